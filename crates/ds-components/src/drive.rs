//! Ready-made drive assemblies.

use serde::{Deserialize, Serialize};

use ds_core::units::{farads, henries, kg_m2, nm, ohms, volts, webers};
use ds_core::{ExternalId, SubsystemId};
use ds_sim::{Model, SimResult, ValueKind};

use crate::inverter::{DcLinkInverter, StiffInverter};
use crate::machine::PmSyncMachine;
use crate::mechanics::Mechanics;

/// DC-link parameters; without them the converter sees a stiff bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcLinkParams {
    /// DC-link capacitance (F)
    pub c_dc: f64,
    /// Source resistance (Ω)
    pub r_g: f64,
}

/// Parameters of an inverter-fed PMSM drive, in SI units.
///
/// Defaults describe a 2.2-kW, 6-pole machine on a 540-V bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PmsmDriveParams {
    /// DC-bus (or source) voltage (V)
    pub u_dc: f64,
    /// Stator resistance (Ω)
    pub r_s: f64,
    /// Synchronous inductance (H)
    pub l_s: f64,
    /// PM flux linkage (Wb)
    pub psi_f: f64,
    /// Number of pole pairs
    pub n_p: u32,
    /// Total moment of inertia (kg·m²)
    pub inertia: f64,
    /// Viscous friction coefficient (N·m·s/rad)
    pub friction: f64,
    /// Constant load torque (N·m)
    pub tau_load: f64,
    pub dc_link: Option<DcLinkParams>,
}

impl Default for PmsmDriveParams {
    fn default() -> Self {
        Self {
            u_dc: 540.0,
            r_s: 3.6,
            l_s: 0.036,
            psi_f: 0.545,
            n_p: 3,
            inertia: 0.015,
            friction: 0.0,
            tau_load: 0.0,
            dc_link: None,
        }
    }
}

/// An assembled model and the handles a driver needs.
#[derive(Debug)]
pub struct DriveModel {
    pub model: Model,
    /// External input carrying the converter switching state
    pub switching: ExternalId,
    pub converter: SubsystemId,
    pub machine: SubsystemId,
    pub mechanics: SubsystemId,
}

/// Build converter + PMSM + mechanics, registered in that order.
///
/// Wiring:
/// - switching state -> converter `q_cs`
/// - converter `u_cs` -> machine `u_s`
/// - mechanics `w_m` -> machine `w_m`
/// - machine `tau_m` -> mechanics `tau_m`
/// - machine `i_s` -> converter `i_cs` (DC-link converter only)
pub fn assemble_pmsm_drive(params: &PmsmDriveParams) -> SimResult<DriveModel> {
    let mut builder = Model::builder();

    let converter = match &params.dc_link {
        Some(dc) => builder.add(
            "converter",
            DcLinkInverter::new(farads(dc.c_dc), ohms(dc.r_g), volts(params.u_dc))?,
        ),
        None => builder.add("converter", StiffInverter::new(volts(params.u_dc))?),
    };
    let machine = builder.add(
        "machine",
        PmSyncMachine::new(
            ohms(params.r_s),
            henries(params.l_s),
            webers(params.psi_f),
            params.n_p,
        )?,
    );
    let mechanics = builder.add(
        "mechanics",
        Mechanics::new(kg_m2(params.inertia))?
            .with_friction(params.friction)?
            .with_load_torque(nm(params.tau_load))?,
    );

    let switching = builder.external("q_cs", ValueKind::Phases);
    builder.drive(switching, converter, "q_cs");
    builder
        .connect(converter, "u_cs", machine, "u_s")
        .connect(mechanics, "w_m", machine, "w_m")
        .connect(machine, "tau_m", mechanics, "tau_m");
    if params.dc_link.is_some() {
        builder.connect(machine, "i_s", converter, "i_cs");
    }

    let model = builder.build()?;
    tracing::debug!(dim = model.dim(), dc_link = params.dc_link.is_some(), "PMSM drive assembled");
    Ok(DriveModel {
        model,
        switching,
        converter,
        machine,
        mechanics,
    })
}
