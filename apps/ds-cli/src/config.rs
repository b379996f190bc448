//! YAML drive description.
//!
//! Every section is optional; anything left out takes its default.
//!
//! ```yaml
//! sim:
//!   t_stop: 0.5
//!   integrator: dormand_prince
//!   delay: 1
//!   modulator:
//!     kind: carrier_comparison
//!     levels: 4096
//! plant:
//!   u_dc: 540.0
//!   dc_link:
//!     c_dc: 1.0e-3
//!     r_g: 0.1
//! control:
//!   t_s: 1.0e-4
//!   w_final: 314.16
//!   ramp_time: 0.4
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use ds_components::{OpenLoopVoltage, PmsmDriveParams, SampleConfig, assemble_pmsm_drive};
use ds_core::units::{rad_per_s, s, volts, webers};
use ds_sim::{SimOptions, SimResult, Simulation};

use crate::error::CliResult;

/// Open-loop controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Sampling period (s)
    pub t_s: f64,
    /// Final electrical angular frequency (rad/s)
    pub w_final: f64,
    /// Frequency ramp time (s)
    pub ramp_time: f64,
    /// Flux reference (Wb); defaults to the PM flux when absent
    pub psi_ref: Option<f64>,
    /// Scale duty ratios by the measured DC-link voltage
    pub measured_dc_bus: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            t_s: 1e-4,
            w_final: 2.0 * std::f64::consts::PI * 50.0,
            ramp_time: 0.4,
            psi_ref: None,
            measured_dc_bus: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub sim: SimOptions,
    pub plant: PmsmDriveParams,
    pub control: ControlConfig,
}

impl DriveConfig {
    pub fn from_yaml(text: &str) -> CliResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn to_yaml(&self) -> CliResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Assemble the plant and controller into a ready-to-run simulation.
    pub fn simulation(&self) -> SimResult<Simulation<OpenLoopVoltage>> {
        let drive = assemble_pmsm_drive(&self.plant)?;
        let sample = SampleConfig::new(s(self.control.t_s))?;
        let mut controller = OpenLoopVoltage::new(
            sample,
            rad_per_s(self.control.w_final),
            s(self.control.ramp_time),
            webers(self.control.psi_ref.unwrap_or(self.plant.psi_f)),
            volts(self.plant.u_dc),
        )?;
        if self.control.measured_dc_bus && self.plant.dc_link.is_some() {
            controller = controller.with_measured_dc_bus(drive.converter);
        }
        Simulation::new(drive.model, drive.switching, controller, self.sim.clone())
    }
}
