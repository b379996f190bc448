//! Three-phase RL load in stator coordinates.

use ds_core::units::{Inductance, Resistance};
use ds_core::{Complex64, ensure_non_negative, ensure_positive};
use ds_sim::{SignalDecl, Signals, SignalsMut, SimResult, Subsystem, Value};

/// Balanced, star-connected RL load.
///
/// ```text
/// L * di_s/dt = u_s - R * i_s
/// ```
#[derive(Clone, Debug)]
pub struct RlLoad {
    /// Resistance (Ω)
    pub r: f64,
    /// Inductance (H)
    pub l: f64,
}

impl RlLoad {
    const STATES: [SignalDecl; 1] = [SignalDecl::complex("i_s")];
    const INPUTS: [SignalDecl; 1] = [SignalDecl::complex("u_s")];
    const OUTPUTS: [SignalDecl; 1] = [SignalDecl::complex("i_s")];

    pub fn new(r: Resistance, l: Inductance) -> SimResult<Self> {
        Ok(Self {
            r: ensure_non_negative(r.value, "load resistance cannot be negative")?,
            l: ensure_positive(l.value, "load inductance must be positive")?,
        })
    }

    /// Time constant L/R (s); infinite for a purely inductive load.
    pub fn time_constant(&self) -> f64 {
        self.l / self.r
    }
}

impl Subsystem for RlLoad {
    fn states(&self) -> &[SignalDecl] {
        &Self::STATES
    }

    fn inputs(&self) -> &[SignalDecl] {
        &Self::INPUTS
    }

    fn outputs(&self) -> &[SignalDecl] {
        &Self::OUTPUTS
    }

    fn initial_state(&self) -> Vec<Value> {
        vec![Value::Complex(Complex64::new(0.0, 0.0))]
    }

    fn compute_outputs(
        &self,
        _t: f64,
        state: &Signals<'_>,
        _input: &Signals<'_>,
        output: &mut SignalsMut<'_>,
    ) -> SimResult<()> {
        output.set(0, state.complex(0)?)
    }

    fn rhs(
        &self,
        _t: f64,
        state: &Signals<'_>,
        input: &Signals<'_>,
        _output: &Signals<'_>,
        derivative: &mut SignalsMut<'_>,
    ) -> SimResult<()> {
        let i_s = state.complex(0)?;
        let u_s = input.complex(0)?;
        derivative.set(0, (u_s - self.r * i_s) / self.l)
    }
}
