//! Rotor mechanics.

use ds_core::units::{Inertia, Torque};
use ds_core::{ensure_finite, ensure_non_negative, ensure_positive};
use ds_sim::{SignalDecl, Signals, SignalsMut, SimResult, Subsystem, Value};

/// Rigid shaft with inertia, viscous friction and a constant load torque.
///
/// ```text
/// J * dw_m/dt = tau_m - tau_L - b * w_m
/// ```
///
/// where:
/// - J is the total moment of inertia (kg·m²)
/// - tau_m is the electromagnetic torque from the machine
/// - tau_L is the load torque
/// - b is the viscous friction coefficient (N·m·s/rad)
#[derive(Clone, Debug)]
pub struct Mechanics {
    /// Moment of inertia (kg·m²)
    pub inertia: f64,
    /// Viscous friction coefficient (N·m·s/rad)
    pub friction: f64,
    /// Constant load torque (N·m)
    pub tau_load: f64,
}

impl Mechanics {
    const STATES: [SignalDecl; 1] = [SignalDecl::real("w_m")];
    const INPUTS: [SignalDecl; 1] = [SignalDecl::real("tau_m")];
    const OUTPUTS: [SignalDecl; 1] = [SignalDecl::real("w_m")];

    /// Create a frictionless, unloaded shaft.
    ///
    /// # Errors
    /// Returns error if the inertia is not positive.
    pub fn new(inertia: Inertia) -> SimResult<Self> {
        Ok(Self {
            inertia: ensure_positive(inertia.value, "shaft inertia must be positive")?,
            friction: 0.0,
            tau_load: 0.0,
        })
    }

    /// Set the viscous friction coefficient (N·m·s/rad).
    pub fn with_friction(mut self, friction: f64) -> SimResult<Self> {
        self.friction = ensure_non_negative(friction, "friction coefficient cannot be negative")?;
        Ok(self)
    }

    pub fn with_load_torque(mut self, tau_load: Torque) -> SimResult<Self> {
        self.tau_load = ensure_finite(tau_load.value, "load torque")?;
        Ok(self)
    }

    /// Friction torque, always opposing motion.
    pub fn friction_torque(&self, w_m: f64) -> f64 {
        -self.friction * w_m
    }

    /// Angular acceleration dw_m/dt (rad/s²) for an applied torque.
    pub fn angular_acceleration(&self, tau_m: f64, w_m: f64) -> f64 {
        (tau_m - self.tau_load + self.friction_torque(w_m)) / self.inertia
    }
}

impl Subsystem for Mechanics {
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
        vec![Value::Real(0.0)]
    }

    fn compute_outputs(
        &self,
        _t: f64,
        state: &Signals<'_>,
        _input: &Signals<'_>,
        output: &mut SignalsMut<'_>,
    ) -> SimResult<()> {
        output.set(0, state.real(0)?)
    }

    fn rhs(
        &self,
        _t: f64,
        state: &Signals<'_>,
        input: &Signals<'_>,
        _output: &Signals<'_>,
        derivative: &mut SignalsMut<'_>,
    ) -> SimResult<()> {
        let w_m = state.real(0)?;
        derivative.set(0, self.angular_acceleration(input.real(0)?, w_m))
    }
}
