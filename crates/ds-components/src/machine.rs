//! Permanent-magnet synchronous machine.

use ds_core::units::{Flux, Inductance, Resistance};
use ds_core::{Complex64, ensure_non_negative, ensure_positive};
use ds_sim::{SignalDecl, SimError, Signals, SignalsMut, SimResult, Subsystem, Value};

/// Non-salient PMSM modelled in stator coordinates.
///
/// States are the stator flux linkage `psi_s` and the electrical rotor
/// angle `theta_m`:
///
/// ```text
/// dpsi_s/dt  = u_s - R_s * i_s
/// dtheta_m/dt = n_p * w_m
/// i_s   = (psi_s - psi_f * exp(j*theta_m)) / L_s
/// tau_m = 1.5 * n_p * Im(i_s * conj(psi_s))
/// ```
///
/// `w_m` is the mechanical rotor speed supplied by the mechanics.
#[derive(Clone, Debug)]
pub struct PmSyncMachine {
    /// Stator resistance (Ω)
    pub r_s: f64,
    /// Synchronous inductance (H)
    pub l_s: f64,
    /// PM flux linkage (Wb)
    pub psi_f: f64,
    /// Number of pole pairs
    pub n_p: u32,
}

impl PmSyncMachine {
    const STATES: [SignalDecl; 2] = [SignalDecl::complex("psi_s"), SignalDecl::real("theta_m")];
    const INPUTS: [SignalDecl; 2] = [SignalDecl::complex("u_s"), SignalDecl::real("w_m")];
    const OUTPUTS: [SignalDecl; 2] = [SignalDecl::complex("i_s"), SignalDecl::real("tau_m")];

    pub fn new(r_s: Resistance, l_s: Inductance, psi_f: Flux, n_p: u32) -> SimResult<Self> {
        if n_p == 0 {
            return Err(SimError::InvalidArg {
                what: "number of pole pairs must be positive",
            });
        }
        Ok(Self {
            r_s: ensure_non_negative(r_s.value, "stator resistance cannot be negative")?,
            l_s: ensure_positive(l_s.value, "stator inductance must be positive")?,
            psi_f: ensure_non_negative(psi_f.value, "PM flux cannot be negative")?,
            n_p,
        })
    }

    /// Stator current from flux linkage and electrical angle.
    pub fn current(&self, psi_s: Complex64, theta_m: f64) -> Complex64 {
        (psi_s - self.psi_f * Complex64::from_polar(1.0, theta_m)) / self.l_s
    }

    /// Electromagnetic torque (N·m).
    pub fn torque(&self, psi_s: Complex64, i_s: Complex64) -> f64 {
        1.5 * f64::from(self.n_p) * (i_s * psi_s.conj()).im
    }
}

impl Subsystem for PmSyncMachine {
    fn states(&self) -> &[SignalDecl] {
        &Self::STATES
    }

    fn inputs(&self) -> &[SignalDecl] {
        &Self::INPUTS
    }

    fn outputs(&self) -> &[SignalDecl] {
        &Self::OUTPUTS
    }

    /// Flux aligned with the magnets, rotor at zero angle: no current.
    fn initial_state(&self) -> Vec<Value> {
        vec![
            Value::Complex(Complex64::new(self.psi_f, 0.0)),
            Value::Real(0.0),
        ]
    }

    fn compute_outputs(
        &self,
        _t: f64,
        state: &Signals<'_>,
        _input: &Signals<'_>,
        output: &mut SignalsMut<'_>,
    ) -> SimResult<()> {
        let psi_s = state.complex(0)?;
        let i_s = self.current(psi_s, state.real(1)?);
        output.set(0, i_s)?;
        output.set(1, self.torque(psi_s, i_s))
    }

    fn rhs(
        &self,
        _t: f64,
        _state: &Signals<'_>,
        input: &Signals<'_>,
        output: &Signals<'_>,
        derivative: &mut SignalsMut<'_>,
    ) -> SimResult<()> {
        let u_s = input.complex(0)?;
        let w_m = input.real(1)?;
        let i_s = output.complex(0)?;
        derivative.set(0, u_s - self.r_s * i_s)?;
        derivative.set(1, f64::from(self.n_p) * w_m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_core::units::{henries, ohms, webers};

    fn machine() -> PmSyncMachine {
        PmSyncMachine::new(ohms(3.6), henries(0.036), webers(0.545), 3).unwrap()
    }

    #[test]
    fn machine_invalid_parameters() {
        assert!(PmSyncMachine::new(ohms(3.6), henries(0.036), webers(0.545), 0).is_err());
        assert!(PmSyncMachine::new(ohms(3.6), henries(0.0), webers(0.545), 3).is_err());
        assert!(PmSyncMachine::new(ohms(-1.0), henries(0.036), webers(0.545), 3).is_err());
    }

    #[test]
    fn aligned_flux_gives_no_current() {
        let m = machine();
        let i_s = m.current(Complex64::new(0.545, 0.0), 0.0);
        assert!(i_s.norm() < 1e-12);
        let theta = 1.2;
        let i_s = m.current(m.psi_f * Complex64::from_polar(1.0, theta), theta);
        assert!(i_s.norm() < 1e-12);
    }

    #[test]
    fn q_axis_current_produces_torque() {
        // psi_s = psi_f + j L_s i_q at theta = 0
        let m = machine();
        let i_q = 5.0;
        let psi_s = Complex64::new(m.psi_f, m.l_s * i_q);
        let i_s = m.current(psi_s, 0.0);
        assert!((i_s.im - i_q).abs() < 1e-12);
        let tau = m.torque(psi_s, i_s);
        assert!((tau - 1.5 * 3.0 * m.psi_f * i_q).abs() < 1e-9);
    }
}
