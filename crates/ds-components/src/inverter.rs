//! Three-phase two-level converters.

use ds_core::units::{Capacitance, Resistance, Voltage};
use ds_core::{Complex64, abc_to_complex, ensure_positive};
use ds_sim::{SignalDecl, Signals, SignalsMut, SimResult, Subsystem, Value};

/// Converter fed from an ideal DC bus.
///
/// ```text
/// u_cs = u_dc * space_vector(q_cs)
/// ```
#[derive(Clone, Debug)]
pub struct StiffInverter {
    /// DC-bus voltage (V)
    pub u_dc: f64,
}

impl StiffInverter {
    const INPUTS: [SignalDecl; 1] = [SignalDecl::phases("q_cs")];
    const OUTPUTS: [SignalDecl; 1] = [SignalDecl::complex("u_cs")];

    pub fn new(u_dc: Voltage) -> SimResult<Self> {
        Ok(Self {
            u_dc: ensure_positive(u_dc.value, "DC-bus voltage must be positive")?,
        })
    }
}

impl Subsystem for StiffInverter {
    fn states(&self) -> &[SignalDecl] {
        &[]
    }

    fn inputs(&self) -> &[SignalDecl] {
        &Self::INPUTS
    }

    fn outputs(&self) -> &[SignalDecl] {
        &Self::OUTPUTS
    }

    fn initial_state(&self) -> Vec<Value> {
        Vec::new()
    }

    fn compute_outputs(
        &self,
        _t: f64,
        _state: &Signals<'_>,
        input: &Signals<'_>,
        output: &mut SignalsMut<'_>,
    ) -> SimResult<()> {
        let q = abc_to_complex(input.phases(0)?);
        output.set(0, self.u_dc * q)
    }

    fn rhs(
        &self,
        _t: f64,
        _state: &Signals<'_>,
        _input: &Signals<'_>,
        _output: &Signals<'_>,
        _derivative: &mut SignalsMut<'_>,
    ) -> SimResult<()> {
        Ok(())
    }
}

/// Converter with a DC-link capacitor charged from a source through a
/// resistance.
///
/// ```text
/// C * du_dc/dt = (u_g - u_dc) / R_g - i_dc
/// i_dc = 1.5 * Re(q * conj(i_cs))
/// ```
///
/// where `q` is the space vector of the switching state.
#[derive(Clone, Debug)]
pub struct DcLinkInverter {
    /// DC-link capacitance (F)
    pub c_dc: f64,
    /// Source resistance (Ω)
    pub r_g: f64,
    /// Source voltage (V)
    pub u_g: f64,
}

impl DcLinkInverter {
    const STATES: [SignalDecl; 1] = [SignalDecl::real("u_dc")];
    const INPUTS: [SignalDecl; 2] = [SignalDecl::phases("q_cs"), SignalDecl::complex("i_cs")];
    const OUTPUTS: [SignalDecl; 2] = [SignalDecl::complex("u_cs"), SignalDecl::real("u_dc")];

    pub fn new(c_dc: Capacitance, r_g: Resistance, u_g: Voltage) -> SimResult<Self> {
        Ok(Self {
            c_dc: ensure_positive(c_dc.value, "DC-link capacitance must be positive")?,
            r_g: ensure_positive(r_g.value, "source resistance must be positive")?,
            u_g: ensure_positive(u_g.value, "source voltage must be positive")?,
        })
    }

    /// DC-side current drawn by the converter.
    pub fn dc_current(q: [f64; 3], i_cs: Complex64) -> f64 {
        1.5 * (abc_to_complex(q) * i_cs.conj()).re
    }
}

impl Subsystem for DcLinkInverter {
    fn states(&self) -> &[SignalDecl] {
        &Self::STATES
    }

    fn inputs(&self) -> &[SignalDecl] {
        &Self::INPUTS
    }

    fn outputs(&self) -> &[SignalDecl] {
        &Self::OUTPUTS
    }

    /// The capacitor starts charged to the source voltage.
    fn initial_state(&self) -> Vec<Value> {
        vec![Value::Real(self.u_g)]
    }

    fn compute_outputs(
        &self,
        _t: f64,
        state: &Signals<'_>,
        input: &Signals<'_>,
        output: &mut SignalsMut<'_>,
    ) -> SimResult<()> {
        let u_dc = state.real(0)?;
        let q = abc_to_complex(input.phases(0)?);
        output.set(0, u_dc * q)?;
        output.set(1, u_dc)
    }

    fn rhs(
        &self,
        _t: f64,
        state: &Signals<'_>,
        input: &Signals<'_>,
        _output: &Signals<'_>,
        derivative: &mut SignalsMut<'_>,
    ) -> SimResult<()> {
        let u_dc = state.real(0)?;
        let i_dc = Self::dc_current(input.phases(0)?, input.complex(1)?);
        let i_g = (self.u_g - u_dc) / self.r_g;
        derivative.set(0, (i_g - i_dc) / self.c_dc)
    }
}
