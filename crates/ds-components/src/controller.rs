//! Open-loop voltage controller.

use std::f64::consts::PI;

use ds_core::units::{AngularVelocity, Flux, Time, Voltage};
use ds_core::{
    Complex64, SubsystemId, duty_ratios_from_voltage, ensure_non_negative, ensure_positive,
    max_linear_voltage,
};
use ds_sim::{ControlCommand, Controller, Model, SimError, SimResult};

use crate::sampled::SampleConfig;

/// Rotating voltage reference with a linear frequency ramp.
///
/// The voltage magnitude follows `psi_ref * |w|` (constant volts per hertz)
/// and is limited to the linear modulation range. Duty ratios come from
/// min-max zero-sequence injection.
#[derive(Clone, Debug)]
pub struct OpenLoopVoltage {
    sample: SampleConfig,
    /// Final electrical angular frequency (rad/s)
    pub w_final: f64,
    /// Time to reach `w_final` (s); zero applies it as a step
    pub ramp_time: f64,
    /// Flux reference (Wb)
    pub psi_ref: f64,
    /// DC-bus voltage used when no bus is measured (V)
    pub u_dc: f64,
    dc_bus: Option<SubsystemId>,
    theta: f64,
}

impl OpenLoopVoltage {
    pub fn new(
        sample: SampleConfig,
        w_final: AngularVelocity,
        ramp_time: Time,
        psi_ref: Flux,
        u_dc: Voltage,
    ) -> SimResult<Self> {
        if !w_final.value.is_finite() {
            return Err(SimError::InvalidArg {
                what: "final frequency must be finite",
            });
        }
        Ok(Self {
            sample,
            w_final: w_final.value,
            ramp_time: ensure_non_negative(ramp_time.value, "ramp time cannot be negative")?,
            psi_ref: ensure_non_negative(psi_ref.value, "flux reference cannot be negative")?,
            u_dc: ensure_positive(u_dc.value, "DC-bus voltage must be positive")?,
            dc_bus: None,
            theta: 0.0,
        })
    }

    /// Read the DC-bus voltage from output `u_dc` of `converter` instead of
    /// using the fixed value.
    pub fn with_measured_dc_bus(mut self, converter: SubsystemId) -> Self {
        self.dc_bus = Some(converter);
        self
    }

    pub fn sample(&self) -> SampleConfig {
        self.sample
    }

    /// Angle of the voltage reference for the next period (rad).
    pub fn angle(&self) -> f64 {
        self.theta
    }

    /// Electrical frequency reference at `t` (rad/s).
    pub fn frequency_reference(&self, t: f64) -> f64 {
        if self.ramp_time > 0.0 {
            self.w_final * (t / self.ramp_time).min(1.0)
        } else {
            self.w_final
        }
    }

    fn dc_voltage(&self, model: &Model) -> SimResult<f64> {
        let Some(id) = self.dc_bus else {
            return Ok(self.u_dc);
        };
        model
            .output(id, "u_dc")
            .and_then(|v| v.as_real())
            .ok_or_else(|| SimError::Controller {
                message: "DC-bus voltage is not measurable".to_string(),
            })
    }
}

impl Controller for OpenLoopVoltage {
    fn control(&mut self, t: f64, model: &Model) -> SimResult<ControlCommand> {
        let u_dc = self.dc_voltage(model)?;
        if u_dc <= 0.0 {
            return Err(SimError::Controller {
                message: format!("DC-bus voltage collapsed to {u_dc} V"),
            });
        }
        let w = self.frequency_reference(t);

        // Voltage leads the flux by 90 degrees in steady state.
        let u_max = max_linear_voltage(u_dc);
        let u_mag = (self.psi_ref * w.abs()).min(u_max);
        let u_ref = Complex64::from_polar(u_mag, self.theta + w.signum() * 0.5 * PI);
        let duty = duty_ratios_from_voltage(u_ref, u_dc);

        let t_s = self.sample.t_s;
        self.theta = (self.theta + w * t_s + PI).rem_euclid(2.0 * PI) - PI;
        tracing::trace!(t, w, u_mag, "open-loop voltage reference");
        Ok(ControlCommand::new(t_s, duty))
    }

    fn reset(&mut self) {
        self.theta = 0.0;
    }
}
