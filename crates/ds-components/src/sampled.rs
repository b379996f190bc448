//! Sampling configuration for digital controllers.
//!
//! Controllers run once per sampling period; the converter holds their
//! output until the next sample.

use serde::{Deserialize, Serialize};

use ds_core::units::{Frequency, Time};
use ds_sim::{SimError, SimResult};

/// Sampling period of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleConfig {
    /// Sample period in seconds.
    pub t_s: f64,
}

impl SampleConfig {
    /// Create a new sample configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the period is not positive and finite.
    pub fn new(t_s: Time) -> SimResult<Self> {
        Self::from_seconds(t_s.value)
    }

    /// Create a sample configuration from frequency.
    ///
    /// For double-update PWM the sampling frequency is twice the switching
    /// frequency.
    pub fn from_frequency(f_s: Frequency) -> SimResult<Self> {
        if !(f_s.value.is_finite() && f_s.value > 0.0) {
            return Err(SimError::InvalidArg {
                what: "sampling frequency must be positive",
            });
        }
        Self::from_seconds(1.0 / f_s.value)
    }

    pub(crate) fn from_seconds(t_s: f64) -> SimResult<Self> {
        if !(t_s.is_finite() && t_s > 0.0) {
            return Err(SimError::InvalidArg {
                what: "sampling period must be positive",
            });
        }
        Ok(Self { t_s })
    }

    /// Get the sample frequency in Hz.
    pub fn frequency(&self) -> f64 {
        1.0 / self.t_s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_core::units::{hz, s};

    #[test]
    fn period_and_frequency_agree() {
        let cfg = SampleConfig::from_frequency(hz(10e3)).unwrap();
        assert!((cfg.t_s - 1e-4).abs() < 1e-18);
        assert!((cfg.frequency() - 10e3).abs() < 1e-9);
        assert_eq!(SampleConfig::new(s(2.5e-4)).unwrap().t_s, 2.5e-4);
    }

    #[test]
    fn non_positive_period_is_rejected() {
        assert!(SampleConfig::new(s(0.0)).is_err());
        assert!(SampleConfig::new(s(-1e-4)).is_err());
        assert!(SampleConfig::from_frequency(hz(0.0)).is_err());
    }
}
