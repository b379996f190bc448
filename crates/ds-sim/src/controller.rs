//! Contract for the sampled digital controller driving a simulation.

use crate::error::SimResult;
use crate::model::Model;
use crate::pwm::DutyRatios;

/// Output of one controller invocation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlCommand {
    /// Sampling period until the next invocation (seconds), must be positive.
    pub t_s: f64,
    /// Duty-ratio reference for the converter.
    pub duty: DutyRatios,
}

impl ControlCommand {
    pub fn new(t_s: f64, duty: DutyRatios) -> Self {
        Self { t_s, duty }
    }
}

/// Sampled controller invoked once per sampling period.
///
/// Reads measurements from the model (outputs and states, read-only) and may
/// keep private discrete state between calls.
pub trait Controller {
    fn control(&mut self, t: f64, model: &Model) -> SimResult<ControlCommand>;

    /// Return to the state right after construction.
    fn reset(&mut self) {}
}

impl<F> Controller for F
where
    F: FnMut(f64, &Model) -> SimResult<ControlCommand>,
{
    fn control(&mut self, t: f64, model: &Model) -> SimResult<ControlCommand> {
        self(t, model)
    }
}
