//! Error types for simulation operations.

use thiserror::Error;

use crate::signal::ValueKind;

/// Errors encountered while assembling or running a drive simulation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Duplicate subsystem name '{name}'")]
    DuplicateName { name: String },

    #[error("Unknown subsystem id {id}")]
    UnknownSubsystem { id: u32 },

    #[error("Unknown external input id {id}")]
    UnknownExternal { id: u32 },

    #[error("Subsystem '{subsystem}' has no {direction} named '{port}'")]
    UnknownPort {
        subsystem: String,
        direction: &'static str,
        port: String,
    },

    #[error("Input '{subsystem}.{input}' is not wired to any source")]
    UnwiredInput { subsystem: String, input: String },

    #[error("Input '{subsystem}.{input}' is driven by more than one source")]
    MultipleDrivers { subsystem: String, input: String },

    #[error("Kind mismatch for '{signal}': expected {expected}, found {found}")]
    KindMismatch {
        signal: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("Subsystem '{subsystem}' declares {declared} states but supplied {supplied} initial values")]
    StateCount {
        subsystem: String,
        declared: usize,
        supplied: usize,
    },

    #[error("Interconnect-driven input '{input}' read while computing outputs")]
    Feedthrough { input: &'static str },

    #[error("Signal '{signal}' was not written")]
    Unwritten { signal: &'static str },

    #[error("Index out of bounds: {what} (index={index}, len={len})")]
    IndexOob {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("State vector length mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Non-finite value in {what} at t={t}")]
    NonFinite { what: &'static str, t: f64 },

    #[error("Step size collapsed to {h:e} at t={t}")]
    StepSizeTooSmall { t: f64, h: f64 },

    #[error("Controller error: {message}")]
    Controller { message: String },
}

impl SimError {
    /// True for invalid-floating-point conditions raised during integration.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            SimError::NonFinite { .. } | SimError::StepSizeTooSmall { .. }
        )
    }
}

pub type SimResult<T> = Result<T, SimError>;

impl From<ds_core::CoreError> for SimError {
    fn from(e: ds_core::CoreError) -> Self {
        match e {
            ds_core::CoreError::NonFinite { what, .. }
            | ds_core::CoreError::OutOfRange { what, .. } => SimError::InvalidArg { what },
        }
    }
}
