use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Rejected physical parameter or numeric input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Out of range: {what} (got {value})")]
    OutOfRange { what: &'static str, value: f64 },
}
