use ds_sim::SimError;
use thiserror::Error;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Simulation error: {0}")]
    Sim(#[from] SimError),

    #[error("Config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run aborted at t = {t} s: {reason}")]
    Aborted { t: f64, reason: SimError },

    #[error("Invalid argument: {0}")]
    InvalidArg(String),
}
