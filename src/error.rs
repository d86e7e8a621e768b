use std::process::ExitStatus;

use crate::providers::ProviderError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("command failed: {command}")]
    CommandFailed { command: String, status: ExitStatus },

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("SSH error: {0}")]
    Ssh(String),

    #[error("deployment failed: {0}")]
    Deployment(String),

    #[error("state store error: {0}")]
    State(String),

    #[error("health check failed for {0} after {1} attempts")]
    HealthCheckTimeout(String, u32),

    #[error("no free port on {0} in range 3000-9000")]
    PortsExhausted(String),

    #[error("environment variable missing: {0}")]
    EnvMissing(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for build, activation, and health-check failures that the
    /// push phase records into `push_failed` on the target state.
    #[must_use]
    pub const fn is_deployment(&self) -> bool {
        matches!(self, Self::Deployment(_) | Self::HealthCheckTimeout(_, _))
    }
}
