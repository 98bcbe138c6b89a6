//! Crate-wide error type.
//!
//! Only failures that abort an operation live here. Probe failures during
//! polling are `ProbeOutcome::Unreachable` and unexpected exits are reported
//! as `SupervisorEvent::ServiceExited`; neither is ever surfaced as an error.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("{name} executable not found: {}", .path.display())]
    ExecutableMissing { name: String, path: PathBuf },

    #[error("Failed to spawn {name} process: {source}")]
    SpawnFailure {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timeout waiting for {name} to become healthy ({}ms)", .timeout.as_millis())]
    HealthCheckTimeout { name: String, timeout: Duration },
}

impl SupervisorError {
    /// Display name of the service a startup failure belongs to.
    pub fn service(&self) -> Option<&str> {
        match self {
            SupervisorError::ExecutableMissing { name, .. }
            | SupervisorError::SpawnFailure { name, .. }
            | SupervisorError::HealthCheckTimeout { name, .. } => Some(name),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
