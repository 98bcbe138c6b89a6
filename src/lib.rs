//! Supervisor for the sidecar services a host application depends on.
//!
//! Launches every configured service, holds the host back until each one
//! answers its health endpoint, keeps polling them afterwards and tears them
//! down with SIGTERM, escalating to SIGKILL after a grace period.

pub mod parse;
pub mod errors;
pub mod service;
pub mod runtime;
pub mod health;
pub mod startup;
pub mod monitor;
pub mod control;
pub mod restart;
pub mod progress;
pub mod supervisor;
pub mod shell;
pub mod logger;

pub use errors::{Result, SupervisorError};
pub use health::{HealthProbe, HttpProbe, ProbeOutcome};
pub use parse::Config;
pub use progress::{Progress, SupervisorEvent};
pub use runtime::{ExitOutcome, ExitWatch, OsSpawner, ProcessHandle, ProcessSpawner};
pub use service::{Service, ServiceStatus};
pub use supervisor::Supervisor;
