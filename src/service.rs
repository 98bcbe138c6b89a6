//! Service descriptors and the insertion-ordered registry that owns them.
//!
//! Static fields of a [`Service`] never change after registration. The
//! mutable part ([`ServiceState`]) sits behind one mutex per service so that
//! spawn, exit observation and probe results are applied one writer at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::errors::{Result, SupervisorError};
use crate::parse::Config;
use crate::restart::RestartConfig;
use crate::runtime::{ExitOutcome, ProcessHandle};

pub struct Service {
    id: String,
    name: String,
    executable: PathBuf,
    args: Vec<String>,
    health_url: String,
    restart: RestartConfig,
    pub(crate) state: Mutex<ServiceState>,
}

/// Mutable half of a service.
///
/// `process` is `Some` iff a spawn succeeded and its exit has not been observed yet.
#[derive(Default)]
pub(crate) struct ServiceState {
    pub(crate) process: Option<Arc<dyn ProcessHandle>>,
    pub(crate) healthy: bool,
    pub(crate) last_exit: Option<ExitOutcome>,
    /// Bumped on every spawn; exit observers of older generations leave the state alone.
    pub(crate) generation: u64,
    /// Set while shutdown is terminating the current process.
    pub(crate) stopping: bool,
    pub(crate) restarts: u32,
}

/// Point-in-time view of a service, for hosts and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub id: String,
    pub name: String,
    pub pid: Option<u32>,
    pub running: bool,
    pub healthy: bool,
    pub last_exit: Option<ExitOutcome>,
    pub restarts: u32,
}

impl Service {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        executable: impl Into<PathBuf>,
        args: Vec<String>,
        health_url: impl Into<String>,
        restart: RestartConfig,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            executable: executable.into(),
            args,
            health_url: health_url.into(),
            restart,
            state: Mutex::new(ServiceState::default()),
        }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn executable(&self) -> &Path { &self.executable }
    pub fn args(&self) -> &[String] { &self.args }
    pub fn health_url(&self) -> &str { &self.health_url }
    pub fn restart(&self) -> &RestartConfig { &self.restart }

    pub async fn is_healthy(&self) -> bool {
        self.state.lock().await.healthy
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.process.is_some()
    }

    pub async fn status(&self) -> ServiceStatus {
        let st = self.state.lock().await;
        ServiceStatus {
            id: self.id.clone(),
            name: self.name.clone(),
            pid: st.process.as_ref().and_then(|p| p.pid()),
            running: st.process.is_some(),
            healthy: st.healthy,
            last_exit: st.last_exit,
            restarts: st.restarts,
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("executable", &self.executable)
            .field("args", &self.args)
            .field("health_url", &self.health_url)
            .finish_non_exhaustive()
    }
}

/// Insertion-ordered set of services keyed by id.
#[derive(Debug, Default)]
pub struct Registry {
    services: Vec<Arc<Service>>,
}

impl Registry {
    /// Builds the registry from configuration. Reads nothing but `cfg`: no I/O, no spawning.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let mut registry = Registry::default();
        for svc in &cfg.services {
            if svc.name.trim().is_empty() {
                return Err(SupervisorError::Config("service with empty name".into()));
            }
            if svc.health_url.trim().is_empty() {
                return Err(SupervisorError::Config(format!("{} has no health_url", svc.name)));
            }
            let id = svc.id.clone().unwrap_or_else(|| derive_id(&svc.name));
            registry.insert(Service::new(
                id,
                svc.name.clone(),
                cfg.executable_path(svc),
                svc.args.clone(),
                svc.health_url.clone(),
                RestartConfig::from(svc),
            ))?;
        }
        Ok(registry)
    }

    pub fn insert(&mut self, service: Service) -> Result<()> {
        if self.get(service.id()).is_some() {
            return Err(SupervisorError::Config(format!("duplicate service id `{}`", service.id())));
        }
        self.services.push(Arc::new(service));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Service>> {
        self.services.iter().find(|s| s.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Service>> {
        self.services.iter()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// "Py Bridge" -> "py-bridge"
fn derive_id(name: &str) -> String {
    name.trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}
