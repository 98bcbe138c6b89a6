//! The supervisor facade handed to the host.
//!
//! A [`Supervisor`] is an explicitly constructed handle; clones share one
//! state, so every part of the host that holds a clone sees the same
//! services, flags and monitor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};

use crate::control;
use crate::errors::Result;
use crate::health::{HealthProbe, HttpProbe};
use crate::monitor::{check_services_health, HealthMonitor};
use crate::parse::{Config, TimingConfig};
use crate::progress::{ProgressReporter, SupervisorEvent};
use crate::runtime::{OsSpawner, ProcessSpawner};
use crate::service::{Registry, ServiceStatus};
use crate::startup;

pub(crate) struct Shared {
    pub(crate) registry: Registry,
    pub(crate) spawner: Arc<dyn ProcessSpawner>,
    pub(crate) probe: Arc<dyn HealthProbe>,
    pub(crate) progress: ProgressReporter,
    pub(crate) timing: TimingConfig,
    pub(crate) rollback_on_failure: bool,
    pub(crate) monitor: Mutex<HealthMonitor>,
    /// Mirrors `monitor.is_active()` for readers that cannot await the lock.
    pub(crate) monitoring: AtomicBool,
    /// Launches hold it shared until their handle is stored; `stop_all` takes
    /// it exclusively while it collects running processes.
    pub(crate) lifecycle: RwLock<()>,
    /// Written while a probe round applies its results, read by snapshots of
    /// the health flags.
    pub(crate) health_round: RwLock<()>,
}

pub(crate) type SupervisorState = Arc<Shared>;

#[derive(Clone)]
pub struct Supervisor {
    state: SupervisorState,
}

impl Supervisor {
    /// Real processes and HTTP health checks.
    pub fn new(config: &Config) -> Result<Self> {
        let probe = HttpProbe::new(config.timing.probe_timeout())?;
        Self::with_backends(config, Arc::new(OsSpawner), Arc::new(probe))
    }

    pub fn with_backends(
        config: &Config,
        spawner: Arc<dyn ProcessSpawner>,
        probe: Arc<dyn HealthProbe>,
    ) -> Result<Self> {
        let registry = Registry::from_config(config)?;
        Ok(Self {
            state: Arc::new(Shared {
                registry,
                spawner,
                probe,
                progress: ProgressReporter::new(config.event_capacity),
                timing: config.timing.clone(),
                rollback_on_failure: config.startup.rollback_on_failure,
                monitor: Mutex::new(HealthMonitor::default()),
                monitoring: AtomicBool::new(false),
                lifecycle: RwLock::new(()),
                health_round: RwLock::new(()),
            }),
        })
    }

    /// Starts every service and waits for all of them to become healthy.
    pub async fn start_all(&self) -> bool {
        startup::start_all(&self.state).await
    }

    /// Like [`Supervisor::start_all`] but hands back the error.
    pub async fn try_start_all(&self) -> Result<()> {
        startup::try_start_all(&self.state).await
    }

    /// Best effort; always ends with `true`.
    pub async fn stop_all(&self) -> bool {
        control::stop_all(&self.state).await
    }

    /// Flags as left by the last completed probe round (or health gate).
    pub async fn is_all_healthy(&self) -> bool {
        let _round = self.state.health_round.read().await;
        for service in self.state.registry.iter() {
            if !service.is_healthy().await {
                return false;
            }
        }
        true
    }

    /// Runs one monitor round right now.
    pub async fn check_health(&self) -> bool {
        check_services_health(&self.state).await.all_healthy()
    }

    pub fn is_monitoring(&self) -> bool {
        self.state.monitoring.load(Ordering::SeqCst)
    }

    pub fn set_progress_callback<F>(&self, callback: F)
    where
        F: Fn(&str, u8) + Send + Sync + 'static,
    {
        self.state.progress.set_callback(Arc::new(callback));
    }

    pub fn clear_progress_callback(&self) {
        self.state.progress.clear_callback();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.state.progress.subscribe()
    }

    pub fn registry(&self) -> &Registry {
        &self.state.registry
    }

    pub async fn statuses(&self) -> Vec<ServiceStatus> {
        let _round = self.state.health_round.read().await;
        let mut out = Vec::with_capacity(self.state.registry.len());
        for service in self.state.registry.iter() {
            out.push(service.status().await);
        }
        out
    }

    /// Whether both handles drive the same supervisor.
    pub fn same_instance(a: &Supervisor, b: &Supervisor) -> bool {
        Arc::ptr_eq(&a.state, &b.state)
    }
}
