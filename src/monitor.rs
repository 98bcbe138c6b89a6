use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::health::ProbeOutcome;
use crate::supervisor::{Shared, SupervisorState};

/// Result of one probe round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: usize,
    pub total: usize,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.healthy >= self.total
    }

    pub fn percent(&self) -> u8 {
        aggregate_progress(self.healthy, self.total)
    }
}

/// 100 when everything is healthy, otherwise `40 + floor(healthy / total * 60)`.
pub fn aggregate_progress(healthy: usize, total: usize) -> u8 {
    if total == 0 || healthy >= total {
        return 100;
    }
    (40 + healthy * 60 / total) as u8
}

/// Handle of the periodic probe task. At most one task is alive at a time.
#[derive(Default)]
pub struct HealthMonitor {
    task: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Replaces any running monitor with a fresh one. The first tick fires one period from now.
    pub(crate) async fn start(&mut self, state: &SupervisorState) {
        self.stop(state).await;

        let period = state.timing.monitor_interval();
        self.task = Some(tokio::spawn(run_monitor(Arc::downgrade(state), period)));
        state.monitoring.store(true, Ordering::SeqCst);
        info!(interval_ms = period.as_millis() as u64, "Health monitor started");
    }

    /// Idempotent. Returns once the task is gone, so no probe outlives the call.
    pub(crate) async fn stop(&mut self, state: &Shared) {
        state.monitoring.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            info!("Health monitor stopped");
        }
    }
}

async fn run_monitor(state: Weak<Shared>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    // a slow round pushes the next one back instead of stacking ticks
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(state) = state.upgrade() else {
            debug!("supervisor dropped; health monitor exiting");
            break;
        };
        check_services_health(&state).await;
    }
}

/*
    @@@
    @check_services_health();
    . Probes every registered service once, all probes in flight together.
    . Compares each result with the previous flag: false->true logs "now healthy", true->false warns
      "no longer healthy"; the flag takes the new value either way.
    . All flags of a round are applied under the round guard, so snapshots never see half a round.
    . Reports 100% "All services are ready" or 40..=99% "Waiting for services to be ready...".
*/
pub(crate) async fn check_services_health(state: &Shared) -> HealthReport {
    let services: Vec<_> = state.registry.iter().cloned().collect();
    let outcomes = join_all(services.iter().map(|s| state.probe.probe(s.health_url()))).await;

    // Readers see either the previous round or this one, never a mix.
    let round = state.health_round.write().await;
    let mut healthy = 0;
    for (service, outcome) in services.iter().zip(outcomes) {
        let now = outcome.is_healthy();
        let was = std::mem::replace(&mut service.state.lock().await.healthy, now);
        if now {
            healthy += 1;
        }

        match (was, now) {
            (false, true) => {
                info!(service = %service.name(), "{} is now healthy", service.name());
                state.progress.service_healthy(service.name());
            }
            (true, false) => {
                warn!(service = %service.name(), outcome = ?outcome, "{} is no longer healthy", service.name());
                state.progress.service_unhealthy(service.name());
            }
            _ => {}
        }

        if let ProbeOutcome::Unreachable { reason } = &outcome {
            debug!(service = %service.name(), "Health check failed for {}: {}", service.name(), reason);
        }
    }

    drop(round);

    let report = HealthReport { healthy, total: services.len() };
    if report.all_healthy() {
        state.progress.report("All services are ready", 100);
    } else {
        state.progress.report("Waiting for services to be ready...", report.percent());
    }
    report
}
