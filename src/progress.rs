//! Progress and lifecycle events for the host.
//!
//! Two outlets share every progress report:
//! - a bounded `broadcast` channel of [`SupervisorEvent`]s. Emission never
//!   blocks; a subscriber that falls more than `capacity` events behind loses
//!   the oldest ones and sees `RecvError::Lagged`.
//! - one optional `(message, percent)` callback slot. Setting a new callback
//!   replaces the old one.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Local};
use tokio::sync::broadcast;
use tracing::debug;

use crate::runtime::ExitOutcome;

pub type ProgressCallback = Arc<dyn Fn(&str, u8) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub message: String,
    /// 0..=100
    pub percent: u8,
    pub at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    Progress(Progress),
    ServiceHealthy { service: String },
    ServiceUnhealthy { service: String },
    ServiceExited { service: String, outcome: ExitOutcome },
}

pub struct ProgressReporter {
    events: broadcast::Sender<SupervisorEvent>,
    callback: RwLock<Option<ProgressCallback>>,
}

impl ProgressReporter {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self { events, callback: RwLock::new(None) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    pub fn set_callback(&self, callback: ProgressCallback) {
        *self.callback.write().unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    pub fn clear_callback(&self) {
        *self.callback.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn report(&self, message: impl Into<String>, percent: u8) {
        let message = message.into();
        let percent = percent.min(100);
        debug!(percent, "{}", message);

        let callback = self.callback.read().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(callback) = callback {
            callback(&message, percent);
        }
        self.emit(SupervisorEvent::Progress(Progress { message, percent, at: Local::now() }));
    }

    pub fn service_healthy(&self, service: &str) {
        self.emit(SupervisorEvent::ServiceHealthy { service: service.to_string() });
    }

    pub fn service_unhealthy(&self, service: &str) {
        self.emit(SupervisorEvent::ServiceUnhealthy { service: service.to_string() });
    }

    pub fn service_exited(&self, service: &str, outcome: ExitOutcome) {
        self.emit(SupervisorEvent::ServiceExited { service: service.to_string(), outcome });
    }

    fn emit(&self, event: SupervisorEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::broadcast::error::TryRecvError;

    fn recorder() -> (Arc<Mutex<Vec<(String, u8)>>>, ProgressCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb: ProgressCallback = Arc::new(move |msg: &str, pct: u8| {
            sink.lock().unwrap().push((msg.to_string(), pct));
        });
        (seen, cb)
    }

    #[test]
    fn callback_slot_holds_one_observer() {
        let reporter = ProgressReporter::new(8);
        let (first, cb1) = recorder();
        let (second, cb2) = recorder();

        reporter.report("Starting services...", 10);
        reporter.set_callback(cb1);
        reporter.report("Waiting for services to initialize...", 30);
        reporter.set_callback(cb2);
        reporter.report("Services started successfully", 50);
        reporter.clear_callback();
        reporter.report("ignored", 60);

        assert_eq!(*first.lock().unwrap(), vec![("Waiting for services to initialize...".to_string(), 30)]);
        assert_eq!(*second.lock().unwrap(), vec![("Services started successfully".to_string(), 50)]);
    }

    #[test]
    fn percent_is_clamped() {
        let reporter = ProgressReporter::new(8);
        let mut rx = reporter.subscribe();
        reporter.report("overflow", 250);
        match rx.try_recv().unwrap() {
            SupervisorEvent::Progress(p) => assert_eq!(p.percent, 100),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn slow_subscribers_lose_oldest_events() {
        let reporter = ProgressReporter::new(2);
        let mut rx = reporter.subscribe();
        for pct in [10, 20, 30, 40] {
            reporter.report("tick", pct);
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(2))));
        match rx.try_recv().unwrap() {
            SupervisorEvent::Progress(p) => assert_eq!(p.percent, 30),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
