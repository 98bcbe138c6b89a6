#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sidecar_supervisor::parse::{parse_str, Config};
use sidecar_supervisor::{
    ExitOutcome, ExitWatch, HealthProbe, ProbeOutcome, ProcessHandle, ProcessSpawner, Service,
    SupervisorEvent,
};
use tempfile::TempDir;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

pub const ORAKLE_URL: &str = "http://localhost:5000/health";
pub const PYBRIDGE_URL: &str = "http://localhost:5001/health";

/// A process that only exits when told to.
pub struct FakeProcess {
    pub service: String,
    pub ignores_sigterm: bool,
    exit: watch::Sender<Option<ExitOutcome>>,
    pub terminated_at: Mutex<Option<Instant>>,
    pub killed_at: Mutex<Option<Instant>>,
}

impl FakeProcess {
    pub fn exit_with(&self, outcome: ExitOutcome) {
        self.exit.send_replace(Some(outcome));
    }

    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    pub fn terminated_at(&self) -> Option<Instant> {
        *self.terminated_at.lock().unwrap()
    }

    pub fn killed_at(&self) -> Option<Instant> {
        *self.killed_at.lock().unwrap()
    }
}

impl ProcessHandle for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    fn terminate(&self) -> io::Result<()> {
        *self.terminated_at.lock().unwrap() = Some(Instant::now());
        if !self.ignores_sigterm {
            self.exit_with(ExitOutcome::Signal(15));
        }
        Ok(())
    }

    fn kill(&self) -> io::Result<()> {
        *self.killed_at.lock().unwrap() = Some(Instant::now());
        self.exit_with(ExitOutcome::Signal(9));
        Ok(())
    }

    fn exit_watch(&self) -> ExitWatch {
        self.exit.subscribe()
    }
}

/// Counts spawns and hands out [`FakeProcess`]es.
#[derive(Default)]
pub struct FakeSpawner {
    pub spawn_calls: AtomicUsize,
    fail_for: Mutex<HashSet<String>>,
    stubborn: Mutex<HashSet<String>>,
    processes: Mutex<Vec<Arc<FakeProcess>>>,
    spawn_delay: Mutex<Option<Duration>>,
}

impl FakeSpawner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Spawning this service fails like a broken binary would.
    pub fn fail_spawn(&self, service_id: &str) {
        self.fail_for.lock().unwrap().insert(service_id.to_string());
    }

    /// Processes of this service ignore SIGTERM.
    pub fn ignore_sigterm(&self, service_id: &str) {
        self.stubborn.lock().unwrap().insert(service_id.to_string());
    }

    /// Later spawns take this long before the process exists.
    pub fn delay_spawns(&self, delay: Duration) {
        *self.spawn_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.spawn_calls.load(Ordering::SeqCst)
    }

    pub fn processes(&self) -> Vec<Arc<FakeProcess>> {
        self.processes.lock().unwrap().clone()
    }

    /// Most recent process of a service.
    pub fn latest(&self, service_id: &str) -> Arc<FakeProcess> {
        self.processes()
            .into_iter()
            .rev()
            .find(|p| p.service == service_id)
            .expect("service was never spawned")
    }
}

#[async_trait]
impl ProcessSpawner for FakeSpawner {
    async fn spawn(&self, service: &Service) -> io::Result<Arc<dyn ProcessHandle>> {
        self.spawn_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_for.lock().unwrap().contains(service.id()) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "exec format error"));
        }
        let delay = *self.spawn_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let (exit, _) = watch::channel(None);
        let process = Arc::new(FakeProcess {
            service: service.id().to_string(),
            ignores_sigterm: self.stubborn.lock().unwrap().contains(service.id()),
            exit,
            terminated_at: Mutex::new(None),
            killed_at: Mutex::new(None),
        });
        self.processes.lock().unwrap().push(process.clone());
        Ok(process as Arc<dyn ProcessHandle>)
    }
}

/// Probe answers set per URL; unknown URLs are unreachable.
#[derive(Default)]
pub struct ScriptedProbe {
    outcomes: Mutex<HashMap<String, ProbeOutcome>>,
    pub calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, url: &str, outcome: ProbeOutcome) {
        self.outcomes.lock().unwrap().insert(url.to_string(), outcome);
    }

    pub fn healthy(&self, url: &str) {
        self.set(url, ProbeOutcome::Healthy);
    }

    pub fn down(&self, url: &str) {
        self.set(url, ProbeOutcome::Unhealthy { status: 503 });
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(ProbeOutcome::Unreachable { reason: "connection refused".into() })
    }
}

/// Two executables on disk plus a matching config.
pub struct Fixture {
    pub dir: TempDir,
    pub orakle: PathBuf,
    pub pybridge: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let orakle = dir.path().join("orakle");
        let pybridge = dir.path().join("pybridge");
        std::fs::write(&orakle, b"#!/bin/sh\n").unwrap();
        std::fs::write(&pybridge, b"#!/bin/sh\n").unwrap();
        Self { dir, orakle, pybridge }
    }

    /// `extra` is appended to each service entry (already indented).
    pub fn config_with(&self, top: &str, extra: &str) -> Config {
        let yaml = format!(
            r#"
{top}
services:
  - id: orakle
    name: Orakle
    cmd: {orakle}
    health_url: {ORAKLE_URL}
{extra}
  - id: pybridge
    name: Pybridge
    cmd: {pybridge}
    health_url: {PYBRIDGE_URL}
{extra}
"#,
            orakle = self.orakle.display(),
            pybridge = self.pybridge.display(),
        );
        parse_str(&yaml).unwrap()
    }

    pub fn config(&self) -> Config {
        self.config_with("", "")
    }
}

/// Everything currently buffered on the receiver.
pub fn drain(rx: &mut broadcast::Receiver<SupervisorEvent>) -> Vec<SupervisorEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

pub fn progress_of(events: &[SupervisorEvent]) -> Vec<(String, u8)> {
    events
        .iter()
        .filter_map(|ev| match ev {
            SupervisorEvent::Progress(p) => Some((p.message.clone(), p.percent)),
            _ => None,
        })
        .collect()
}
