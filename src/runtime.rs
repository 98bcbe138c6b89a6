use std::fmt;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn, Instrument, Span};

use crate::errors::{Result, SupervisorError};
use crate::restart::should_restart;
use crate::service::Service;
use crate::supervisor::{Shared, SupervisorState};

/// How a managed process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Code(i32),
    Signal(i32),
    /// The process is gone but no status could be collected.
    Unknown,
}

impl ExitOutcome {
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            ExitOutcome::Code(code)
        } else if let Some(sig) = status.signal() {
            ExitOutcome::Signal(sig)
        } else {
            ExitOutcome::Unknown
        }
    }

    /// Exit code as a shell reports it; signal deaths become `128 + signal`.
    pub fn as_code(&self) -> Option<i32> {
        match self {
            ExitOutcome::Code(code) => Some(*code),
            ExitOutcome::Signal(sig) => Some(128 + sig),
            ExitOutcome::Unknown => None,
        }
    }

    /// A non-zero exit code. Signal deaths carry no code and do not count.
    pub fn is_crash(&self) -> bool {
        matches!(self, ExitOutcome::Code(code) if *code != 0)
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Code(code) => write!(f, "exit code {code}"),
            ExitOutcome::Signal(sig) => write!(f, "signal {sig}"),
            ExitOutcome::Unknown => write!(f, "unknown status"),
        }
    }
}

/// Becomes `Some` once the process exit has been observed.
pub type ExitWatch = watch::Receiver<Option<ExitOutcome>>;

/// A running process owned by exactly one service.
pub trait ProcessHandle: Send + Sync {
    fn pid(&self) -> Option<u32>;
    /// Graceful termination request (SIGTERM).
    fn terminate(&self) -> io::Result<()>;
    /// Unconditional kill (SIGKILL).
    fn kill(&self) -> io::Result<()>;
    fn exit_watch(&self) -> ExitWatch;
}

/// Creates OS processes for services. Tests inject their own.
#[async_trait]
pub trait ProcessSpawner: Send + Sync + 'static {
    async fn spawn(&self, service: &Service) -> io::Result<Arc<dyn ProcessHandle>>;
}

/// Waits until the exit of the watched process is known.
pub async fn wait_for_exit(exit: &mut ExitWatch) -> ExitOutcome {
    match exit.wait_for(|outcome| outcome.is_some()).await {
        Ok(outcome) => (*outcome).unwrap_or(ExitOutcome::Unknown),
        // reaper went away without reporting
        Err(_) => ExitOutcome::Unknown,
    }
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSpawner;

#[async_trait]
impl ProcessSpawner for OsSpawner {
    async fn spawn(&self, service: &Service) -> io::Result<Arc<dyn ProcessHandle>> {
        let mut child = Command::new(service.executable())
            .args(service.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(service.name(), stdout, OutputStream::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(service.name(), stderr, OutputStream::Stderr);
        }

        let (tx, rx) = watch::channel(None);
        let name = service.name().to_string();
        tokio::spawn(async move {
            let outcome = match child.wait().await {
                Ok(status) => ExitOutcome::from_status(status),
                Err(e) => {
                    error!(service = %name, error = %e, "failed to wait on child");
                    ExitOutcome::Unknown
                }
            };
            tx.send_replace(Some(outcome));
        });

        Ok(Arc::new(OsProcess { pid, exit: rx }))
    }
}

struct OsProcess {
    pid: Option<u32>,
    exit: ExitWatch,
}

impl OsProcess {
    fn signal(&self, sig: Signal) -> io::Result<()> {
        // Once reaped the pid may already belong to someone else.
        if self.exit.borrow().is_some() {
            return Ok(());
        }
        let Some(pid) = self.pid else { return Ok(()) };
        match kill(Pid::from_raw(pid as i32), sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }
}

impl ProcessHandle for OsProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn terminate(&self) -> io::Result<()> {
        self.signal(Signal::SIGTERM)
    }

    fn kill(&self) -> io::Result<()> {
        self.signal(Signal::SIGKILL)
    }

    fn exit_watch(&self) -> ExitWatch {
        self.exit.clone()
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

fn forward_lines<R>(name: &str, reader: R, stream: OutputStream)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let name = name.to_string();
    let span = Span::current();
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        // Keep draining until EOF; dropping the pipe early would SIGPIPE the child.
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(service = %name, error = %e, "output stream closed");
                    break;
                }
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            match stream {
                OutputStream::Stdout => info!(service = %name, "[{}] {}", name, line),
                OutputStream::Stderr => error!(service = %name, "[{}] {}", name, line),
            }
        }
    }.instrument(span));
}

/*
    @@@
    @launch();
    . Spawns the service process through the configured spawner; an OS-level failure is returned as SpawnFailure.
    . Stores the handle on the service under a fresh generation and resets healthy/stopping.
    . Hands the exit watch to a background observer. Boxed because the observer may launch again.
*/
pub(crate) fn launch(state: SupervisorState, service: Arc<Service>) -> BoxFuture<'static, Result<()>> {
    async move {
        info!(
            service = %service.name(),
            path = %service.executable().display(),
            "Starting {} service", service.name()
        );

        let handle = match state.spawner.spawn(&service).await {
            Ok(handle) => handle,
            Err(source) => {
                service.state.lock().await.healthy = false;
                error!(service = %service.name(), error = %source, "Failed to spawn process");
                return Err(SupervisorError::SpawnFailure {
                    name: service.name().to_string(),
                    source,
                });
            }
        };

        let exit = handle.exit_watch();
        let generation = {
            let mut st = service.state.lock().await;
            st.generation += 1;
            st.process = Some(handle.clone());
            st.healthy = false;
            st.stopping = false;
            st.generation
        };
        info!(service = %service.name(), pid = ?handle.pid(), "Spawned new instance");

        tokio::spawn(observe_exit(Arc::downgrade(&state), service, generation, exit));
        Ok(())
    }
    .boxed()
}

/*
    @@@
    @observe_exit();
    . Waits for the process of one generation to end, then records the outcome and clears the handle.
    . Exits requested by shutdown stop here.
    . A non-zero exit code marks the service unhealthy and, while monitoring, reports a crash at 100%.
    . Finally asks the restart policy whether to relaunch.
*/
async fn observe_exit(state: Weak<Shared>, service: Arc<Service>, generation: u64, mut exit: ExitWatch) {
    let outcome = wait_for_exit(&mut exit).await;

    let (requested, attempt) = {
        let mut st = service.state.lock().await;
        if st.generation != generation {
            return;
        }
        st.process = None;
        st.last_exit = Some(outcome);
        if st.stopping || outcome.is_crash() {
            st.healthy = false;
        }
        (st.stopping, st.restarts)
    };

    let Some(state) = state.upgrade() else { return };
    state.progress.service_exited(service.name(), outcome);

    if requested {
        info!(service = %service.name(), exit = %outcome, "Exited after stop request");
        return;
    }

    match outcome {
        ExitOutcome::Code(0) => info!(service = %service.name(), exit_code = 0, "{} exited", service.name()),
        ExitOutcome::Code(code) => {
            error!(service = %service.name(), exit_code = code, "{} exited with code {}", service.name(), code)
        }
        other => warn!(service = %service.name(), exit = %other, "{} terminated without exit code", service.name()),
    }

    let monitoring = state.monitoring.load(Ordering::SeqCst);
    if outcome.is_crash() && monitoring {
        state.progress.report(format!("{} service crashed", service.name()), 100);
    }

    if monitoring {
        maybe_restart(state, service, outcome, attempt).await;
    }
}

async fn maybe_restart(state: SupervisorState, service: Arc<Service>, outcome: ExitOutcome, attempt: u32) {
    let restart = service.restart();
    let Some(code) = outcome.as_code() else { return };

    if !should_restart(code, restart.policy, &restart.exitcodes) {
        info!(service = %service.name(), "Not restarting (policy: {:?})", restart.policy);
        return;
    }
    if attempt >= restart.max_retries {
        warn!(service = %service.name(), retries = restart.max_retries, "Not restarting; retry limit reached");
        return;
    }

    let delay = restart.delay_for(attempt);
    info!(
        service = %service.name(),
        delay_ms = delay.as_millis() as u64,
        "Restarting; {} retries left", restart.max_retries - attempt - 1
    );
    sleep(delay).await;

    // Held until the handle is stored so stop_all cannot snapshot in between.
    let _launching = state.lifecycle.read().await;
    // Shutdown may have started during the backoff.
    if !state.monitoring.load(Ordering::SeqCst) {
        return;
    }
    {
        let mut st = service.state.lock().await;
        if st.process.is_some() {
            return;
        }
        st.restarts += 1;
    }
    if let Err(e) = launch(state.clone(), service.clone()).await {
        error!(service = %service.name(), error = %e, "Restart failed");
    }
}
