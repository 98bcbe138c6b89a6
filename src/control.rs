use crate::runtime::{wait_for_exit, ProcessHandle};
use crate::service::Service;
use crate::supervisor::SupervisorState;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/*
    @@@
    @stop_all();
    . Cancels the health monitor first so no probe races with process teardown.
    . Waits out launches already in flight, then marks every service with a live process as stopping
      and terminates them all concurrently.
    . Never fails: returns true once every termination resolved, or straight away if nothing ran.
*/
pub(crate) async fn stop_all(state: &SupervisorState) -> bool {
    state.monitor.lock().await.stop(state).await;

    // In-flight launches finish and store their handle before the snapshot.
    let lifecycle = state.lifecycle.write().await;
    let mut running = Vec::new();
    for service in state.registry.iter() {
        let mut st = service.state.lock().await;
        if let Some(handle) = st.process.clone() {
            st.stopping = true;
            info!(service = %service.name(), "Stopping {} service...", service.name());
            running.push((service.clone(), handle, st.generation));
        }
    }
    drop(lifecycle);

    if running.is_empty() {
        info!("No active services to stop");
        return true;
    }

    info!("Waiting for {} services to terminate...", running.len());
    let grace = state.timing.stop_grace();
    join_all(
        running
            .into_iter()
            .map(|(service, handle, generation)| stop_and_cleanup(service, handle, generation, grace)),
    )
    .await;
    info!("All services stopped successfully");
    true
}

/*
    @@@
    @stop_and_cleanup();
    . Sends the graceful signal, then waits up to `grace` for the exit observer to see the process go.
    . On timeout sends SIGKILL and keeps waiting; the exit watch resolves once the OS confirms the exit.
    . Clears `healthy` and, if still ours, the process handle.
*/
async fn stop_and_cleanup(
    service: Arc<Service>,
    handle: Arc<dyn ProcessHandle>,
    generation: u64,
    grace: Duration,
) {
    let name = service.name();
    let mut exit = handle.exit_watch();

    // 1) Send graceful stop
    info!(service = %name, pid = ?handle.pid(), "sending SIGTERM");
    if let Err(e) = handle.terminate() {
        error!(service = %name, error = %e, "failed to send SIGTERM");
    }

    // 2) Wait up to the grace period
    let outcome = match timeout(grace, wait_for_exit(&mut exit)).await {
        Ok(outcome) => outcome,
        // 3) Force-kill
        Err(_) => {
            warn!(service = %name, "Force killing {} service with SIGKILL", name);
            if let Err(e) = handle.kill() {
                error!(service = %name, error = %e, "failed to SIGKILL");
            }
            wait_for_exit(&mut exit).await
        }
    };
    info!(service = %name, exit = %outcome, "{} service terminated successfully", name);

    // 4) Clear state
    let mut st = service.state.lock().await;
    st.healthy = false;
    if st.generation == generation {
        st.process = None;
        st.last_exit = Some(outcome);
    }
}
