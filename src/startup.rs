use futures::future::{join_all, try_join_all};
use tracing::{debug, error, info, warn};

use crate::control;
use crate::errors::{Result, SupervisorError};
use crate::health::wait_for_healthy;
use crate::runtime::launch;
use crate::service::Registry;
use crate::supervisor::SupervisorState;

/// Runs [`try_start_all`] and turns a failure into a terminal 100% progress message.
pub(crate) async fn start_all(state: &SupervisorState) -> bool {
    match try_start_all(state).await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, service = ?e.service(), "Failed to start services");
            state.progress.report(format!("Error: {e}"), 100);
            false
        }
    }
}

/*
    @@@
    @try_start_all();
    . Fails fast when any executable is missing; nothing is spawned in that case.
    . Launches every service concurrently, and only then gates each one on its health endpoint.
    . Any spawn failure or gate timeout fails the whole start (first error wins), after an optional rollback.
    . On success starts the health monitor, replacing a previous one.
*/
pub(crate) async fn try_start_all(state: &SupervisorState) -> Result<()> {
    state.progress.report("Starting services...", 10);

    verify_executables(&state.registry)?;

    let launched = launch_all(state).await;
    state.progress.report("Waiting for services to initialize...", 30);

    if let Some(err) = launched.into_iter().find_map(Result::err) {
        rollback(state).await;
        return Err(err);
    }

    let timing = &state.timing;
    let gates = state.registry.iter().map(|service| {
        wait_for_healthy(service, state.probe.as_ref(), timing.startup_timeout(), timing.poll_interval())
    });
    if let Err(err) = try_join_all(gates).await {
        rollback(state).await;
        return Err(err);
    }

    info!(services = state.registry.len(), "All services passed their health gate");
    state.progress.report("Services started successfully", 50);

    state.monitor.lock().await.start(state).await;
    Ok(())
}

/// Every executable must exist before anything is spawned.
pub fn verify_executables(registry: &Registry) -> Result<()> {
    for service in registry.iter() {
        if !service.executable().is_file() {
            error!(
                service = %service.name(),
                "Executable not found: {}", service.executable().display()
            );
            return Err(SupervisorError::ExecutableMissing {
                name: service.name().to_string(),
                path: service.executable().to_path_buf(),
            });
        }
    }
    Ok(())
}

/// Spawns every service that is not already running. Restart counters start over.
async fn launch_all(state: &SupervisorState) -> Vec<Result<()>> {
    let _launching = state.lifecycle.read().await;
    let launches = state.registry.iter().map(|service| {
        let state = state.clone();
        let service = service.clone();
        async move {
            {
                let mut st = service.state.lock().await;
                st.restarts = 0;
                if st.process.is_some() {
                    debug!(service = %service.name(), "already running; not spawning again");
                    return Ok(());
                }
            }
            launch(state, service).await
        }
    });
    join_all(launches).await
}

async fn rollback(state: &SupervisorState) {
    if state.rollback_on_failure {
        warn!("Startup failed; stopping services that were already spawned");
        control::stop_all(state).await;
    } else {
        warn!("Startup failed; leaving already spawned services running");
    }
}
