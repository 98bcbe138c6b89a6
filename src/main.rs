use anyhow::Context;
use futures::stream::StreamExt;
use sidecar_supervisor::logger::init_logging;
use sidecar_supervisor::parse::parser;
use sidecar_supervisor::shell::{format_status, run_shell};
use sidecar_supervisor::Supervisor;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tracing::info;

const DEFAULT_CONFIG: &str = "config/config.yml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let cfg = parser(&path).with_context(|| format!("failed to load config `{}`", path))?;
    let _guard = init_logging(&cfg.logging)?;

    let supervisor = Supervisor::new(&cfg)?;
    supervisor.set_progress_callback(|message, percent| println!("[{:>3}%] {}", percent, message));
    spawn_signal_handler(supervisor.clone())?;

    if !supervisor.start_all().await {
        supervisor.stop_all().await;
        std::process::exit(1);
    }

    let status = supervisor.clone();
    let health = supervisor.clone();
    let start = supervisor.clone();
    let stop = supervisor.clone();
    run_shell(
        move || {
            let s = status.clone();
            async move {
                for st in s.statuses().await {
                    println!("{}", format_status(&st));
                }
            }
        },
        move || {
            let s = health.clone();
            async move {
                let all = s.check_health().await;
                println!("all services healthy: {}", all);
            }
        },
        move || {
            let s = start.clone();
            async move {
                if !s.start_all().await {
                    println!("start failed, see progress output");
                }
            }
        },
        move || {
            let s = stop.clone();
            async move {
                s.stop_all().await;
            }
        },
    )
    .await?;

    supervisor.stop_all().await;
    Ok(())
}

/// SIGINT/SIGTERM stop every service before the process exits.
fn spawn_signal_handler(supervisor: Supervisor) -> anyhow::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to register signal handlers")?;
    tokio::spawn(async move {
        if let Some(signal) = signals.next().await {
            info!(signal, "Received signal; stopping services");
            supervisor.stop_all().await;
            std::process::exit(0);
        }
    });
    Ok(())
}
