//! Health probing.
//!
//! A probe answers with one of three outcomes so callers can tell "confirmed
//! down" from "could not reach". Startup gating and the monitor both collapse
//! everything but [`ProbeOutcome::Healthy`] into "not healthy".

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::errors::{Result, SupervisorError};
use crate::service::Service;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    /// The endpoint answered with a non-success status.
    Unhealthy { status: u16 },
    /// Connection refused, DNS failure, request timeout...
    Unreachable { reason: String },
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    /// Issues exactly one request against `url`.
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// `GET <url>`; any 2xx is healthy. No headers, no body, no retries.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => ProbeOutcome::Healthy,
            Ok(resp) => ProbeOutcome::Unhealthy { status: resp.status().as_u16() },
            Err(e) => ProbeOutcome::Unreachable { reason: e.to_string() },
        }
    }
}

/*
    @@@
    @wait_for_healthy();
    . Probes the service endpoint every `interval` until one probe succeeds; failures while the
      process initializes are expected and only logged at debug.
    . The polling loop races a `deadline` timer; losing the race is a HealthCheckTimeout for that service.
    . One success is enough: the flag is set here and steady state is left to the monitor.
*/
pub async fn wait_for_healthy(
    service: &Service,
    probe: &dyn HealthProbe,
    deadline: Duration,
    interval: Duration,
) -> Result<()> {
    let polling = async {
        loop {
            match probe.probe(service.health_url()).await {
                ProbeOutcome::Healthy => return,
                other => debug!(service = %service.name(), outcome = ?other, "not healthy yet"),
            }
            sleep(interval).await;
        }
    };

    match timeout(deadline, polling).await {
        Ok(()) => {
            service.state.lock().await.healthy = true;
            info!(service = %service.name(), "{} is healthy", service.name());
            Ok(())
        }
        Err(_) => {
            warn!(
                service = %service.name(),
                timeout_ms = deadline.as_millis() as u64,
                "gave up waiting for health"
            );
            Err(SupervisorError::HealthCheckTimeout {
                name: service.name().to_string(),
                timeout: deadline,
            })
        }
    }
}
