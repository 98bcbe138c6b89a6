use std::time::Duration;

use crate::parse::{RestartPolicy, ServiceConfig};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Restart settings of one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartConfig {
    pub policy: RestartPolicy,
    pub exitcodes: Vec<i32>,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            policy: RestartPolicy::Never,
            exitcodes: vec![0],
            max_retries: 0,
            backoff: Duration::from_secs(1),
        }
    }
}

impl From<&ServiceConfig> for RestartConfig {
    fn from(cfg: &ServiceConfig) -> Self {
        Self {
            policy: cfg.autorestart,
            exitcodes: cfg.exitcodes.to_vec(),
            max_retries: cfg.startretries,
            backoff: Duration::from_millis(cfg.restart_backoff_ms),
        }
    }
}

impl RestartConfig {
    /// Delay before restart number `attempt` (0-based): `backoff * 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/*
    @@@
    @should_restart();
    . Always restarts regardless of the exit code, Never does not restart.
    . Unexpected restarts only when the exit code is not in the list of expected codes.
*/
pub fn should_restart(code: i32, policy: RestartPolicy, expected: &[i32]) -> bool {
    match policy {
        RestartPolicy::Always => true,
        RestartPolicy::Never => false,
        RestartPolicy::Unexpected => !expected.contains(&code),
    }
}
