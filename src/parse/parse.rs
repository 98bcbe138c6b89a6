use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::Result;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v.clone()],
            OneOrMany::Many(vs) => vs.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
    Always,
    Never,
    Unexpected,
}

fn default_exitcodes() -> OneOrMany<i32> { OneOrMany::One(0) }
fn default_autorestart() -> RestartPolicy { RestartPolicy::Never }
fn default_restart_backoff_ms() -> u64 { 1000 }
fn default_event_capacity() -> usize { 64 }
fn default_rollback() -> bool { true }

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub health_url: String,
    #[serde(default = "default_autorestart")]
    pub autorestart: RestartPolicy,
    #[serde(default = "default_exitcodes")]
    pub exitcodes: OneOrMany<i32>,
    #[serde(default)]
    pub startretries: u32,
    #[serde(default = "default_restart_backoff_ms")]
    pub restart_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub startup_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub monitor_interval_ms: u64,
    pub stop_grace_ms: u64,
    pub probe_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            startup_timeout_ms: 30_000,
            poll_interval_ms: 500,
            monitor_interval_ms: 5_000,
            stop_grace_ms: 5_000,
            probe_timeout_ms: 2_000,
        }
    }
}

impl TimingConfig {
    pub fn startup_timeout(&self) -> Duration { Duration::from_millis(self.startup_timeout_ms) }
    pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }
    pub fn monitor_interval(&self) -> Duration { Duration::from_millis(self.monitor_interval_ms) }
    pub fn stop_grace(&self) -> Duration { Duration::from_millis(self.stop_grace_ms) }
    pub fn probe_timeout(&self) -> Duration { Duration::from_millis(self.probe_timeout_ms) }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct StartupConfig {
    #[serde(default = "default_rollback")]
    pub rollback_on_failure: bool,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self { rollback_on_failure: default_rollback() }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file: String,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file: String::from("supervisor.log"),
            level: String::from("info"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub executables_dir: Option<PathBuf>,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub startup: StartupConfig,
    pub services: Vec<ServiceConfig>,
}

impl Config {
    /// Absolute or `executables_dir`-relative path of a service binary.
    pub fn executable_path(&self, service: &ServiceConfig) -> PathBuf {
        resolve_executable(self.executables_dir.as_deref(), &service.cmd)
    }
}

/*
    @@@
    @resolve_executable();
    . Absolute commands are returned untouched.
    . Relative commands are joined onto the executables directory, when one is configured,
      and get the platform executable suffix (".exe" on Windows) if they carry no extension.
*/
pub fn resolve_executable(base: Option<&Path>, cmd: &str) -> PathBuf {
    let cmd_path = Path::new(cmd);
    if cmd_path.is_absolute() {
        return cmd_path.to_path_buf();
    }
    match base {
        Some(dir) => {
            let mut path = dir.join(cmd_path);
            if path.extension().is_none() && !std::env::consts::EXE_SUFFIX.is_empty() {
                path.set_extension(std::env::consts::EXE_EXTENSION);
            }
            path
        }
        None => cmd_path.to_path_buf(),
    }
}

/*
    @@@
    @parser();
    . Reads the content of the YAML config into a String. Any I/O error is returned as an Err.
    . Hands the raw YAML text to serde_yaml, which maps it into the Config struct.
*/
pub fn parser(path: impl AsRef<Path>) -> Result<Config> {
    let yaml_file = fs::read_to_string(path)?;
    parse_str(&yaml_file)
}

pub fn parse_str(yaml: &str) -> Result<Config> {
    let parsed_config: Config = serde_yaml::from_str(yaml)?;
    Ok(parsed_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
services:
  - name: Orakle
    cmd: /opt/sidecars/orakle
    health_url: http://localhost:5000/health
  - name: Pybridge
    cmd: pybridge/pybridge
    args: ["--port", "5001"]
    health_url: http://localhost:5001/health
    autorestart: unexpected
    exitcodes: [0, 2]
    startretries: 3
"#;

    #[test]
    fn defaults_match_observed_constants() {
        let cfg = parse_str(MINIMAL).unwrap();
        assert_eq!(cfg.timing.poll_interval(), Duration::from_millis(500));
        assert_eq!(cfg.timing.startup_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.timing.monitor_interval(), Duration::from_secs(5));
        assert_eq!(cfg.timing.stop_grace(), Duration::from_secs(5));
        assert!(cfg.startup.rollback_on_failure);
        assert_eq!(cfg.event_capacity, 64);
        assert_eq!(cfg.logging, LoggingConfig::default());
    }

    #[test]
    fn services_keep_file_order_and_per_service_fields() {
        let cfg = parse_str(MINIMAL).unwrap();
        let names: Vec<_> = cfg.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Orakle", "Pybridge"]);

        let orakle = &cfg.services[0];
        assert_eq!(orakle.autorestart, RestartPolicy::Never);
        assert_eq!(orakle.exitcodes.to_vec(), vec![0]);
        assert!(orakle.args.is_empty());

        let pybridge = &cfg.services[1];
        assert_eq!(pybridge.autorestart, RestartPolicy::Unexpected);
        assert_eq!(pybridge.exitcodes, OneOrMany::Many(vec![0, 2]));
        assert_eq!(pybridge.startretries, 3);
        assert_eq!(pybridge.args, ["--port", "5001"]);
    }

    #[test]
    fn partial_timing_section_keeps_other_defaults() {
        let yaml = r#"
timing:
  stop_grace_ms: 100
services: []
"#;
        let cfg = parse_str(yaml).unwrap();
        assert_eq!(cfg.timing.stop_grace(), Duration::from_millis(100));
        assert_eq!(cfg.timing.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn missing_services_is_an_error() {
        assert!(parse_str("timing: {}\n").is_err());
    }

    #[test]
    fn absolute_commands_are_not_rebased() {
        let path = resolve_executable(Some(Path::new("/srv/bin")), "/usr/bin/env");
        assert_eq!(path, PathBuf::from("/usr/bin/env"));
    }

    #[test]
    fn relative_commands_join_executables_dir() {
        let path = resolve_executable(Some(Path::new("/srv/bin")), "orakle/orakle");
        let expected = Path::new("/srv/bin/orakle").join(format!("orakle{}", std::env::consts::EXE_SUFFIX));
        assert_eq!(path, expected);
        assert_eq!(resolve_executable(None, "orakle"), PathBuf::from("orakle"));
    }
}
