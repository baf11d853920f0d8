//! Controller settings.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! or missing file yields a working configuration. CLI flags override the
//! loaded values in `main`.

use crate::error::{ControllerError, ControllerResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level controller settings.
///
/// # Example
///
/// ```toml
/// pipeline_conf = "/tmp/pipeline.json"
/// timer_period_ms = 500
///
/// [lagopus]
/// dsl = "/usr/local/etc/lagopus/lagopus.dsl"
/// portmask = "3"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControllerSettings {
    /// Pipeline configuration (JSON).
    #[serde(default = "default_pipeline_conf")]
    pub pipeline_conf: PathBuf,

    /// Benchmark configuration (JSON).
    #[serde(default = "default_benchmark_conf")]
    pub benchmark_conf: PathBuf,

    /// Called once after the first successful configuration.
    #[serde(default = "default_webhook_configured")]
    pub webhook_configured: String,

    /// Address of the REST facade.
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Benchmark timer period. Must be non-zero.
    #[serde(default = "default_timer_period_ms")]
    pub timer_period_ms: u64,

    /// Delay before launching the switch, lets hugepages be reclaimed.
    #[serde(default = "default_restart_grace_ms")]
    pub restart_grace_ms: u64,

    /// How often the default gateway's ARP entry is rewritten.
    #[serde(default = "default_arp_refresh_secs")]
    pub arp_refresh_secs: u64,

    /// Lagopus bridge the ARP entry goes into.
    #[serde(default = "default_bridge")]
    pub bridge: String,

    #[serde(default)]
    pub lagopus: LagopusSettings,
}

/// How the switch process is launched and controlled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LagopusSettings {
    /// Switch executable, looked up in `PATH` unless absolute.
    #[serde(default = "default_lagopus_binary")]
    pub binary: String,

    /// DSL configuration passed with `-C`.
    #[serde(default = "default_lagopus_dsl")]
    pub dsl: PathBuf,

    /// Lagopus shell, fed commands on stdin.
    #[serde(default = "default_lagosh")]
    pub lagosh: String,

    /// DPDK `-n`.
    #[serde(default = "default_memory_channels")]
    pub memory_channels: u32,

    /// DPDK `-p`, hex without prefix.
    #[serde(default = "default_portmask")]
    pub portmask: String,

    /// Working directory of the switch process; inherited if unset.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

fn default_pipeline_conf() -> PathBuf {
    PathBuf::from("pipeline.json")
}

fn default_benchmark_conf() -> PathBuf {
    PathBuf::from("benchmark.json")
}

fn default_webhook_configured() -> String {
    "http://localhost:8888/configured".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timer_period_ms() -> u64 {
    1000
}

fn default_restart_grace_ms() -> u64 {
    3000
}

fn default_arp_refresh_secs() -> u64 {
    240
}

fn default_bridge() -> String {
    "br-phy".to_string()
}

fn default_lagopus_binary() -> String {
    "lagopus".to_string()
}

fn default_lagopus_dsl() -> PathBuf {
    PathBuf::from("lagopus.dsl")
}

fn default_lagosh() -> String {
    "lagosh".to_string()
}

fn default_memory_channels() -> u32 {
    2
}

fn default_portmask() -> String {
    "3".to_string()
}

impl Default for LagopusSettings {
    fn default() -> Self {
        Self {
            binary: default_lagopus_binary(),
            dsl: default_lagopus_dsl(),
            lagosh: default_lagosh(),
            memory_channels: default_memory_channels(),
            portmask: default_portmask(),
            workdir: None,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            pipeline_conf: default_pipeline_conf(),
            benchmark_conf: default_benchmark_conf(),
            webhook_configured: default_webhook_configured(),
            listen: default_listen(),
            log_level: default_log_level(),
            timer_period_ms: default_timer_period_ms(),
            restart_grace_ms: default_restart_grace_ms(),
            arp_refresh_secs: default_arp_refresh_secs(),
            bridge: default_bridge(),
            lagopus: LagopusSettings::default(),
        }
    }
}

impl ControllerSettings {
    /// Reads and validates a TOML settings file.
    ///
    /// # Arguments
    ///
    /// * `path` - settings file; absent keys take their defaults
    ///
    /// # Returns
    ///
    /// * `Err(ControllerError::Settings)` - unreadable, malformed or invalid
    pub fn load(path: &Path) -> ControllerResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ControllerError::settings(path, e))?;
        let settings: Self =
            toml::from_str(&content).map_err(|e| ControllerError::settings(path, e))?;
        settings
            .validate()
            .map_err(|e| ControllerError::settings(path, e))?;
        Ok(settings)
    }

    /// Checks values serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.timer_period_ms == 0 {
            return Err("timer_period_ms must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn timer_period(&self) -> Duration {
        Duration::from_millis(self.timer_period_ms)
    }

    pub fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.restart_grace_ms)
    }

    pub fn arp_refresh(&self) -> Duration {
        Duration::from_secs(self.arp_refresh_secs)
    }
}
