//! Pipeline and benchmark configuration records.
//!
//! Both files are JSON. Keys may be written with hyphens (`run-time`,
//! `downlink-port`); [`normalize_keys`] rewrites them to underscores before
//! the typed records are deserialized. Pipeline-specific keys that the
//! common record does not know about are kept in [`PipelineConfig::params`]
//! and parsed by the owning plugin.

use crate::error::{PipelineError, PipelineResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::net::Ipv4Addr;
use std::path::Path;
use tipsy_types::{CoreMask, MacAddress};
use tracing::info;

/// A host with an IPv4 and an Ethernet address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Host {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
}

/// Gateway descriptor: the SUT's own addresses and its default next hop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Gateway {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
    #[serde(default)]
    pub default_gw: Option<Host>,
}

/// A runtime command executed on every benchmark timer firing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Command {
    /// Handler name, e.g. `add_l2_entry`.
    pub action: String,
    /// Action-specific arguments, parsed by the handler.
    #[serde(default)]
    pub args: Value,
}

impl Command {
    pub fn new(action: impl Into<String>, args: Value) -> Self {
        Self {
            action: action.into(),
            args,
        }
    }

    /// Deserializes the arguments into the action's own record.
    pub fn args<T: DeserializeOwned>(&self) -> PipelineResult<T> {
        serde_json::from_value(self.args.clone())
            .map_err(|e| PipelineError::invalid_args(&self.action, e))
    }
}

/// The pipeline configuration file.
///
/// Keys are normalized from `kebab-case` before parsing. Keys not listed
/// here are kept in `params` for the plugin.
///
/// # Example
///
/// ```
/// use tipsy_pipeline::{from_json_str, PipelineConfig};
///
/// let conf: PipelineConfig = from_json_str(
///     r#"{"name": "l2fwd", "fakedrop": true,
///         "run-time": [{"action": "add-l2-entry"}]}"#,
/// )
/// .unwrap();
/// assert!(conf.fakedrop_enabled());
/// assert_eq!(conf.run_time[0].action, "add-l2-entry");
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline type, see [`PipelineKind`](crate::PipelineKind).
    pub name: String,
    /// `None` behaves like `Some(false)`.
    #[serde(default)]
    pub fakedrop: Option<bool>,
    /// Commands for each benchmark timer firing, in order.
    #[serde(default)]
    pub run_time: Vec<Command>,
    #[serde(default)]
    pub gw: Option<Gateway>,
    /// Everything else; read by the plugin through [`params`](Self::params).
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl PipelineConfig {
    /// Parses the pipeline-specific keys into `T`.
    pub fn params<T: DeserializeOwned>(&self) -> PipelineResult<T> {
        serde_json::from_value(Value::Object(self.params.clone()))
            .map_err(|e| PipelineError::InvalidConfig(format!("{}: {}", self.name, e)))
    }

    pub fn fakedrop_enabled(&self) -> bool {
        self.fakedrop.unwrap_or(false)
    }

    /// The next hop whose ARP entry is kept fresh on the switch.
    pub fn default_gw(&self) -> Option<&Host> {
        self.gw.as_ref().and_then(|gw| gw.default_gw.as_ref())
    }
}

/// The system under test.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SutConfig {
    /// Switch port name or DPDK index facing the traffic generator's
    /// upstream side.
    #[serde(deserialize_with = "port_name")]
    pub uplink_port: String,
    #[serde(deserialize_with = "port_name")]
    pub downlink_port: String,
    /// Cores the switch may use.
    pub coremask: CoreMask,
}

/// Resources requested for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineResources {
    /// Dataplane core count. One is raised to two at launch.
    #[serde(default = "default_core")]
    pub core: u32,
}

fn default_core() -> u32 {
    1
}

impl Default for PipelineResources {
    fn default() -> Self {
        Self {
            core: default_core(),
        }
    }
}

/// The benchmark configuration file. Only the parts the switch needs are
/// parsed; other keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BenchmarkConfig {
    pub sut: SutConfig,
    #[serde(default)]
    pub pipeline: PipelineResources,
}

impl BenchmarkConfig {
    /// Checks the resources the switch is launched with.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - at least one pipeline core and one usable core in the mask
    /// * `Err(PipelineError::InvalidBenchmark)` - otherwise
    pub fn validate(&self) -> PipelineResult<()> {
        if self.pipeline.core == 0 {
            return Err(PipelineError::InvalidBenchmark(
                "pipeline.core must be at least 1".to_string(),
            ));
        }
        if self.sut.coremask.is_empty() {
            return Err(PipelineError::InvalidBenchmark(format!(
                "coremask {} selects no cores",
                self.sut.coremask
            )));
        }
        Ok(())
    }
}

/// Port names may be given as DPDK port indices (`0`) or names (`"0"`).
fn port_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortName {
        Name(String),
        Index(u64),
    }

    Ok(match PortName::deserialize(deserializer)? {
        PortName::Name(name) => name,
        PortName::Index(idx) => idx.to_string(),
    })
}

/// Rewrites every object key `-` to `_`, recursively.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.replace('-', "_"), normalize_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

/// Parses a JSON document after key normalization.
pub fn from_json_str<T: DeserializeOwned>(s: &str) -> Result<T, serde_json::Error> {
    let raw: Value = serde_json::from_str(s)?;
    serde_json::from_value(normalize_keys(raw))
}

fn load_json<T: DeserializeOwned>(path: &Path) -> PipelineResult<T> {
    info!(path = %path.display(), "conf_file");
    let file = File::open(path).map_err(|e| PipelineError::config_read(path, e))?;
    let raw: Value = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| PipelineError::config_parse(path, e))?;
    serde_json::from_value(normalize_keys(raw)).map_err(|e| PipelineError::config_parse(path, e))
}

/// Loads the pipeline configuration. The pipeline name is checked later,
/// when the plugin is loaded.
pub fn load_pipeline_config(path: &Path) -> PipelineResult<PipelineConfig> {
    load_json(path)
}

/// Loads and validates the benchmark configuration.
pub fn load_benchmark_config(path: &Path) -> PipelineResult<BenchmarkConfig> {
    let conf: BenchmarkConfig = load_json(path)?;
    conf.validate()?;
    Ok(conf)
}
