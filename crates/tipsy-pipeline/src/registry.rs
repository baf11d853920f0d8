//! Pipeline name to plugin resolution.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::pipelines::{Bng, BstOutput, L2Fwd, L3Fwd, Mgw, PortFwd};
use crate::plugin::PipelinePlugin;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Pipeline types the controller can install.
///
/// `vmgw` is the mobile gateway with base stations reached through
/// groups instead of directly through ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    PortFwd,
    L2Fwd,
    L3Fwd,
    Mgw,
    Vmgw,
    Bng,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 6] = [
        PipelineKind::PortFwd,
        PipelineKind::L2Fwd,
        PipelineKind::L3Fwd,
        PipelineKind::Mgw,
        PipelineKind::Vmgw,
        PipelineKind::Bng,
    ];

    /// Name as written in the pipeline configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::PortFwd => "portfwd",
            PipelineKind::L2Fwd => "l2fwd",
            PipelineKind::L3Fwd => "l3fwd",
            PipelineKind::Mgw => "mgw",
            PipelineKind::Vmgw => "vmgw",
            PipelineKind::Bng => "bng",
        }
    }

    /// Builds the plugin for this kind from `config`.
    ///
    /// # Arguments
    ///
    /// * `config` - the pipeline configuration; plugins read their static
    ///   entries (users, hosts, base stations) from it
    ///
    /// # Returns
    ///
    /// The plugin, or `PipelineError::InvalidConfig` when the configuration
    /// lacks something the pipeline needs, such as the gateway address.
    pub fn instantiate(&self, config: &PipelineConfig) -> PipelineResult<Box<dyn PipelinePlugin>> {
        Ok(match self {
            PipelineKind::PortFwd => Box::new(PortFwd::new(config)?),
            PipelineKind::L2Fwd => Box::new(L2Fwd::new(config)?),
            PipelineKind::L3Fwd => Box::new(L3Fwd::new(config)?),
            PipelineKind::Mgw => Box::new(Mgw::new(config, BstOutput::Port)?),
            PipelineKind::Vmgw => Box::new(Mgw::new(config, BstOutput::Group)?),
            PipelineKind::Bng => Box::new(Bng::new(config)?),
        })
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PipelineKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| PipelineError::UnknownPipeline(s.to_string()))
    }
}

/// Resolves `config.name` and builds its plugin.
///
/// # Example
///
/// ```
/// use tipsy_pipeline::{from_json_str, load_pipeline, PipelineConfig};
///
/// let conf: PipelineConfig = from_json_str(r#"{"name": "l2fwd"}"#).unwrap();
/// let plugin = load_pipeline(&conf).unwrap();
/// assert_eq!(plugin.name(), "l2fwd");
/// ```
pub fn load_pipeline(config: &PipelineConfig) -> PipelineResult<Box<dyn PipelinePlugin>> {
    let kind: PipelineKind = config.name.parse()?;
    let plugin = kind.instantiate(config)?;
    info!(pipeline = %kind, tables = plugin.tables().len(), "pipeline loaded");
    Ok(plugin)
}
