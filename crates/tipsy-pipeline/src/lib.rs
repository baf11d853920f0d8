//! Pipeline configuration, flow program builder and pipeline plugins.
//!
//! A pipeline is a named forwarding behavior (port forwarding, L2/L3
//! forwarding, mobile and broadband gateways). Each one is a
//! [`PipelinePlugin`] resolved by name through [`load_pipeline`]; plugins
//! program the switch through a [`FlowBuilder`].

pub mod config;
pub mod error;
pub mod fakedrop;
pub mod flow;
pub mod pipelines;
pub mod plugin;
pub mod ports;
pub mod registry;
pub mod tables;

pub use config::{
    from_json_str, load_benchmark_config, load_pipeline_config, normalize_keys, BenchmarkConfig,
    Command, Gateway, Host, PipelineConfig,
};
pub use error::{PipelineError, PipelineResult};
pub use fakedrop::install_fakedrop_rules;
pub use flow::{FlowBuilder, FlowSpec, TableRef};
pub use plugin::{dispatch, ActionStatus, PipelineContext, PipelinePlugin};
pub use ports::PortTable;
pub use registry::{load_pipeline, PipelineKind};
pub use tables::{TableRegistry, DROP_TABLE};
