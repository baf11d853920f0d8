//! Pipeline error types.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tipsy_openflow::OfpError;

/// Errors from configuration loading, plugins and the flow builder.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to read {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// Plugin-specific configuration is missing or inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The benchmark leaves the switch without cores.
    #[error("Invalid benchmark configuration: {0}")]
    InvalidBenchmark(String),

    #[error("Unknown pipeline: {0}")]
    UnknownPipeline(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown port: {0}")]
    UnknownPort(String),

    /// A runtime command's arguments do not fit its action.
    #[error("Invalid arguments for {action}: {message}")]
    InvalidArgs { action: String, message: String },

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error(transparent)]
    Datapath(#[from] OfpError),
}

impl PipelineError {
    pub fn config_read(path: &Path, source: std::io::Error) -> Self {
        PipelineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn config_parse(path: &Path, message: impl ToString) -> Self {
        PipelineError::ConfigParse {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn invalid_args(action: impl Into<String>, message: impl ToString) -> Self {
        PipelineError::InvalidArgs {
            action: action.into(),
            message: message.to_string(),
        }
    }

    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        PipelineError::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
