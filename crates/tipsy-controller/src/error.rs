//! Controller error types.

use std::path::PathBuf;
use thiserror::Error;
use tipsy_openflow::{DatapathId, OfpError};
use tipsy_pipeline::PipelineError;

/// Errors raised by the orchestrator and its collaborators.
///
/// See [`is_fatal`](ControllerError::is_fatal) for which of them end the
/// run.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A second switch connected while another one is bound.
    #[error("This controller can handle only one switch: bound {bound}, got {got}")]
    SecondSwitch { bound: DatapathId, got: DatapathId },

    /// A benchmark timer firing overlapped the previous one.
    #[error("Previous timer firing is still running")]
    TimerOverrun,

    /// An operation needs the switch, but none is connected.
    #[error("No switch connected")]
    NotConnected,

    /// Settings could not be read, parsed or validated.
    #[error("Failed to load settings from {path}: {message}")]
    Settings { path: PathBuf, message: String },

    #[error("Failed to execute '{command}': {source}")]
    ShellExec {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' failed with exit code {exit_code}: {output}")]
    ShellCommandFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    /// The switch binary could not be launched.
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Notification to {url} failed: {message}")]
    Notify { url: String, message: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Datapath(#[from] OfpError),
}

impl ControllerError {
    pub fn settings(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        ControllerError::Settings {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn notify(url: impl Into<String>, message: impl ToString) -> Self {
        ControllerError::Notify {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Fatal errors end the control loop and the process.
    pub fn is_fatal(&self) -> bool {
        match self {
            ControllerError::SecondSwitch { .. }
            | ControllerError::TimerOverrun
            | ControllerError::Settings { .. } => true,
            ControllerError::Pipeline(e) => matches!(
                e,
                PipelineError::UnknownPipeline(_)
                    | PipelineError::InvalidBenchmark(_)
                    | PipelineError::ConfigRead { .. }
                    | PipelineError::ConfigParse { .. }
            ),
            _ => false,
        }
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;
