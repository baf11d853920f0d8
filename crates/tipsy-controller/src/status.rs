//! Orchestrator status.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;

/// Lifecycle state of the orchestrator, as reported by `GET /tipsy/status`.
///
/// The serialized names are part of the REST interface and must not
/// change; benchmark scripts poll for `"configured"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OrchStatus {
    #[serde(rename = "init")]
    Init,
    #[serde(rename = "wait")]
    Wait,
    #[serde(rename = "start_lagopus")]
    StartLagopus,
    #[serde(rename = "initialize_datapath")]
    InitializeDatapath,
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "wait_for_PortDesc")]
    WaitForPortDesc,
    #[serde(rename = "configure_1")]
    Configure1,
    #[serde(rename = "configured")]
    Configured,
    #[serde(rename = "stopping")]
    Stopping,
    #[serde(rename = "stopped")]
    Stopped,
}

impl OrchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchStatus::Init => "init",
            OrchStatus::Wait => "wait",
            OrchStatus::StartLagopus => "start_lagopus",
            OrchStatus::InitializeDatapath => "initialize_datapath",
            OrchStatus::Connected => "connected",
            OrchStatus::WaitForPortDesc => "wait_for_PortDesc",
            OrchStatus::Configure1 => "configure_1",
            OrchStatus::Configured => "configured",
            OrchStatus::Stopping => "stopping",
            OrchStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for OrchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: OrchStatus,
    pub to: OrchStatus,
    pub at: DateTime<Local>,
}
