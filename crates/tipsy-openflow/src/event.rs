//! Switch-to-controller events reported by the protocol adapter.

use crate::datapath::Datapath;
use crate::error::ErrorMsg;
use crate::types::PortNo;
use std::sync::Arc;
use tipsy_types::MacAddress;

/// Completed handshake (`OFPT_FEATURES_REPLY`).
#[derive(Debug, Clone)]
pub struct SwitchFeatures {
    pub datapath: Arc<dyn Datapath>,
    pub version: u8,
    pub n_buffers: u32,
    pub n_tables: u8,
}

/// `OFPMP_DESC` reply body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchDesc {
    pub mfr_desc: String,
    pub hw_desc: String,
    pub sw_desc: String,
    pub serial_num: String,
    pub dp_desc: String,
}

/// One entry of an `OFPMP_PORT_DESC` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDesc {
    pub port_no: PortNo,
    pub hw_addr: MacAddress,
    pub name: String,
}

impl PortDesc {
    pub fn new(port_no: PortNo, name: impl Into<String>) -> Self {
        Self {
            port_no,
            hw_addr: MacAddress::ZERO,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DatapathEvent {
    SwitchFeatures(SwitchFeatures),
    DescStatsReply(SwitchDesc),
    PortDescStatsReply(Vec<PortDesc>),
    Error(ErrorMsg),
    BarrierReply,
    Disconnected,
}

impl DatapathEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DatapathEvent::SwitchFeatures(_) => "switch_features",
            DatapathEvent::DescStatsReply(_) => "desc_stats_reply",
            DatapathEvent::PortDescStatsReply(_) => "port_desc_stats_reply",
            DatapathEvent::Error(_) => "error",
            DatapathEvent::BarrierReply => "barrier_reply",
            DatapathEvent::Disconnected => "disconnected",
        }
    }
}
