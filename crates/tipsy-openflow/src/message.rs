//! Controller-to-switch messages.

use crate::flow::FlowMod;
use crate::group::GroupMod;
use crate::meter::MeterMod;
use crate::types::PortNo;

/// Messages the controller sends to a datapath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfpMessage {
    /// `OFPMP_DESC` request.
    DescStatsRequest,
    /// `OFPMP_PORT_DESC` request; `PortNo::ANY` asks for every port.
    PortDescStatsRequest { port: PortNo },
    FlowMod(FlowMod),
    GroupMod(GroupMod),
    MeterMod(MeterMod),
    BarrierRequest,
}

impl OfpMessage {
    /// Short message name for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            OfpMessage::DescStatsRequest => "desc_stats_request",
            OfpMessage::PortDescStatsRequest { .. } => "port_desc_stats_request",
            OfpMessage::FlowMod(_) => "flow_mod",
            OfpMessage::GroupMod(_) => "group_mod",
            OfpMessage::MeterMod(_) => "meter_mod",
            OfpMessage::BarrierRequest => "barrier_request",
        }
    }

    pub fn as_flow_mod(&self) -> Option<&FlowMod> {
        match self {
            OfpMessage::FlowMod(fm) => Some(fm),
            _ => None,
        }
    }

    pub fn as_group_mod(&self) -> Option<&GroupMod> {
        match self {
            OfpMessage::GroupMod(gm) => Some(gm),
            _ => None,
        }
    }

    pub fn as_meter_mod(&self) -> Option<&MeterMod> {
        match self {
            OfpMessage::MeterMod(mm) => Some(mm),
            _ => None,
        }
    }
}

impl From<FlowMod> for OfpMessage {
    fn from(fm: FlowMod) -> Self {
        OfpMessage::FlowMod(fm)
    }
}

impl From<GroupMod> for OfpMessage {
    fn from(gm: GroupMod) -> Self {
        OfpMessage::GroupMod(gm)
    }
}

impl From<MeterMod> for OfpMessage {
    fn from(mm: MeterMod) -> Self {
        OfpMessage::MeterMod(mm)
    }
}
