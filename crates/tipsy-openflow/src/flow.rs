//! Flow table programming: match, actions, instructions and the flow-mod.

use crate::types::{GroupId, MeterId, PortNo, TableId};
use std::net::Ipv4Addr;
use tipsy_types::{Ipv4Prefix, MacAddress};

/// Default flow priority (`OFP_DEFAULT_PRIORITY`).
pub const OFP_DEFAULT_PRIORITY: u16 = 0x8000;

/// Send the whole packet to the controller on an output action.
pub const OFPCML_NO_BUFFER: u16 = 0xffff;

pub const ETH_TYPE_IP: u16 = 0x0800;
pub const ETH_TYPE_ARP: u16 = 0x0806;
pub const IPPROTO_UDP: u8 = 17;

/// OXM match fields used by the TIPSY pipelines. Unset fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Match {
    pub in_port: Option<PortNo>,
    pub eth_dst: Option<MacAddress>,
    pub eth_src: Option<MacAddress>,
    pub eth_type: Option<u16>,
    /// VID with `OFPVID_PRESENT` already applied.
    pub vlan_vid: Option<u16>,
    pub ip_proto: Option<u8>,
    pub ipv4_src: Option<Ipv4Prefix>,
    pub ipv4_dst: Option<Ipv4Prefix>,
    pub udp_dst: Option<u16>,
    pub tunnel_id: Option<u64>,
}

impl Match {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_port(mut self, port: PortNo) -> Self {
        self.in_port = Some(port);
        self
    }

    pub fn eth_dst(mut self, mac: MacAddress) -> Self {
        self.eth_dst = Some(mac);
        self
    }

    pub fn eth_src(mut self, mac: MacAddress) -> Self {
        self.eth_src = Some(mac);
        self
    }

    pub fn eth_type(mut self, eth_type: u16) -> Self {
        self.eth_type = Some(eth_type);
        self
    }

    pub fn vlan_vid(mut self, vid: u16) -> Self {
        self.vlan_vid = Some(vid);
        self
    }

    pub fn ip_proto(mut self, proto: u8) -> Self {
        self.ip_proto = Some(proto);
        self
    }

    /// Matches IPv4 source; implies `eth_type = 0x0800`.
    pub fn ipv4_src(mut self, prefix: impl Into<Ipv4Prefix>) -> Self {
        self.eth_type = Some(ETH_TYPE_IP);
        self.ipv4_src = Some(prefix.into());
        self
    }

    /// Matches IPv4 destination; implies `eth_type = 0x0800`.
    pub fn ipv4_dst(mut self, prefix: impl Into<Ipv4Prefix>) -> Self {
        self.eth_type = Some(ETH_TYPE_IP);
        self.ipv4_dst = Some(prefix.into());
        self
    }

    /// Matches UDP destination port; implies IPv4/UDP.
    pub fn udp_dst(mut self, port: u16) -> Self {
        self.eth_type = Some(ETH_TYPE_IP);
        self.ip_proto = Some(IPPROTO_UDP);
        self.udp_dst = Some(port);
        self
    }

    pub fn tunnel_id(mut self, id: u64) -> Self {
        self.tunnel_id = Some(id);
        self
    }

    /// True if every field is a wildcard.
    pub fn is_empty(&self) -> bool {
        *self == Match::default()
    }
}

/// Header fields rewritten by a set-field action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetField {
    EthSrc(MacAddress),
    EthDst(MacAddress),
    VlanVid(u16),
    Ipv4Src(Ipv4Addr),
    Ipv4Dst(Ipv4Addr),
    TunnelId(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Output { port: PortNo, max_len: u16 },
    Group(GroupId),
    SetField(SetField),
    PushVlan(u16),
    PopVlan,
    DecNwTtl,
}

impl Action {
    pub fn output(port: PortNo) -> Self {
        Action::Output {
            port,
            max_len: OFPCML_NO_BUFFER,
        }
    }

    pub fn set_field(field: SetField) -> Self {
        Action::SetField(field)
    }

    /// Output port, if this is an output action.
    pub fn output_port(&self) -> Option<PortNo> {
        match self {
            Action::Output { port, .. } => Some(*port),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    ApplyActions(Vec<Action>),
    WriteActions(Vec<Action>),
    GotoTable(TableId),
    Meter(MeterId),
}

impl Instruction {
    pub fn goto_table(&self) -> Option<TableId> {
        match self {
            Instruction::GotoTable(id) => Some(*id),
            _ => None,
        }
    }

    pub fn actions(&self) -> &[Action] {
        match self {
            Instruction::ApplyActions(actions) | Instruction::WriteActions(actions) => actions,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowModCommand {
    Add,
    Modify,
    ModifyStrict,
    Delete,
    DeleteStrict,
}

impl FlowModCommand {
    pub fn is_delete(&self) -> bool {
        matches!(self, FlowModCommand::Delete | FlowModCommand::DeleteStrict)
    }
}

/// An `OFPT_FLOW_MOD` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMod {
    pub table_id: TableId,
    pub command: FlowModCommand,
    pub priority: u16,
    pub matches: Match,
    pub instructions: Vec<Instruction>,
    pub cookie: u64,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub out_port: PortNo,
    pub out_group: GroupId,
}

impl FlowMod {
    /// An add with default priority, no instructions and wildcard
    /// out-port/out-group.
    pub fn new(table_id: TableId, command: FlowModCommand) -> Self {
        Self {
            table_id,
            command,
            priority: OFP_DEFAULT_PRIORITY,
            matches: Match::default(),
            instructions: Vec::new(),
            cookie: 0,
            idle_timeout: 0,
            hard_timeout: 0,
            out_port: PortNo::ANY,
            out_group: GroupId::ANY,
        }
    }

    /// Target of the first goto-table instruction.
    pub fn goto_table(&self) -> Option<TableId> {
        self.instructions.iter().find_map(Instruction::goto_table)
    }

    /// Ports named by output actions across all action lists.
    pub fn output_ports(&self) -> Vec<PortNo> {
        self.instructions
            .iter()
            .flat_map(|i| i.actions().iter().filter_map(Action::output_port))
            .collect()
    }
}
