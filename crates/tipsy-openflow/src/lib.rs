//! Typed OpenFlow 1.3 message model for the TIPSY controller.
//!
//! Messages are plain values; serializing them onto the wire is the job of
//! the protocol adapter behind a [`Datapath`].

pub mod datapath;
pub mod error;
pub mod event;
pub mod flow;
pub mod group;
pub mod message;
pub mod meter;
pub mod types;

pub use datapath::{ChannelDatapath, Datapath, MemoryDatapath};
pub use error::{ErrorMsg, OfpError, OfpErrorType, OfpResult};
pub use event::{DatapathEvent, PortDesc, SwitchDesc, SwitchFeatures};
pub use flow::{
    Action, FlowMod, FlowModCommand, Instruction, Match, SetField, ETH_TYPE_ARP, ETH_TYPE_IP,
    IPPROTO_UDP, OFP_DEFAULT_PRIORITY,
};
pub use group::{Bucket, GroupMod, GroupModCommand, GroupType};
pub use message::OfpMessage;
pub use meter::{MeterBand, MeterMod, MeterModCommand};
pub use types::{DatapathId, GroupId, MeterId, PortNo, TableId};

/// Wire protocol version (OpenFlow 1.3).
pub const OFP_VERSION: u8 = 0x04;
