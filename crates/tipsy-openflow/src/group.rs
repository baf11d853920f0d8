//! Group table programming.

use crate::flow::Action;
use crate::types::{GroupId, PortNo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupModCommand {
    Add,
    Modify,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupType {
    All,
    Select,
    #[default]
    Indirect,
    FastFailover,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub weight: u16,
    pub watch_port: PortNo,
    pub watch_group: GroupId,
    pub actions: Vec<Action>,
}

impl Bucket {
    /// Zero weight, wildcard watch port and group.
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            weight: 0,
            watch_port: PortNo::ANY,
            watch_group: GroupId::ANY,
            actions,
        }
    }
}

/// An `OFPT_GROUP_MOD` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMod {
    pub command: GroupModCommand,
    pub group_type: GroupType,
    pub group_id: GroupId,
    pub buckets: Vec<Bucket>,
}
