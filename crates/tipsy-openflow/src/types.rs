//! Typed OpenFlow identifiers.
//!
//! Port numbers, table ids, group ids and meter ids are all plain integers
//! on the wire. Wrapping them keeps a group id from being passed where an
//! output port is expected.

use std::fmt;

macro_rules! define_ofp_id {
    ($(#[$doc:meta])* $name:ident, $raw:ty, $label:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub $raw);

        impl $name {
            pub const fn as_raw(&self) -> $raw {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $label, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$raw> for $name {
            fn from(raw: $raw) -> Self {
                $name(raw)
            }
        }
    };
}

define_ofp_id!(
    /// An OpenFlow port number (`ofp_port_no`).
    PortNo, u32, "Port"
);
define_ofp_id!(
    /// A flow table id.
    TableId, u8, "Table"
);
define_ofp_id!(
    /// A group table entry id.
    GroupId, u32, "Group"
);
define_ofp_id!(
    /// A meter id.
    MeterId, u32, "Meter"
);

impl PortNo {
    /// Maximum number of physical and logical switch ports.
    pub const MAX: PortNo = PortNo(0xffff_ff00);
    pub const IN_PORT: PortNo = PortNo(0xffff_fff8);
    pub const CONTROLLER: PortNo = PortNo(0xffff_fffd);
    pub const LOCAL: PortNo = PortNo(0xffff_fffe);
    /// Wildcard port used in flow-mod `out_port` and bucket `watch_port`.
    pub const ANY: PortNo = PortNo(0xffff_ffff);

    pub const fn is_reserved(&self) -> bool {
        self.0 > Self::MAX.0
    }
}

impl TableId {
    /// Wildcard table for table-wide deletes and stats.
    pub const ALL: TableId = TableId(0xff);
}

impl GroupId {
    pub const MAX: GroupId = GroupId(0xffff_ff00);
    pub const ALL: GroupId = GroupId(0xffff_fffc);
    /// Wildcard group used in flow-mod `out_group` and bucket `watch_group`.
    pub const ANY: GroupId = GroupId(0xffff_ffff);
}

impl MeterId {
    pub const MAX: MeterId = MeterId(0xffff_0000);
}

/// A datapath (switch) identity as announced in the features reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatapathId(pub u64);

impl fmt::Display for DatapathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
