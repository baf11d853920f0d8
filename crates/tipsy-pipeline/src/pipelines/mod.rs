//! Concrete pipeline plugins.

pub mod bng;
mod gateway;
pub mod l2fwd;
pub mod l3fwd;
pub mod mgw;
pub mod portfwd;

pub use bng::Bng;
pub use l2fwd::L2Fwd;
pub use l3fwd::L3Fwd;
pub use mgw::{BstOutput, Mgw};
pub use portfwd::PortFwd;

use crate::plugin::PipelineContext;
use serde::Deserialize;
use tipsy_openflow::PortNo;

/// Traffic direction. Upstream traffic enters on the uplink port and
/// leaves on the downlink port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upstream,
    Downstream,
}

impl Direction {
    /// Table holding this direction's entries.
    pub fn table(&self) -> &'static str {
        match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
        }
    }

    /// Port this direction's traffic enters on.
    pub fn ingress_port(&self, ctx: &PipelineContext<'_>) -> PortNo {
        match self {
            Direction::Upstream => ctx.uplink,
            Direction::Downstream => ctx.downlink,
        }
    }

    pub fn egress_port(&self, ctx: &PipelineContext<'_>) -> PortNo {
        match self {
            Direction::Upstream => ctx.downlink,
            Direction::Downstream => ctx.uplink,
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::flow::FlowBuilder;
    use crate::plugin::PipelineContext;
    use crate::ports::PortTable;
    use crate::tables::TableRegistry;
    use tipsy_openflow::{MemoryDatapath, PortNo};

    pub const UL: PortNo = PortNo(1);
    pub const DL: PortNo = PortNo(2);

    pub fn ctx<'a>(
        dp: &'a MemoryDatapath,
        tables: &'a TableRegistry,
        ports: &'a PortTable,
    ) -> PipelineContext<'a> {
        PipelineContext {
            flows: FlowBuilder::new(dp, tables),
            ports,
            uplink: UL,
            downlink: DL,
        }
    }
}
