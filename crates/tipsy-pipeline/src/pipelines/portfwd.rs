//! Port forwarding: everything from uplink goes to downlink and back.

use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::flow::FlowSpec;
use crate::pipelines::Direction;
use crate::plugin::{PipelineContext, PipelinePlugin};
use crate::tables::TableRegistry;
use serde::Deserialize;
use tipsy_openflow::{Action, Match, SetField};
use tipsy_types::MacAddress;

#[derive(Debug, Clone, Default, Deserialize)]
struct PortFwdParams {
    /// Destination MAC rewritten on upstream packets.
    #[serde(default)]
    mac_swap_upstream: Option<MacAddress>,
    #[serde(default)]
    mac_swap_downstream: Option<MacAddress>,
}

/// The `portfwd` plugin. It has no runtime actions.
#[derive(Debug)]
pub struct PortFwd {
    tables: TableRegistry,
    params: PortFwdParams,
}

impl PortFwd {
    pub fn new(config: &PipelineConfig) -> PipelineResult<Self> {
        Ok(Self {
            tables: TableRegistry::sequential(["forward", "drop"]),
            params: config.params()?,
        })
    }

    fn forward(&self, ctx: &PipelineContext<'_>, dir: Direction) -> PipelineResult<()> {
        let mac = match dir {
            Direction::Upstream => self.params.mac_swap_upstream,
            Direction::Downstream => self.params.mac_swap_downstream,
        };
        ctx.flows.install_flow(
            FlowSpec::new("forward")
                .matching(Match::new().in_port(dir.ingress_port(ctx)))
                .actions(mac.map(|m| Action::set_field(SetField::EthDst(m))))
                .output(dir.egress_port(ctx)),
        )
    }
}

impl PipelinePlugin for PortFwd {
    fn name(&self) -> &'static str {
        "portfwd"
    }

    fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    fn config_switch(&mut self, ctx: &PipelineContext<'_>) -> PipelineResult<()> {
        self.forward(ctx, Direction::Upstream)?;
        self.forward(ctx, Direction::Downstream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::from_json_str;
    use crate::pipelines::testutil::{ctx, DL, UL};
    use crate::ports::PortTable;
    use pretty_assertions::assert_eq;
    use tipsy_openflow::{DatapathId, MemoryDatapath, TableId};

    #[test]
    fn test_cross_forwarding() {
        let conf: PipelineConfig = from_json_str(
            r#"{"name": "portfwd", "mac-swap-downstream": "02:00:00:00:00:09"}"#,
        )
        .unwrap();
        let mut pl = PortFwd::new(&conf).unwrap();
        let dp = MemoryDatapath::new(DatapathId(1));
        let ports = PortTable::default();
        let tables = pl.tables().clone();
        pl.config_switch(&ctx(&dp, &tables, &ports)).unwrap();

        let fms = dp.flow_mods();
        assert_eq!(fms.len(), 2);
        assert!(fms.iter().all(|fm| fm.table_id == TableId(0)));
        assert_eq!(fms[0].matches.in_port, Some(UL));
        assert_eq!(fms[0].output_ports(), vec![DL]);
        assert_eq!(fms[0].instructions[0].actions().len(), 1);
        assert_eq!(fms[1].matches.in_port, Some(DL));
        assert_eq!(
            fms[1].instructions[0].actions()[0],
            Action::set_field(SetField::EthDst("02:00:00:00:00:09".parse().unwrap()))
        );
    }
}
