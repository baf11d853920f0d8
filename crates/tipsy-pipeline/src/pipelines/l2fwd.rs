//! L2 forwarding: destination MAC lookup, one table per direction.

use crate::config::{Command, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::flow::FlowSpec;
use crate::pipelines::Direction;
use crate::plugin::{ActionStatus, PipelineContext, PipelinePlugin};
use crate::tables::TableRegistry;
use serde::Deserialize;
use tipsy_openflow::{Match, PortNo};
use tipsy_types::MacAddress;
use tracing::debug;

/// One MAC table entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct L2Entry {
    pub mac: MacAddress,
    /// Output port; the direction's egress port when unset.
    #[serde(default)]
    pub out_port: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct L2FwdParams {
    #[serde(default)]
    upstream_l2_table: Vec<L2Entry>,
    #[serde(default)]
    downstream_l2_table: Vec<L2Entry>,
}

#[derive(Debug, Deserialize)]
struct L2EntryArgs {
    table: Direction,
    entry: L2Entry,
}

/// The `l2fwd` plugin.
///
/// A selector table splits traffic by ingress port into the `upstream` and
/// `downstream` MAC tables. Runtime actions: `add_l2_entry`,
/// `del_l2_entry`, with `table` naming the direction.
#[derive(Debug)]
pub struct L2Fwd {
    tables: TableRegistry,
    upstream: Vec<L2Entry>,
    downstream: Vec<L2Entry>,
}

impl L2Fwd {
    pub fn new(config: &PipelineConfig) -> PipelineResult<Self> {
        let params: L2FwdParams = config.params()?;
        Ok(Self {
            tables: TableRegistry::sequential(["selector", "upstream", "downstream", "drop"]),
            upstream: params.upstream_l2_table,
            downstream: params.downstream_l2_table,
        })
    }

    fn entries_mut(&mut self, dir: Direction) -> &mut Vec<L2Entry> {
        match dir {
            Direction::Upstream => &mut self.upstream,
            Direction::Downstream => &mut self.downstream,
        }
    }

    fn entry_flow(ctx: &PipelineContext<'_>, dir: Direction, entry: &L2Entry) -> FlowSpec {
        let out = entry.out_port.map(PortNo).unwrap_or(dir.egress_port(ctx));
        FlowSpec::new(dir.table())
            .matching(Match::new().eth_dst(entry.mac))
            .output(out)
    }

    fn add_entry(
        &mut self,
        ctx: &PipelineContext<'_>,
        dir: Direction,
        entry: L2Entry,
    ) -> PipelineResult<()> {
        ctx.flows.install_flow(Self::entry_flow(ctx, dir, &entry))?;
        let entries = self.entries_mut(dir);
        entries.retain(|e| e.mac != entry.mac);
        entries.push(entry);
        Ok(())
    }

    fn del_entry(
        &mut self,
        ctx: &PipelineContext<'_>,
        dir: Direction,
        mac: MacAddress,
    ) -> PipelineResult<()> {
        let entries = self.entries_mut(dir);
        let before = entries.len();
        entries.retain(|e| e.mac != mac);
        if entries.len() == before {
            return Err(PipelineError::not_found("l2 entry", mac));
        }
        ctx.flows.install_flow(
            FlowSpec::new(dir.table())
                .matching(Match::new().eth_dst(mac))
                .delete(),
        )
    }
}

impl PipelinePlugin for L2Fwd {
    fn name(&self) -> &'static str {
        "l2fwd"
    }

    fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    fn config_switch(&mut self, ctx: &PipelineContext<'_>) -> PipelineResult<()> {
        for dir in [Direction::Upstream, Direction::Downstream] {
            ctx.flows.install_flow(
                FlowSpec::new("selector")
                    .matching(Match::new().in_port(dir.ingress_port(ctx)))
                    .goto(dir.table()),
            )?;
        }
        for entry in &self.upstream {
            ctx.flows
                .install_flow(Self::entry_flow(ctx, Direction::Upstream, entry))?;
        }
        for entry in &self.downstream {
            ctx.flows
                .install_flow(Self::entry_flow(ctx, Direction::Downstream, entry))?;
        }
        Ok(())
    }

    fn do_action(&mut self, ctx: &PipelineContext<'_>, cmd: &Command) -> PipelineResult<ActionStatus> {
        match cmd.action.as_str() {
            "add_l2_entry" => {
                let args: L2EntryArgs = cmd.args()?;
                debug!(table = args.table.table(), mac = %args.entry.mac, "add_l2_entry");
                self.add_entry(ctx, args.table, args.entry)?;
            }
            "del_l2_entry" => {
                let args: L2EntryArgs = cmd.args()?;
                debug!(table = args.table.table(), mac = %args.entry.mac, "del_l2_entry");
                self.del_entry(ctx, args.table, args.entry.mac)?;
            }
            _ => return Ok(ActionStatus::Unsupported),
        }
        Ok(ActionStatus::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::from_json_str;
    use crate::pipelines::testutil::{ctx, DL, UL};
    use crate::plugin::dispatch;
    use crate::ports::PortTable;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tipsy_openflow::{DatapathId, FlowModCommand, MemoryDatapath, TableId};

    fn plugin() -> L2Fwd {
        let conf: PipelineConfig = from_json_str(
            r#"{
                "name": "l2fwd",
                "upstream-l2-table": [{"mac": "aa:aa:aa:aa:aa:01"}],
                "downstream-l2-table": [{"mac": "bb:bb:bb:bb:bb:01", "out-port": 7}]
            }"#,
        )
        .unwrap();
        L2Fwd::new(&conf).unwrap()
    }

    #[test]
    fn test_config_switch() {
        let mut pl = plugin();
        let dp = MemoryDatapath::new(DatapathId(1));
        let ports = PortTable::default();
        let tables = pl.tables().clone();
        pl.config_switch(&ctx(&dp, &tables, &ports)).unwrap();

        let fms = dp.flow_mods();
        assert_eq!(fms.len(), 4);
        assert_eq!(fms[0].matches.in_port, Some(UL));
        assert_eq!(fms[0].goto_table(), Some(TableId(1)));
        assert_eq!(fms[1].matches.in_port, Some(DL));
        assert_eq!(fms[1].goto_table(), Some(TableId(2)));
        assert_eq!(fms[2].table_id, TableId(1));
        assert_eq!(fms[2].output_ports(), vec![DL]);
        assert_eq!(fms[3].table_id, TableId(2));
        assert_eq!(fms[3].output_ports(), vec![PortNo(7)]);
    }

    #[test]
    fn test_runtime_entries() {
        let mut pl = plugin();
        let dp = MemoryDatapath::new(DatapathId(1));
        let ports = PortTable::default();
        let tables = pl.tables().clone();
        let ctx = ctx(&dp, &tables, &ports);

        let entry = json!({"table": "upstream", "entry": {"mac": "aa:aa:aa:aa:aa:02"}});
        dispatch(&mut pl, &ctx, &Command::new("add_l2_entry", entry.clone())).unwrap();
        dispatch(&mut pl, &ctx, &Command::new("del_l2_entry", entry.clone())).unwrap();
        assert_eq!(pl.upstream.len(), 1);

        let fms = dp.flow_mods();
        assert_eq!(fms[0].command, FlowModCommand::Add);
        assert_eq!(fms[1].command, FlowModCommand::Delete);

        let err = dispatch(&mut pl, &ctx, &Command::new("del_l2_entry", entry)).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));
    }
}
