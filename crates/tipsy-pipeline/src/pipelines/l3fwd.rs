//! L3 forwarding: longest-prefix routes pointing at next-hop groups.

use crate::config::{Command, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::flow::FlowSpec;
use crate::pipelines::Direction;
use crate::plugin::{ActionStatus, PipelineContext, PipelinePlugin};
use crate::tables::TableRegistry;
use serde::Deserialize;
use tipsy_openflow::{Action, GroupId, GroupType, Match, PortNo, SetField, ETH_TYPE_IP};
use tipsy_types::{Ipv4Prefix, MacAddress};
use tracing::debug;

/// Downstream next-hop groups are numbered from here.
const DOWNSTREAM_GROUP_BASE: u32 = 0x1000;

/// A prefix route.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Route {
    pub ip: Ipv4Prefix,
    /// Index into the direction's group table.
    pub nhop: u32,
}

/// L2 rewrite towards a next hop; installed as an indirect group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NextHop {
    /// Output port; the direction's egress port when unset.
    #[serde(default)]
    pub port: Option<u32>,
    pub smac: MacAddress,
    pub dmac: MacAddress,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct L3FwdParams {
    #[serde(default)]
    upstream_l3_table: Vec<Route>,
    #[serde(default)]
    downstream_l3_table: Vec<Route>,
    #[serde(default)]
    upstream_group_table: Vec<NextHop>,
    #[serde(default)]
    downstream_group_table: Vec<NextHop>,
}

#[derive(Debug, Deserialize)]
struct RouteArgs {
    table: Direction,
    entry: Route,
}

/// The `l3fwd` plugin.
///
/// Runtime actions: `add_route`, `del_route`. Routes must point at a next
/// hop present in the configuration.
#[derive(Debug)]
pub struct L3Fwd {
    tables: TableRegistry,
    params: L3FwdParams,
}

fn group_id(dir: Direction, nhop: u32) -> GroupId {
    match dir {
        Direction::Upstream => GroupId(nhop),
        Direction::Downstream => GroupId(DOWNSTREAM_GROUP_BASE + nhop),
    }
}

impl L3Fwd {
    pub fn new(config: &PipelineConfig) -> PipelineResult<Self> {
        Ok(Self {
            tables: TableRegistry::sequential(["selector", "upstream", "downstream", "drop"]),
            params: config.params()?,
        })
    }

    fn groups(&self, dir: Direction) -> &[NextHop] {
        match dir {
            Direction::Upstream => &self.params.upstream_group_table,
            Direction::Downstream => &self.params.downstream_group_table,
        }
    }

    fn routes_mut(&mut self, dir: Direction) -> &mut Vec<Route> {
        match dir {
            Direction::Upstream => &mut self.params.upstream_l3_table,
            Direction::Downstream => &mut self.params.downstream_l3_table,
        }
    }

    fn check_nhop(&self, dir: Direction, route: &Route) -> PipelineResult<()> {
        if (route.nhop as usize) < self.groups(dir).len() {
            Ok(())
        } else {
            Err(PipelineError::InvalidConfig(format!(
                "route {} refers to missing {} next hop {}",
                route.ip,
                dir.table(),
                route.nhop
            )))
        }
    }

    fn route_flow(dir: Direction, route: &Route) -> FlowSpec {
        FlowSpec::new(dir.table())
            .priority(u16::from(route.ip.len()))
            .matching(Match::new().ipv4_dst(route.ip))
    }

    fn install_groups(&self, ctx: &PipelineContext<'_>, dir: Direction) -> PipelineResult<()> {
        for (idx, nhop) in self.groups(dir).iter().enumerate() {
            let out = nhop.port.map(PortNo).unwrap_or(dir.egress_port(ctx));
            ctx.flows.install_group(
                group_id(dir, idx as u32),
                vec![
                    Action::set_field(SetField::EthSrc(nhop.smac)),
                    Action::set_field(SetField::EthDst(nhop.dmac)),
                    Action::output(out),
                ],
                GroupType::Indirect,
            )?;
        }
        Ok(())
    }

    fn add_route(&self, ctx: &PipelineContext<'_>, dir: Direction, route: &Route) -> PipelineResult<()> {
        self.check_nhop(dir, route)?;
        ctx.flows.install_flow(
            Self::route_flow(dir, route)
                .action(Action::DecNwTtl)
                .action(Action::Group(group_id(dir, route.nhop))),
        )
    }
}

impl PipelinePlugin for L3Fwd {
    fn name(&self) -> &'static str {
        "l3fwd"
    }

    fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    fn config_switch(&mut self, ctx: &PipelineContext<'_>) -> PipelineResult<()> {
        for dir in [Direction::Upstream, Direction::Downstream] {
            self.install_groups(ctx, dir)?;
            ctx.flows.install_flow(
                FlowSpec::new("selector")
                    .matching(
                        Match::new()
                            .in_port(dir.ingress_port(ctx))
                            .eth_type(ETH_TYPE_IP),
                    )
                    .goto(dir.table()),
            )?;
        }
        for route in &self.params.upstream_l3_table {
            self.add_route(ctx, Direction::Upstream, route)?;
        }
        for route in &self.params.downstream_l3_table {
            self.add_route(ctx, Direction::Downstream, route)?;
        }
        Ok(())
    }

    fn do_action(&mut self, ctx: &PipelineContext<'_>, cmd: &Command) -> PipelineResult<ActionStatus> {
        match cmd.action.as_str() {
            "add_route" => {
                let args: RouteArgs = cmd.args()?;
                debug!(table = args.table.table(), ip = %args.entry.ip, "add_route");
                self.add_route(ctx, args.table, &args.entry)?;
                let routes = self.routes_mut(args.table);
                routes.retain(|r| r.ip != args.entry.ip);
                routes.push(args.entry);
            }
            "del_route" => {
                let args: RouteArgs = cmd.args()?;
                debug!(table = args.table.table(), ip = %args.entry.ip, "del_route");
                let routes = self.routes_mut(args.table);
                let before = routes.len();
                routes.retain(|r| r.ip != args.entry.ip);
                if routes.len() == before {
                    return Err(PipelineError::not_found("route", args.entry.ip));
                }
                ctx.flows
                    .install_flow(Self::route_flow(args.table, &args.entry).delete_strict())?;
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
    use tipsy_openflow::{DatapathId, FlowModCommand, Instruction, MemoryDatapath, TableId};

    fn conf(extra: &str) -> PipelineConfig {
        from_json_str(&format!(
            r#"{{
                "name": "l3fwd",
                "upstream-group-table": [{{"smac": "02:00:00:00:00:01", "dmac": "02:00:00:00:00:02"}}],
                "downstream-group-table": [{{"port": 9, "smac": "02:00:00:00:00:03", "dmac": "02:00:00:00:00:04"}}]
                {}
            }}"#,
            extra
        ))
        .unwrap()
    }

    #[test]
    fn test_config_switch() {
        let mut pl = L3Fwd::new(&conf(
            r#", "upstream-l3-table": [{"ip": "10.0.0.0/8", "nhop": 0}],
                 "downstream-l3-table": [{"ip": "192.168.1.0/24", "nhop": 0}]"#,
        ))
        .unwrap();
        let dp = MemoryDatapath::new(DatapathId(1));
        let ports = PortTable::default();
        let tables = pl.tables().clone();
        pl.config_switch(&ctx(&dp, &tables, &ports)).unwrap();

        let msgs = dp.messages();
        let up_group = msgs[0].as_group_mod().unwrap();
        assert_eq!(up_group.group_id, GroupId(0));
        assert_eq!(up_group.buckets[0].actions[2], Action::output(DL));
        let selector = msgs[1].as_flow_mod().unwrap();
        assert_eq!(selector.matches.in_port, Some(UL));
        let down_group = msgs[2].as_group_mod().unwrap();
        assert_eq!(down_group.group_id, GroupId(DOWNSTREAM_GROUP_BASE));
        assert_eq!(down_group.buckets[0].actions[2], Action::output(PortNo(9)));

        let routes = dp.flow_mods();
        let up_route = &routes[2];
        assert_eq!(up_route.table_id, TableId(1));
        assert_eq!(up_route.priority, 8);
        assert_eq!(
            up_route.instructions,
            vec![Instruction::ApplyActions(vec![
                Action::DecNwTtl,
                Action::Group(GroupId(0))
            ])]
        );
        assert_eq!(routes[3].table_id, TableId(2));
        assert_eq!(routes[3].priority, 24);
    }

    #[test]
    fn test_missing_nhop() {
        let mut pl = L3Fwd::new(&conf(
            r#", "upstream-l3-table": [{"ip": "10.0.0.0/8", "nhop": 3}]"#,
        ))
        .unwrap();
        let dp = MemoryDatapath::new(DatapathId(1));
        let ports = PortTable::default();
        let tables = pl.tables().clone();
        let err = pl.config_switch(&ctx(&dp, &tables, &ports)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_runtime_routes() {
        let mut pl = L3Fwd::new(&conf("")).unwrap();
        let dp = MemoryDatapath::new(DatapathId(1));
        let ports = PortTable::default();
        let tables = pl.tables().clone();
        let ctx = ctx(&dp, &tables, &ports);

        let args = json!({"table": "downstream", "entry": {"ip": "172.16.0.0/12", "nhop": 0}});
        dispatch(&mut pl, &ctx, &Command::new("add_route", args.clone())).unwrap();
        dispatch(&mut pl, &ctx, &Command::new("del_route", args)).unwrap();

        let fms = dp.flow_mods();
        assert_eq!(fms.len(), 2);
        assert_eq!(fms[0].command, FlowModCommand::Add);
        assert_eq!(fms[1].command, FlowModCommand::DeleteStrict);
        assert_eq!(fms[1].priority, 12);
        assert!(pl.params.downstream_l3_table.is_empty());
    }
}
