//! Mobile gateway, plain (`mgw`) and virtual (`vmgw`).
//!
//! Uplink traffic arrives from base stations on the `tun-<bst>` tunnel
//! ports with the user's TEID in the tunnel id; it is matched per user,
//! rate limited and routed to the servers. Downlink traffic is matched on
//! the user address and sent back into the user's current base station
//! tunnel. The virtual variant reaches base stations through one indirect
//! group each, so a handover rewrites a single group reference.

use crate::config::{Command, Gateway, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::flow::FlowSpec;
use crate::pipelines::gateway::{self, NextHop, Server, ServerArgs};
use crate::plugin::{ActionStatus, PipelineContext, PipelinePlugin};
use crate::tables::TableRegistry;
use serde::Deserialize;
use std::net::Ipv4Addr;
use tipsy_openflow::{Action, GroupId, GroupType, Match, SetField};
use tipsy_types::MacAddress;
use tracing::{debug, info};

const BST_GROUP_BASE: u32 = 0x1000;

/// How downlink traffic reaches a base station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BstOutput {
    /// Output straight to the tunnel port.
    Port,
    /// Output through a per-base-station indirect group.
    Group,
}

/// A base station at the far end of a `tun-<index>` port.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BaseStation {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
}

/// A mobile user, keyed by TEID.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub ip: Ipv4Addr,
    pub teid: u32,
    /// Index of the serving base station.
    pub tun_end: u32,
    /// kbit/s; unlimited when unset.
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MgwParams {
    #[serde(default)]
    bsts: Vec<BaseStation>,
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    srvs: Vec<Server>,
    #[serde(default)]
    nhops: Vec<NextHop>,
}

#[derive(Debug, Deserialize)]
struct HandoverArgs {
    user_teid: u32,
    #[serde(default = "default_bst_shift")]
    bst_shift: u32,
}

fn default_bst_shift() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct AddUserArgs {
    user: User,
}

#[derive(Debug, Deserialize)]
struct DelUserArgs {
    user_teid: u32,
}

/// The `mgw` and `vmgw` plugins.
///
/// Runtime actions: `handover`, `add_user`, `del_user`, `add_server`,
/// `del_server`.
#[derive(Debug)]
pub struct Mgw {
    name: &'static str,
    output: BstOutput,
    tables: TableRegistry,
    gw: Gateway,
    params: MgwParams,
}

impl Mgw {
    /// # Arguments
    ///
    /// * `config` - pipeline configuration with the gateway address, base
    ///   stations, users, servers and next hops
    /// * `output` - [`BstOutput::Port`] for `mgw`, [`BstOutput::Group`] for
    ///   `vmgw`
    pub fn new(config: &PipelineConfig, output: BstOutput) -> PipelineResult<Self> {
        let name = match output {
            BstOutput::Port => "mgw",
            BstOutput::Group => "vmgw",
        };
        Ok(Self {
            name,
            output,
            tables: TableRegistry::sequential([
                "ingress",
                "uplink_user",
                gateway::UPLINK_ROUTE,
                "downlink_user",
                "drop",
            ]),
            gw: gateway::require_gw(config)?,
            params: config.params()?,
        })
    }

    fn bst_group(bst: u32) -> GroupId {
        GroupId(BST_GROUP_BASE + bst)
    }

    fn check_bst(&self, bst: u32) -> PipelineResult<()> {
        if (bst as usize) < self.params.bsts.len() {
            Ok(())
        } else {
            Err(PipelineError::InvalidConfig(format!(
                "{}: base station {} does not exist",
                self.name, bst
            )))
        }
    }

    fn downlink_flow(&self, ctx: &PipelineContext<'_>, user: &User) -> PipelineResult<FlowSpec> {
        let bst = &self.params.bsts[user.tun_end as usize];
        let spec = FlowSpec::new("downlink_user")
            .matching(Match::new().ipv4_dst(user.ip))
            .action(Action::set_field(SetField::TunnelId(u64::from(user.teid))))
            .action(Action::set_field(SetField::EthDst(bst.mac)));
        Ok(match self.output {
            BstOutput::Port => spec.output(ctx.ports.tun_port(user.tun_end)?),
            BstOutput::Group => spec.action(Action::Group(Self::bst_group(user.tun_end))),
        })
    }

    fn add_user(&self, ctx: &PipelineContext<'_>, user: &User) -> PipelineResult<()> {
        self.check_bst(user.tun_end)?;
        let meter = gateway::install_user_meter(ctx, user.teid, user.rate_limit)?;
        ctx.flows.install_flow(
            FlowSpec::new("uplink_user")
                .matching(
                    Match::new()
                        .tunnel_id(u64::from(user.teid))
                        .ipv4_src(user.ip),
                )
                .goto(gateway::UPLINK_ROUTE)
                .instructions(meter),
        )?;
        ctx.flows.install_flow(self.downlink_flow(ctx, user)?)
    }

    fn del_user(&self, ctx: &PipelineContext<'_>, user: &User) -> PipelineResult<()> {
        ctx.flows.install_flow(
            FlowSpec::new("uplink_user")
                .matching(
                    Match::new()
                        .tunnel_id(u64::from(user.teid))
                        .ipv4_src(user.ip),
                )
                .delete(),
        )?;
        ctx.flows.install_flow(
            FlowSpec::new("downlink_user")
                .matching(Match::new().ipv4_dst(user.ip))
                .delete(),
        )?;
        gateway::remove_user_meter(ctx, user.teid, user.rate_limit)
    }

    fn user_index(&self, teid: u32) -> PipelineResult<usize> {
        self.params
            .users
            .iter()
            .position(|u| u.teid == teid)
            .ok_or_else(|| PipelineError::not_found("user", teid))
    }

    fn handover(&mut self, ctx: &PipelineContext<'_>, args: HandoverArgs) -> PipelineResult<()> {
        let n_bsts = self.params.bsts.len() as u32;
        if n_bsts == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "{}: handover without base stations",
                self.name
            )));
        }
        let idx = self.user_index(args.user_teid)?;
        let old = self.params.users[idx].tun_end;
        let new = (old + args.bst_shift % n_bsts) % n_bsts;
        self.params.users[idx].tun_end = new;
        debug!(teid = args.user_teid, old, new, "handover");
        let user = self.params.users[idx].clone();
        ctx.flows.install_flow(self.downlink_flow(ctx, &user)?)
    }
}

impl PipelinePlugin for Mgw {
    fn name(&self) -> &'static str {
        self.name
    }

    fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    fn config_switch(&mut self, ctx: &PipelineContext<'_>) -> PipelineResult<()> {
        gateway::install_nhop_groups(ctx, &self.gw, &self.params.nhops)?;

        for bst in 0..self.params.bsts.len() as u32 {
            let tun = ctx.ports.tun_port(bst)?;
            if self.output == BstOutput::Group {
                ctx.flows.install_group(
                    Self::bst_group(bst),
                    vec![Action::output(tun)],
                    GroupType::Indirect,
                )?;
            }
            ctx.flows.install_flow(
                FlowSpec::new("ingress")
                    .matching(Match::new().in_port(tun))
                    .goto("uplink_user"),
            )?;
        }
        ctx.flows.install_flow(
            FlowSpec::new("ingress")
                .matching(Match::new().in_port(ctx.downlink))
                .goto("downlink_user"),
        )?;

        for user in &self.params.users {
            self.add_user(ctx, user)?;
        }
        for server in &self.params.srvs {
            gateway::add_server(ctx, &self.params.nhops, server)?;
        }
        info!(
            pipeline = self.name,
            bsts = self.params.bsts.len(),
            users = self.params.users.len(),
            servers = self.params.srvs.len(),
            "flow program installed"
        );
        Ok(())
    }

    fn do_action(&mut self, ctx: &PipelineContext<'_>, cmd: &Command) -> PipelineResult<ActionStatus> {
        match cmd.action.as_str() {
            "handover" => self.handover(ctx, cmd.args()?)?,
            "add_user" => {
                let AddUserArgs { user } = cmd.args()?;
                if self.user_index(user.teid).is_ok() {
                    return Err(PipelineError::invalid_args(
                        &cmd.action,
                        format!("user {} already exists", user.teid),
                    ));
                }
                self.add_user(ctx, &user)?;
                self.params.users.push(user);
            }
            "del_user" => {
                let DelUserArgs { user_teid } = cmd.args()?;
                let idx = self.user_index(user_teid)?;
                let user = self.params.users.remove(idx);
                self.del_user(ctx, &user)?;
            }
            "add_server" => {
                let ServerArgs { server } = cmd.args()?;
                gateway::add_server(ctx, &self.params.nhops, &server)?;
                self.params.srvs.retain(|s| s.ip != server.ip);
                self.params.srvs.push(server);
            }
            "del_server" => {
                let ServerArgs { server } = cmd.args()?;
                let before = self.params.srvs.len();
                self.params.srvs.retain(|s| s.ip != server.ip);
                if self.params.srvs.len() == before {
                    return Err(PipelineError::not_found("server", server.ip));
                }
                gateway::del_server(ctx, &server)?;
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
    use crate::pipelines::testutil::{ctx, DL};
    use crate::plugin::dispatch;
    use crate::ports::PortTable;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tipsy_openflow::{
        DatapathId, FlowModCommand, Instruction, MemoryDatapath, MeterId, PortDesc, PortNo,
        TableId,
    };

    fn conf() -> PipelineConfig {
        from_json_str(
            r#"{
                "name": "mgw",
                "gw": {"ip": "10.0.0.1", "mac": "02:00:00:00:00:01"},
                "bsts": [{"ip": "10.1.0.1", "mac": "02:00:00:00:01:01"},
                         {"ip": "10.1.0.2", "mac": "02:00:00:00:01:02"}],
                "users": [{"ip": "172.16.0.1", "teid": 1, "tun-end": 0, "rate-limit": 10000},
                          {"ip": "172.16.0.2", "teid": 2, "tun-end": 1}],
                "srvs": [{"ip": "8.8.8.8", "nhop": 0}],
                "nhops": [{"ip": "10.2.0.1", "mac": "02:00:00:00:02:01"}]
            }"#,
        )
        .unwrap()
    }

    fn ports() -> PortTable {
        PortTable::from_descs(&[
            PortDesc::new(PortNo(1), "port0"),
            PortDesc::new(PortNo(2), "port1"),
            PortDesc::new(PortNo(10), "tun-0"),
            PortDesc::new(PortNo(11), "tun-1"),
        ])
    }

    #[test]
    fn test_config_switch() {
        let mut pl = Mgw::new(&conf(), BstOutput::Port).unwrap();
        let dp = MemoryDatapath::new(DatapathId(1));
        let ports = ports();
        let tables = pl.tables().clone();
        pl.config_switch(&ctx(&dp, &tables, &ports)).unwrap();

        assert_eq!(dp.count("group_mod"), 1);
        assert_eq!(dp.count("meter_mod"), 1);

        let fms = dp.flow_mods();
        // 2 tunnel ingress + downlink ingress + 2 users * 2 + 1 server
        assert_eq!(fms.len(), 8);
        assert_eq!(fms[0].matches.in_port, Some(PortNo(10)));
        assert_eq!(fms[2].matches.in_port, Some(DL));
        assert_eq!(fms[2].goto_table(), Some(TableId(3)));

        let uplink_user = &fms[3];
        assert_eq!(uplink_user.matches.tunnel_id, Some(1));
        assert!(uplink_user
            .instructions
            .contains(&Instruction::Meter(MeterId(2))));
        assert_eq!(fms[4].output_ports(), vec![PortNo(10)]);
        assert_eq!(fms[6].output_ports(), vec![PortNo(11)]);
    }

    #[test]
    fn test_missing_tunnel_port() {
        let mut pl = Mgw::new(&conf(), BstOutput::Port).unwrap();
        let dp = MemoryDatapath::new(DatapathId(1));
        let ports = PortTable::default();
        let tables = pl.tables().clone();
        let err = pl.config_switch(&ctx(&dp, &tables, &ports)).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownPort(name) if name == "tun-0"));
    }

    #[test]
    fn test_missing_gw() {
        let conf: PipelineConfig = from_json_str(r#"{"name": "mgw"}"#).unwrap();
        assert!(matches!(
            Mgw::new(&conf, BstOutput::Port),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_handover_wraps() {
        let mut pl = Mgw::new(&conf(), BstOutput::Port).unwrap();
        let dp = MemoryDatapath::new(DatapathId(1));
        let ports = ports();
        let tables = pl.tables().clone();
        let ctx = ctx(&dp, &tables, &ports);

        let cmd = Command::new("handover", json!({"user_teid": 2}));
        dispatch(&mut pl, &ctx, &cmd).unwrap();
        assert_eq!(pl.params.users[1].tun_end, 0);
        dispatch(&mut pl, &ctx, &cmd).unwrap();
        assert_eq!(pl.params.users[1].tun_end, 1);

        let fms = dp.flow_mods();
        assert_eq!(fms.len(), 2);
        assert_eq!(fms[0].output_ports(), vec![PortNo(10)]);
        assert_eq!(fms[1].output_ports(), vec![PortNo(11)]);

        let unknown = Command::new("handover", json!({"user_teid": 9}));
        assert!(matches!(
            dispatch(&mut pl, &ctx, &unknown),
            Err(PipelineError::NotFound { .. })
        ));
    }

    #[test]
    fn test_vmgw_uses_bst_groups() {
        let mut pl = Mgw::new(&conf(), BstOutput::Group).unwrap();
        assert_eq!(pl.name(), "vmgw");
        let dp = MemoryDatapath::new(DatapathId(1));
        let ports = ports();
        let tables = pl.tables().clone();
        let ctx = ctx(&dp, &tables, &ports);
        pl.config_switch(&ctx).unwrap();

        // 1 next hop group + 2 base station groups
        assert_eq!(dp.count("group_mod"), 3);
        dp.take();

        dispatch(&mut pl, &ctx, &Command::new("handover", json!({"user_teid": 1}))).unwrap();
        let fm = &dp.flow_mods()[0];
        assert!(fm.output_ports().is_empty());
        assert!(fm.instructions[0]
            .actions()
            .contains(&Action::Group(GroupId(BST_GROUP_BASE + 1))));
    }

    #[test]
    fn test_user_and_server_actions() {
        let mut pl = Mgw::new(&conf(), BstOutput::Port).unwrap();
        let dp = MemoryDatapath::new(DatapathId(1));
        let ports = ports();
        let tables = pl.tables().clone();
        let ctx = ctx(&dp, &tables, &ports);

        let user = json!({"user": {"ip": "172.16.0.3", "teid": 3, "tun_end": 1, "rate_limit": 500}});
        dispatch(&mut pl, &ctx, &Command::new("add_user", user.clone())).unwrap();
        assert!(dispatch(&mut pl, &ctx, &Command::new("add_user", user)).is_err());
        dispatch(&mut pl, &ctx, &Command::new("del_user", json!({"user_teid": 3}))).unwrap();
        assert_eq!(pl.params.users.len(), 2);

        let msgs = dp.messages();
        let meter_mods: Vec<_> = msgs.iter().filter_map(|m| m.as_meter_mod()).collect();
        assert_eq!(meter_mods.len(), 2);
        assert_eq!(meter_mods[0].meter_id, MeterId(4));

        let server = json!({"server": {"ip": "1.1.1.1", "nhop": 0}});
        dispatch(&mut pl, &ctx, &Command::new("add_server", server.clone())).unwrap();
        dispatch(&mut pl, &ctx, &Command::new("del_server", server.clone())).unwrap();
        assert!(dispatch(&mut pl, &ctx, &Command::new("del_server", server)).is_err());

        let deletes = dp
            .flow_mods()
            .iter()
            .filter(|fm| fm.command == FlowModCommand::Delete)
            .count();
        assert_eq!(deletes, 3);
    }
}
