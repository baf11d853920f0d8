//! Broadband network gateway.
//!
//! Subscriber traffic arrives VLAN-tagged from the CPEs on the uplink port.
//! The tag identifies the CPE; it is stripped, the user is rate limited and
//! the packet is routed to the servers. The downlink direction tags the
//! packet with the CPE's VLAN and addresses the CPE directly.

use crate::config::{Command, Gateway, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::flow::FlowSpec;
use crate::pipelines::gateway::{self, NextHop, Server, ServerArgs};
use crate::plugin::{ActionStatus, PipelineContext, PipelinePlugin};
use crate::tables::TableRegistry;
use serde::Deserialize;
use std::net::Ipv4Addr;
use tipsy_openflow::{Action, Match, SetField};
use tipsy_types::{MacAddress, VlanId};
use tracing::info;

const ETH_TYPE_8021Q: u16 = 0x8100;

/// Customer premises equipment, identified by its VLAN tag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Cpe {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
    pub vlan_id: VlanId,
}

/// A subscriber address behind one CPE.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Subscriber {
    pub ip: Ipv4Addr,
    /// Index of the CPE the subscriber sits behind.
    pub cpe: u32,
    /// kbit/s; unlimited when unset.
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BngParams {
    #[serde(default)]
    cpe: Vec<Cpe>,
    #[serde(default)]
    users: Vec<Subscriber>,
    #[serde(default)]
    srvs: Vec<Server>,
    #[serde(default)]
    nhops: Vec<NextHop>,
}

#[derive(Debug, Deserialize)]
struct AddUserArgs {
    user: Subscriber,
}

#[derive(Debug, Deserialize)]
struct DelUserArgs {
    user_ip: Ipv4Addr,
}

/// The `bng` plugin.
///
/// Runtime actions: `add_user`, `del_user`, `add_server`, `del_server`.
#[derive(Debug)]
pub struct Bng {
    tables: TableRegistry,
    gw: Gateway,
    params: BngParams,
}

impl Bng {
    /// Reads CPEs, users, servers and next hops from `config`.
    ///
    /// # Returns
    ///
    /// `PipelineError::InvalidConfig` when `config` has no gateway
    /// address.
    pub fn new(config: &PipelineConfig) -> PipelineResult<Self> {
        Ok(Self {
            tables: TableRegistry::sequential([
                "ingress",
                "uplink_cpe",
                gateway::UPLINK_ROUTE,
                "downlink_user",
                "drop",
            ]),
            gw: gateway::require_gw(config)?,
            params: config.params()?,
        })
    }

    fn cpe(&self, user: &Subscriber) -> PipelineResult<&Cpe> {
        self.params.cpe.get(user.cpe as usize).ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "user {} refers to missing cpe {}",
                user.ip, user.cpe
            ))
        })
    }

    /// Meters are keyed by the subscriber address.
    fn meter_key(user: &Subscriber) -> u32 {
        u32::from(user.ip)
    }

    fn uplink_match(cpe: &Cpe, user: &Subscriber) -> Match {
        Match::new()
            .vlan_vid(cpe.vlan_id.ofp_vid())
            .ipv4_src(user.ip)
    }

    fn add_user(&self, ctx: &PipelineContext<'_>, user: &Subscriber) -> PipelineResult<()> {
        let cpe = self.cpe(user)?;
        let meter = gateway::install_user_meter(ctx, Self::meter_key(user), user.rate_limit)?;
        ctx.flows.install_flow(
            FlowSpec::new("uplink_cpe")
                .matching(Self::uplink_match(cpe, user))
                .action(Action::PopVlan)
                .goto(gateway::UPLINK_ROUTE)
                .instructions(meter),
        )?;
        ctx.flows.install_flow(
            FlowSpec::new("downlink_user")
                .matching(Match::new().ipv4_dst(user.ip))
                .actions([
                    Action::PushVlan(ETH_TYPE_8021Q),
                    Action::set_field(SetField::VlanVid(cpe.vlan_id.ofp_vid())),
                    Action::set_field(SetField::EthSrc(self.gw.mac)),
                    Action::set_field(SetField::EthDst(cpe.mac)),
                ])
                .output(ctx.uplink),
        )
    }

    fn del_user(&self, ctx: &PipelineContext<'_>, user: &Subscriber) -> PipelineResult<()> {
        let cpe = self.cpe(user)?;
        ctx.flows.install_flow(
            FlowSpec::new("uplink_cpe")
                .matching(Self::uplink_match(cpe, user))
                .delete(),
        )?;
        ctx.flows.install_flow(
            FlowSpec::new("downlink_user")
                .matching(Match::new().ipv4_dst(user.ip))
                .delete(),
        )?;
        gateway::remove_user_meter(ctx, Self::meter_key(user), user.rate_limit)
    }
}

impl PipelinePlugin for Bng {
    fn name(&self) -> &'static str {
        "bng"
    }

    fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    fn config_switch(&mut self, ctx: &PipelineContext<'_>) -> PipelineResult<()> {
        gateway::install_nhop_groups(ctx, &self.gw, &self.params.nhops)?;

        ctx.flows.install_flow(
            FlowSpec::new("ingress")
                .matching(Match::new().in_port(ctx.uplink))
                .goto("uplink_cpe"),
        )?;
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
            cpes = self.params.cpe.len(),
            users = self.params.users.len(),
            servers = self.params.srvs.len(),
            "bng flow program installed"
        );
        Ok(())
    }

    fn do_action(&mut self, ctx: &PipelineContext<'_>, cmd: &Command) -> PipelineResult<ActionStatus> {
        match cmd.action.as_str() {
            "add_user" => {
                let AddUserArgs { user } = cmd.args()?;
                self.add_user(ctx, &user)?;
                self.params.users.retain(|u| u.ip != user.ip);
                self.params.users.push(user);
            }
            "del_user" => {
                let DelUserArgs { user_ip } = cmd.args()?;
                let idx = self
                    .params
                    .users
                    .iter()
                    .position(|u| u.ip == user_ip)
                    .ok_or_else(|| PipelineError::not_found("user", user_ip))?;
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
                self.params.srvs.retain(|s| s.ip != server.ip);
                gateway::del_server(ctx, &server)?;
            }
            _ => return Ok(ActionStatus::Unsupported),
        }
        Ok(ActionStatus::Done)
    }
}
