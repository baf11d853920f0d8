//! Pieces shared by the gateway pipelines: next-hop groups, server routes
//! and per-user rate-limit meters.

use crate::config::{Gateway, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::flow::FlowSpec;
use crate::plugin::PipelineContext;
use serde::Deserialize;
use std::net::Ipv4Addr;
use tipsy_openflow::{Action, GroupId, GroupType, Instruction, Match, MeterId, PortNo, SetField};
use tipsy_types::MacAddress;

pub(crate) const UPLINK_ROUTE: &str = "uplink_route";

/// A router behind the downlink port.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NextHop {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
    #[serde(default)]
    pub port: Option<u32>,
}

/// A server reachable through one of the next hops.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Server {
    pub ip: Ipv4Addr,
    pub nhop: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServerArgs {
    pub server: Server,
}

pub(crate) fn require_gw(config: &PipelineConfig) -> PipelineResult<Gateway> {
    config
        .gw
        .clone()
        .ok_or_else(|| PipelineError::InvalidConfig(format!("{}: missing gw", config.name)))
}

pub(crate) fn nhop_group(idx: u32) -> GroupId {
    GroupId(idx)
}

/// Meter ids start at 1, so the TEID or user id is shifted by one.
pub(crate) fn user_meter(id: u32) -> PipelineResult<MeterId> {
    id.checked_add(1)
        .map(MeterId)
        .ok_or_else(|| PipelineError::InvalidConfig(format!("no meter id for user {}", id)))
}

/// Groups rewriting L2 addresses towards each next hop.
pub(crate) fn install_nhop_groups(
    ctx: &PipelineContext<'_>,
    gw: &Gateway,
    nhops: &[NextHop],
) -> PipelineResult<()> {
    for (idx, nhop) in nhops.iter().enumerate() {
        let out = nhop.port.map(PortNo).unwrap_or(ctx.downlink);
        ctx.flows.install_group(
            nhop_group(idx as u32),
            vec![
                Action::set_field(SetField::EthSrc(gw.mac)),
                Action::set_field(SetField::EthDst(nhop.mac)),
                Action::output(out),
            ],
            GroupType::Indirect,
        )?;
    }
    Ok(())
}

pub(crate) fn server_flow(server: &Server) -> FlowSpec {
    FlowSpec::new(UPLINK_ROUTE).matching(Match::new().ipv4_dst(server.ip))
}

pub(crate) fn add_server(
    ctx: &PipelineContext<'_>,
    nhops: &[NextHop],
    server: &Server,
) -> PipelineResult<()> {
    if server.nhop as usize >= nhops.len() {
        return Err(PipelineError::InvalidConfig(format!(
            "server {} refers to missing next hop {}",
            server.ip, server.nhop
        )));
    }
    ctx.flows.install_flow(
        server_flow(server)
            .action(Action::DecNwTtl)
            .action(Action::Group(nhop_group(server.nhop))),
    )
}

pub(crate) fn del_server(ctx: &PipelineContext<'_>, server: &Server) -> PipelineResult<()> {
    ctx.flows.install_flow(server_flow(server).delete())
}

/// Meter instruction for a rate-limited user, installing the meter first.
pub(crate) fn install_user_meter(
    ctx: &PipelineContext<'_>,
    id: u32,
    rate_limit: Option<u32>,
) -> PipelineResult<Option<Instruction>> {
    match rate_limit {
        Some(rate) => {
            let meter = user_meter(id)?;
            ctx.flows.install_meter(meter, rate)?;
            Ok(Some(Instruction::Meter(meter)))
        }
        None => Ok(None),
    }
}

pub(crate) fn remove_user_meter(
    ctx: &PipelineContext<'_>,
    id: u32,
    rate_limit: Option<u32>,
) -> PipelineResult<()> {
    if rate_limit.is_some() {
        ctx.flows.remove_meter(user_meter(id)?)?;
    }
    Ok(())
}
