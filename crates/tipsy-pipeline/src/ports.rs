//! Port name to OpenFlow port number mapping.

use crate::error::{PipelineError, PipelineResult};
use std::collections::BTreeMap;
use tipsy_openflow::{PortDesc, PortNo};

/// Ports reported by the switch in its port-description reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortTable {
    ports: BTreeMap<String, PortNo>,
}

impl PortTable {
    /// Indexes a port-description reply by port name. A later entry with
    /// the same name replaces an earlier one.
    pub fn from_descs(descs: &[PortDesc]) -> Self {
        Self {
            ports: descs
                .iter()
                .map(|d| (d.name.clone(), d.port_no))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<PortNo> {
        self.ports.get(name).copied()
    }

    /// Looks the name up, then falls back to reading it as a DPDK port
    /// index; Lagopus numbers OpenFlow ports from 1, so index `i` is port
    /// `i + 1`.
    ///
    /// # Example
    ///
    /// ```
    /// use tipsy_openflow::{PortDesc, PortNo};
    /// use tipsy_pipeline::PortTable;
    ///
    /// let ports = PortTable::from_descs(&[PortDesc::new(PortNo(7), "uplink")]);
    /// assert_eq!(ports.resolve("uplink").unwrap(), PortNo(7));
    /// assert_eq!(ports.resolve("0").unwrap(), PortNo(1));
    /// assert!(ports.resolve("eth9").is_err());
    /// ```
    pub fn resolve(&self, name: &str) -> PipelineResult<PortNo> {
        if let Some(port) = self.get(name) {
            return Ok(port);
        }
        name.trim()
            .parse::<u32>()
            .ok()
            .and_then(|idx| idx.checked_add(1))
            .map(PortNo)
            .ok_or_else(|| PipelineError::UnknownPort(name.to_string()))
    }

    /// Tunnel port towards endpoint `tun_end` (`tun-<tun_end>`).
    pub fn tun_port(&self, tun_end: impl std::fmt::Display) -> PipelineResult<PortNo> {
        let name = format!("tun-{}", tun_end);
        self.get(&name).ok_or(PipelineError::UnknownPort(name))
    }

    /// Ports sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, PortNo)> {
        self.ports.iter().map(|(n, p)| (n.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
