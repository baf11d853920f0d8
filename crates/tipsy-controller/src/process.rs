//! Switch process lifecycle.
//!
//! The orchestrator launches the switch after allocating its dataplane
//! cores, and stops it on exit. Both go through [`DatapathProcess`] so the
//! state machine can run against a recording double in tests.

use crate::error::{ControllerError, ControllerResult};
use crate::settings::LagopusSettings;
use crate::shell::{self, shellquote, ECHO_CMD};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;
use tipsy_types::MacAddress;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// How long to wait for the switch to exit after `stop` before killing it.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// The switch as an operating system process.
///
/// Implementations must tolerate `stop` without a prior `start`, since the
/// control loop stops the switch on every way out.
#[async_trait]
pub trait DatapathProcess: Send + std::fmt::Debug {
    /// Launches the switch pinned to `cores`.
    async fn start(&mut self, cores: &[u32]) -> ControllerResult<()>;

    /// Stops the switch. Best effort; safe to call when not running.
    async fn stop(&mut self) -> ControllerResult<()>;

    /// Adds a static ARP entry to `bridge`.
    ///
    /// # Arguments
    ///
    /// * `bridge` - switch bridge name, e.g. `br-phy`
    /// * `ip` - neighbor address
    /// * `mac` - neighbor hardware address
    async fn set_arp(&mut self, bridge: &str, ip: Ipv4Addr, mac: MacAddress)
        -> ControllerResult<()>;
}

/// A Lagopus switch managed through its command line and `lagosh`.
#[derive(Debug)]
pub struct LagopusProcess {
    settings: LagopusSettings,
    child: Option<Child>,
}

impl LagopusProcess {
    pub fn new(settings: LagopusSettings) -> Self {
        Self {
            settings,
            child: None,
        }
    }

    /// `-C <dsl> -d -- -l<cores> -n<channels> -- -p<portmask>`
    pub fn command_args(&self, cores: &[u32]) -> Vec<String> {
        let corelist = cores
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");
        vec![
            "-C".to_string(),
            self.settings.dsl.display().to_string(),
            "-d".to_string(),
            "--".to_string(),
            format!("-l{}", corelist),
            format!("-n{}", self.settings.memory_channels),
            "--".to_string(),
            format!("-p{}", self.settings.portmask),
        ]
    }

    fn lagosh_cmd(&self, line: &str) -> String {
        format!(
            "{} {} | {}",
            ECHO_CMD,
            shellquote(line),
            shellquote(&self.settings.lagosh)
        )
    }

    /// Shell pipeline asking `lagosh` to stop the switch.
    pub fn stop_command(&self) -> String {
        self.lagosh_cmd("stop")
    }

    /// Shell pipeline adding one ARP entry through `lagosh`.
    ///
    /// # Example
    ///
    /// ```
    /// use tipsy_controller::{LagopusProcess, LagopusSettings};
    ///
    /// let process = LagopusProcess::new(LagopusSettings::default());
    /// let cmd = process.arp_command(
    ///     "br-phy",
    ///     "10.0.0.254".parse().unwrap(),
    ///     "02:00:00:00:00:fe".parse().unwrap(),
    /// );
    /// assert!(cmd.contains("arp br-phy add 10.0.0.254 02:00:00:00:00:fe"));
    /// ```
    pub fn arp_command(&self, bridge: &str, ip: Ipv4Addr, mac: MacAddress) -> String {
        self.lagosh_cmd(&format!("arp {} add {} {}", bridge, ip, mac))
    }
}

#[async_trait]
impl DatapathProcess for LagopusProcess {
    async fn start(&mut self, cores: &[u32]) -> ControllerResult<()> {
        let args = self.command_args(cores);
        info!(binary = %self.settings.binary, ?args, "starting lagopus");

        let mut cmd = Command::new(&self.settings.binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = &self.settings.workdir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| ControllerError::Spawn {
            program: self.settings.binary.clone(),
            source: e,
        })?;
        debug!(pid = ?child.id(), "lagopus spawned");
        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> ControllerResult<()> {
        let result = shell::exec_checked(&self.stop_command()).await;
        if let Err(e) = &result {
            warn!(error = %e, "lagosh stop failed");
        }

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(STOP_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => info!(%status, "lagopus exited"),
                Ok(Err(e)) => warn!(error = %e, "waiting for lagopus failed"),
                Err(_) => {
                    warn!("lagopus did not exit, killing it");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to kill lagopus");
                    }
                }
            }
        }

        result.map(|_| ())
    }

    async fn set_arp(
        &mut self,
        bridge: &str,
        ip: Ipv4Addr,
        mac: MacAddress,
    ) -> ControllerResult<()> {
        shell::exec_checked(&self.arp_command(bridge, ip, mac)).await?;
        debug!(bridge, %ip, %mac, "ARP table updated");
        Ok(())
    }
}
