//! The switch orchestrator.
//!
//! Owns everything the control loop mutates: the bound datapath, the port
//! table, the loaded pipeline plugin, core allocation and the benchmark
//! timer. Each handler runs to completion on the control task.
//!
//! Happy path:
//!
//! ```text
//! init -> wait -> start_lagopus -> initialize_datapath
//!      -> connected -> wait_for_PortDesc -> configure_1 -> configured
//! ```
//!
//! and on exit `stopping -> stopped` from any state.

use crate::cores::CoreAllocation;
use crate::error::{ControllerError, ControllerResult};
use crate::event::ControlEvent;
use crate::notify::Notifier;
use crate::process::DatapathProcess;
use crate::settings::ControllerSettings;
use crate::status::{OrchStatus, StatusChange};
use crate::timer::{BenchmarkTimer, Overrun};
use chrono::Local;
use std::sync::Arc;
use tipsy_openflow::{
    Datapath, DatapathEvent, DatapathId, ErrorMsg, OfpErrorType, OfpMessage, PortDesc, PortNo,
    SwitchDesc, SwitchFeatures,
};
use tipsy_pipeline::{
    dispatch, install_fakedrop_rules, load_pipeline, BenchmarkConfig, FlowBuilder,
    PipelineConfig, PipelineContext, PipelinePlugin, PortTable, TableRegistry,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// State machine for one switch and one benchmark run.
///
/// Not shared: the control loop owns it and feeds it events through
/// [`handle_event`](Orchestrator::handle_event). Other tasks observe it
/// through [`subscribe`](Orchestrator::subscribe).
///
/// # Example
///
/// ```ignore
/// let (tx, rx) = mpsc::unbounded_channel();
/// let mut orch = Orchestrator::new(pl_conf, bm_conf, settings, process, notifier, tx)?;
/// orch.initialize().await?;
/// let orch = run(orch, rx, shutdown).await?;
/// assert_eq!(orch.status(), OrchStatus::Stopped);
/// ```
#[derive(Debug)]
pub struct Orchestrator {
    pl_conf: PipelineConfig,
    bm_conf: BenchmarkConfig,
    settings: ControllerSettings,

    plugin: Box<dyn PipelinePlugin>,
    /// Copy of the plugin's registry, so flows can be built while the
    /// plugin itself is borrowed mutably.
    tables: TableRegistry,
    cores: CoreAllocation,

    process: Box<dyn DatapathProcess>,
    notifier: Arc<dyn Notifier>,
    timer: BenchmarkTimer,
    events: mpsc::UnboundedSender<ControlEvent>,

    status: OrchStatus,
    status_tx: watch::Sender<OrchStatus>,
    history: Vec<StatusChange>,

    datapath: Option<Arc<dyn Datapath>>,
    dp_id: Option<DatapathId>,
    ports: PortTable,
    uplink: Option<PortNo>,
    downlink: Option<PortNo>,

    configured: bool,
    port_desc_pending: bool,
    notified: bool,
    arp_scheduled: bool,
}

impl Orchestrator {
    /// Validates the configuration and loads the pipeline plugin named by
    /// `pl_conf`.
    ///
    /// # Arguments
    ///
    /// * `pl_conf` - pipeline configuration, including the runtime commands
    /// * `bm_conf` - ports and CPU resources of the switch under test
    /// * `settings` - controller settings
    /// * `process` - launches and stops the switch
    /// * `notifier` - told once when the switch is first configured
    /// * `events` - sender side of the control loop's queue, used by the
    ///   benchmark timer and the ARP refresh
    ///
    /// # Returns
    ///
    /// A fatal error for an unknown pipeline, a benchmark configuration
    /// without cores, or invalid settings.
    pub fn new(
        pl_conf: PipelineConfig,
        bm_conf: BenchmarkConfig,
        settings: ControllerSettings,
        process: Box<dyn DatapathProcess>,
        notifier: Arc<dyn Notifier>,
        events: mpsc::UnboundedSender<ControlEvent>,
    ) -> ControllerResult<Self> {
        bm_conf.validate()?;
        settings
            .validate()
            .map_err(|e| ControllerError::settings("<settings>", e))?;
        let plugin = load_pipeline(&pl_conf)?;
        let tables = plugin.tables().clone();
        let cores = CoreAllocation::new(bm_conf.sut.coremask);
        let timer = BenchmarkTimer::new(settings.timer_period());
        let (status_tx, _) = watch::channel(OrchStatus::Init);

        Ok(Self {
            pl_conf,
            bm_conf,
            settings,
            plugin,
            tables,
            cores,
            process,
            notifier,
            timer,
            events,
            status: OrchStatus::Init,
            status_tx,
            history: Vec::new(),
            datapath: None,
            dp_id: None,
            ports: PortTable::default(),
            uplink: None,
            downlink: None,
            configured: false,
            port_desc_pending: false,
            notified: false,
            arp_scheduled: false,
        })
    }

    pub fn status(&self) -> OrchStatus {
        self.status
    }

    /// Every transition so far, oldest first.
    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    /// Receiver that sees every status change.
    pub fn subscribe(&self) -> watch::Receiver<OrchStatus> {
        self.status_tx.subscribe()
    }

    pub fn pipeline_name(&self) -> &'static str {
        self.plugin.name()
    }

    pub fn datapath_id(&self) -> Option<DatapathId> {
        self.dp_id
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn ports(&self) -> &PortTable {
        &self.ports
    }

    pub fn timer(&self) -> &BenchmarkTimer {
        &self.timer
    }

    fn change_status(&mut self, new: OrchStatus) {
        let old = self.status;
        info!(%old, %new, "status");
        self.status = new;
        self.history.push(StatusChange {
            from: old,
            to: new,
            at: Local::now(),
        });
        self.status_tx.send_replace(new);
    }

    fn connected(&self) -> ControllerResult<Arc<dyn Datapath>> {
        self.datapath.clone().ok_or(ControllerError::NotConnected)
    }

    /// Pipeline core count; a single core is raised to two.
    pub fn pipeline_cores(&self) -> usize {
        let requested = self.bm_conf.pipeline.core;
        if requested == 1 {
            warn!("num_cores is increased to 2");
            2
        } else {
            requested as usize
        }
    }

    /// Next `n` dataplane cores from the core mask.
    pub fn get_cores(&mut self, n: usize) -> Vec<u32> {
        self.cores.get_cores(n)
    }

    /// Waits out the restart grace and launches the switch.
    pub async fn initialize(&mut self) -> ControllerResult<()> {
        self.change_status(OrchStatus::Wait);
        let grace = self.settings.restart_grace();
        if !grace.is_zero() {
            debug!(grace_ms = grace.as_millis() as u64, "waiting before switch start");
            tokio::time::sleep(grace).await;
        }

        self.change_status(OrchStatus::StartLagopus);
        let num_cores = self.pipeline_cores();
        let cores = self.get_cores(num_cores);
        info!(?cores, "dataplane cores");
        self.process.start(&cores).await?;

        self.change_status(OrchStatus::InitializeDatapath);
        Ok(())
    }

    /// Routes one control event to its handler. `Exit` is the loop's
    /// business and is ignored here.
    pub async fn handle_event(&mut self, event: ControlEvent) -> ControllerResult<()> {
        match event {
            ControlEvent::Datapath(ev) => self.handle_datapath_event(ev).await,
            ControlEvent::TimerFired => self.on_timer(),
            ControlEvent::TimerOverrun => {
                self.timer.disarm();
                Err(ControllerError::TimerOverrun)
            }
            ControlEvent::ArpRefresh => {
                self.refresh_arp().await;
                Ok(())
            }
            ControlEvent::Exit => Ok(()),
        }
    }

    async fn handle_datapath_event(&mut self, event: DatapathEvent) -> ControllerResult<()> {
        match event {
            DatapathEvent::SwitchFeatures(features) => {
                self.handle_switch_features(features).await
            }
            DatapathEvent::DescStatsReply(desc) => {
                self.handle_desc_stats_reply(&desc);
                Ok(())
            }
            DatapathEvent::PortDescStatsReply(ports) => self.handle_port_desc_reply(&ports).await,
            DatapathEvent::Error(msg) => {
                self.handle_error_msg(&msg);
                Ok(())
            }
            DatapathEvent::BarrierReply => {
                debug!("barrier reply");
                Ok(())
            }
            DatapathEvent::Disconnected => {
                self.handle_disconnect();
                Ok(())
            }
        }
    }

    /// Binds the switch on first contact. Another switch while one is bound
    /// is fatal and leaves the binding alone.
    pub async fn handle_switch_features(
        &mut self,
        features: SwitchFeatures,
    ) -> ControllerResult<()> {
        let id = features.datapath.id();
        if let Some(bound) = self.dp_id {
            if bound != id {
                error!(%bound, got = %id, "This controller can handle only one switch");
                return Err(ControllerError::SecondSwitch { bound, got: id });
            }
            info!("Switch has reconnected, reconfiguring");
        }

        self.configured = false;
        self.port_desc_pending = false;
        self.dp_id = Some(id);
        self.datapath = Some(features.datapath.clone());
        info!(datapath = %id, ofproto = features.version, "switch_features");
        self.change_status(OrchStatus::Connected);

        features.datapath.send_msg(OfpMessage::DescStatsRequest)?;

        self.configure()
    }

    /// Requests the port list; configuration continues when it arrives.
    pub fn configure(&mut self) -> ControllerResult<()> {
        if self.configured || self.port_desc_pending {
            debug!(
                configured = self.configured,
                pending = self.port_desc_pending,
                "configure: nothing to do"
            );
            return Ok(());
        }

        let dp = self.connected()?;
        dp.send_msg(OfpMessage::PortDescStatsRequest { port: PortNo::ANY })?;
        self.port_desc_pending = true;
        self.change_status(OrchStatus::WaitForPortDesc);
        Ok(())
    }

    /// Logs the switch description. No state changes.
    pub fn handle_desc_stats_reply(&self, desc: &SwitchDesc) {
        info!(
            mfr = %desc.mfr_desc,
            hw = %desc.hw_desc,
            sw = %desc.sw_desc,
            serial = %desc.serial_num,
            dp = %desc.dp_desc,
            "switch description"
        );
    }

    /// Replaces the port table with the reply's ports and, if the reply
    /// answers this controller's request, continues configuration.
    pub async fn handle_port_desc_reply(&mut self, descs: &[PortDesc]) -> ControllerResult<()> {
        self.ports = PortTable::from_descs(descs);
        for (name, port_no) in self.ports.iter() {
            debug!(port = name, %port_no, "port");
        }

        if !self.port_desc_pending {
            debug!("unsolicited port description, port table refreshed");
            return Ok(());
        }
        self.port_desc_pending = false;
        self.configure_1().await
    }

    /// Installs the drop rules and the pipeline's flow program.
    ///
    /// Order on the wire: drop rules, the plugin's flows, one barrier.
    /// The benchmark ports are resolved against the port table first.
    ///
    /// # Returns
    ///
    /// * `Err(PipelineError::UnknownPort)` - a benchmark port is neither a
    ///   switch port name nor a DPDK index; nothing is installed
    /// * `Err(ControllerError::NotConnected)` - the switch went away
    /// * any error from the plugin's `config_switch`; flows sent before the
    ///   failure stay installed
    pub async fn configure_1(&mut self) -> ControllerResult<()> {
        self.change_status(OrchStatus::Configure1);
        let dp = self.connected()?;

        let uplink = self.ports.resolve(&self.bm_conf.sut.uplink_port)?;
        let downlink = self.ports.resolve(&self.bm_conf.sut.downlink_port)?;
        self.uplink = Some(uplink);
        self.downlink = Some(downlink);
        info!(%uplink, %downlink, "ports resolved");

        let flows = FlowBuilder::new(dp.as_ref(), &self.tables);
        let n = install_fakedrop_rules(&flows, self.pl_conf.fakedrop, uplink, downlink)?;
        debug!(flows = n, "drop rules installed");

        let ctx = PipelineContext {
            flows,
            ports: &self.ports,
            uplink,
            downlink,
        };
        self.plugin.config_switch(&ctx)?;
        flows.barrier()?;

        self.handle_configured().await;
        Ok(())
    }

    /// Marks the switch configured and starts what depends on it.
    ///
    /// The notifier is told only after the first configuration of the
    /// run; a notification failure is logged and ignored. The benchmark
    /// timer is armed when the pipeline has runtime commands, and the
    /// periodic ARP refresh starts when a default gateway is configured.
    /// Neither is restarted after a reconnect.
    pub async fn handle_configured(&mut self) {
        self.configured = true;
        self.change_status(OrchStatus::Configured);

        if !self.notified {
            self.notified = true;
            if let Err(e) = self.notifier.configured().await {
                debug!(error = %e, "configured notification failed");
            }
        }

        if !self.pl_conf.run_time.is_empty() && !self.timer.is_armed() {
            info!(
                commands = self.pl_conf.run_time.len(),
                "starting benchmark timer"
            );
            self.timer.arm(self.events.clone());
        }

        if self.pl_conf.default_gw().is_some() && !self.arp_scheduled {
            self.arp_scheduled = true;
            self.refresh_arp().await;
        }
    }

    /// Forgets the connection but keeps the bound datapath id, so only the
    /// same switch may reconnect.
    pub fn handle_disconnect(&mut self) {
        warn!(datapath = ?self.dp_id, "switch disconnected");
        self.datapath = None;
        self.configured = false;
        self.port_desc_pending = false;
    }

    /// Logs an OpenFlow error message. Meter failures get a hint, since
    /// they usually mean the switch was built without meter support.
    pub fn handle_error_msg(&self, msg: &ErrorMsg) {
        if msg.kind() == OfpErrorType::MeterModFailed {
            error!(
                %msg,
                "METER_MOD failed, check that the switch has meter support enabled"
            );
        } else if msg.err_type != 0 && msg.code != 0 {
            error!(
                "OFPErrorMsg received: type=0x{:02x} code=0x{:02x} message={}",
                msg.err_type,
                msg.code,
                msg.data_hex()
            );
        } else {
            error!(?msg, "OFPErrorMsg received");
        }
    }

    /// Runs the runtime commands once, in configuration order.
    ///
    /// The firing holds the timer's permit from here until it returns, so
    /// only time spent executing counts towards an overrun. A failing
    /// command ends this firing and the permit is released either way.
    ///
    /// # Returns
    ///
    /// * `Err(ControllerError::TimerOverrun)` - another firing still runs
    /// * `Err(_)` - the first failing command's error, not fatal
    pub fn on_timer(&mut self) -> ControllerResult<()> {
        if !self.timer.is_armed() {
            debug!("tick from a disarmed timer ignored");
            return Ok(());
        }
        let permit = self
            .timer
            .try_begin()
            .map_err(|Overrun| ControllerError::TimerOverrun)?;
        info!(start = %permit.started(), "timer called");
        let dp = self.connected()?;
        let (uplink, downlink) = match (self.uplink, self.downlink) {
            (Some(ul), Some(dl)) => (ul, dl),
            _ => return Err(ControllerError::NotConnected),
        };

        let ctx = PipelineContext {
            flows: FlowBuilder::new(dp.as_ref(), &self.tables),
            ports: &self.ports,
            uplink,
            downlink,
        };
        for cmd in &self.pl_conf.run_time {
            dispatch(self.plugin.as_mut(), &ctx, cmd)?;
        }

        info!(end = %Local::now(), "timer done");
        drop(permit);
        Ok(())
    }

    /// Programs the gateway's ARP entry and schedules the next refresh.
    pub async fn refresh_arp(&mut self) {
        let Some(gw) = self.pl_conf.default_gw().copied() else {
            return;
        };
        match self
            .process
            .set_arp(&self.settings.bridge, gw.ip, gw.mac)
            .await
        {
            Ok(()) => debug!(bridge = %self.settings.bridge, "Update the ARP table"),
            Err(e) => warn!(bridge = %self.settings.bridge, error = %e, "ARP update failed"),
        }

        let events = self.events.clone();
        let delay = self.settings.arp_refresh();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if events.send(ControlEvent::ArpRefresh).is_err() {
                debug!("control loop gone, ARP refresh stopped");
            }
        });
    }

    /// Stops the timer and the switch. Best effort.
    ///
    /// Ends in `stopped` whether or not the switch process could be
    /// stopped; the failure is only logged.
    pub async fn stop(&mut self) {
        self.change_status(OrchStatus::Stopping);
        self.timer.disarm();
        if let Err(e) = self.process.stop().await {
            warn!(error = %e, "failed to stop the switch");
        }
        self.datapath = None;
        self.configured = false;
        self.change_status(OrchStatus::Stopped);
    }
}
