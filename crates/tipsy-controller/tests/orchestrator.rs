//! Drives the orchestrator through its lifecycle against an in-memory
//! datapath, a recording switch process and a counting notifier.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tipsy_controller::{
    run, ControlEvent, ControlHandle, ControllerError, ControllerResult, ControllerSettings,
    DatapathProcess, Notifier, OrchStatus, Orchestrator,
};
use tipsy_openflow::{
    DatapathEvent, DatapathId, ErrorMsg, MemoryDatapath, PortDesc, PortNo, SwitchFeatures,
    TableId, OFP_VERSION,
};
use tipsy_pipeline::{from_json_str, BenchmarkConfig, PipelineConfig};
use tipsy_types::MacAddress;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
struct RecordingProcess {
    calls: Arc<Mutex<Vec<String>>>,
    /// How long `set_arp` takes, like a slow lagosh.
    arp_delay: Duration,
}

impl RecordingProcess {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DatapathProcess for RecordingProcess {
    async fn start(&mut self, cores: &[u32]) -> ControllerResult<()> {
        let cores: Vec<String> = cores.iter().map(|c| c.to_string()).collect();
        self.record(format!("start {}", cores.join(",")));
        Ok(())
    }

    async fn stop(&mut self) -> ControllerResult<()> {
        self.record("stop".to_string());
        Ok(())
    }

    async fn set_arp(
        &mut self,
        bridge: &str,
        ip: Ipv4Addr,
        mac: MacAddress,
    ) -> ControllerResult<()> {
        if !self.arp_delay.is_zero() {
            tokio::time::sleep(self.arp_delay).await;
        }
        self.record(format!("arp {} {} {}", bridge, ip, mac));
        Ok(())
    }
}

/// Counts notifications and fails every one of them, like an absent
/// benchmark driver.
#[derive(Debug, Default)]
struct CountingNotifier {
    calls: AtomicUsize,
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn configured(&self) -> ControllerResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ControllerError::notify("http://localhost:8888/configured", "refused"))
    }
}

struct Harness {
    orch: Orchestrator,
    events: mpsc::UnboundedReceiver<ControlEvent>,
    tx: mpsc::UnboundedSender<ControlEvent>,
    process: RecordingProcess,
    notifier: Arc<CountingNotifier>,
}

const L2FWD: &str = r#"{
    "name": "l2fwd",
    "run-time": [
        {"action": "add_l2_entry",
         "args": {"table": "upstream", "entry": {"mac": "aa:aa:aa:aa:aa:02"}}},
        {"action": "no-such-action"}
    ]
}"#;

const BENCHMARK: &str = r#"{
    "sut": {"uplink-port": "0", "downlink-port": 1, "coremask": "0xF"},
    "pipeline": {"core": 1}
}"#;

fn settings() -> ControllerSettings {
    ControllerSettings {
        restart_grace_ms: 0,
        // Firings are driven by hand.
        timer_period_ms: 3_600_000,
        ..Default::default()
    }
}

fn harness(pipeline: &str) -> Harness {
    harness_with(pipeline, settings(), RecordingProcess::default())
}

fn harness_with(
    pipeline: &str,
    settings: ControllerSettings,
    process: RecordingProcess,
) -> Harness {
    let pl_conf: PipelineConfig = from_json_str(pipeline).unwrap();
    let bm_conf: BenchmarkConfig = from_json_str(BENCHMARK).unwrap();
    let notifier = Arc::new(CountingNotifier::default());
    let (tx, events) = mpsc::unbounded_channel();
    let orch = Orchestrator::new(
        pl_conf,
        bm_conf,
        settings,
        Box::new(process.clone()),
        notifier.clone(),
        tx.clone(),
    )
    .unwrap();
    Harness {
        orch,
        events,
        tx,
        process,
        notifier,
    }
}

fn features(dp: &Arc<MemoryDatapath>) -> ControlEvent {
    ControlEvent::Datapath(DatapathEvent::SwitchFeatures(SwitchFeatures {
        datapath: dp.clone(),
        version: OFP_VERSION,
        n_buffers: 0,
        n_tables: 254,
    }))
}

fn port_desc() -> ControlEvent {
    ControlEvent::Datapath(DatapathEvent::PortDescStatsReply(vec![
        PortDesc::new(PortNo(1), "p0"),
        PortDesc::new(PortNo(2), "p1"),
    ]))
}

async fn configure(h: &mut Harness, dp: &Arc<MemoryDatapath>) {
    h.orch.initialize().await.unwrap();
    h.orch.handle_event(features(dp)).await.unwrap();
    h.orch.handle_event(port_desc()).await.unwrap();
    assert_eq!(h.orch.status(), OrchStatus::Configured);
}

#[tokio::test]
async fn test_happy_path_transitions() {
    let mut h = harness(L2FWD);
    let dp = Arc::new(MemoryDatapath::new(DatapathId(0x11)));

    h.orch.initialize().await.unwrap();
    assert_eq!(h.orch.status(), OrchStatus::InitializeDatapath);
    // A single requested core is raised to two.
    assert_eq!(h.process.calls(), vec!["start 0,1"]);

    h.orch.handle_event(features(&dp)).await.unwrap();
    assert_eq!(h.orch.status(), OrchStatus::WaitForPortDesc);
    assert_eq!(dp.count("desc_stats_request"), 1);
    assert_eq!(dp.count("port_desc_stats_request"), 1);

    h.orch.handle_event(port_desc()).await.unwrap();
    assert!(h.orch.is_configured());
    assert_eq!(h.orch.ports().len(), 2);

    let path: Vec<OrchStatus> = h.orch.history().iter().map(|c| c.to).collect();
    assert_eq!(
        path,
        vec![
            OrchStatus::Wait,
            OrchStatus::StartLagopus,
            OrchStatus::InitializeDatapath,
            OrchStatus::Connected,
            OrchStatus::WaitForPortDesc,
            OrchStatus::Configure1,
            OrchStatus::Configured,
        ]
    );
    assert_eq!(h.orch.history()[0].from, OrchStatus::Init);

    // Four drop rules for l2fwd's tables plus its two selector flows.
    assert_eq!(dp.count("flow_mod"), 6);
    assert_eq!(dp.count("barrier_request"), 1);
    assert_eq!(h.notifier.calls.load(Ordering::SeqCst), 1);
    assert!(h.orch.timer().is_armed());
}

#[tokio::test]
async fn test_configure_is_idempotent() {
    let mut h = harness(L2FWD);
    let dp = Arc::new(MemoryDatapath::new(DatapathId(0x11)));

    h.orch.initialize().await.unwrap();
    h.orch.handle_event(features(&dp)).await.unwrap();
    // Request outstanding.
    h.orch.configure().unwrap();
    h.orch.handle_event(port_desc()).await.unwrap();
    // Already configured.
    h.orch.configure().unwrap();

    assert_eq!(dp.count("port_desc_stats_request"), 1);
    assert_eq!(dp.count("flow_mod"), 6);

    // A late duplicate reply only refreshes the port table.
    h.orch.handle_event(port_desc()).await.unwrap();
    assert_eq!(dp.count("flow_mod"), 6);
    assert_eq!(h.orch.status(), OrchStatus::Configured);
}

#[tokio::test]
async fn test_second_switch_is_fatal() {
    let mut h = harness(L2FWD);
    let dp = Arc::new(MemoryDatapath::new(DatapathId(0x11)));
    configure(&mut h, &dp).await;

    let other = Arc::new(MemoryDatapath::new(DatapathId(0x22)));
    let err = h.orch.handle_event(features(&other)).await.unwrap_err();
    assert!(matches!(err, ControllerError::SecondSwitch { .. }));
    assert!(err.is_fatal());
    assert_eq!(h.orch.datapath_id(), Some(DatapathId(0x11)));
    assert_eq!(h.orch.status(), OrchStatus::Configured);
    assert!(other.messages().is_empty());
}

#[tokio::test]
async fn test_reconnect_reconfigures_without_notifying_again() {
    let mut h = harness(L2FWD);
    let dp = Arc::new(MemoryDatapath::new(DatapathId(0x11)));
    configure(&mut h, &dp).await;

    h.orch
        .handle_event(ControlEvent::Datapath(DatapathEvent::Disconnected))
        .await
        .unwrap();
    assert!(!h.orch.is_configured());
    assert_eq!(h.orch.datapath_id(), Some(DatapathId(0x11)));

    h.orch.handle_event(features(&dp)).await.unwrap();
    assert_eq!(h.orch.status(), OrchStatus::WaitForPortDesc);
    h.orch.handle_event(port_desc()).await.unwrap();

    assert_eq!(h.orch.status(), OrchStatus::Configured);
    assert_eq!(dp.count("port_desc_stats_request"), 2);
    assert_eq!(h.notifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timer_firing_dispatches_in_order() {
    let mut h = harness(L2FWD);
    let dp = Arc::new(MemoryDatapath::new(DatapathId(0x11)));
    configure(&mut h, &dp).await;
    dp.take();

    h.orch.handle_event(ControlEvent::TimerFired).await.unwrap();

    // add_l2_entry installs one flow, the unknown action falls through.
    let fms = dp.flow_mods();
    assert_eq!(fms.len(), 1);
    assert_eq!(fms[0].table_id, TableId(1));
    assert_eq!(
        fms[0].matches.eth_dst,
        Some("aa:aa:aa:aa:aa:02".parse().unwrap())
    );
    assert_eq!(fms[0].output_ports(), vec![PortNo(2)]);
    assert!(!h.orch.timer().is_busy());
    assert!(h.orch.timer().is_armed());
}

#[tokio::test]
async fn test_failing_command_aborts_only_that_firing() {
    let mut h = harness(
        r#"{
            "name": "l2fwd",
            "run-time": [
                {"action": "del_l2_entry",
                 "args": {"table": "downstream", "entry": {"mac": "cc:cc:cc:cc:cc:01"}}},
                {"action": "add_l2_entry",
                 "args": {"table": "upstream", "entry": {"mac": "aa:aa:aa:aa:aa:02"}}}
            ]
        }"#,
    );
    let dp = Arc::new(MemoryDatapath::new(DatapathId(0x11)));
    configure(&mut h, &dp).await;
    dp.take();

    let err = h
        .orch
        .handle_event(ControlEvent::TimerFired)
        .await
        .unwrap_err();
    assert!(!err.is_fatal());
    assert_eq!(dp.count("flow_mod"), 0);
    assert!(!h.orch.timer().is_busy());
    assert!(h.orch.timer().is_armed());
}

#[tokio::test]
async fn test_overlapping_firing_disarms() {
    let mut h = harness(L2FWD);
    let dp = Arc::new(MemoryDatapath::new(DatapathId(0x11)));
    configure(&mut h, &dp).await;

    let running = h.orch.timer().try_begin().unwrap();
    let err = h
        .orch
        .handle_event(ControlEvent::TimerFired)
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::TimerOverrun));
    assert!(!h.orch.timer().is_armed());
    drop(running);

    let err = h
        .orch
        .handle_event(ControlEvent::TimerOverrun)
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::TimerOverrun));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_tick_queued_behind_slow_arp_update_is_not_an_overrun() {
    let gateway = r#"{
        "name": "portfwd",
        "gw": {
            "ip": "10.0.0.1",
            "mac": "02:00:00:00:00:01",
            "default-gw": {"ip": "10.0.0.254", "mac": "02:00:00:00:00:fe"}
        },
        "run-time": [{"action": "no-such-action"}]
    }"#;
    let settings = ControllerSettings {
        timer_period_ms: 50,
        ..settings()
    };
    let process = RecordingProcess {
        arp_delay: Duration::from_millis(150),
        ..Default::default()
    };
    let mut h = harness_with(gateway, settings, process);
    h.orch.initialize().await.unwrap();

    let shutdown = CancellationToken::new();
    let mut handle = ControlHandle::new(h.tx.clone(), h.orch.subscribe(), shutdown.clone());
    let looped = tokio::spawn(run(h.orch, h.events, shutdown));

    let dp = Arc::new(MemoryDatapath::new(DatapathId(0x11)));
    h.tx.send(features(&dp)).unwrap();
    h.tx.send(port_desc()).unwrap();
    assert!(handle.wait_for(OrchStatus::Configured).await);

    // Several periods pass while the control task waits on the ARP update
    // and then runs the queued firings.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(handle.status(), OrchStatus::Configured);

    handle.request_exit();
    let orch = looped.await.unwrap().unwrap();
    assert_eq!(orch.status(), OrchStatus::Stopped);
    assert_eq!(
        h.process.calls(),
        vec!["start 0,1", "arp br-phy 10.0.0.254 02:00:00:00:00:fe", "stop"]
    );
}

#[tokio::test]
async fn test_benchmark_without_cores_is_fatal() {
    let pl_conf: PipelineConfig = from_json_str(r#"{"name": "portfwd"}"#).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let bm_conf: BenchmarkConfig = from_json_str(
        r#"{"sut": {"uplink-port": "0", "downlink-port": 1, "coremask": "0xF"},
            "pipeline": {"core": 0}}"#,
    )
    .unwrap();
    let err = Orchestrator::new(
        pl_conf,
        bm_conf,
        settings(),
        Box::new(RecordingProcess::default()),
        Arc::new(CountingNotifier::default()),
        tx,
    )
    .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_zero_timer_period_is_fatal() {
    let pl_conf: PipelineConfig = from_json_str(L2FWD).unwrap();
    let bm_conf: BenchmarkConfig = from_json_str(BENCHMARK).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let err = Orchestrator::new(
        pl_conf,
        bm_conf,
        ControllerSettings {
            timer_period_ms: 0,
            ..settings()
        },
        Box::new(RecordingProcess::default()),
        Arc::new(CountingNotifier::default()),
        tx,
    )
    .unwrap_err();
    assert!(matches!(err, ControllerError::Settings { .. }));
}

#[tokio::test]
async fn test_no_runtime_commands_leaves_timer_disarmed() {
    let mut h = harness(r#"{"name": "portfwd"}"#);
    let dp = Arc::new(MemoryDatapath::new(DatapathId(0x11)));
    configure(&mut h, &dp).await;
    assert!(!h.orch.timer().is_armed());
}

#[tokio::test]
async fn test_fakedrop_cross_connects() {
    let mut h = harness(r#"{"name": "l2fwd", "fakedrop": true}"#);
    let dp = Arc::new(MemoryDatapath::new(DatapathId(0x11)));
    configure(&mut h, &dp).await;

    let drop_rules: Vec<_> = dp
        .flow_mods()
        .into_iter()
        .filter(|fm| fm.table_id == TableId(3))
        .collect();
    assert_eq!(drop_rules.len(), 2);
    assert_eq!(drop_rules[0].matches.in_port, Some(PortNo(1)));
    assert_eq!(drop_rules[0].output_ports(), vec![PortNo(2)]);
    assert_eq!(drop_rules[1].matches.in_port, Some(PortNo(2)));
    assert_eq!(drop_rules[1].output_ports(), vec![PortNo(1)]);
    assert!(dp
        .flow_mods()
        .iter()
        .all(|fm| fm.goto_table() != Some(TableId(3))));
}

#[tokio::test]
async fn test_default_gateway_programs_arp() {
    let mut h = harness(
        r#"{
            "name": "portfwd",
            "gw": {
                "ip": "10.0.0.1",
                "mac": "02:00:00:00:00:01",
                "default-gw": {"ip": "10.0.0.254", "mac": "02:00:00:00:00:fe"}
            }
        }"#,
    );
    let dp = Arc::new(MemoryDatapath::new(DatapathId(0x11)));
    configure(&mut h, &dp).await;

    assert_eq!(
        h.process.calls(),
        vec!["start 0,1", "arp br-phy 10.0.0.254 02:00:00:00:00:fe"]
    );
}

#[tokio::test]
async fn test_error_message_keeps_state() {
    let mut h = harness(L2FWD);
    let dp = Arc::new(MemoryDatapath::new(DatapathId(0x11)));
    configure(&mut h, &dp).await;

    for msg in [
        ErrorMsg::new(12, 1, vec![]),
        ErrorMsg::new(5, 1, vec![0x04, 0x0e]),
        ErrorMsg::new(0, 0, vec![]),
    ] {
        h.orch
            .handle_event(ControlEvent::Datapath(DatapathEvent::Error(msg)))
            .await
            .unwrap();
    }
    assert_eq!(h.orch.status(), OrchStatus::Configured);
}

#[tokio::test]
async fn test_unknown_pipeline_is_fatal() {
    let pl_conf: PipelineConfig = from_json_str(r#"{"name": "nosuch"}"#).unwrap();
    let bm_conf: BenchmarkConfig = from_json_str(BENCHMARK).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let err = Orchestrator::new(
        pl_conf,
        bm_conf,
        settings(),
        Box::new(RecordingProcess::default()),
        Arc::new(CountingNotifier::default()),
        tx,
    )
    .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_control_loop_exit() {
    let mut h = harness(L2FWD);
    h.orch.initialize().await.unwrap();

    let shutdown = CancellationToken::new();
    let mut handle = ControlHandle::new(h.tx.clone(), h.orch.subscribe(), shutdown.clone());
    let looped = tokio::spawn(run(h.orch, h.events, shutdown));

    let dp = Arc::new(MemoryDatapath::new(DatapathId(0x11)));
    h.tx.send(features(&dp)).unwrap();
    h.tx.send(port_desc()).unwrap();
    assert!(handle.wait_for(OrchStatus::Configured).await);
    assert_eq!(handle.status(), OrchStatus::Configured);

    handle.request_exit();
    let orch = looped.await.unwrap().unwrap();
    assert_eq!(orch.status(), OrchStatus::Stopped);
    assert_eq!(handle.status(), OrchStatus::Stopped);
    assert_eq!(h.process.calls(), vec!["start 0,1", "stop"]);
}

#[tokio::test]
async fn test_control_loop_stops_on_fatal_error() {
    let mut h = harness(L2FWD);
    h.orch.initialize().await.unwrap();

    let shutdown = CancellationToken::new();
    let looped = tokio::spawn(run(h.orch, h.events, shutdown));

    let first = Arc::new(MemoryDatapath::new(DatapathId(0x11)));
    let second = Arc::new(MemoryDatapath::new(DatapathId(0x22)));
    h.tx.send(features(&first)).unwrap();
    h.tx.send(features(&second)).unwrap();

    let err = looped.await.unwrap().unwrap_err();
    assert!(matches!(err, ControllerError::SecondSwitch { .. }));
    assert_eq!(h.process.calls(), vec!["start 0,1", "stop"]);
}

#[tokio::test]
async fn test_control_loop_cancellation() {
    let h = harness(L2FWD);
    let shutdown = CancellationToken::new();
    let looped = tokio::spawn(run(h.orch, h.events, shutdown.clone()));

    shutdown.cancel();
    let orch = looped.await.unwrap().unwrap();
    assert_eq!(orch.status(), OrchStatus::Stopped);
}
