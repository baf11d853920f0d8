//! `tipsy` controller entry point.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tipsy_controller::{
    rest_api, run, ControlHandle, ControllerSettings, LagopusProcess, Orchestrator,
    WebhookNotifier,
};
use tipsy_pipeline::{load_benchmark_config, load_pipeline_config};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// TIPSY switch orchestrator for Lagopus
#[derive(Parser, Debug)]
#[command(name = "tipsy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Controller settings file (TOML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// JSON formatted configuration file of the pipeline
    #[arg(long)]
    pipeline_conf: Option<PathBuf>,

    /// Configuration of the whole benchmark (JSON)
    #[arg(long)]
    benchmark_conf: Option<PathBuf>,

    /// URL to request when the switch is configured
    #[arg(long)]
    webhook: Option<String>,

    /// REST API listen address
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    log_level: Option<String>,
}

impl Args {
    fn settings(&self) -> anyhow::Result<ControllerSettings> {
        let mut settings = match &self.config {
            Some(path) => ControllerSettings::load(path)?,
            None => ControllerSettings::default(),
        };
        if let Some(path) = &self.pipeline_conf {
            settings.pipeline_conf = path.clone();
        }
        if let Some(path) = &self.benchmark_conf {
            settings.benchmark_conf = path.clone();
        }
        if let Some(url) = &self.webhook {
            settings.webhook_configured = url.clone();
        }
        if let Some(listen) = &self.listen {
            settings.listen = listen.clone();
        }
        if let Some(level) = &self.log_level {
            settings.log_level = level.clone();
        }
        Ok(settings)
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn run_controller(settings: ControllerSettings) -> anyhow::Result<()> {
    let pl_conf = load_pipeline_config(&settings.pipeline_conf)?;
    let bm_conf = load_benchmark_config(&settings.benchmark_conf)?;
    info!(
        pipeline = %pl_conf.name,
        uplink = %bm_conf.sut.uplink_port,
        downlink = %bm_conf.sut.downlink_port,
        coremask = %bm_conf.sut.coremask,
        "configuration loaded"
    );

    let notifier = Arc::new(WebhookNotifier::new(settings.webhook_configured.clone())?);
    let process = Box::new(LagopusProcess::new(settings.lagopus.clone()));
    let listen = settings.listen.clone();

    let (tx, rx) = mpsc::unbounded_channel();
    let mut orch = Orchestrator::new(pl_conf, bm_conf, settings, process, notifier, tx.clone())?;
    let shutdown = CancellationToken::new();
    let handle = ControlHandle::new(tx, orch.subscribe(), shutdown.clone());

    let listener = TcpListener::bind(listen.as_str())
        .await
        .with_context(|| format!("failed to bind REST API to {}", listen))?;
    let rest = tokio::spawn(rest_api::serve(listener, handle.clone()));

    let sigint = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT, shutting down");
            sigint.cancel();
        }
    });

    if let Err(e) = orch.initialize().await {
        orch.stop().await;
        shutdown.cancel();
        return Err(e.into());
    }
    info!("waiting for the switch to connect");

    let result = run(orch, rx, shutdown.clone()).await;
    shutdown.cancel();
    match rest.await {
        Ok(Err(e)) => error!(error = %e, "REST API failed"),
        Err(e) => error!(error = %e, "REST API task panicked"),
        Ok(Ok(())) => {}
    }
    result.map(|_| ()).map_err(Into::into)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let settings = match args.settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("tipsy: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&settings.log_level);

    info!(
        pipeline_conf = %settings.pipeline_conf.display(),
        benchmark_conf = %settings.benchmark_conf.display(),
        "Starting TIPSY controller"
    );

    match run_controller(settings).await {
        Ok(()) => {
            info!("TIPSY controller stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Fatal: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
