//! The control loop and the handle other tasks use to reach it.

use crate::error::{ControllerError, ControllerResult};
use crate::event::ControlEvent;
use crate::orch::Orchestrator;
use crate::status::OrchStatus;
use tipsy_openflow::DatapathEvent;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Cloneable access to a running orchestrator: status snapshots, event
/// injection and shutdown.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    events: mpsc::UnboundedSender<ControlEvent>,
    status: watch::Receiver<OrchStatus>,
    shutdown: CancellationToken,
}

impl ControlHandle {
    pub fn new(
        events: mpsc::UnboundedSender<ControlEvent>,
        status: watch::Receiver<OrchStatus>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            events,
            status,
            shutdown,
        }
    }

    pub fn status(&self) -> OrchStatus {
        *self.status.borrow()
    }

    /// Sender for the protocol adapter.
    pub fn events(&self) -> mpsc::UnboundedSender<ControlEvent> {
        self.events.clone()
    }

    /// Forwards one switch event to the control loop.
    ///
    /// # Returns
    ///
    /// `Err(ControllerError::NotConnected)` once the loop has exited.
    pub fn datapath_event(&self, event: DatapathEvent) -> ControllerResult<()> {
        self.events
            .send(ControlEvent::Datapath(event))
            .map_err(|_| ControllerError::NotConnected)
    }

    /// Asks the loop to release the switch and return.
    pub fn request_exit(&self) {
        if self.events.send(ControlEvent::Exit).is_err() {
            self.shutdown.cancel();
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Resolves once the status equals `wanted`.
    pub async fn wait_for(&mut self, wanted: OrchStatus) -> bool {
        self.status.wait_for(|s| *s == wanted).await.is_ok()
    }
}

/// Runs the orchestrator until exit, cancellation or a fatal error. The
/// switch is stopped on every way out.
pub async fn run(
    mut orch: Orchestrator,
    mut events: mpsc::UnboundedReceiver<ControlEvent>,
    shutdown: CancellationToken,
) -> ControllerResult<Orchestrator> {
    info!(pipeline = orch.pipeline_name(), "control loop started");

    let result = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested");
                break Ok(());
            }
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("all event senders dropped");
                    break Ok(());
                };
                if matches!(event, ControlEvent::Exit) {
                    info!("exit requested");
                    break Ok(());
                }

                let kind = event.kind();
                if let Err(e) = orch.handle_event(event).await {
                    if e.is_fatal() {
                        error!(event = kind, error = %e, "fatal error");
                        break Err(e);
                    }
                    warn!(event = kind, error = %e, "event handling failed");
                }
            }
        }
    };

    orch.stop().await;
    result.map(|()| orch)
}
