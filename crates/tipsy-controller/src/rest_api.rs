//! REST facade.
//!
//! `GET /tipsy/status` returns the status as a JSON string and
//! `GET /tipsy/exit` answers `"ok"` and then shuts the controller down.
//! Anything else gets a failure record.

use crate::service::ControlHandle;
use crate::status::OrchStatus;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;

/// Body returned for requests the facade cannot serve.
///
/// ```json
/// {"result": "failure", "details": "no such resource: /tipsy/bogus"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFailure {
    pub result: String,
    pub details: String,
}

impl ApiFailure {
    pub fn new(details: impl Into<String>) -> Self {
        Self {
            result: "failure".to_string(),
            details: details.into(),
        }
    }
}

/// Routes of the facade, bound to one running orchestrator.
pub fn router(handle: ControlHandle) -> Router {
    Router::new()
        .route("/tipsy/status", get(get_status))
        .route("/tipsy/exit", get(get_exit))
        .fallback(not_found)
        .with_state(handle)
}

async fn get_status(State(handle): State<ControlHandle>) -> Json<OrchStatus> {
    Json(handle.status())
}

async fn get_exit(State(handle): State<ControlHandle>) -> Json<&'static str> {
    info!("exit requested over REST");
    handle.request_exit();
    Json("ok")
}

async fn not_found(uri: Uri) -> (StatusCode, Json<ApiFailure>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiFailure::new(format!("no such resource: {}", uri.path()))),
    )
}

/// Serves the facade on `listener` until the handle's shutdown token fires.
pub async fn serve(listener: TcpListener, handle: ControlHandle) -> std::io::Result<()> {
    let shutdown = handle.shutdown_token();
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "REST API listening");
    }
    axum::serve(listener, router(handle))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
