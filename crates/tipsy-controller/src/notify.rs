//! Outbound "configured" notification.

use crate::error::{ControllerError, ControllerResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Receiver of lifecycle notifications. Failures are logged by the
/// caller and never affect the switch.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Tells the benchmark driver that the switch is configured.
    async fn configured(&self) -> ControllerResult<()>;
}

/// Sends a single GET to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// Builds the HTTP client. Nothing is sent until
    /// [`configured`](Notifier::configured) is called.
    pub fn new(url: impl Into<String>) -> ControllerResult<Self> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .map_err(|e| ControllerError::notify(&url, e))?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn configured(&self) -> ControllerResult<()> {
        debug!(url = %self.url, "sending configured notification");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ControllerError::notify(&self.url, e))?;
        info!(url = %self.url, status = %response.status(), "configured notification sent");
        Ok(())
    }
}
