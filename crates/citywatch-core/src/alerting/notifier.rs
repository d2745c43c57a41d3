//! Notification dispatch
//!
//! The engine only emits intents; delivery retries and provider-specific
//! formatting belong to the external dispatcher behind the webhook.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::NotificationConfig;
use crate::error::{Error, Result};
use crate::models::NotificationIntent;

/// Outbound notification channel
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Hand one intent to the dispatcher
    async fn dispatch(&self, intent: &NotificationIntent) -> Result<()>;
}

/// POSTs intents as JSON to the external dispatcher's webhook
pub struct WebhookDispatcher {
    client: Client,
    url: String,
}

impl WebhookDispatcher {
    /// Build a dispatcher from configuration; `None` when no webhook is set
    pub fn from_config(config: &NotificationConfig) -> Result<Option<Self>> {
        let Some(url) = config.webhook_url.clone() else {
            return Ok(None);
        };

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Notification(e.to_string()))?;

        Ok(Some(Self { client, url }))
    }

    /// Dispatcher for a fixed URL with a default timeout
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Notification(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookDispatcher {
    async fn dispatch(&self, intent: &NotificationIntent) -> Result<()> {
        debug!(
            sensor_id = %intent.sensor_id,
            metric = %intent.metric,
            "Dispatching notification intent"
        );

        let response = self
            .client
            .post(&self.url)
            .json(intent)
            .send()
            .await
            .map_err(|e| Error::Notification(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Notification(format!(
                "dispatcher returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Logs intents instead of delivering them; the default when no webhook is
/// configured.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn dispatch(&self, intent: &NotificationIntent) -> Result<()> {
        info!(
            sensor_id = %intent.sensor_id,
            metric = %intent.metric,
            severity = ?intent.severity,
            message = %intent.short_message,
            "Notification intent (no dispatcher configured)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn intent() -> NotificationIntent {
        NotificationIntent {
            sensor_id: "Loop-01".to_string(),
            metric: "vehicle_count".to_string(),
            severity: Severity::Critical,
            short_message: "TRAFFIC ALERT! Loop-01: vehicle_count=13.0".to_string(),
        }
    }

    #[tokio::test]
    async fn test_webhook_posts_intent_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .and(body_partial_json(serde_json::json!({
                "sensor_id": "Loop-01",
                "severity": "critical",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(format!("{}/notify", server.uri())).unwrap();
        dispatcher.dispatch(&intent()).await.unwrap();
    }

    #[tokio::test]
    async fn test_webhook_error_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(server.uri()).unwrap();
        let err = dispatcher.dispatch(&intent()).await.unwrap_err();
        assert!(matches!(err, Error::Notification(_)));
    }
}
