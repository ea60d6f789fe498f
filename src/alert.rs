//! The alert sink (spec §6): anything that can deliver a text alert,
//! with a default implementation shaped like the source system's WeCom
//! (WeChat work) group-webhook notifier.

use async_trait::async_trait;
use serde_json::json;

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, text: &str, mentions: &[String]) -> anyhow::Result<()>;
}

/// Posts a WeCom-shaped text message to a group webhook URL, matching
/// the original binlog monitor's notification shape.
pub struct WebhookAlertSink {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookAlertSink {
    pub fn new(webhook_url: String) -> Self {
        Self { client: reqwest::Client::new(), webhook_url }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send_alert(&self, text: &str, mentions: &[String]) -> anyhow::Result<()> {
        let payload = json!({
            "msgtype": "text",
            "text": {
                "content": text,
                "mentioned_mobile_list": mentions,
            },
        });
        self.client.post(&self.webhook_url).json(&payload).send().await?.error_for_status()?;
        Ok(())
    }
}

/// A sink that only logs; used when no webhook URL is configured.
pub struct LoggingAlertSink;

#[async_trait]
impl AlertSink for LoggingAlertSink {
    async fn send_alert(&self, text: &str, _mentions: &[String]) -> anyhow::Result<()> {
        tracing::warn!(alert = text, "alert sink not configured, logging only");
        Ok(())
    }
}
