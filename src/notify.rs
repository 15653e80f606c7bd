//! Message sinks for job results.

use crate::data::{Notification, NotificationKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, kind: NotificationKind, title: &str, text: &str) -> Result<()>;
}

/// Deliver a notification, logging a warning if it fails.
///
/// Delivery problems never abort the cycle that produced the message.
pub async fn send_or_log(notifier: &dyn Notifier, notification: &Notification) {
    if let Err(e) = notifier
        .send(notification.kind, &notification.title, &notification.text)
        .await
    {
        tracing::warn!("Failed to send notification {:?}: {:#}", notification.title, e);
    }
}

/// Writes notifications to the log. Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, kind: NotificationKind, title: &str, text: &str) -> Result<()> {
        tracing::info!(?kind, "{}\n{}", title, text);
        Ok(())
    }
}

/// POSTs `{"kind", "title", "text"}` as JSON to a webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create webhook client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, kind: NotificationKind, title: &str, text: &str) -> Result<()> {
        let body = Notification::new(kind, title, text);
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("Webhook request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Webhook returned status {}", response.status());
        }
        Ok(())
    }
}

/// Pick the sink described by the configuration
pub fn from_config(config: &crate::config::NotificationConfig) -> Result<Box<dyn Notifier>> {
    match config.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(Box::new(WebhookNotifier::new(url)?)),
        _ => Ok(Box::new(LogNotifier)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _: NotificationKind, _: &str, _: &str) -> Result<()> {
            anyhow::bail!("sink offline")
        }
    }

    #[tokio::test]
    async fn test_send_or_log_swallows_failure() {
        let n = Notification::new(NotificationKind::Failure, "title", "text");
        // Should not panic, just log
        send_or_log(&FailingNotifier, &n).await;
    }

    #[tokio::test]
    async fn test_webhook_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(serde_json::json!({
                "kind": "site_message",
                "title": "Hello",
                "text": "line 1\nline 2"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.uri())).unwrap();
        notifier
            .send(NotificationKind::SiteMessage, "Hello", "line 1\nline 2")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_webhook_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri()).unwrap();
        let err = notifier
            .send(NotificationKind::Failure, "t", "x")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_blank_webhook_falls_back_to_log() {
        let config = crate::config::NotificationConfig {
            webhook_url: Some("  ".to_string()),
        };
        assert!(from_config(&config).is_ok());
    }
}
