//! Drain notifications.
//!
//! After a host has been drained, a message summarizing the action is posted
//! to a chat webhook (Slack-compatible attachment format).

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::NotifyError;

/// Display name used for webhook messages.
pub const USERNAME: &str = "Rancher Rebalancer";

/// Summary of one drained host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    /// `stack/service` reference.
    pub service_ref: String,
    pub hostname: String,
    pub scale: u32,
    pub host_count: usize,
    /// Replicas successfully deleted.
    pub rescheduled: usize,
    /// One `id | name` line per targeted replica.
    pub replicas: Vec<String>,
}

impl Notification {
    /// Render the webhook payload.
    pub fn to_payload(&self) -> WebhookPayload {
        let fields = vec![
            Field::short("Unbalanced Service", &self.service_ref),
            Field::short("Unbalanced Host", &self.hostname),
            Field::short("Service Scale", self.scale.to_string()),
            Field::short("Total Host Number", self.host_count.to_string()),
            Field::long(
                "Action Performed",
                format!(
                    "{} container(s) have been rescheduled to other host(s)",
                    self.rescheduled
                ),
            ),
            Field::long("Deleted Containers", self.replicas.join("\n")),
        ];

        WebhookPayload {
            channel: self.channel.clone(),
            username: USERNAME.to_string(),
            attachments: vec![Attachment {
                color: "good".to_string(),
                fields,
            }],
        }
    }
}

/// Webhook request body.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub channel: String,
    pub username: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    pub color: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Field {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl Field {
    fn short(title: &str, value: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            value: value.into(),
            short: true,
        }
    }

    fn long(title: &str, value: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            value: value.into(),
            short: false,
        }
    }
}

/// Outbound notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification, waiting for the receiver to accept it.
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Posts notifications to a chat webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = notification.to_payload();
        debug!(url = %self.url, channel = %payload.channel, "Sending notification");

        let response = self.client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(status = %status, body = %body, "Notification response");

        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Logs notifications instead of sending them (no webhook configured).
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            channel = %notification.channel,
            service = %notification.service_ref,
            host = %notification.hostname,
            rescheduled = notification.rescheduled,
            "No webhook configured, notification not sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification() -> Notification {
        Notification {
            channel: "#ops".to_string(),
            service_ref: "shop/web".to_string(),
            hostname: "node-1".to_string(),
            scale: 9,
            host_count: 3,
            rescheduled: 2,
            replicas: vec!["1i1 | shop-web-1".to_string(), "1i2 | shop-web-2".to_string()],
        }
    }

    #[test]
    fn test_payload_fields() {
        let payload = notification().to_payload();
        assert_eq!(payload.username, USERNAME);
        assert_eq!(payload.attachments.len(), 1);

        let fields = &payload.attachments[0].fields;
        let titles: Vec<_> = fields.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Unbalanced Service",
                "Unbalanced Host",
                "Service Scale",
                "Total Host Number",
                "Action Performed",
                "Deleted Containers",
            ]
        );
        assert_eq!(fields[2].value, "9");
        assert_eq!(fields[3].value, "3");
        assert!(fields[4].value.starts_with("2 container(s)"));
        assert_eq!(fields[5].value, "1i1 | shop-web-1\n1i2 | shop-web-2");
    }

    #[test]
    fn test_payload_serialization() {
        let json = serde_json::to_value(notification().to_payload()).unwrap();
        assert_eq!(json["channel"], "#ops");
        assert_eq!(json["attachments"][0]["color"], "good");
        assert_eq!(json["attachments"][0]["fields"][0]["short"], true);
        assert_eq!(json["attachments"][0]["fields"][5]["short"], false);
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.notify(&notification()).await.is_ok());
    }
}
