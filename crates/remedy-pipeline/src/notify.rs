// ABOUTME: Delivers prod-stage reports to the on-call recipient
// ABOUTME: Webhook delivery with base64 attachments, or a log line when no endpoint is configured
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use remedy_core::{NotifyConfig, RemedyError, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct AttachmentPayload {
    name: String,
    content_base64: String,
}

#[derive(Debug, Serialize)]
struct NotificationPayload<'a> {
    recipient: &'a str,
    subject: &'a str,
    body: &'a str,
    attachments: Vec<AttachmentPayload>,
}

pub struct WebhookNotifier {
    client: Client,
    endpoint: String,
    token: Option<SecretString>,
}

impl WebhookNotifier {
    pub fn new(
        endpoint: impl Into<String>,
        config: &NotifyConfig,
        token: Option<SecretString>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RemedyError::Notify(format!("building HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
        })
    }
}

async fn build_payload(notification: &Notification) -> Result<NotificationPayload<'_>> {
    let mut attachments = Vec::with_capacity(notification.attachments.len());
    for path in &notification.attachments {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            RemedyError::Notify(format!("reading attachment {}: {}", path.display(), e))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        attachments.push(AttachmentPayload {
            name,
            content_base64: STANDARD.encode(bytes),
        });
    }

    Ok(NotificationPayload {
        recipient: &notification.recipient,
        subject: &notification.subject,
        body: &notification.body,
        attachments,
    })
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let payload = build_payload(notification).await?;

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        request
            .send()
            .await
            .map_err(|e| RemedyError::Notify(format!("POST {}: {}", self.endpoint, e)))?
            .error_for_status()
            .map_err(|e| RemedyError::Notify(e.to_string()))?;

        info!(
            recipient = %notification.recipient,
            attachments = payload.attachments.len(),
            "notification delivered"
        );
        Ok(())
    }
}

/// Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        info!(
            recipient = %notification.recipient,
            subject = %notification.subject,
            attachments = ?notification.attachments,
            "no notification endpoint configured; report logged only"
        );
        debug!(body = %notification.body, "notification body");
        Ok(())
    }
}
