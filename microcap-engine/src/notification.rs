//! Push notification delivery.
//!
//! Alerts are delivered to devices through an HTTP push gateway that
//! forwards APNs-shaped payloads. When push is disabled or no gateway is
//! configured, deliveries are logged and reported as successful.

use async_trait::async_trait;
use microcap_common::config::{Config, PushConfig};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Push gateway request failed: {0}")]
    Transport(String),

    #[error("Push gateway returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for NotificationError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Delivers one notification to one device.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn dispatch(&self, device_token: &str, title: &str, body: &str) -> Result<(), NotificationError>;
}

// ============================================================================
// Payload
// ============================================================================

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    device_token: &'a str,
    topic: &'a str,
    sandbox: bool,
    payload: ApnsPayload<'a>,
}

#[derive(Debug, Serialize)]
struct ApnsPayload<'a> {
    aps: Aps<'a>,
}

#[derive(Debug, Serialize)]
struct Aps<'a> {
    alert: ApsAlert<'a>,
    sound: &'static str,
    badge: u32,
    #[serde(rename = "mutable-content")]
    mutable_content: u8,
}

#[derive(Debug, Serialize)]
struct ApsAlert<'a> {
    title: &'a str,
    body: &'a str,
}

// ============================================================================
// Gateway client
// ============================================================================

/// Push gateway client.
pub struct PushGatewayClient {
    enabled: bool,
    endpoint: Option<String>,
    token: Option<String>,
    topic: String,
    sandbox: bool,
    client: reqwest::Client,
}

impl PushGatewayClient {
    pub fn new(push: &PushConfig, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(push.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            enabled: push.enabled,
            endpoint: push.endpoint.clone().filter(|e| !e.trim().is_empty()),
            token,
            topic: push.topic.clone(),
            sandbox: push.sandbox,
            client,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.push, config.secrets.push_gateway_token.clone())
    }

    /// True when notifications actually leave the process.
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.endpoint.is_some()
    }
}

#[async_trait]
impl NotificationSink for PushGatewayClient {
    async fn dispatch(&self, device_token: &str, title: &str, body: &str) -> Result<(), NotificationError> {
        let Some(endpoint) = self.endpoint.as_deref().filter(|_| self.enabled) else {
            info!(device_token = %device_token, title = %title, "Simulating push (gateway not configured)");
            return Ok(());
        };

        let request = PushRequest {
            device_token,
            topic: &self.topic,
            sandbox: self.sandbox,
            payload: ApnsPayload {
                aps: Aps {
                    alert: ApsAlert { title, body },
                    sound: "default",
                    badge: 1,
                    mutable_content: 1,
                },
            },
        };

        let mut builder = self.client.post(endpoint).json(&request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected { status, body });
        }

        debug!(device_token = %device_token, "Push notification delivered");
        Ok(())
    }
}
