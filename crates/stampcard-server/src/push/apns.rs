//! Apple push service client for wallet pass updates.
//!
//! Wallet passes use a content-free push: the payload is `{}` and the topic
//! is the pass type identifier. The device reacts by asking the web service
//! which of its passes changed.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use stampcard_core::config::PushConfig;
use tracing::{debug, warn};

use super::{DeliveryOutcome, PushDispatcher, PushError};

/// Environment variable holding the provider bearer token.
const APNS_AUTH_TOKEN_ENV: &str = "STAMPCARD_APNS_AUTH_TOKEN";

/// Reasons the push service uses for tokens that will never work again.
const INVALID_TOKEN_REASONS: &[&str] =
    &["BadDeviceToken", "Unregistered", "DeviceTokenNotForTopic"];

#[derive(Debug, Deserialize)]
struct ApnsErrorBody {
    reason: Option<String>,
}

/// Client for the Apple push service.
#[derive(Debug, Clone)]
pub struct ApnsDispatcher {
    http: reqwest::Client,
    base_url: String,
    topic: String,
    auth_token: Option<String>,
}

fn read_auth_token_from_env() -> Option<String> {
    let token = std::env::var(APNS_AUTH_TOKEN_ENV).ok().filter(|t| !t.is_empty());
    if token.is_none() {
        warn!(
            "Environment variable {APNS_AUTH_TOKEN_ENV} is not set; \
             push requests are unauthenticated"
        );
    }
    token
}

impl ApnsDispatcher {
    /// Build a dispatcher from configuration. `topic` is the pass type
    /// identifier.
    pub fn new(config: &PushConfig, topic: &str) -> Result<Self, PushError> {
        Self::with_auth_token(config, topic, read_auth_token_from_env())
    }

    /// Build a dispatcher with an explicit bearer token.
    pub fn with_auth_token(
        config: &PushConfig,
        topic: &str,
        auth_token: Option<String>,
    ) -> Result<Self, PushError> {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| PushError::Client(e.to_string()))?;

        debug!(base_url = %config.apns_base_url, topic, "APNs dispatcher initialized");

        Ok(Self {
            http,
            base_url: config.apns_base_url.trim_end_matches('/').to_string(),
            topic: topic.to_string(),
            auth_token,
        })
    }

    pub fn device_url(&self, push_token: &str) -> String {
        format!("{}/3/device/{push_token}", self.base_url)
    }
}

#[async_trait]
impl PushDispatcher for ApnsDispatcher {
    async fn notify(&self, push_token: &str) -> DeliveryOutcome {
        let mut request = self
            .http
            .post(self.device_url(push_token))
            .header("apns-topic", &self.topic)
            .header("apns-push-type", "background")
            .header("content-type", "application/json")
            .body("{}");
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(push_token, error = %e, "APNs request failed");
                return DeliveryOutcome::failed(push_token, e.to_string());
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(push_token, "APNs notification delivered");
            return DeliveryOutcome::delivered(push_token);
        }

        let reason = response
            .json::<ApnsErrorBody>()
            .await
            .ok()
            .and_then(|body| body.reason)
            .unwrap_or_else(|| status.to_string());

        if status.as_u16() == 410 || INVALID_TOKEN_REASONS.contains(&reason.as_str()) {
            warn!(push_token, status = status.as_u16(), reason = %reason, "APNs rejected token");
            DeliveryOutcome::invalid(push_token, reason)
        } else {
            warn!(push_token, status = status.as_u16(), reason = %reason, "APNs delivery failed");
            DeliveryOutcome::failed(push_token, reason)
        }
    }
}
