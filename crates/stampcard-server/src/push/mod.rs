//! Push delivery of silent "pass changed" signals.
//!
//! - [`ApnsDispatcher`] posts an empty payload to the Apple push service
//! - [`NoopDispatcher`] is used when push is disabled
//! - [`RecordingDispatcher`] captures tokens in memory for tests
//!
//! Dispatchers never return errors for individual deliveries: each token
//! yields a [`DeliveryOutcome`] and invalid tokens are reported so the
//! registry can prune them. Rate policy lives in the lifecycle manager.

pub mod apns;
pub mod recording;

use async_trait::async_trait;
use tracing::debug;

pub use apns::ApnsDispatcher;
pub use recording::RecordingDispatcher;

/// Errors constructing a dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Push client error: {0}")]
    Client(String),
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub push_token: String,
    pub delivered: bool,
    pub failure_reason: Option<String>,
    /// The push service rejected the token permanently.
    pub token_invalid: bool,
}

impl DeliveryOutcome {
    pub fn delivered(push_token: &str) -> Self {
        Self {
            push_token: push_token.to_string(),
            delivered: true,
            failure_reason: None,
            token_invalid: false,
        }
    }

    pub fn failed(push_token: &str, reason: impl Into<String>) -> Self {
        Self {
            push_token: push_token.to_string(),
            delivered: false,
            failure_reason: Some(reason.into()),
            token_invalid: false,
        }
    }

    pub fn invalid(push_token: &str, reason: impl Into<String>) -> Self {
        Self {
            token_invalid: true,
            ..Self::failed(push_token, reason)
        }
    }
}

/// Aggregate of a batch of deliveries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub delivered: usize,
    pub failed: usize,
    pub invalid_tokens: Vec<String>,
}

impl BatchOutcome {
    pub fn push(&mut self, outcome: DeliveryOutcome) {
        if outcome.delivered {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
        if outcome.token_invalid {
            self.invalid_tokens.push(outcome.push_token);
        }
    }
}

/// Delivers wake signals to devices.
#[async_trait]
pub trait PushDispatcher: Send + Sync {
    /// Deliver one signal. Never fails; the outcome carries the reason.
    async fn notify(&self, push_token: &str) -> DeliveryOutcome;

    /// Deliver to every token, aggregating per-token outcomes.
    async fn notify_batch(&self, push_tokens: &[String]) -> BatchOutcome {
        let mut batch = BatchOutcome::default();
        for token in push_tokens {
            batch.push(self.notify(token).await);
        }
        batch
    }
}

/// Dispatcher used when push delivery is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDispatcher;

#[async_trait]
impl PushDispatcher for NoopDispatcher {
    async fn notify(&self, push_token: &str) -> DeliveryOutcome {
        debug!(push_token, "Push disabled, dropping notification");
        DeliveryOutcome::failed(push_token, "push disabled")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_never_delivers_or_invalidates() {
        let batch = NoopDispatcher
            .notify_batch(&["a".to_string(), "b".to_string()])
            .await;
        assert_eq!(batch.delivered, 0);
        assert_eq!(batch.failed, 2);
        assert!(batch.invalid_tokens.is_empty());
    }

    #[test]
    fn batch_collects_invalid_tokens() {
        let mut batch = BatchOutcome::default();
        batch.push(DeliveryOutcome::delivered("ok"));
        batch.push(DeliveryOutcome::invalid("gone", "Unregistered"));
        batch.push(DeliveryOutcome::failed("later", "timeout"));
        assert_eq!((batch.delivered, batch.failed), (1, 2));
        assert_eq!(batch.invalid_tokens, vec!["gone".to_string()]);
    }
}
