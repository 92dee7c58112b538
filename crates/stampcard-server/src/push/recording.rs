//! In-memory dispatcher that records every delivery.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{DeliveryOutcome, PushDispatcher};

/// Records pushed tokens; tokens marked invalid are reported as such.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<String>>,
    invalid: HashSet<String>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher that rejects `tokens` as permanently invalid.
    pub fn rejecting<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sent: Mutex::new(Vec::new()),
            invalid: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Every token a delivery was attempted for, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count_for(&self, push_token: &str) -> usize {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| *t == push_token)
            .count()
    }
}

#[async_trait]
impl PushDispatcher for RecordingDispatcher {
    async fn notify(&self, push_token: &str) -> DeliveryOutcome {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(push_token.to_string());
        if self.invalid.contains(push_token) {
            DeliveryOutcome::invalid(push_token, "BadDeviceToken")
        } else {
            DeliveryOutcome::delivered(push_token)
        }
    }
}
