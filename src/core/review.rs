//! Operator review queue
//!
//! Payments the engine must not decide on its own (exhausted reconciliation
//! retries, suspicious beneficiary names) are handed to a human. The queue
//! itself is an external collaborator; the in-memory implementation backs
//! tests and the CLI.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::types::{AccountId, PaymentId};

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewReason {
    /// Provider state stayed inconclusive past the retry limit
    ReconciliationExhausted { retry_counter: u8 },
    /// Account holder name returned by the provider differs from the request
    NameMismatch {
        expected: String,
        returned: String,
        similarity: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewItem {
    pub payment_id: PaymentId,
    pub account_id: AccountId,
    pub reason: ReviewReason,
    pub raised_at: DateTime<Utc>,
}

/// Sink for items needing operator attention
pub trait ReviewQueue: Send + Sync {
    fn submit(&self, item: ReviewItem);
}

#[derive(Debug, Default)]
pub struct InMemoryReviewQueue {
    items: Mutex<Vec<ReviewItem>>,
}

impl InMemoryReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<ReviewItem> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ReviewQueue for InMemoryReviewQueue {
    fn submit(&self, item: ReviewItem) {
        tracing::warn!(
            payment_id = %item.payment_id,
            account_id = item.account_id,
            reason = ?item.reason,
            "Payment queued for operator review"
        );
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
    }
}
