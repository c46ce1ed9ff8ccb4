//! Engine configuration
//!
//! Built once at start-up (from CLI arguments or defaults) and handed to the
//! components that need it. Nothing here is mutated afterwards.

use chrono::Duration;
use std::time::Duration as StdDuration;

use crate::core::bank_codes::DEFAULT_NAME_MATCH_THRESHOLD;
use crate::types::Amount;

/// Inconclusive attempts after which a payment goes to operator review
pub const MAX_RETRY_SYNC_STATUS: u8 = 5;

/// Backoff schedule for QUERY-sourced reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the n-th inconclusive attempt (index n - 1)
    pub delays: Vec<Duration>,
    /// Delay used once the counter is past the last table entry
    pub final_increment: Duration,
    pub max_retries: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: [2, 3, 5, 8, 13].into_iter().map(Duration::minutes).collect(),
            final_increment: Duration::minutes(5),
            max_retries: MAX_RETRY_SYNC_STATUS,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next inquiry, given the retry counter after increment
    pub fn delay_for(&self, retry_counter: u8) -> Duration {
        match retry_counter {
            0 => self.first_delay(),
            n => self
                .delays
                .get(usize::from(n) - 1)
                .copied()
                .unwrap_or(self.final_increment),
        }
    }

    /// Delay before the first inquiry of a freshly opened payment
    pub fn first_delay(&self) -> Duration {
        self.delays.first().copied().unwrap_or(self.final_increment)
    }
}

/// Fixed sender identity attached to every disbursement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub first_name: String,
    pub last_name: String,
}

impl Default for SenderIdentity {
    fn default() -> Self {
        Self {
            first_name: "Payment".to_string(),
            last_name: "Gateway".to_string(),
        }
    }
}

/// Configuration shared by the reconciliation and disbursement components
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    /// Minimum account-name similarity before a disbursement is flagged
    pub name_match_threshold: f64,
    /// Upper bound for every provider call
    pub provider_timeout: StdDuration,
    /// How often the background runner looks for due inquiries
    pub poll_interval: StdDuration,
    /// Inquiries issued concurrently per poll cycle
    pub max_concurrent_queries: usize,
    pub sender: SenderIdentity,
    /// Fixed notes string the provider receives on every disbursement
    pub disbursement_notes: String,
    /// Fee charged per disbursement, held and debited with the principal
    pub disbursement_fee: Amount,
    pub provider_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            name_match_threshold: DEFAULT_NAME_MATCH_THRESHOLD,
            provider_timeout: StdDuration::from_secs(30),
            poll_interval: StdDuration::from_secs(30),
            max_concurrent_queries: 8,
            sender: SenderIdentity::default(),
            disbursement_notes: "Disbursement".to_string(),
            disbursement_fee: 0,
            provider_name: "provider".to_string(),
        }
    }
}
