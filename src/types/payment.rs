//! Payment-related types
//!
//! A payment is a payin or payout whose outcome is confirmed by the external
//! provider. Its status is only ever changed by the status state machine and
//! every attempted change lands in the status change log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::account::{AccountId, Amount};

/// Payment identifier
pub type PaymentId = Uuid;

/// Direction of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayType {
    /// Money collected for the merchant
    In,
    /// Money paid out from the merchant's balance
    Out,
}

/// Payment status
///
/// PROCESSING is the only non-terminal status. REVERSED is reachable from
/// SUCCESS through a manual reversal only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Processing,
    Success,
    Failed,
    Reversed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Reversed => "REVERSED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a status signal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusSource {
    /// Pushed by the provider (or the synchronous submission response)
    Callback,
    /// Pulled by the scheduled status inquiry
    Query,
    /// Operator action such as a manual reversal
    Manual,
}

impl fmt::Display for StatusSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusSource::Callback => write!(f, "CALLBACK"),
            StatusSource::Query => write!(f, "QUERY"),
            StatusSource::Manual => write!(f, "MANUAL"),
        }
    }
}

/// What happened to a requested transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogOutcome {
    Applied,
    /// Requested status equals the current one; nothing changed
    Duplicate,
    /// Transition not permitted; nothing changed
    Rejected,
}

/// Append-only audit row for a payment status change attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeLogEntry {
    pub payment_id: PaymentId,
    pub from_status: PaymentStatus,
    pub to_status: PaymentStatus,
    pub source: StatusSource,
    pub outcome: LogOutcome,
    /// Raw provider state string, when the change came from the provider
    pub provider_state: Option<String>,
    pub changed_by: String,
    pub timestamp: DateTime<Utc>,
}

/// A payin or payout tracked by the reconciliation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: PaymentId,
    /// Merchant account whose balance the payment affects
    pub account_id: AccountId,
    pub pay_type: PayType,
    pub payment_method: String,
    pub amount: Amount,
    pub fee: Amount,
    pub status: PaymentStatus,
    pub provider: String,
    /// Reference assigned by the provider on submission, if any
    pub provider_ref: Option<String>,
    /// Inconclusive reconciliation attempts so far (0..=5)
    pub retry_counter: u8,
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Handed to operator review after exhausting automatic retries
    pub escalated: bool,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Create a payment in PROCESSING
    pub fn new(
        account_id: AccountId,
        pay_type: PayType,
        payment_method: &str,
        amount: Amount,
        fee: Amount,
        provider: &str,
        created_by: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            payment_id: Uuid::new_v4(),
            account_id,
            pay_type,
            payment_method: payment_method.to_string(),
            amount,
            fee,
            status: PaymentStatus::Processing,
            provider: provider.to_string(),
            provider_ref: None,
            retry_counter: 0,
            next_retry_at: None,
            escalated: false,
            notes: None,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PaymentStatus::Processing, false)]
    #[case(PaymentStatus::Success, true)]
    #[case(PaymentStatus::Failed, true)]
    #[case(PaymentStatus::Reversed, true)]
    fn test_terminal_statuses(#[case] status: PaymentStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn test_new_payment_starts_processing() {
        let payment = Payment::new(1, PayType::Out, "disbursement", 5000, 0, "flip", "ops");

        assert_eq!(payment.status, PaymentStatus::Processing);
        assert_eq!(payment.retry_counter, 0);
        assert!(payment.next_retry_at.is_none());
        assert!(!payment.escalated);
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&PaymentStatus::Reversed).unwrap();
        assert_eq!(json, "\"REVERSED\"");
    }
}
