//! Error types for the ledger and reconciliation engine
//!
//! Every operation returns `Result<_, LedgerError>`. Callers classify failures
//! with [`LedgerError::kind`] instead of inspecting messages.
//!
//! # Error Categories
//!
//! - **Validation**: missing or malformed input, unknown or inactive entities
//! - **Authorization**: wrong PIN, operation not allowed for the role
//! - **InsufficientBalance**: a debit larger than the bucket balance
//! - **UnknownBankCode**: no provider mapping for an internal bank code
//! - **InvalidTransition**: a payment status change the state machine forbids
//! - **ProviderUnavailable**: transient provider failures and timeouts
//! - **TransferFailed**: a multi-leg ledger unit that could not be completed
//! - **Internal**: credential store or ledger invariant failures

use thiserror::Error;

use super::account::{AccountId, Amount};
use super::movement::BalanceBucket;
use super::payment::{PaymentId, PaymentStatus};

/// Error class used by callers (for example to pick an HTTP status)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    InsufficientBalance,
    UnknownBankCode,
    InvalidTransition,
    ProviderUnavailable,
    TransferFailed,
    Internal,
}

/// Main error type for the ledger
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// A required request field is absent or blank
    #[error("Missing required field '{field}'")]
    MissingField { field: String },

    /// Amounts must be strictly positive
    #[error("Amount must be greater than zero for {operation}")]
    InvalidAmount { operation: String },

    #[error("Account {account_id} not found")]
    AccountNotFound { account_id: AccountId },

    #[error("Account {account_id} already exists")]
    AccountExists { account_id: AccountId },

    /// Deactivated accounts accept no further movements
    #[error("Account {account_id} is inactive")]
    AccountInactive { account_id: AccountId },

    #[error("Payment {payment_id} not found")]
    PaymentNotFound { payment_id: PaymentId },

    /// The operation is not granted to the caller's user type and role
    #[error("User '{username}' is not allowed to perform {operation}")]
    Forbidden { username: String, operation: String },

    #[error("Wrong PIN for user '{username}'")]
    WrongPin { username: String },

    #[error("Insufficient {bucket} balance on account {account_id}: available {available}, requested {requested}")]
    InsufficientBalance {
        account_id: AccountId,
        bucket: BalanceBucket,
        available: Amount,
        requested: Amount,
    },

    #[error("Balance overflow on {bucket} balance of account {account_id}")]
    BalanceOverflow {
        account_id: AccountId,
        bucket: BalanceBucket,
    },

    #[error("Unknown bank code '{code}'")]
    UnknownBankCode { code: String },

    #[error("Invalid status transition for payment {payment_id}: {from} -> {to}")]
    InvalidTransition {
        payment_id: PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Payment provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    #[error("Payment provider did not answer within {timeout_ms}ms")]
    ProviderTimeout { timeout_ms: u64 },

    /// The provider float cannot cover the payout right now
    #[error("Provider balance too low: available {available}, requested {requested}")]
    ProviderBalanceTooLow { available: Amount, requested: Amount },

    #[error("Transfer from account {from} to account {to} failed: {reason}")]
    TransferFailed {
        from: AccountId,
        to: AccountId,
        reason: String,
    },

    #[error("Credential store error: {message}")]
    Credential { message: String },

    #[error("Ledger invariant violated: {message}")]
    Invariant { message: String },
}

impl LedgerError {
    /// Classify the error into the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::MissingField { .. }
            | LedgerError::InvalidAmount { .. }
            | LedgerError::AccountNotFound { .. }
            | LedgerError::AccountExists { .. }
            | LedgerError::AccountInactive { .. }
            | LedgerError::PaymentNotFound { .. }
            | LedgerError::BalanceOverflow { .. } => ErrorKind::Validation,
            LedgerError::Forbidden { .. } | LedgerError::WrongPin { .. } => {
                ErrorKind::Authorization
            }
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::UnknownBankCode { .. } => ErrorKind::UnknownBankCode,
            LedgerError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            LedgerError::ProviderUnavailable { .. }
            | LedgerError::ProviderTimeout { .. }
            | LedgerError::ProviderBalanceTooLow { .. } => ErrorKind::ProviderUnavailable,
            LedgerError::TransferFailed { .. } => ErrorKind::TransferFailed,
            LedgerError::Credential { .. } | LedgerError::Invariant { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the caller can fix the request and try again
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation
                | ErrorKind::Authorization
                | ErrorKind::InsufficientBalance
                | ErrorKind::UnknownBankCode
        )
    }

    /// Whether the failure is transient and worth retrying later
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::ProviderUnavailable
    }
}

// Helper functions for creating common errors

impl LedgerError {
    pub fn missing_field(field: &str) -> Self {
        LedgerError::MissingField {
            field: field.to_string(),
        }
    }

    pub fn invalid_amount(operation: &str) -> Self {
        LedgerError::InvalidAmount {
            operation: operation.to_string(),
        }
    }

    pub fn account_not_found(account_id: AccountId) -> Self {
        LedgerError::AccountNotFound { account_id }
    }

    pub fn payment_not_found(payment_id: PaymentId) -> Self {
        LedgerError::PaymentNotFound { payment_id }
    }

    pub fn forbidden(username: &str, operation: &str) -> Self {
        LedgerError::Forbidden {
            username: username.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn wrong_pin(username: &str) -> Self {
        LedgerError::WrongPin {
            username: username.to_string(),
        }
    }

    pub fn insufficient_balance(
        account_id: AccountId,
        bucket: BalanceBucket,
        available: Amount,
        requested: Amount,
    ) -> Self {
        LedgerError::InsufficientBalance {
            account_id,
            bucket,
            available,
            requested,
        }
    }

    pub fn unknown_bank_code(code: &str) -> Self {
        LedgerError::UnknownBankCode {
            code: code.to_string(),
        }
    }

    pub fn invalid_transition(payment_id: PaymentId, from: PaymentStatus, to: PaymentStatus) -> Self {
        LedgerError::InvalidTransition {
            payment_id,
            from,
            to,
        }
    }

    pub fn provider_unavailable(message: impl Into<String>) -> Self {
        LedgerError::ProviderUnavailable {
            message: message.into(),
        }
    }

    pub fn transfer_failed(from: AccountId, to: AccountId, reason: impl Into<String>) -> Self {
        LedgerError::TransferFailed {
            from,
            to,
            reason: reason.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        LedgerError::Invariant {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use uuid::Uuid;

    #[rstest]
    #[case::missing_field(
        LedgerError::missing_field("bank_account_number"),
        "Missing required field 'bank_account_number'"
    )]
    #[case::invalid_amount(
        LedgerError::invalid_amount("top-up"),
        "Amount must be greater than zero for top-up"
    )]
    #[case::wrong_pin(LedgerError::wrong_pin("finance01"), "Wrong PIN for user 'finance01'")]
    #[case::insufficient(
        LedgerError::insufficient_balance(1, BalanceBucket::Settled, 10000, 15000),
        "Insufficient settled balance on account 1: available 10000, requested 15000"
    )]
    #[case::unknown_bank(
        LedgerError::unknown_bank_code("IDR_999"),
        "Unknown bank code 'IDR_999'"
    )]
    #[case::transfer_failed(
        LedgerError::transfer_failed(1, 2, "account 2 is inactive"),
        "Transfer from account 1 to account 2 failed: account 2 is inactive"
    )]
    #[case::timeout(
        LedgerError::ProviderTimeout { timeout_ms: 30000 },
        "Payment provider did not answer within 30000ms"
    )]
    fn test_error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case(LedgerError::missing_field("amount"), ErrorKind::Validation)]
    #[case(LedgerError::account_not_found(3), ErrorKind::Validation)]
    #[case(LedgerError::wrong_pin("a"), ErrorKind::Authorization)]
    #[case(LedgerError::forbidden("a", "TopUp"), ErrorKind::Authorization)]
    #[case(
        LedgerError::insufficient_balance(1, BalanceBucket::Settled, 0, 1),
        ErrorKind::InsufficientBalance
    )]
    #[case(LedgerError::unknown_bank_code("X"), ErrorKind::UnknownBankCode)]
    #[case(
        LedgerError::invalid_transition(Uuid::nil(), PaymentStatus::Failed, PaymentStatus::Success),
        ErrorKind::InvalidTransition
    )]
    #[case(LedgerError::provider_unavailable("down"), ErrorKind::ProviderUnavailable)]
    #[case(LedgerError::ProviderTimeout { timeout_ms: 1 }, ErrorKind::ProviderUnavailable)]
    #[case(LedgerError::transfer_failed(1, 2, "x"), ErrorKind::TransferFailed)]
    #[case(LedgerError::invariant("x"), ErrorKind::Internal)]
    fn test_error_kind(#[case] error: LedgerError, #[case] kind: ErrorKind) {
        assert_eq!(error.kind(), kind);
    }

    #[test]
    fn test_client_errors_are_distinct_from_internal_failures() {
        assert!(LedgerError::wrong_pin("a").is_client_error());
        assert!(LedgerError::insufficient_balance(1, BalanceBucket::Settled, 0, 1).is_client_error());
        assert!(!LedgerError::provider_unavailable("down").is_client_error());
        assert!(!LedgerError::invariant("x").is_client_error());
        assert!(LedgerError::provider_unavailable("down").is_transient());
    }
}
