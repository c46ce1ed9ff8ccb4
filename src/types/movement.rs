//! Ledger movement types
//!
//! A movement is an immutable, append-only ledger entry recording one change
//! (or one audited non-change) to a single balance bucket of an account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::{AccountId, Amount};
use super::payment::PaymentId;

/// Movement identifier, monotonically increasing across the whole ledger
pub type MovementId = u64;

/// Why a movement was written
///
/// The numeric ids are part of the stored data and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReasonId {
    TopUp = 1,
    HoldBalance = 2,
    Settlement = 3,
    OutSettlement = 4,
    Payin = 5,
    Payout = 6,
    Fee = 7,
    BalanceTransfer = 8,
}

impl ReasonId {
    /// Numeric id as persisted
    #[inline]
    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(ReasonId::TopUp),
            2 => Some(ReasonId::HoldBalance),
            3 => Some(ReasonId::Settlement),
            4 => Some(ReasonId::OutSettlement),
            5 => Some(ReasonId::Payin),
            6 => Some(ReasonId::Payout),
            7 => Some(ReasonId::Fee),
            8 => Some(ReasonId::BalanceTransfer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonId::TopUp => "TopUp",
            ReasonId::HoldBalance => "HoldBalance",
            ReasonId::Settlement => "Settlement",
            ReasonId::OutSettlement => "OutSettlement",
            ReasonId::Payin => "Payin",
            ReasonId::Payout => "Payout",
            ReasonId::Fee => "Fee",
            ReasonId::BalanceTransfer => "BalanceTransfer",
        }
    }
}

impl fmt::Display for ReasonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CapitalType {
    /// Increases the balance; no floor check
    Credit,
    /// Decreases the balance; requires balance >= amount
    Debit,
    /// Audit-only entry, balance untouched
    Unchanged,
}

impl CapitalType {
    /// The compensating direction used by reversals
    pub fn inverse(&self) -> Self {
        match self {
            CapitalType::Credit => CapitalType::Debit,
            CapitalType::Debit => CapitalType::Credit,
            CapitalType::Unchanged => CapitalType::Unchanged,
        }
    }
}

impl fmt::Display for CapitalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapitalType::Credit => write!(f, "CREDIT"),
            CapitalType::Debit => write!(f, "DEBIT"),
            CapitalType::Unchanged => write!(f, "UNCHANGED"),
        }
    }
}

/// Which of the two account balances a movement touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BalanceBucket {
    Settled,
    Unsettled,
}

impl fmt::Display for BalanceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceBucket::Settled => write!(f, "settled"),
            BalanceBucket::Unsettled => write!(f, "unsettled"),
        }
    }
}

/// Immutable ledger entry
///
/// `balance_after` equals `balance_before` plus or minus `amount` according to
/// `capital_type`; `Unchanged` entries keep both equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub movement_id: MovementId,
    pub account_id: AccountId,
    /// `None` for manual operations not tied to a payment
    pub payment_id: Option<PaymentId>,
    pub reason: ReasonId,
    pub capital_type: CapitalType,
    pub bucket: BalanceBucket,
    pub amount: Amount,
    pub balance_before: Amount,
    pub balance_after: Amount,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A movement to be written by the ledger store
///
/// The store fills in ids, balances and timestamps inside the account lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub account_id: AccountId,
    pub payment_id: Option<PaymentId>,
    pub reason: ReasonId,
    pub capital_type: CapitalType,
    pub bucket: BalanceBucket,
    pub amount: Amount,
    pub actor: String,
}

impl MovementRequest {
    pub fn credit(
        account_id: AccountId,
        bucket: BalanceBucket,
        reason: ReasonId,
        amount: Amount,
        actor: &str,
    ) -> Self {
        Self::new(account_id, bucket, reason, CapitalType::Credit, amount, actor)
    }

    pub fn debit(
        account_id: AccountId,
        bucket: BalanceBucket,
        reason: ReasonId,
        amount: Amount,
        actor: &str,
    ) -> Self {
        Self::new(account_id, bucket, reason, CapitalType::Debit, amount, actor)
    }

    pub fn unchanged(
        account_id: AccountId,
        bucket: BalanceBucket,
        reason: ReasonId,
        amount: Amount,
        actor: &str,
    ) -> Self {
        Self::new(account_id, bucket, reason, CapitalType::Unchanged, amount, actor)
    }

    fn new(
        account_id: AccountId,
        bucket: BalanceBucket,
        reason: ReasonId,
        capital_type: CapitalType,
        amount: Amount,
        actor: &str,
    ) -> Self {
        Self {
            account_id,
            payment_id: None,
            reason,
            capital_type,
            bucket,
            amount,
            actor: actor.to_string(),
        }
    }

    /// Attach the payment this movement belongs to
    pub fn for_payment(mut self, payment_id: PaymentId) -> Self {
        self.payment_id = Some(payment_id);
        self
    }
}
