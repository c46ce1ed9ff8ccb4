//! Account-related types
//!
//! An account is either a merchant balance holder or an internal capital
//! holder. Balances are kept in the smallest IDR unit and are only ever
//! changed through ledger movements.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::movement::BalanceBucket;

/// Account identifier
pub type AccountId = u64;

/// Monetary amount in the smallest currency unit (IDR has no minor unit)
pub type Amount = u64;

/// Which side of the book an account sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    /// Merchant or capital holder the platform owes money to
    Creditor,
    /// Holder that owes money to the platform
    Debitor,
}

/// Lifecycle status; accounts are deactivated, never deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    Active,
    Inactive,
}

/// Current balance projection of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,

    pub account_type: AccountType,

    /// Funds available for withdrawal or payout
    pub settled_balance: Amount,

    /// Funds held pending settlement (payin proceeds, payout holds)
    pub unsettled_balance: Amount,

    pub status: AccountStatus,
}

impl Account {
    /// Create an active account with zero balances
    pub fn new(account_id: AccountId, account_type: AccountType) -> Self {
        Account {
            account_id,
            account_type,
            settled_balance: 0,
            unsettled_balance: 0,
            status: AccountStatus::Active,
        }
    }

    /// Balance of the given bucket
    pub fn balance(&self, bucket: BalanceBucket) -> Amount {
        match bucket {
            BalanceBucket::Settled => self.settled_balance,
            BalanceBucket::Unsettled => self.unsettled_balance,
        }
    }

    pub(crate) fn balance_mut(&mut self, bucket: BalanceBucket) -> &mut Amount {
        match bucket {
            BalanceBucket::Settled => &mut self.settled_balance,
            BalanceBucket::Unsettled => &mut self.unsettled_balance,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Sum of both buckets, saturating
    pub fn total(&self) -> Amount {
        self.settled_balance.saturating_add(self.unsettled_balance)
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Creditor => write!(f, "CREDITOR"),
            AccountType::Debitor => write!(f, "DEBITOR"),
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "ACTIVE"),
            AccountStatus::Inactive => write!(f, "INACTIVE"),
        }
    }
}
