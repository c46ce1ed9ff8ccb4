//! The verified principal handed to the core by the authentication layer
//!
//! The core trusts these values as-is; it only decides what the principal is
//! allowed to do (see `core::authz`).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::AccountId;

/// Username recorded on movements and status changes made by automation
pub const SYSTEM_ACTOR: &str = "SYSTEM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserType {
    /// Back-office staff
    UserOperation,
    /// Merchant-side user
    UserMerchant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[serde(rename = "customer support")]
    CustomerSupport,
    Finance,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::CustomerSupport => write!(f, "customer support"),
            Role::Finance => write!(f, "finance"),
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserType::UserOperation => write!(f, "USER_OPERATION"),
            UserType::UserMerchant => write!(f, "USER_MERCHANT"),
        }
    }
}

/// Authenticated caller of a ledger operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub username: String,
    pub user_type: UserType,
    pub role: Role,
    /// Account a merchant user belongs to; unused for back-office staff
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_account: Option<AccountId>,
}

impl Actor {
    pub fn new(username: &str, user_type: UserType, role: Role) -> Self {
        Self {
            username: username.to_string(),
            user_type,
            role,
            merchant_account: None,
        }
    }

    /// Bind the actor to its merchant account
    pub fn for_account(mut self, account_id: AccountId) -> Self {
        self.merchant_account = Some(account_id);
        self
    }

    /// Whether the actor may act on `account_id` at all
    ///
    /// Back-office staff reach every account; a merchant user only its own.
    pub fn owns(&self, account_id: AccountId) -> bool {
        match self.user_type {
            UserType::UserOperation => true,
            UserType::UserMerchant => self.merchant_account == Some(account_id),
        }
    }
}
