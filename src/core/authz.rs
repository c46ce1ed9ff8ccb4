//! Declarative authorization policy
//!
//! One table maps `(user type, role)` to the set of ledger operations the
//! principal may invoke. Every operation consults it once, before doing any
//! work.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::types::{AccountId, Actor, LedgerError, Role, UserType};

/// Ledger operations subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    TopUp,
    HoldBalance,
    Settlement,
    OutSettlement,
    ReversePayment,
    BalanceTransfer,
    Disburse,
    ViewBalance,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::TopUp => "TopUp",
            Operation::HoldBalance => "HoldBalance",
            Operation::Settlement => "Settlement",
            Operation::OutSettlement => "OutSettlement",
            Operation::ReversePayment => "ReverseManualPayment",
            Operation::BalanceTransfer => "BalanceTransfer",
            Operation::Disburse => "Disburse",
            Operation::ViewBalance => "ViewBalance",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability table `{(user type, role)} -> {operations}`
#[derive(Debug, Clone)]
pub struct AuthorizationPolicy {
    grants: HashMap<(UserType, Role), HashSet<Operation>>,
}

impl AuthorizationPolicy {
    /// A policy that grants nothing
    pub fn empty() -> Self {
        Self {
            grants: HashMap::new(),
        }
    }

    /// Grant a set of operations to a user type and role
    pub fn grant(mut self, user_type: UserType, role: Role, operations: &[Operation]) -> Self {
        self.grants
            .entry((user_type, role))
            .or_default()
            .extend(operations.iter().copied());
        self
    }

    pub fn is_allowed(&self, actor: &Actor, operation: Operation) -> bool {
        self.grants
            .get(&(actor.user_type, actor.role))
            .is_some_and(|ops| ops.contains(&operation))
    }

    /// Fail with `Forbidden` unless the actor may run the operation
    pub fn authorize(&self, actor: &Actor, operation: Operation) -> Result<(), LedgerError> {
        if self.is_allowed(actor, operation) {
            Ok(())
        } else {
            tracing::warn!(
                username = %actor.username,
                user_type = %actor.user_type,
                role = %actor.role,
                operation = %operation,
                "Operation not permitted"
            );
            Err(LedgerError::forbidden(&actor.username, operation.as_str()))
        }
    }

    /// `authorize`, scoped to the account the operation touches
    ///
    /// A merchant user is refused on any account other than its own, even
    /// when its role grants the operation.
    pub fn authorize_on(
        &self,
        actor: &Actor,
        operation: Operation,
        account_id: AccountId,
    ) -> Result<(), LedgerError> {
        self.authorize(actor, operation)?;
        if actor.owns(account_id) {
            return Ok(());
        }
        tracing::warn!(
            username = %actor.username,
            operation = %operation,
            account_id,
            merchant_account = ?actor.merchant_account,
            "Operation on a foreign merchant account"
        );
        Err(LedgerError::forbidden(&actor.username, operation.as_str()))
    }
}

impl Default for AuthorizationPolicy {
    /// Back-office admins and finance run balance operations; merchants may
    /// disburse and transfer, limited to their own account by
    /// `authorize_on`. Customer support is read-only.
    fn default() -> Self {
        use Operation::*;

        Self::empty()
            .grant(
                UserType::UserOperation,
                Role::Admin,
                &[
                    TopUp,
                    HoldBalance,
                    Settlement,
                    OutSettlement,
                    ReversePayment,
                    BalanceTransfer,
                    Disburse,
                    ViewBalance,
                ],
            )
            .grant(
                UserType::UserOperation,
                Role::Finance,
                &[
                    TopUp,
                    HoldBalance,
                    Settlement,
                    OutSettlement,
                    ReversePayment,
                    BalanceTransfer,
                    ViewBalance,
                ],
            )
            .grant(UserType::UserOperation, Role::CustomerSupport, &[ViewBalance])
            .grant(
                UserType::UserMerchant,
                Role::Admin,
                &[Disburse, BalanceTransfer, ViewBalance],
            )
            .grant(UserType::UserMerchant, Role::Finance, &[Disburse, ViewBalance])
            .grant(UserType::UserMerchant, Role::CustomerSupport, &[ViewBalance])
    }
}
