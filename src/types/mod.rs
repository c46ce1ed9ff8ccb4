//! Types module
//!
//! Contains core data structures used throughout the ledger.
//! This module organizes types into logical submodules:
//! - `account`: Account state and identifiers
//! - `movement`: Immutable ledger entries and their classification
//! - `payment`: Payments, statuses and the status change log
//! - `actor`: The verified principal handed over by the auth layer
//! - `error`: Error taxonomy for every ledger operation

pub mod account;
pub mod actor;
pub mod error;
pub mod movement;
pub mod payment;

pub use account::{Account, AccountId, AccountStatus, AccountType, Amount};
pub use actor::{Actor, Role, UserType, SYSTEM_ACTOR};
pub use error::{ErrorKind, LedgerError};
pub use movement::{BalanceBucket, CapitalType, Movement, MovementId, MovementRequest, ReasonId};
pub use payment::{
    LogOutcome, PayType, Payment, PaymentId, PaymentStatus, StatusChangeLogEntry, StatusSource,
};
