//! Core business logic module
//!
//! - `bank_codes` - internal bank code translation and name matching
//! - `ledger_store` - append-only movements and balance projection
//! - `authz` / `credentials` - authorization policy and PIN verification
//! - `balance_ops` - PIN-protected balance operations and engine ledger effects
//! - `status` - payment status state machine and payment registry
//! - `reconciliation` - provider signal handling and background polling
//! - `disbursement` - outgoing payouts to bank accounts
//! - `review` - operator review queue
//! - `replay` - balance projection rebuild from an operations export

pub mod authz;
pub mod balance_ops;
pub mod bank_codes;
pub mod credentials;
pub mod disbursement;
pub mod ledger_store;
pub mod reconciliation;
pub mod replay;
pub mod review;
pub mod status;

pub use authz::{AuthorizationPolicy, Operation};
pub use balance_ops::{BalanceOperations, BalanceRequest, ReversalRequest, TransferRequest};
pub use bank_codes::{BankCodeTranslator, ProviderBank};
pub use credentials::{Argon2PinStore, PinVerifier};
pub use disbursement::{DisbursementOrchestrator, DisbursementRequest};
pub use ledger_store::LedgerStore;
pub use reconciliation::{
    PayinRequest, PollSummary, ProviderSignal, ReconciliationScheduler, SignalOutcome,
};
pub use replay::{LedgerReplay, ReplayReport};
pub use review::{InMemoryReviewQueue, ReviewItem, ReviewQueue, ReviewReason};
pub use status::{PaymentStore, StatusStateMachine};
