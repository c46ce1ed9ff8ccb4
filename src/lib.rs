//! Merchant balance ledger and payment-status reconciliation engine
//!
//! # Overview
//!
//! Merchants hold IDR balances split into a settled bucket (available for
//! payout) and an unsettled bucket (payin proceeds and payout holds). Every
//! balance change is an append-only movement recording the balance before and
//! after. Payments to and from external bank accounts go through a payment
//! provider whose outcomes are reconciled through callbacks and polling.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Account, Movement, Payment, LedgerError)
//! - [`core`] - Business logic components:
//!   - [`core::ledger_store`] - per-account locked movement log
//!   - [`core::balance_ops`] - TopUp, HoldBalance, Settlement, OutSettlement,
//!     ReverseManualPayment and BalanceTransfer
//!   - [`core::status`] - payment status state machine
//!   - [`core::reconciliation`] - callback and query reconciliation
//!   - [`core::disbursement`] - outgoing payouts
//!   - [`core::bank_codes`] - bank code translation
//! - [`provider`] - payment provider interface
//! - [`config`] - engine configuration
//! - [`cli`] / [`io`] / [`logging`] - the `ledger-tool` binary's plumbing
//!
//! # Payment Statuses
//!
//! - **PROCESSING**: submitted or received, outcome unknown
//! - **SUCCESS**: provider confirmed; ledger effect applied
//! - **FAILED**: provider declined; payout holds released
//! - **REVERSED**: a successful payment undone by an operator

pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod logging;
pub mod provider;
pub mod types;

pub use config::{EngineConfig, RetryPolicy};
pub use core::{
    BalanceOperations, BankCodeTranslator, DisbursementOrchestrator, LedgerStore,
    ReconciliationScheduler,
};
pub use io::write_accounts_csv;
pub use provider::PaymentProvider;
pub use types::{Account, AccountId, Amount, LedgerError, Movement, Payment, PaymentId, PaymentStatus};
