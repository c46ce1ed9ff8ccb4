//! Payment status state machine and payment registry
//!
//! ```text
//! PROCESSING ──> SUCCESS ──(manual)──> REVERSED
//!      └───────> FAILED
//! ```
//!
//! Every requested transition, including duplicates and rejected ones, is
//! appended to the payment's status change log. Only permitted transitions
//! change the status.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::types::{
    LedgerError, LogOutcome, Payment, PaymentId, PaymentStatus, StatusChangeLogEntry,
    StatusSource,
};

/// Interpretation of a provider state string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderOutcome {
    /// The provider reports a final outcome
    Final(PaymentStatus),
    /// Pending or unrecognised; keep polling
    Inconclusive,
}

/// Map a provider state string onto a payment status
///
/// `confirmed`/`completed` mean success, `declined`/`canceled` mean failure.
/// Anything else, including pending states, is inconclusive.
pub fn map_provider_state(state: &str) -> ProviderOutcome {
    match state.trim().to_ascii_lowercase().as_str() {
        "confirmed" | "completed" => ProviderOutcome::Final(PaymentStatus::Success),
        "declined" | "canceled" => ProviderOutcome::Final(PaymentStatus::Failed),
        _ => ProviderOutcome::Inconclusive,
    }
}

/// Outcome of a permitted transition request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status changed
    Applied,
    /// Payment already held the requested status
    NoOp,
}

/// Transition rules for payment statuses
#[derive(Debug, Clone, Copy)]
pub struct StatusStateMachine;

impl StatusStateMachine {
    /// Statuses reachable from `current`
    pub fn valid_transitions(current: PaymentStatus) -> &'static [PaymentStatus] {
        match current {
            PaymentStatus::Processing => &[PaymentStatus::Success, PaymentStatus::Failed],
            PaymentStatus::Success => &[PaymentStatus::Reversed],
            PaymentStatus::Failed | PaymentStatus::Reversed => &[],
        }
    }

    pub fn can_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
        Self::valid_transitions(from).contains(&to)
    }

    /// Check a transition without changing anything
    ///
    /// `Success -> Reversed` is only permitted from a manual source.
    pub fn check(
        payment: &Payment,
        to: PaymentStatus,
        source: StatusSource,
    ) -> Result<Transition, LedgerError> {
        let from = payment.status;
        if from == to {
            return Ok(Transition::NoOp);
        }
        let manual_only = to == PaymentStatus::Reversed && source != StatusSource::Manual;
        if Self::can_transition(from, to) && !manual_only {
            Ok(Transition::Applied)
        } else {
            Err(LedgerError::invalid_transition(payment.payment_id, from, to))
        }
    }

    /// Apply a transition and append its log entry
    ///
    /// Duplicates and rejected transitions are logged too; a rejected
    /// transition returns `InvalidTransition` and leaves the status unchanged.
    pub fn apply(
        record: &mut PaymentRecord,
        to: PaymentStatus,
        source: StatusSource,
        changed_by: &str,
        provider_state: Option<&str>,
    ) -> Result<Transition, LedgerError> {
        let from = record.payment.status;
        let checked = Self::check(&record.payment, to, source);
        let outcome = match &checked {
            Ok(Transition::Applied) => LogOutcome::Applied,
            Ok(Transition::NoOp) => LogOutcome::Duplicate,
            Err(_) => LogOutcome::Rejected,
        };

        let now = Utc::now();
        record.history.push(StatusChangeLogEntry {
            payment_id: record.payment.payment_id,
            from_status: from,
            to_status: to,
            source,
            outcome,
            provider_state: provider_state.map(str::to_string),
            changed_by: changed_by.to_string(),
            timestamp: now,
        });

        match checked {
            Ok(Transition::Applied) => {
                record.payment.status = to;
                record.payment.updated_at = now;
                if to.is_terminal() {
                    record.payment.next_retry_at = None;
                }
                info!(
                    payment_id = %record.payment.payment_id,
                    %from, %to, %source,
                    "Payment status changed"
                );
            }
            Ok(Transition::NoOp) => {
                debug!(
                    payment_id = %record.payment.payment_id,
                    status = %to, %source,
                    "Duplicate status signal recorded"
                );
            }
            Err(ref e) => {
                warn!(
                    payment_id = %record.payment.payment_id,
                    %from, %to, %source,
                    error = %e,
                    "Status transition rejected"
                );
            }
        }

        checked
    }
}

/// A payment together with its status change log
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub payment: Payment,
    history: Vec<StatusChangeLogEntry>,
}

impl PaymentRecord {
    pub fn history(&self) -> &[StatusChangeLogEntry] {
        &self.history
    }
}

fn lock(record: &Mutex<PaymentRecord>) -> MutexGuard<'_, PaymentRecord> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe payment registry with one lock per payment
#[derive(Debug, Default)]
pub struct PaymentStore {
    payments: DashMap<PaymentId, Arc<Mutex<PaymentRecord>>>,
}

impl PaymentStore {
    pub fn new() -> Self {
        Self {
            payments: DashMap::new(),
        }
    }

    /// Register a new payment
    pub fn insert(&self, payment: Payment) -> PaymentId {
        let payment_id = payment.payment_id;
        self.payments.insert(
            payment_id,
            Arc::new(Mutex::new(PaymentRecord {
                payment,
                history: Vec::new(),
            })),
        );
        payment_id
    }

    pub fn get(&self, payment_id: PaymentId) -> Option<Payment> {
        let handle = self.handle(payment_id).ok()?;
        let record = lock(&handle);
        Some(record.payment.clone())
    }

    /// Status change log of a payment in write order
    pub fn history(&self, payment_id: PaymentId) -> Vec<StatusChangeLogEntry> {
        match self.handle(payment_id) {
            Ok(handle) => lock(&handle).history.clone(),
            Err(_) => Vec::new(),
        }
    }

    /// Run `f` while holding the payment's lock
    ///
    /// Every status change and its ledger effect happen inside this call, so
    /// concurrent callbacks and polls for one payment are serialized.
    pub fn with_payment<R, F>(&self, payment_id: PaymentId, f: F) -> Result<R, LedgerError>
    where
        F: FnOnce(&mut PaymentRecord) -> Result<R, LedgerError>,
    {
        let handle = self.handle(payment_id)?;
        let mut record = lock(&handle);
        f(&mut *record)
    }

    /// Payments in PROCESSING whose next inquiry is due at `now`
    pub fn due_for_query(&self, now: DateTime<Utc>) -> Vec<PaymentId> {
        let mut due: Vec<(DateTime<Utc>, PaymentId)> = self
            .snapshot()
            .into_iter()
            .filter(|p| p.status == PaymentStatus::Processing)
            .filter_map(|p| p.next_retry_at.filter(|at| *at <= now).map(|at| (at, p.payment_id)))
            .collect();
        due.sort();
        due.into_iter().map(|(_, id)| id).collect()
    }

    /// Payments currently in the given status
    pub fn by_status(&self, status: PaymentStatus) -> Vec<Payment> {
        self.snapshot()
            .into_iter()
            .filter(|p| p.status == status)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }

    fn snapshot(&self) -> Vec<Payment> {
        let handles: Vec<_> = self
            .payments
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        handles.iter().map(|h| lock(h).payment.clone()).collect()
    }

    fn handle(&self, payment_id: PaymentId) -> Result<Arc<Mutex<PaymentRecord>>, LedgerError> {
        self.payments
            .get(&payment_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LedgerError::payment_not_found(payment_id))
    }
}
