//! Payment-status reconciliation
//!
//! Provider outcomes reach the engine two ways: CALLBACK signals pushed by the
//! provider (or synthesized from a submission response) and QUERY signals the
//! background runner pulls for payments still in `PROCESSING`. Both go
//! through [`ReconciliationScheduler::handle_signal`], which holds the
//! payment's lock for the whole decision, so a poll racing a callback for the
//! same payment sees the first one's result and is recorded as a duplicate.
//!
//! Inconclusive signals back off along the retry table. Once the table is
//! exhausted the payment is escalated to operator review and polled at a
//! fixed increment; it is never failed automatically.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::balance_ops::BalanceOperations;
use super::review::{ReviewItem, ReviewQueue, ReviewReason};
use super::status::{map_provider_state, PaymentRecord, PaymentStore, ProviderOutcome, StatusStateMachine};
use crate::config::EngineConfig;
use crate::provider::{call_with_timeout, PaymentProvider};
use crate::types::{
    AccountId, Amount, LedgerError, PayType, Payment, PaymentId, PaymentStatus, StatusSource,
    SYSTEM_ACTOR,
};

/// What the provider told us about a payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderSignal {
    /// Raw provider state string, mapped by [`map_provider_state`]
    State(String),
    /// The provider rejected the request outright (HTTP 422); final failure
    Rejected(String),
    /// No usable answer: timeout or transport failure
    Unreachable,
}

impl ProviderSignal {
    fn outcome(&self) -> ProviderOutcome {
        match self {
            ProviderSignal::State(state) => map_provider_state(state),
            ProviderSignal::Rejected(_) => ProviderOutcome::Final(PaymentStatus::Failed),
            ProviderSignal::Unreachable => ProviderOutcome::Inconclusive,
        }
    }

    fn provider_state(&self) -> Option<&str> {
        match self {
            ProviderSignal::State(state) | ProviderSignal::Rejected(state) => Some(state),
            ProviderSignal::Unreachable => None,
        }
    }
}

/// Result of feeding one signal into the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The payment reached a final status and its ledger effect was applied
    Applied(PaymentStatus),
    /// The payment already held the signalled status
    Duplicate,
    /// The payment is final and the signal contradicts it; nothing changed
    Discarded,
    /// Still processing; next inquiry scheduled
    Pending {
        retry_counter: u8,
        next_retry_at: DateTime<Utc>,
    },
    /// Retries exhausted; handed to operator review and still polled
    Escalated { next_retry_at: DateTime<Utc> },
}

/// Counters of one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub inquired: usize,
    pub resolved: usize,
    pub pending: usize,
    pub failed: usize,
}

/// Provider-triggered incoming payment to be tracked until final
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayinRequest {
    pub account_id: AccountId,
    pub amount: Amount,
    pub fee: Amount,
    pub payment_method: String,
    pub provider_ref: Option<String>,
}

pub struct ReconciliationScheduler {
    config: Arc<EngineConfig>,
    ops: Arc<BalanceOperations>,
    provider: Arc<dyn PaymentProvider>,
    review: Arc<dyn ReviewQueue>,
}

impl ReconciliationScheduler {
    pub fn new(
        config: Arc<EngineConfig>,
        ops: Arc<BalanceOperations>,
        provider: Arc<dyn PaymentProvider>,
        review: Arc<dyn ReviewQueue>,
    ) -> Self {
        Self {
            config,
            ops,
            provider,
            review,
        }
    }

    pub fn payments(&self) -> &Arc<PaymentStore> {
        self.ops.payments()
    }

    /// Register an incoming payment and schedule its first inquiry
    pub fn open_payin(&self, request: PayinRequest) -> Result<PaymentId, LedgerError> {
        if request.amount == 0 {
            return Err(LedgerError::invalid_amount("payin"));
        }
        if request.fee > request.amount {
            return Err(LedgerError::invalid_amount("payin fee"));
        }
        if request.payment_method.trim().is_empty() {
            return Err(LedgerError::missing_field("payment_method"));
        }
        let account = self
            .ops
            .ledger()
            .account(request.account_id)
            .ok_or_else(|| LedgerError::account_not_found(request.account_id))?;
        if !account.is_active() {
            return Err(LedgerError::AccountInactive {
                account_id: request.account_id,
            });
        }

        let mut payment = Payment::new(
            request.account_id,
            PayType::In,
            &request.payment_method,
            request.amount,
            request.fee,
            &self.config.provider_name,
            SYSTEM_ACTOR,
        );
        payment.provider_ref = request.provider_ref;
        payment.next_retry_at = Some(Utc::now() + self.config.retry.first_delay());

        let payment_id = self.payments().insert(payment);
        info!(%payment_id, account_id = request.account_id, amount = request.amount, "Payin opened");
        Ok(payment_id)
    }

    /// Feed a provider signal into the state machine
    pub fn handle_signal(
        &self,
        payment_id: PaymentId,
        signal: ProviderSignal,
        source: StatusSource,
    ) -> Result<SignalOutcome, LedgerError> {
        self.handle_signal_at(payment_id, signal, source, Utc::now())
    }

    /// [`handle_signal`](Self::handle_signal) with an explicit clock
    ///
    /// A final status on a payment still processing applies the ledger effect
    /// first and commits the status only if the ledger accepted it. If the
    /// ledger refuses, the payment stays processing with a retry scheduled
    /// and the ledger error is returned.
    pub fn handle_signal_at(
        &self,
        payment_id: PaymentId,
        signal: ProviderSignal,
        source: StatusSource,
        now: DateTime<Utc>,
    ) -> Result<SignalOutcome, LedgerError> {
        self.payments().with_payment(payment_id, |record| match signal.outcome() {
            ProviderOutcome::Final(to) if record.payment.status.is_terminal() => {
                let logged = StatusStateMachine::apply(
                    record,
                    to,
                    source,
                    SYSTEM_ACTOR,
                    signal.provider_state(),
                );
                Ok(match logged {
                    Ok(_) => SignalOutcome::Duplicate,
                    Err(_) => SignalOutcome::Discarded,
                })
            }
            ProviderOutcome::Final(to) => {
                StatusStateMachine::check(&record.payment, to, source)?;
                if let Err(e) = self.ops.apply_final_status(&record.payment, to) {
                    error!(
                        %payment_id,
                        status = %to,
                        error = %e,
                        "Ledger effect failed; payment stays processing"
                    );
                    self.schedule_retry(record, now);
                    return Err(e);
                }
                StatusStateMachine::apply(
                    record,
                    to,
                    source,
                    SYSTEM_ACTOR,
                    signal.provider_state(),
                )?;
                Ok(SignalOutcome::Applied(to))
            }
            ProviderOutcome::Inconclusive if record.payment.status.is_terminal() => {
                debug!(%payment_id, %source, "Inconclusive signal for final payment ignored");
                Ok(SignalOutcome::Discarded)
            }
            ProviderOutcome::Inconclusive => Ok(self.schedule_retry(record, now)),
        })
    }

    /// Advance the backoff of a payment that is still processing
    fn schedule_retry(&self, record: &mut PaymentRecord, now: DateTime<Utc>) -> SignalOutcome {
        let policy = &self.config.retry;
        let payment = &mut record.payment;
        payment.updated_at = now;

        if payment.retry_counter < policy.max_retries {
            payment.retry_counter += 1;
            let next_retry_at = now + policy.delay_for(payment.retry_counter);
            payment.next_retry_at = Some(next_retry_at);
            debug!(
                payment_id = %payment.payment_id,
                retry_counter = payment.retry_counter,
                %next_retry_at,
                "Payment still processing"
            );
            return SignalOutcome::Pending {
                retry_counter: payment.retry_counter,
                next_retry_at,
            };
        }

        let next_retry_at = now + policy.final_increment;
        payment.next_retry_at = Some(next_retry_at);
        if payment.escalated {
            return SignalOutcome::Pending {
                retry_counter: payment.retry_counter,
                next_retry_at,
            };
        }

        payment.escalated = true;
        warn!(
            payment_id = %payment.payment_id,
            retry_counter = payment.retry_counter,
            "Reconciliation retries exhausted"
        );
        self.review.submit(ReviewItem {
            payment_id: payment.payment_id,
            account_id: payment.account_id,
            reason: ReviewReason::ReconciliationExhausted {
                retry_counter: payment.retry_counter,
            },
            raised_at: now,
        });
        SignalOutcome::Escalated { next_retry_at }
    }

    /// Ask the provider for the current state of a payment
    ///
    /// Timeouts and transport failures come back as
    /// [`ProviderSignal::Unreachable`], never as an error.
    pub async fn inquire(&self, payment: &Payment) -> ProviderSignal {
        let call = self
            .provider
            .inquire_status(payment.payment_id, payment.provider_ref.as_deref());
        match call_with_timeout(self.config.provider_timeout, call).await {
            Ok(state) => ProviderSignal::State(state),
            Err(e) => {
                warn!(payment_id = %payment.payment_id, error = %e, "Status inquiry failed");
                ProviderSignal::Unreachable
            }
        }
    }

    /// Run one QUERY pass over every payment due at `now`
    pub async fn poll_due(&self, now: DateTime<Utc>) -> PollSummary {
        let due: Vec<Payment> = self
            .payments()
            .due_for_query(now)
            .into_iter()
            .filter_map(|id| self.payments().get(id))
            .collect();
        if due.is_empty() {
            return PollSummary::default();
        }

        let concurrency = self.config.max_concurrent_queries.max(1);
        let signals: Vec<(PaymentId, ProviderSignal)> = stream::iter(due)
            .map(|payment| async move { (payment.payment_id, self.inquire(&payment).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut summary = PollSummary {
            inquired: signals.len(),
            ..PollSummary::default()
        };
        for (payment_id, signal) in signals {
            match self.handle_signal_at(payment_id, signal, StatusSource::Query, now) {
                Ok(SignalOutcome::Applied(_)) => summary.resolved += 1,
                Ok(SignalOutcome::Pending { .. } | SignalOutcome::Escalated { .. }) => {
                    summary.pending += 1
                }
                Ok(SignalOutcome::Duplicate | SignalOutcome::Discarded) => {}
                Err(e) => {
                    summary.failed += 1;
                    error!(%payment_id, error = %e, "Reconciliation of payment failed");
                }
            }
        }
        summary
    }

    /// Poll due payments every `poll_interval` until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.config.poll_interval, "Reconciliation runner started");
        let mut interval = tokio::time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let summary = self.poll_due(Utc::now()).await;
                    if summary.inquired > 0 {
                        info!(
                            inquired = summary.inquired,
                            resolved = summary.resolved,
                            pending = summary.pending,
                            failed = summary.failed,
                            "Reconciliation cycle finished"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reconciliation runner stopped");
    }
}
