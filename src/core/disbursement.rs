//! Outgoing disbursements to a merchant's beneficiary bank account
//!
//! The orchestrator validates and reserves funds locally, then hands the
//! payout to the provider. The provider's synchronous answer is fed into the
//! reconciliation scheduler as a CALLBACK signal, so a declined submission
//! releases the hold through the same path an asynchronous callback would.

use std::sync::Arc;
use tracing::{info, warn};

use super::authz::Operation;
use super::balance_ops::BalanceOperations;
use super::bank_codes::BankCodeTranslator;
use super::reconciliation::{ProviderSignal, ReconciliationScheduler};
use super::review::{ReviewItem, ReviewQueue, ReviewReason};
use crate::config::EngineConfig;
use crate::provider::{
    call_with_timeout, DisbursementPayload, PaymentProvider, HTTP_OK, HTTP_UNPROCESSABLE,
};
use crate::types::{
    AccountId, Actor, Amount, BalanceBucket, LedgerError, PayType, Payment, PaymentId, ReasonId,
    StatusSource,
};

pub const PAYMENT_METHOD_DISBURSEMENT: &str = "disbursement";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisbursementRequest {
    pub account_id: AccountId,
    pub amount: Amount,
    /// Internal bank code, e.g. `IDR_014`
    pub bank_code: String,
    pub account_number: String,
    /// Holder name as typed by the merchant
    pub account_name: String,
    pub pin: String,
    pub notes: Option<String>,
}

impl DisbursementRequest {
    fn validate(&self) -> Result<(), LedgerError> {
        let required = [
            ("bank_code", &self.bank_code),
            ("account_number", &self.account_number),
            ("account_name", &self.account_name),
            ("pin", &self.pin),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(LedgerError::missing_field(field));
        }
        if self.amount == 0 {
            return Err(LedgerError::invalid_amount("disbursement"));
        }
        Ok(())
    }
}

pub struct DisbursementOrchestrator {
    config: Arc<EngineConfig>,
    banks: Arc<BankCodeTranslator>,
    ops: Arc<BalanceOperations>,
    scheduler: Arc<ReconciliationScheduler>,
    provider: Arc<dyn PaymentProvider>,
    review: Arc<dyn ReviewQueue>,
}

impl DisbursementOrchestrator {
    /// Wire the orchestrator
    ///
    /// The name-match threshold of `config` takes precedence over the one the
    /// translator was built with.
    pub fn new(
        config: Arc<EngineConfig>,
        banks: Arc<BankCodeTranslator>,
        ops: Arc<BalanceOperations>,
        scheduler: Arc<ReconciliationScheduler>,
        provider: Arc<dyn PaymentProvider>,
        review: Arc<dyn ReviewQueue>,
    ) -> Self {
        let banks = if banks.name_match_threshold() == config.name_match_threshold {
            banks
        } else {
            Arc::new(
                BankCodeTranslator::clone(&banks)
                    .with_name_match_threshold(config.name_match_threshold),
            )
        };
        Self {
            config,
            banks,
            ops,
            scheduler,
            provider,
            review,
        }
    }

    /// Disburse settled funds to a bank account
    ///
    /// # Returns
    ///
    /// * `Ok(PaymentId)` - the payment was created and its funds held; its
    ///   final status arrives through reconciliation
    /// * `Err(LedgerError)` - nothing was held and no payment exists
    pub async fn disburse(
        &self,
        request: DisbursementRequest,
        actor: &Actor,
    ) -> Result<PaymentId, LedgerError> {
        request.validate()?;
        self.ops.admit(
            actor,
            Operation::Disburse,
            &request.pin,
            request.account_id,
            ReasonId::Payout,
        )?;

        let fee = self.config.disbursement_fee;
        let total = request
            .amount
            .checked_add(fee)
            .ok_or_else(|| LedgerError::invalid_amount("disbursement"))?;
        let account = self
            .ops
            .ledger()
            .account(request.account_id)
            .ok_or_else(|| LedgerError::account_not_found(request.account_id))?;
        if account.settled_balance < total {
            return Err(LedgerError::insufficient_balance(
                request.account_id,
                BalanceBucket::Settled,
                account.settled_balance,
                total,
            ));
        }

        let bank = self.banks.translate(&request.bank_code)?.clone();

        let float = call_with_timeout(self.config.provider_timeout, self.provider.get_balance()).await?;
        if float < request.amount {
            warn!(available = float, requested = request.amount, "Provider float too low");
            return Err(LedgerError::ProviderBalanceTooLow {
                available: float,
                requested: request.amount,
            });
        }

        let inquiry = call_with_timeout(
            self.config.provider_timeout,
            self.provider
                .inquire_account(bank.provider_id, &request.account_number),
        )
        .await;

        let payment = Payment::new(
            request.account_id,
            PayType::Out,
            PAYMENT_METHOD_DISBURSEMENT,
            request.amount,
            fee,
            &self.config.provider_name,
            &actor.username,
        )
        .with_notes(request.notes.clone());
        let payment_id = payment.payment_id;

        self.ops.place_hold(&payment, &actor.username)?;
        self.scheduler.payments().insert(payment.clone());
        info!(
            %payment_id,
            account_id = request.account_id,
            amount = request.amount,
            fee,
            bank = %bank.name,
            "Disbursement funds held"
        );

        match inquiry {
            Ok(returned) => {
                let check = self.banks.check_account_name(&request.account_name, &returned);
                if check.flagged {
                    self.review.submit(ReviewItem {
                        payment_id,
                        account_id: request.account_id,
                        reason: ReviewReason::NameMismatch {
                            expected: request.account_name.clone(),
                            returned,
                            similarity: check.similarity,
                        },
                        raised_at: payment.created_at,
                    });
                }
            }
            Err(e) => warn!(%payment_id, error = %e, "Account inquiry failed; continuing"),
        }

        let payload = DisbursementPayload {
            sender_first_name: self.config.sender.first_name.clone(),
            sender_last_name: self.config.sender.last_name.clone(),
            bank_id: bank.provider_id,
            account_number: request.account_number,
            account_name: request.account_name,
            amount: request.amount,
            currency: "IDR".to_string(),
            country_iso: "IDN".to_string(),
            notes: self.config.disbursement_notes.clone(),
            mode: "DESTINATION".to_string(),
            external_id: payment_id,
        };

        let submitted = call_with_timeout(
            self.config.provider_timeout,
            self.provider.submit_disbursement(&payload),
        )
        .await;
        let signal = match submitted {
            Ok(response) => {
                if let Some(provider_ref) = response.provider_ref.clone() {
                    self.scheduler.payments().with_payment(payment_id, |record| {
                        record.payment.provider_ref = Some(provider_ref);
                        Ok(())
                    })?;
                }
                match response.http_status {
                    HTTP_UNPROCESSABLE => ProviderSignal::Rejected(response.provider_state),
                    HTTP_OK => ProviderSignal::State(response.provider_state),
                    status => {
                        warn!(%payment_id, status, "Unexpected provider status on submission");
                        ProviderSignal::Unreachable
                    }
                }
            }
            Err(e) => {
                warn!(%payment_id, error = %e, "Disbursement submission unanswered");
                ProviderSignal::Unreachable
            }
        };

        if let Err(e) = self
            .scheduler
            .handle_signal(payment_id, signal, StatusSource::Callback)
        {
            warn!(%payment_id, error = %e, "Submission result not applied; left to reconciliation");
        }
        Ok(payment_id)
    }

    pub fn name_match_threshold(&self) -> f64 {
        self.banks.name_match_threshold()
    }

    /// Float currently available at the provider
    pub async fn provider_balance(&self, actor: &Actor) -> Result<Amount, LedgerError> {
        self.ops.authorize(actor, Operation::ViewBalance)?;
        call_with_timeout(self.config.provider_timeout, self.provider.get_balance()).await
    }
}
