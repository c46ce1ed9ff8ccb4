//! Balance operations exposed to back-office and merchant users
//!
//! Every operation runs the same admission pipeline before touching the
//! ledger:
//!
//! 1. the authorization policy must grant the operation to the actor
//! 2. the actor's PIN must verify; a wrong PIN leaves an audit movement
//! 3. the amount and required fields are validated
//!
//! and then maps onto a fixed set of ledger movements. The engine's own ledger
//! effects (holds, payout finalization, payin credits) skip the PIN and are
//! recorded under the system actor.

use std::sync::Arc;
use tracing::{info, warn};

use super::authz::{AuthorizationPolicy, Operation};
use super::credentials::PinVerifier;
use super::ledger_store::LedgerStore;
use super::status::{PaymentStore, StatusStateMachine, Transition};
use crate::types::{
    Account, AccountId, Actor, Amount, BalanceBucket, CapitalType, LedgerError, Movement,
    MovementRequest, PayType, Payment, PaymentId, PaymentStatus, ReasonId, StatusSource,
    SYSTEM_ACTOR,
};

/// Single-account balance operation (top-up, hold, settlement, out-settlement)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRequest {
    pub account_id: AccountId,
    pub amount: Amount,
    pub pin: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub amount: Amount,
    pub pin: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversalRequest {
    pub payment_id: PaymentId,
    pub pin: String,
    pub notes: Option<String>,
}

/// Ledger side of the merchant back office
pub struct BalanceOperations {
    ledger: Arc<LedgerStore>,
    payments: Arc<PaymentStore>,
    pins: Arc<dyn PinVerifier>,
    policy: Arc<AuthorizationPolicy>,
}

impl BalanceOperations {
    pub fn new(
        ledger: Arc<LedgerStore>,
        payments: Arc<PaymentStore>,
        pins: Arc<dyn PinVerifier>,
        policy: Arc<AuthorizationPolicy>,
    ) -> Self {
        Self {
            ledger,
            payments,
            pins,
            policy,
        }
    }

    pub fn ledger(&self) -> &Arc<LedgerStore> {
        &self.ledger
    }

    pub fn payments(&self) -> &Arc<PaymentStore> {
        &self.payments
    }

    /// Credit the settled balance
    pub fn top_up(&self, actor: &Actor, request: BalanceRequest) -> Result<Movement, LedgerError> {
        self.admit(actor, Operation::TopUp, &request.pin, request.account_id, ReasonId::TopUp)?;
        require_amount(request.amount, "top-up")?;

        let movement = self.ledger.apply_movement(top_up_leg(
            request.account_id,
            request.amount,
            &actor.username,
        ))?;
        info!(
            account_id = request.account_id,
            amount = request.amount,
            actor = %actor.username,
            "Top-up applied"
        );
        Ok(movement)
    }

    /// Move funds from settled to unsettled
    pub fn hold_balance(
        &self,
        actor: &Actor,
        request: BalanceRequest,
    ) -> Result<Vec<Movement>, LedgerError> {
        self.admit(
            actor,
            Operation::HoldBalance,
            &request.pin,
            request.account_id,
            ReasonId::HoldBalance,
        )?;
        require_amount(request.amount, "hold balance")?;

        self.ledger
            .apply_batch(hold_legs(request.account_id, request.amount, &actor.username))
    }

    /// Move funds from unsettled to settled
    pub fn settlement(
        &self,
        actor: &Actor,
        request: BalanceRequest,
    ) -> Result<Vec<Movement>, LedgerError> {
        self.admit(
            actor,
            Operation::Settlement,
            &request.pin,
            request.account_id,
            ReasonId::Settlement,
        )?;
        require_amount(request.amount, "settlement")?;

        self.ledger
            .apply_batch(settlement_legs(request.account_id, request.amount, &actor.username))
    }

    /// Pay settled funds out to the merchant
    pub fn out_settlement(
        &self,
        actor: &Actor,
        request: BalanceRequest,
    ) -> Result<Movement, LedgerError> {
        self.admit(
            actor,
            Operation::OutSettlement,
            &request.pin,
            request.account_id,
            ReasonId::OutSettlement,
        )?;
        require_amount(request.amount, "out-settlement")?;

        self.ledger.apply_movement(out_settlement_leg(
            request.account_id,
            request.amount,
            &actor.username,
        ))
    }

    /// Transfer settled funds between two accounts
    pub fn balance_transfer(
        &self,
        actor: &Actor,
        request: TransferRequest,
    ) -> Result<(Movement, Movement), LedgerError> {
        self.admit(
            actor,
            Operation::BalanceTransfer,
            &request.pin,
            request.from_account,
            ReasonId::BalanceTransfer,
        )?;
        require_amount(request.amount, "balance transfer")?;

        self.ledger.transfer(
            request.from_account,
            request.to_account,
            request.amount,
            &actor.username,
        )
    }

    /// Reverse a successful payment
    ///
    /// Every balance-changing movement recorded for the payment is undone by
    /// its inverse, newest first, in one atomic batch; principal and fee are
    /// reversed together. The payment then moves to `REVERSED` with a manual
    /// log entry. Any other status fails with `InvalidTransition`, which is
    /// logged against the payment.
    pub fn reverse_manual_payment(
        &self,
        actor: &Actor,
        request: ReversalRequest,
    ) -> Result<Vec<Movement>, LedgerError> {
        let payment = self
            .payments
            .get(request.payment_id)
            .ok_or_else(|| LedgerError::payment_not_found(request.payment_id))?;
        let reason = match payment.pay_type {
            PayType::In => ReasonId::Payin,
            PayType::Out => ReasonId::Payout,
        };
        self.admit(
            actor,
            Operation::ReversePayment,
            &request.pin,
            payment.account_id,
            reason,
        )?;

        self.payments.with_payment(request.payment_id, |record| {
            let from = record.payment.status;
            if from != PaymentStatus::Success {
                // The attempt is logged either way; a repeat reversal is
                // recorded as Duplicate and must not move funds again.
                return match StatusStateMachine::apply(
                    record,
                    PaymentStatus::Reversed,
                    StatusSource::Manual,
                    &actor.username,
                    None,
                ) {
                    Ok(Transition::NoOp) => Err(LedgerError::invalid_transition(
                        request.payment_id,
                        from,
                        PaymentStatus::Reversed,
                    )),
                    Ok(Transition::Applied) => Err(LedgerError::invariant(format!(
                        "payment {} reversed from {from} without compensation",
                        request.payment_id
                    ))),
                    Err(e) => Err(e),
                };
            }

            let compensations: Vec<MovementRequest> = self
                .ledger
                .movements(record.payment.account_id)
                .into_iter()
                .filter(|m| m.payment_id == Some(request.payment_id))
                .filter(|m| m.capital_type != CapitalType::Unchanged)
                .rev()
                .map(|m| MovementRequest {
                    account_id: m.account_id,
                    payment_id: Some(request.payment_id),
                    reason: m.reason,
                    capital_type: m.capital_type.inverse(),
                    bucket: m.bucket,
                    amount: m.amount,
                    actor: actor.username.clone(),
                })
                .collect();

            let movements = self.ledger.apply_batch(compensations)?;
            if request.notes.is_some() {
                record.payment.notes = request.notes.clone();
            }
            StatusStateMachine::apply(
                record,
                PaymentStatus::Reversed,
                StatusSource::Manual,
                &actor.username,
                None,
            )?;
            info!(
                payment_id = %request.payment_id,
                movements = movements.len(),
                actor = %actor.username,
                "Payment reversed"
            );
            Ok(movements)
        })
    }

    /// Policy check for operations without a PIN or account
    pub fn authorize(&self, actor: &Actor, operation: Operation) -> Result<(), LedgerError> {
        self.policy.authorize(actor, operation)
    }

    /// Balance snapshot of an account
    pub fn view_balance(&self, actor: &Actor, account_id: AccountId) -> Result<Account, LedgerError> {
        self.policy
            .authorize_on(actor, Operation::ViewBalance, account_id)?;
        self.ledger
            .account(account_id)
            .ok_or_else(|| LedgerError::account_not_found(account_id))
    }

    /// Authorization and PIN check shared by every PIN-protected operation
    ///
    /// A refused actor or a wrong PIN is recorded as an `Unchanged` movement
    /// on `account_id` before the error is returned.
    pub fn admit(
        &self,
        actor: &Actor,
        operation: Operation,
        pin: &str,
        account_id: AccountId,
        reason: ReasonId,
    ) -> Result<(), LedgerError> {
        if let Err(e) = self.policy.authorize_on(actor, operation, account_id) {
            self.record_refusal(actor, account_id, reason);
            return Err(e);
        }

        if pin.trim().is_empty() {
            return Err(LedgerError::missing_field("pin"));
        }
        if self.pins.verify(&actor.username, pin)? {
            return Ok(());
        }

        warn!(
            username = %actor.username,
            operation = %operation,
            account_id,
            "Wrong PIN"
        );
        self.record_refusal(actor, account_id, reason);
        Err(LedgerError::wrong_pin(&actor.username))
    }

    fn record_refusal(&self, actor: &Actor, account_id: AccountId, reason: ReasonId) {
        let audit = MovementRequest::unchanged(
            account_id,
            BalanceBucket::Settled,
            reason,
            0,
            &actor.username,
        );
        if let Err(e) = self.ledger.record_audit(audit) {
            warn!(account_id, error = %e, "Could not record refusal audit movement");
        }
    }

    /// Reserve principal plus fee of an outgoing payment
    pub fn place_hold(&self, payment: &Payment, actor: &str) -> Result<Vec<Movement>, LedgerError> {
        let total = payment_total(payment)?;
        self.ledger.apply_batch(
            hold_legs(payment.account_id, total, actor)
                .into_iter()
                .map(|leg| leg.for_payment(payment.payment_id))
                .collect(),
        )
    }

    /// Return a failed payout's hold to the settled balance
    pub fn release_hold(&self, payment: &Payment) -> Result<Vec<Movement>, LedgerError> {
        let total = payment_total(payment)?;
        self.ledger.apply_batch(
            bucket_move_legs(
                payment.account_id,
                BalanceBucket::Unsettled,
                BalanceBucket::Settled,
                ReasonId::HoldBalance,
                total,
                SYSTEM_ACTOR,
            )
            .into_iter()
            .map(|leg| leg.for_payment(payment.payment_id))
            .collect(),
        )
    }

    /// Consume a successful payout's hold: principal and fee leave the ledger
    pub fn finalize_payout(&self, payment: &Payment) -> Result<Vec<Movement>, LedgerError> {
        let mut legs = vec![MovementRequest::debit(
            payment.account_id,
            BalanceBucket::Unsettled,
            ReasonId::Payout,
            payment.amount,
            SYSTEM_ACTOR,
        )
        .for_payment(payment.payment_id)];
        if payment.fee > 0 {
            legs.push(
                MovementRequest::debit(
                    payment.account_id,
                    BalanceBucket::Unsettled,
                    ReasonId::Fee,
                    payment.fee,
                    SYSTEM_ACTOR,
                )
                .for_payment(payment.payment_id),
            );
        }
        self.ledger.apply_batch(legs)
    }

    /// Credit a successful payin, net of its fee, to the unsettled balance
    pub fn credit_payin(&self, payment: &Payment) -> Result<Vec<Movement>, LedgerError> {
        let mut legs = vec![MovementRequest::credit(
            payment.account_id,
            BalanceBucket::Unsettled,
            ReasonId::Payin,
            payment.amount,
            SYSTEM_ACTOR,
        )
        .for_payment(payment.payment_id)];
        if payment.fee > 0 {
            legs.push(
                MovementRequest::debit(
                    payment.account_id,
                    BalanceBucket::Unsettled,
                    ReasonId::Fee,
                    payment.fee,
                    SYSTEM_ACTOR,
                )
                .for_payment(payment.payment_id),
            );
        }
        self.ledger.apply_batch(legs)
    }

    /// Ledger effect of a payment reaching a final provider status
    pub fn apply_final_status(
        &self,
        payment: &Payment,
        status: PaymentStatus,
    ) -> Result<Vec<Movement>, LedgerError> {
        match (payment.pay_type, status) {
            (PayType::Out, PaymentStatus::Success) => self.finalize_payout(payment),
            (PayType::Out, PaymentStatus::Failed) => self.release_hold(payment),
            (PayType::In, PaymentStatus::Success) => self.credit_payin(payment),
            (PayType::In, PaymentStatus::Failed) => Ok(Vec::new()),
            (_, other) => Err(LedgerError::invariant(format!(
                "no ledger effect defined for provider status {other}"
            ))),
        }
    }
}

/// TopUp: credit settled
pub fn top_up_leg(account_id: AccountId, amount: Amount, actor: &str) -> MovementRequest {
    MovementRequest::credit(account_id, BalanceBucket::Settled, ReasonId::TopUp, amount, actor)
}

/// OutSettlement: debit settled
pub fn out_settlement_leg(account_id: AccountId, amount: Amount, actor: &str) -> MovementRequest {
    MovementRequest::debit(
        account_id,
        BalanceBucket::Settled,
        ReasonId::OutSettlement,
        amount,
        actor,
    )
}

/// HoldBalance: settled to unsettled
pub fn hold_legs(account_id: AccountId, amount: Amount, actor: &str) -> Vec<MovementRequest> {
    bucket_move_legs(
        account_id,
        BalanceBucket::Settled,
        BalanceBucket::Unsettled,
        ReasonId::HoldBalance,
        amount,
        actor,
    )
}

/// Settlement: unsettled to settled
pub fn settlement_legs(account_id: AccountId, amount: Amount, actor: &str) -> Vec<MovementRequest> {
    bucket_move_legs(
        account_id,
        BalanceBucket::Unsettled,
        BalanceBucket::Settled,
        ReasonId::Settlement,
        amount,
        actor,
    )
}

fn bucket_move_legs(
    account_id: AccountId,
    from: BalanceBucket,
    to: BalanceBucket,
    reason: ReasonId,
    amount: Amount,
    actor: &str,
) -> Vec<MovementRequest> {
    vec![
        MovementRequest::debit(account_id, from, reason, amount, actor),
        MovementRequest::credit(account_id, to, reason, amount, actor),
    ]
}

fn require_amount(amount: Amount, operation: &str) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::invalid_amount(operation));
    }
    Ok(())
}

fn payment_total(payment: &Payment) -> Result<Amount, LedgerError> {
    payment
        .amount
        .checked_add(payment.fee)
        .ok_or_else(|| LedgerError::invalid_amount("payment total"))
}
