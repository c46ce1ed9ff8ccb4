//! Ledger store: append-only movement log plus balance projection
//!
//! Each account lives behind its own mutex together with its movement log, so
//! reading `balance_before`, computing `balance_after` and appending the
//! movement happen in one critical section. Units touching several accounts
//! (settlements, transfers, reversals) lock every involved account in
//! ascending id order, compute on scratch copies and commit only when every
//! leg succeeded.
//!
//! # Thread Safety
//!
//! The account map is a `DashMap` of `Arc<Mutex<_>>`. Map shard locks are held
//! only long enough to clone the `Arc`; they are never held while waiting on
//! an account mutex.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::types::{
    Account, AccountId, AccountStatus, AccountType, Amount, BalanceBucket, CapitalType,
    LedgerError, Movement, MovementRequest, ReasonId,
};

#[derive(Debug)]
struct AccountLedger {
    account: Account,
    movements: Vec<Movement>,
}

/// Thread-safe ledger of accounts and their movements
#[derive(Debug)]
pub struct LedgerStore {
    accounts: DashMap<AccountId, Arc<Mutex<AccountLedger>>>,
    next_movement_id: AtomicU64,
}

fn lock(ledger: &Mutex<AccountLedger>) -> MutexGuard<'_, AccountLedger> {
    // A panic inside a critical section never leaves a half-written account:
    // state is only written back after every leg succeeded.
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LedgerStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            next_movement_id: AtomicU64::new(1),
        }
    }

    /// Create an account at merchant onboarding
    pub fn open_account(
        &self,
        account_id: AccountId,
        account_type: AccountType,
    ) -> Result<Account, LedgerError> {
        let account = Account::new(account_id, account_type);
        match self.accounts.entry(account_id) {
            Entry::Occupied(_) => Err(LedgerError::AccountExists { account_id }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(AccountLedger {
                    account: account.clone(),
                    movements: Vec::new(),
                })));
                info!(account_id, %account_type, "Account opened");
                Ok(account)
            }
        }
    }

    /// Deactivate an account; it keeps its history and balances
    pub fn deactivate(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        let handle = self.handle(account_id)?;
        let mut ledger = lock(&handle);
        ledger.account.status = AccountStatus::Inactive;
        info!(account_id, "Account deactivated");
        Ok(ledger.account.clone())
    }

    /// Snapshot of an account's balances
    pub fn account(&self, account_id: AccountId) -> Option<Account> {
        let handle = self.accounts.get(&account_id).map(|e| Arc::clone(e.value()))?;
        let ledger = lock(&handle);
        Some(ledger.account.clone())
    }

    /// Snapshot of every account, sorted by id
    pub fn accounts(&self) -> Vec<Account> {
        let handles: Vec<_> = self
            .accounts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut accounts: Vec<Account> = handles.iter().map(|h| lock(h).account.clone()).collect();
        accounts.sort_by_key(|a| a.account_id);
        accounts
    }

    /// Movements of one account in write order
    pub fn movements(&self, account_id: AccountId) -> Vec<Movement> {
        match self.accounts.get(&account_id).map(|e| Arc::clone(e.value())) {
            Some(handle) => lock(&handle).movements.clone(),
            None => Vec::new(),
        }
    }

    /// Every movement across the ledger, ordered by movement id
    pub fn all_movements(&self) -> Vec<Movement> {
        let handles: Vec<_> = self
            .accounts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut movements: Vec<Movement> = handles
            .iter()
            .flat_map(|h| lock(h).movements.clone())
            .collect();
        movements.sort_by_key(|m| m.movement_id);
        movements
    }

    /// Apply a single movement atomically
    ///
    /// # Returns
    ///
    /// * `Ok(Movement)` - the appended movement
    /// * `Err(LedgerError::InsufficientBalance)` - a debit larger than the bucket balance
    /// * `Err(LedgerError::AccountInactive)` - credit or debit on a deactivated account
    /// * `Err(LedgerError::BalanceOverflow)` - a credit that would overflow
    pub fn apply_movement(&self, request: MovementRequest) -> Result<Movement, LedgerError> {
        let mut applied = self.apply_batch(vec![request])?;
        applied
            .pop()
            .ok_or_else(|| LedgerError::invariant("single movement batch produced no movement"))
    }

    /// Append an audit-only movement that leaves the balance unchanged
    pub fn record_audit(&self, mut request: MovementRequest) -> Result<Movement, LedgerError> {
        request.capital_type = CapitalType::Unchanged;
        self.apply_movement(request)
    }

    /// Apply several movements as one all-or-nothing unit
    ///
    /// Legs are evaluated in order, so a later leg sees the effect of earlier
    /// legs on the same bucket. If any leg fails nothing is recorded.
    pub fn apply_batch(&self, requests: Vec<MovementRequest>) -> Result<Vec<Movement>, LedgerError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let ids: BTreeSet<AccountId> = requests.iter().map(|r| r.account_id).collect();
        let handles = ids
            .iter()
            .map(|id| self.handle(*id).map(|h| (*id, h)))
            .collect::<Result<Vec<_>, _>>()?;

        // Ascending id order; every multi-account unit uses the same order.
        let mut guards: Vec<(AccountId, MutexGuard<'_, AccountLedger>)> =
            handles.iter().map(|(id, h)| (*id, lock(h))).collect();

        let mut scratch: HashMap<AccountId, Account> = guards
            .iter()
            .map(|(id, guard)| (*id, guard.account.clone()))
            .collect();

        let now = Utc::now();
        let mut pending = Vec::with_capacity(requests.len());
        for request in requests {
            let account = scratch
                .get_mut(&request.account_id)
                .ok_or_else(|| LedgerError::account_not_found(request.account_id))?;
            let (before, after) = compute_leg(account, &request)?;
            *account.balance_mut(request.bucket) = after;
            pending.push(Movement {
                movement_id: 0,
                account_id: request.account_id,
                payment_id: request.payment_id,
                reason: request.reason,
                capital_type: request.capital_type,
                bucket: request.bucket,
                amount: request.amount,
                balance_before: before,
                balance_after: after,
                created_by: request.actor,
                created_at: now,
            });
        }

        // Every leg validated: commit projections and append movements.
        for (id, guard) in guards.iter_mut() {
            let id: AccountId = *id;
            if let Some(account) = scratch.remove(&id) {
                guard.account = account;
            }
        }
        for movement in pending.iter_mut() {
            movement.movement_id = self.next_movement_id.fetch_add(1, Ordering::SeqCst);
            if let Some((_, guard)) = guards.iter_mut().find(|(id, _)| *id == movement.account_id) {
                guard.movements.push(movement.clone());
            }
            debug!(
                movement_id = movement.movement_id,
                account_id = movement.account_id,
                reason = %movement.reason,
                capital_type = %movement.capital_type,
                bucket = %movement.bucket,
                amount = movement.amount,
                balance_after = movement.balance_after,
                "Movement recorded"
            );
        }

        Ok(pending)
    }

    /// Move settled funds between two accounts atomically
    ///
    /// An underfunded source fails with `InsufficientBalance` and the
    /// destination is never touched. Any other failure of the unit is reported
    /// as `TransferFailed`. On failure neither account changes.
    pub fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        actor: &str,
    ) -> Result<(Movement, Movement), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::invalid_amount("balance transfer"));
        }
        if from == to {
            return Err(LedgerError::transfer_failed(
                from,
                to,
                "source and destination are the same account",
            ));
        }

        let legs = vec![
            MovementRequest::debit(
                from,
                BalanceBucket::Settled,
                ReasonId::BalanceTransfer,
                amount,
                actor,
            ),
            MovementRequest::credit(
                to,
                BalanceBucket::Settled,
                ReasonId::BalanceTransfer,
                amount,
                actor,
            ),
        ];

        match self.apply_batch(legs) {
            Ok(mut movements) if movements.len() == 2 => {
                let credit = movements.remove(1);
                let debit = movements.remove(0);
                info!(from, to, amount, "Balance transferred");
                Ok((debit, credit))
            }
            Ok(_) => Err(LedgerError::invariant("transfer produced an unexpected number of legs")),
            Err(e)
                if matches!(e, LedgerError::InsufficientBalance { account_id, .. } if account_id == from) =>
            {
                warn!(from, to, amount, "Transfer rejected: insufficient source balance");
                Err(e)
            }
            Err(e) => {
                warn!(from, to, amount, error = %e, "Transfer failed");
                Err(LedgerError::transfer_failed(from, to, e.to_string()))
            }
        }
    }

    fn handle(&self, account_id: AccountId) -> Result<Arc<Mutex<AccountLedger>>, LedgerError> {
        self.accounts
            .get(&account_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LedgerError::account_not_found(account_id))
    }
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute (before, after) for one leg against the scratch account
fn compute_leg(account: &Account, request: &MovementRequest) -> Result<(Amount, Amount), LedgerError> {
    let before = account.balance(request.bucket);

    if request.capital_type == CapitalType::Unchanged {
        return Ok((before, before));
    }
    if !account.is_active() {
        return Err(LedgerError::AccountInactive {
            account_id: account.account_id,
        });
    }
    if request.amount == 0 {
        return Err(LedgerError::invalid_amount(request.reason.as_str()));
    }

    let after = match request.capital_type {
        CapitalType::Credit => before.checked_add(request.amount).ok_or(
            LedgerError::BalanceOverflow {
                account_id: account.account_id,
                bucket: request.bucket,
            },
        )?,
        CapitalType::Debit => before.checked_sub(request.amount).ok_or_else(|| {
            LedgerError::insufficient_balance(
                account.account_id,
                request.bucket,
                before,
                request.amount,
            )
        })?,
        CapitalType::Unchanged => before,
    };

    Ok((before, after))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rstest::rstest;
    use std::thread;
    use uuid::Uuid;

    fn store_with(accounts: &[(AccountId, Amount)]) -> LedgerStore {
        let store = LedgerStore::new();
        for (id, settled) in accounts {
            store.open_account(*id, AccountType::Creditor).unwrap();
            if *settled > 0 {
                store
                    .apply_movement(MovementRequest::credit(
                        *id,
                        BalanceBucket::Settled,
                        ReasonId::TopUp,
                        *settled,
                        "seed",
                    ))
                    .unwrap();
            }
        }
        store
    }

    #[test]
    fn test_open_account_twice_fails() {
        let store = LedgerStore::new();
        store.open_account(1, AccountType::Creditor).unwrap();

        let result = store.open_account(1, AccountType::Debitor);

        assert_eq!(result.unwrap_err(), LedgerError::AccountExists { account_id: 1 });
    }

    #[test]
    fn test_credit_records_before_and_after() {
        let store = store_with(&[(1, 0)]);

        let movement = store
            .apply_movement(MovementRequest::credit(
                1,
                BalanceBucket::Settled,
                ReasonId::TopUp,
                10000,
                "finance01",
            ))
            .unwrap();

        assert_eq!(movement.capital_type, CapitalType::Credit);
        assert_eq!(movement.balance_before, 0);
        assert_eq!(movement.balance_after, 10000);
        assert_eq!(movement.created_by, "finance01");
        assert_eq!(store.account(1).unwrap().settled_balance, 10000);
    }

    #[test]
    fn test_debit_beyond_balance_fails_and_leaves_no_trace() {
        let store = store_with(&[(1, 10000)]);
        let movements_before = store.movements(1).len();

        let result = store.apply_movement(MovementRequest::debit(
            1,
            BalanceBucket::Settled,
            ReasonId::OutSettlement,
            15000,
            "finance01",
        ));

        assert_eq!(
            result.unwrap_err(),
            LedgerError::insufficient_balance(1, BalanceBucket::Settled, 10000, 15000)
        );
        assert_eq!(store.account(1).unwrap().settled_balance, 10000);
        assert_eq!(store.movements(1).len(), movements_before);
    }

    #[test]
    fn test_debit_exact_balance_succeeds() {
        let store = store_with(&[(1, 500)]);

        let movement = store
            .apply_movement(MovementRequest::debit(
                1,
                BalanceBucket::Settled,
                ReasonId::OutSettlement,
                500,
                "ops",
            ))
            .unwrap();

        assert_eq!(movement.balance_after, 0);
    }

    #[test]
    fn test_credit_overflow_rejected() {
        let store = store_with(&[(1, u64::MAX)]);

        let result = store.apply_movement(MovementRequest::credit(
            1,
            BalanceBucket::Settled,
            ReasonId::TopUp,
            1,
            "ops",
        ));

        assert!(matches!(result, Err(LedgerError::BalanceOverflow { account_id: 1, .. })));
        assert_eq!(store.account(1).unwrap().settled_balance, u64::MAX);
    }

    #[rstest]
    #[case(CapitalType::Credit)]
    #[case(CapitalType::Debit)]
    fn test_zero_amount_rejected(#[case] capital_type: CapitalType) {
        let store = store_with(&[(1, 100)]);
        let mut request =
            MovementRequest::credit(1, BalanceBucket::Settled, ReasonId::TopUp, 0, "ops");
        request.capital_type = capital_type;

        let result = store.apply_movement(request);

        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
    }

    #[test]
    fn test_unknown_account() {
        let store = LedgerStore::new();

        let result = store.apply_movement(MovementRequest::credit(
            42,
            BalanceBucket::Settled,
            ReasonId::TopUp,
            1,
            "ops",
        ));

        assert_eq!(result.unwrap_err(), LedgerError::account_not_found(42));
    }

    #[test]
    fn test_inactive_account_rejects_movements_but_accepts_audit() {
        let store = store_with(&[(1, 100)]);
        store.deactivate(1).unwrap();

        let credit = store.apply_movement(MovementRequest::credit(
            1,
            BalanceBucket::Settled,
            ReasonId::TopUp,
            1,
            "ops",
        ));
        let audit = store.record_audit(MovementRequest::credit(
            1,
            BalanceBucket::Settled,
            ReasonId::TopUp,
            1,
            "ops",
        ));

        assert_eq!(credit.unwrap_err(), LedgerError::AccountInactive { account_id: 1 });
        let audit = audit.unwrap();
        assert_eq!(audit.capital_type, CapitalType::Unchanged);
        assert_eq!(audit.balance_before, 100);
        assert_eq!(audit.balance_after, 100);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let store = store_with(&[(1, 100)]);

        let result = store.apply_batch(vec![
            MovementRequest::debit(1, BalanceBucket::Settled, ReasonId::HoldBalance, 60, "ops"),
            MovementRequest::credit(1, BalanceBucket::Unsettled, ReasonId::HoldBalance, 60, "ops"),
            MovementRequest::debit(1, BalanceBucket::Settled, ReasonId::HoldBalance, 60, "ops"),
        ]);

        assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));
        let account = store.account(1).unwrap();
        assert_eq!(account.settled_balance, 100);
        assert_eq!(account.unsettled_balance, 0);
        assert_eq!(store.movements(1).len(), 1);
    }

    #[test]
    fn test_batch_legs_see_earlier_legs() {
        let store = store_with(&[(1, 0)]);

        let movements = store
            .apply_batch(vec![
                MovementRequest::credit(1, BalanceBucket::Unsettled, ReasonId::Payin, 1000, "SYSTEM"),
                MovementRequest::debit(1, BalanceBucket::Unsettled, ReasonId::Fee, 50, "SYSTEM"),
            ])
            .unwrap();

        assert_eq!(movements[1].balance_before, 1000);
        assert_eq!(movements[1].balance_after, 950);
        assert!(movements[0].movement_id < movements[1].movement_id);
    }

    #[test]
    fn test_payment_id_is_kept() {
        let store = store_with(&[(1, 0)]);
        let payment_id = Uuid::new_v4();

        let movement = store
            .apply_movement(
                MovementRequest::credit(1, BalanceBucket::Unsettled, ReasonId::Payin, 10, "SYSTEM")
                    .for_payment(payment_id),
            )
            .unwrap();

        assert_eq!(movement.payment_id, Some(payment_id));
    }

    #[test]
    fn test_transfer_preserves_sum() {
        let store = store_with(&[(1, 1000), (2, 250)]);

        let (debit, credit) = store.transfer(1, 2, 400, "finance01").unwrap();

        assert_eq!(debit.capital_type, CapitalType::Debit);
        assert_eq!(credit.capital_type, CapitalType::Credit);
        assert_eq!(debit.reason, ReasonId::BalanceTransfer);
        let a = store.account(1).unwrap();
        let b = store.account(2).unwrap();
        assert_eq!(a.settled_balance, 600);
        assert_eq!(b.settled_balance, 650);
        assert_eq!(a.settled_balance + b.settled_balance, 1250);
    }

    #[test]
    fn test_transfer_insufficient_source_touches_nothing() {
        let store = store_with(&[(1, 100), (2, 50)]);
        let before = (store.account(1).unwrap(), store.account(2).unwrap());

        let result = store.transfer(1, 2, 101, "finance01");

        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance { account_id: 1, .. })
        ));
        assert_eq!(store.account(1).unwrap(), before.0);
        assert_eq!(store.account(2).unwrap(), before.1);
        assert!(store.movements(2).len() == 1);
    }

    #[test]
    fn test_transfer_to_inactive_destination_fails_atomically() {
        let store = store_with(&[(1, 100), (2, 0)]);
        store.deactivate(2).unwrap();

        let result = store.transfer(1, 2, 40, "finance01");

        assert!(matches!(result, Err(LedgerError::TransferFailed { from: 1, to: 2, .. })));
        assert_eq!(store.account(1).unwrap().settled_balance, 100);
        assert_eq!(store.account(2).unwrap().settled_balance, 0);
    }

    #[test]
    fn test_transfer_to_missing_destination_fails() {
        let store = store_with(&[(1, 100)]);

        let result = store.transfer(1, 9, 40, "finance01");

        assert!(matches!(result, Err(LedgerError::TransferFailed { .. })));
        assert_eq!(store.account(1).unwrap().settled_balance, 100);
    }

    #[test]
    fn test_transfer_to_self_fails() {
        let store = store_with(&[(1, 100)]);

        let result = store.transfer(1, 1, 40, "finance01");

        assert!(matches!(result, Err(LedgerError::TransferFailed { .. })));
    }

    #[test]
    fn test_movement_ids_are_unique_and_increasing() {
        let store = store_with(&[(1, 100), (2, 100)]);
        store.transfer(1, 2, 10, "ops").unwrap();
        store.transfer(2, 1, 5, "ops").unwrap();

        let ids: Vec<_> = store.all_movements().iter().map(|m| m.movement_id).collect();

        let mut sorted = ids.clone();
        sorted.dedup();
        assert_eq!(ids.len(), sorted.len());
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_random_sequences_never_go_negative() {
        let mut rng = StdRng::seed_from_u64(0x1ED6E5);
        let store = store_with(&[(1, 0), (2, 0)]);

        for _ in 0..2000 {
            let account_id = rng.gen_range(1..=2);
            let bucket = if rng.gen_bool(0.5) {
                BalanceBucket::Settled
            } else {
                BalanceBucket::Unsettled
            };
            let amount = rng.gen_range(1..=5000);
            let before = store.account(account_id).unwrap();

            let request = if rng.gen_bool(0.5) {
                MovementRequest::credit(account_id, bucket, ReasonId::TopUp, amount, "prop")
            } else {
                MovementRequest::debit(account_id, bucket, ReasonId::OutSettlement, amount, "prop")
            };
            let is_debit = request.capital_type == CapitalType::Debit;

            match store.apply_movement(request) {
                Ok(movement) => {
                    if is_debit {
                        assert_eq!(movement.balance_after, movement.balance_before - amount);
                    } else {
                        assert_eq!(movement.balance_after, movement.balance_before + amount);
                    }
                }
                Err(LedgerError::InsufficientBalance { .. }) => {
                    assert!(is_debit);
                    assert!(before.balance(bucket) < amount);
                    assert_eq!(store.account(account_id).unwrap(), before);
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
    }

    #[test]
    fn test_concurrent_debits_never_overdraw() {
        let store = Arc::new(store_with(&[(1, 1000)]));
        let mut handles = vec![];

        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let mut succeeded = 0;
                for _ in 0..20 {
                    let result = store.apply_movement(MovementRequest::debit(
                        1,
                        BalanceBucket::Settled,
                        ReasonId::OutSettlement,
                        7,
                        "worker",
                    ));
                    if result.is_ok() {
                        succeeded += 1;
                    }
                }
                succeeded
            }));
        }

        let succeeded: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // 1000 / 7 = 142 debits fit; the rest must be rejected.
        assert_eq!(succeeded, 142);
        assert_eq!(store.account(1).unwrap().settled_balance, 1000 - 142 * 7);
    }

    #[test]
    fn test_concurrent_opposite_transfers_do_not_deadlock() {
        let store = Arc::new(store_with(&[(1, 10_000), (2, 10_000)]));
        let mut handles = vec![];

        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let (from, to) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
                for _ in 0..200 {
                    let _ = store.transfer(from, to, 3, "worker");
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let total = store.account(1).unwrap().settled_balance + store.account(2).unwrap().settled_balance;
        assert_eq!(total, 20_000);
    }
}
