//! Rebuild a balance projection from an operations export
//!
//! Each record is applied to a fresh [`LedgerStore`] through the same
//! movement mappings the balance operations use. Accounts are opened on first
//! reference. A record the ledger refuses (for example an overdrawing
//! out-settlement) is reported and skipped; it never aborts the replay.

use tracing::warn;

use super::balance_ops::{hold_legs, out_settlement_leg, settlement_legs, top_up_leg};
use super::ledger_store::LedgerStore;
use crate::io::OperationRecord;
use crate::types::{Account, AccountId, AccountType, LedgerError};

/// Counters of a finished replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub applied: usize,
    pub rejected: usize,
    pub unreadable: usize,
}

pub struct LedgerReplay {
    store: LedgerStore,
    actor: String,
}

impl LedgerReplay {
    pub fn new(actor: &str) -> Self {
        Self {
            store: LedgerStore::new(),
            actor: actor.to_string(),
        }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.store.accounts()
    }

    /// Apply one operation
    pub fn process(&self, record: OperationRecord) -> Result<(), LedgerError> {
        let actor = self.actor.as_str();
        match record {
            OperationRecord::TopUp { account, amount } => {
                self.ensure_account(account);
                self.store.apply_movement(top_up_leg(account, amount, actor))?;
            }
            OperationRecord::Hold { account, amount } => {
                self.ensure_account(account);
                self.store.apply_batch(hold_legs(account, amount, actor))?;
            }
            OperationRecord::Settle { account, amount } => {
                self.ensure_account(account);
                self.store.apply_batch(settlement_legs(account, amount, actor))?;
            }
            OperationRecord::OutSettle { account, amount } => {
                self.ensure_account(account);
                self.store.apply_movement(out_settlement_leg(account, amount, actor))?;
            }
            OperationRecord::Transfer { from, to, amount } => {
                self.ensure_account(from);
                self.ensure_account(to);
                self.store.transfer(from, to, amount, actor)?;
            }
        }
        Ok(())
    }

    /// Apply every record of a reader, skipping the ones that fail
    pub fn replay<I>(&self, records: I) -> ReplayReport
    where
        I: IntoIterator<Item = Result<OperationRecord, String>>,
    {
        let mut report = ReplayReport::default();
        for record in records {
            match record {
                Ok(record) => match self.process(record) {
                    Ok(()) => report.applied += 1,
                    Err(e) => {
                        report.rejected += 1;
                        warn!(?record, error = %e, "Operation rejected");
                    }
                },
                Err(e) => {
                    report.unreadable += 1;
                    warn!(error = %e, "Unreadable row skipped");
                }
            }
        }
        report
    }

    fn ensure_account(&self, account_id: AccountId) {
        if self.store.account(account_id).is_none() {
            // Lost races surface as AccountExists, which is fine here.
            let _ = self.store.open_account(account_id, AccountType::Creditor);
        }
    }
}
