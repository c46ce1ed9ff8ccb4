//! CSV format handling for ledger operation exports and balance output
//!
//! - `CsvRecord` is the raw row of an operations export
//! - `convert_csv_record` turns it into a typed [`OperationRecord`]
//! - `write_accounts_csv` serializes the balance projection
//!
//! All functions are pure (no I/O beyond the writer handed in).

use serde::Deserialize;
use std::io::Write;

use crate::types::{Account, AccountId, Amount};

/// Raw row: `op,account,to,amount`
///
/// `to` is only meaningful for transfers.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvRecord {
    pub op: String,
    pub account: AccountId,
    pub to: Option<AccountId>,
    pub amount: Option<String>,
}

/// One ledger operation of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationRecord {
    TopUp { account: AccountId, amount: Amount },
    Hold { account: AccountId, amount: Amount },
    Settle { account: AccountId, amount: Amount },
    OutSettle { account: AccountId, amount: Amount },
    Transfer { from: AccountId, to: AccountId, amount: Amount },
}

/// Convert a CsvRecord to an OperationRecord
///
/// Op names are case-insensitive. Amounts are whole IDR and required for
/// every op; `to` is required for transfers.
///
/// # Returns
///
/// * `Ok(OperationRecord)` - Successfully converted record
/// * `Err(String)` - Error message describing the conversion failure
pub fn convert_csv_record(csv_record: CsvRecord) -> Result<OperationRecord, String> {
    let op = csv_record.op.to_lowercase();
    let account = csv_record.account;

    let amount = match csv_record.amount.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => raw
            .parse::<Amount>()
            .map_err(|_| format!("Invalid amount '{raw}' for {op} on account {account}"))?,
        _ => return Err(format!("{op} on account {account} requires an amount")),
    };

    let record = match op.as_str() {
        "top_up" => OperationRecord::TopUp { account, amount },
        "hold" => OperationRecord::Hold { account, amount },
        "settle" => OperationRecord::Settle { account, amount },
        "out_settle" => OperationRecord::OutSettle { account, amount },
        "transfer" => {
            let to = csv_record
                .to
                .ok_or_else(|| format!("transfer from account {account} requires a destination"))?;
            OperationRecord::Transfer {
                from: account,
                to,
                amount,
            }
        }
        _ => {
            return Err(format!(
                "Invalid operation: '{}' for account {account}",
                csv_record.op
            ))
        }
    };

    Ok(record)
}

/// Write account balances as CSV
///
/// Columns: account, type, settled, unsettled, total, status. Rows are
/// sorted by account id for deterministic output.
pub fn write_accounts_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), String> {
    let mut writer = csv::Writer::from_writer(output);

    writer
        .write_record(["account", "type", "settled", "unsettled", "total", "status"])
        .map_err(|e| format!("Failed to write CSV header: {e}"))?;

    let mut sorted_accounts = accounts.to_vec();
    sorted_accounts.sort_by_key(|account| account.account_id);

    for account in sorted_accounts {
        writer
            .write_record(&[
                account.account_id.to_string(),
                account.account_type.to_string(),
                account.settled_balance.to_string(),
                account.unsettled_balance.to_string(),
                account.total().to_string(),
                account.status.to_string(),
            ])
            .map_err(|e| format!("Failed to write account record: {e}"))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {e}"))?;

    Ok(())
}
