//! Ledger throughput benchmarks
//!
//! ```bash
//! cargo bench
//! ```
//!
//! - sequential credits on one account
//! - contended debits from several threads on one account
//! - two-account transfers in opposite directions
//! - replaying an in-memory operations export

use merchant_ledger::core::{LedgerReplay, LedgerStore};
use merchant_ledger::io::OperationRecord;
use merchant_ledger::types::{AccountType, BalanceBucket, MovementRequest, ReasonId};
use std::sync::Arc;
use std::thread;

fn main() {
    divan::main();
}

fn funded_store(accounts: u64, settled: u64) -> LedgerStore {
    let store = LedgerStore::new();
    for id in 1..=accounts {
        store
            .open_account(id, AccountType::Creditor)
            .expect("open account");
        store
            .apply_movement(MovementRequest::credit(
                id,
                BalanceBucket::Settled,
                ReasonId::TopUp,
                settled,
                "bench",
            ))
            .expect("seed balance");
    }
    store
}

#[divan::bench(args = [100, 1_000, 10_000])]
fn sequential_credits(n: u64) {
    let store = funded_store(1, 1);
    for _ in 0..n {
        store
            .apply_movement(MovementRequest::credit(
                1,
                BalanceBucket::Settled,
                ReasonId::TopUp,
                1,
                "bench",
            ))
            .expect("credit");
    }
}

#[divan::bench(args = [2, 4, 8])]
fn contended_debits(threads: usize) {
    let store = Arc::new(funded_store(1, 1_000_000));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..1_000 {
                    let _ = store.apply_movement(MovementRequest::debit(
                        1,
                        BalanceBucket::Settled,
                        ReasonId::OutSettlement,
                        1,
                        "bench",
                    ));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker panicked");
    }
}

#[divan::bench]
fn opposite_transfers() {
    let store = Arc::new(funded_store(2, 1_000_000));
    let handles: Vec<_> = [(1, 2), (2, 1)]
        .into_iter()
        .map(|(from, to)| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..1_000 {
                    let _ = store.transfer(from, to, 3, "bench");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker panicked");
    }
}

#[divan::bench]
fn replay_mixed_operations(bencher: divan::Bencher) {
    let records: Vec<Result<OperationRecord, String>> = (0..10_000u64)
        .map(|i| {
            let account = i % 50 + 1;
            Ok(match i % 5 {
                0 => OperationRecord::TopUp { account, amount: 1_000 },
                1 => OperationRecord::Hold { account, amount: 100 },
                2 => OperationRecord::Settle { account, amount: 50 },
                3 => OperationRecord::OutSettle { account, amount: 10 },
                _ => OperationRecord::Transfer {
                    from: account,
                    to: (account % 50) + 1,
                    amount: 5,
                },
            })
        })
        .collect();

    bencher
        .with_inputs(|| records.clone())
        .bench_values(|records| LedgerReplay::new("bench").replay(records));
}
