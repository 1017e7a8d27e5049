//! Transfer engine behaviour under failure and concurrency (in-process store)

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;

use common::*;
use ledger_bank::store::{LedgerError, LedgerStore, MemoryStore};
use ledger_bank::transfer::{TransferEngine, TransferTxParams};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn engine_on(store: &MemoryStore) -> TransferEngine {
    TransferEngine::new(Arc::new(store.clone()))
}

#[tokio::test]
async fn test_transfer_read_after_write() {
    let store = MemoryStore::new();
    let a = create_account_with_balance(&store, 100).await;
    let b = create_account_with_balance(&store, 50).await;
    let engine = engine_on(&store);

    let res = engine
        .transfer_tx(TransferTxParams::new(a.id, b.id, 30))
        .await
        .unwrap();

    assert_eq!(store.get_account(a.id).await.unwrap(), res.from_account);
    assert_eq!(store.get_account(b.id).await.unwrap(), res.to_account);
    assert_eq!(store.get_transfer(res.transfer.id).await.unwrap(), res.transfer);
    assert_eq!(store.get_entry(res.from_entry.id).await.unwrap(), res.from_entry);
    assert_eq!(store.get_entry(res.to_entry.id).await.unwrap(), res.to_entry);
    assert_eq!(res.from_entry.amount + res.to_entry.amount, 0);
}

#[tokio::test]
async fn test_failure_after_each_step_leaves_nothing_behind() {
    // 2 = debit entry, 3 = credit entry, 4/5 = balance updates
    for fail_on_write in 2..=5 {
        let store = MemoryStore::new();
        let a = create_account_with_balance(&store, 100).await;
        let b = create_account_with_balance(&store, 50).await;
        let faulty = Arc::new(FaultyStore::new(store.clone(), fail_on_write));
        let engine = TransferEngine::new(faulty.clone());

        let err = engine
            .transfer_tx(TransferTxParams::new(a.id, b.id, 30))
            .await
            .unwrap_err();
        assert!(
            matches!(err, LedgerError::Storage(ref m) if m.contains("injected")),
            "write {}: unexpected error {}",
            fail_on_write,
            err
        );

        assert_eq!(balance_of(&store, a.id).await, 100);
        assert_eq!(balance_of(&store, b.id).await, 50);
        assert!(entries_of(&store, a.id).await.is_empty());
        assert!(entries_of(&store, b.id).await.is_empty());
        assert!(transfers_of(&store, a.id).await.is_empty());
        assert_eq!(faulty.units_begun(), 1, "no retries expected");
    }
}

#[tokio::test]
async fn test_rollback_failure_reports_both_errors() {
    let store = MemoryStore::new();
    let a = create_account_with_balance(&store, 100).await;
    let b = create_account_with_balance(&store, 50).await;
    let faulty = FaultyStore::new(store.clone(), 3).with_failing_rollback();
    let engine = TransferEngine::new(Arc::new(faulty));

    let err = engine
        .transfer_tx(TransferTxParams::new(a.id, b.id, 30))
        .await
        .unwrap_err();

    match err {
        LedgerError::RollbackFailed { original, rollback } => {
            assert!(matches!(*original, LedgerError::Storage(_)));
            assert!(matches!(*rollback, LedgerError::StorageUnavailable(_)));
        }
        other => panic!("expected RollbackFailed, got {}", other),
    }
    assert_eq!(balance_of(&store, a.id).await, 100);
}

#[tokio::test]
async fn test_missing_account_rejected_without_side_effects() {
    let store = MemoryStore::new();
    let a = create_account_with_balance(&store, 100).await;
    let engine = engine_on(&store);

    for params in [
        TransferTxParams::new(a.id, 987_654, 10),
        TransferTxParams::new(987_654, a.id, 10),
    ] {
        let err = engine.transfer_tx(params).await.unwrap_err();
        assert!(
            err.constraint_kind().is_some() || err.is_not_found(),
            "unexpected error {}",
            err
        );
    }
    assert_eq!(balance_of(&store, a.id).await, 100);
    assert!(entries_of(&store, a.id).await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_same_direction() {
    let store = MemoryStore::new();
    let a = create_account_with_balance(&store, 100).await;
    let b = create_account_with_balance(&store, 100).await;
    let engine = engine_on(&store);

    let n = 5;
    let amount = 10;
    let (a_id, b_id) = (a.id, b.id);
    let handles: Vec<_> = (0..n)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .transfer_tx(TransferTxParams::new(a_id, b_id, amount))
                    .await
            })
        })
        .collect();

    let results = tokio::time::timeout(TEST_TIMEOUT, join_all(handles))
        .await
        .expect("transfers deadlocked");

    let mut seen_k = Vec::new();
    for joined in results {
        let res = joined.unwrap().unwrap();
        assert_eq!(res.transfer.amount, amount);
        assert_eq!(res.from_entry.amount, -amount);
        assert_eq!(res.to_entry.amount, amount);

        // Each result snapshot reflects exactly k transfers for some k in 1..=n
        let diff_from = a.balance - res.from_account.balance;
        let diff_to = res.to_account.balance - b.balance;
        assert_eq!(diff_from, diff_to);
        assert_eq!(diff_from % amount, 0);
        let k = diff_from / amount;
        assert!((1..=n).contains(&k));
        assert!(!seen_k.contains(&k));
        seen_k.push(k);
    }

    assert_eq!(balance_of(&store, a.id).await, a.balance - n * amount);
    assert_eq!(balance_of(&store, b.id).await, b.balance + n * amount);
    assert_eq!(entries_of(&store, a.id).await.len(), n as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_opposite_direction_transfers() {
    let store = MemoryStore::new();
    let a = create_account_with_balance(&store, 500).await;
    let b = create_account_with_balance(&store, 500).await;
    let engine = engine_on(&store);

    let n = 20;
    let amount = 10;
    let (a_id, b_id) = (a.id, b.id);
    let handles: Vec<_> = (0..n)
        .map(|i| {
            let engine = engine.clone();
            let (from, to) = if i % 2 == 0 { (a_id, b_id) } else { (b_id, a_id) };
            tokio::spawn(async move {
                engine
                    .transfer_tx(TransferTxParams::new(from, to, amount))
                    .await
            })
        })
        .collect();

    let results = tokio::time::timeout(TEST_TIMEOUT, join_all(handles))
        .await
        .expect("opposite-direction transfers deadlocked");
    for joined in results {
        joined.unwrap().unwrap();
    }

    assert_eq!(balance_of(&store, a.id).await, 500);
    assert_eq!(balance_of(&store, b.id).await, 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_directions_do_not_deadlock() {
    let store = MemoryStore::new();
    let a = create_account_with_balance(&store, 100).await;
    let b = create_account_with_balance(&store, 100).await;

    // Both units of work pause holding their first row lock. Locking the
    // sender first would leave one holding a and the other holding b here.
    let rendezvous = Arc::new(LockRendezvous::new(2, Duration::from_millis(300)));
    let faulty = FaultyStore::new(store.clone(), 0).with_rendezvous(rendezvous.clone());
    let engine = TransferEngine::new(Arc::new(faulty));

    let (a_id, b_id) = (a.id, b.id);
    let handles: Vec<_> = [(a_id, b_id, 10), (b_id, a_id, 25)]
        .into_iter()
        .map(|(from, to, amount)| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .transfer_tx(TransferTxParams::new(from, to, amount))
                    .await
            })
        })
        .collect();

    let results = tokio::time::timeout(TEST_TIMEOUT, join_all(handles))
        .await
        .expect("opposite-direction transfers deadlocked");
    for joined in results {
        joined.unwrap().unwrap();
    }

    assert_eq!(rendezvous.arrived(), 2);
    assert_eq!(balance_of(&store, a_id).await, 115);
    assert_eq!(balance_of(&store, b_id).await, 85);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_lost_updates_on_hot_account() {
    let store = MemoryStore::new();
    let hot = create_account_with_balance(&store, 1_000).await;
    let mut sinks = Vec::new();
    for _ in 0..4 {
        sinks.push(create_account_with_balance(&store, 0).await);
    }
    let engine = engine_on(&store);

    let m: usize = 40;
    let k: i64 = 7;
    let hot_id = hot.id;
    let handles: Vec<_> = (0..m)
        .map(|i| {
            let engine = engine.clone();
            let to = sinks[i % sinks.len()].id;
            tokio::spawn(async move {
                engine
                    .transfer_tx(TransferTxParams::new(hot_id, to, k))
                    .await
            })
        })
        .collect();

    let results = tokio::time::timeout(TEST_TIMEOUT, join_all(handles))
        .await
        .expect("hot account transfers deadlocked");
    for joined in results {
        joined.unwrap().unwrap();
    }

    assert_eq!(balance_of(&store, hot.id).await, 1_000 - m as i64 * k);
    let mut sink_total = 0;
    for sink in &sinks {
        sink_total += balance_of(&store, sink.id).await;
    }
    assert_eq!(sink_total, m as i64 * k);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_random_transfers_conserve_money() {
    let store = MemoryStore::new();
    let mut accounts = Vec::new();
    for _ in 0..5 {
        accounts.push(create_account_with_balance(&store, 1_000).await);
    }
    let initial_total: i64 = accounts.iter().map(|a| a.balance).sum();
    let engine = engine_on(&store);

    let plan: Vec<(i64, i64, i64)> = {
        let mut rng = rand::thread_rng();
        (0..50)
            .map(|_| {
                let from = rng.gen_range(0..accounts.len());
                let mut to = rng.gen_range(0..accounts.len());
                if to == from {
                    to = (to + 1) % accounts.len();
                }
                (accounts[from].id, accounts[to].id, rng.gen_range(1..=100))
            })
            .collect()
    };

    let handles: Vec<_> = plan
        .into_iter()
        .map(|(from, to, amount)| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .transfer_tx(TransferTxParams::new(from, to, amount))
                    .await
            })
        })
        .collect();

    let results = tokio::time::timeout(TEST_TIMEOUT, join_all(handles))
        .await
        .expect("random transfers deadlocked");
    for joined in results {
        joined.unwrap().unwrap();
    }

    let mut final_total = 0;
    let mut entry_total = 0;
    for account in &accounts {
        let balance = balance_of(&store, account.id).await;
        let entries: i64 = entries_of(&store, account.id)
            .await
            .iter()
            .map(|e| e.amount)
            .sum();
        // Balance equals the opening balance plus its ledger history
        assert_eq!(balance, account.balance + entries);
        final_total += balance;
        entry_total += entries;
    }
    assert_eq!(final_total, initial_total);
    assert_eq!(entry_total, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_transfer_releases_locks() {
    let store = MemoryStore::new();
    let a = create_account_with_balance(&store, 100).await;
    let b = create_account_with_balance(&store, 100).await;
    let engine = engine_on(&store);

    // Hold b's row lock so the transfer locks a and then waits on b
    let mut blocker = store.begin().await.unwrap();
    blocker.add_account_balance(b.id, 0).await.unwrap();

    let stalled = tokio::time::timeout(
        Duration::from_millis(200),
        engine.transfer_tx(TransferTxParams::new(a.id, b.id, 30)),
    )
    .await;
    assert!(stalled.is_err(), "transfer should have been waiting on the row lock");

    blocker.rollback().await.unwrap();

    // a's lock was released when the cancelled unit of work was dropped
    let res = tokio::time::timeout(
        TEST_TIMEOUT,
        engine.transfer_tx(TransferTxParams::new(b.id, a.id, 5)),
    )
    .await
    .expect("lock leaked by cancelled transfer")
    .unwrap();

    assert_eq!(res.from_account.balance, 95);
    assert_eq!(res.to_account.balance, 105);
    assert_eq!(entries_of(&store, a.id).await.len(), 1);
}
