//! Concurrent operations on one account: purchases never overdraw it and completions
//! racing purchases lose no reward.
mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use habitquest::ledger::shop;
use chrono::{TimeZone, Utc};
use habitquest::ledger::{ItemKind, LedgerError, LedgerStore, UserItemRecord};

use common::{add_item, both_backends, register};

fn race<T, F>(attempts: usize, op: F) -> Vec<Result<T, LedgerError>>
where
    T: Send + 'static,
    F: Fn(usize) -> Result<T, LedgerError> + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let barrier = Arc::new(Barrier::new(attempts));
    let handles: Vec<_> = (0..attempts)
        .map(|i| {
            let op = Arc::clone(&op);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                op(i)
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("worker thread"))
        .collect()
}

fn tally(results: &[Result<UserItemRecord, LedgerError>]) -> (usize, usize) {
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let short = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::InsufficientFunds { .. })))
        .count();
    (ok, short)
}

#[test]
fn test_two_purchases_exceeding_balance_through_ledger() {
    for (backend, _dir, ledger) in both_backends(35) {
        let user_id = register(&ledger, "racer").id;
        add_item(&ledger, 910, "Red Cape", ItemKind::Cosmetic, 30);
        add_item(&ledger, 911, "Blue Cape", ItemKind::Cosmetic, 30);

        let ledger = Arc::new(ledger);
        let shared = Arc::clone(&ledger);
        let results = race(2, move |i| shared.purchase(user_id, 910 + i as u64));

        assert_eq!(tally(&results), (1, 1), "{backend}");
        assert_eq!(ledger.get_user(user_id).unwrap().coins, 5, "{backend}");
        assert_eq!(ledger.list_inventory(user_id).unwrap().len(), 1, "{backend}");
    }
}

#[test]
fn test_store_batch_rechecks_balance_without_engine_lock() {
    // Bypass the per-user lock: the store batch alone must still refuse the overdraft.
    for (backend, _dir, ledger) in both_backends(50) {
        let user_id = register(&ledger, "unlocked").id;
        add_item(&ledger, 920, "Tonic", ItemKind::Boost, 20);
        let store: Arc<dyn LedgerStore> = Arc::clone(ledger.store());

        let results = race(6, move |_| {
            shop::purchase(store.as_ref(), user_id, 920, chrono::Utc::now())
        });

        let (ok, short) = tally(&results);
        assert_eq!(ok, 2, "{backend}");
        assert_eq!(short, 4, "{backend}");
        assert_eq!(ledger.get_user(user_id).unwrap().coins, 10, "{backend}");
        let owned = ledger.store().get_user_item(user_id, 920).unwrap().unwrap();
        assert_eq!(owned.quantity, 2, "{backend}");
    }
}

#[test]
fn test_different_users_do_not_interfere() {
    for (backend, _dir, ledger) in both_backends(30) {
        add_item(&ledger, 930, "Boost", ItemKind::Boost, 30);
        let users: Vec<_> = (0..4)
            .map(|i| register(&ledger, &format!("player{i}")).id)
            .collect();
        let ledger = Arc::new(ledger);
        let shared = Arc::clone(&ledger);
        let ids = users.clone();
        let results = race(4, move |i| shared.purchase(ids[i], 930));

        assert_eq!(tally(&results), (4, 0), "{backend}");
        for id in users {
            assert_eq!(ledger.get_user(id).unwrap().coins, 0, "{backend}");
        }
    }
}

#[test]
fn test_completions_racing_a_purchase_keep_every_reward() {
    let day = Utc.with_ymd_and_hms(2024, 9, 2, 10, 0, 0).unwrap();
    for (backend, _dir, ledger) in both_backends(30) {
        let user_id = register(&ledger, "busy").id;
        add_item(&ledger, 940, "Lantern", ItemKind::Cosmetic, 30);
        let habits: Vec<u64> = (0..8)
            .map(|i| {
                ledger
                    .create_habit(user_id, &format!("Habit {i}"), None, 1)
                    .unwrap()
                    .id
            })
            .collect();

        let ledger = Arc::new(ledger);
        let shared = Arc::clone(&ledger);
        // Eight completions of different habits plus one purchase, released together.
        let results = race(habits.len() + 1, move |i| match habits.get(i) {
            Some(&habit_id) => shared.complete_habit_at(user_id, habit_id, day).map(|_| ()),
            None => shared.purchase_at(user_id, 940, day).map(|_| ()),
        });

        assert!(results.iter().all(|r| r.is_ok()), "{backend}: {results:?}");
        let user = ledger.get_user(user_id).unwrap();
        assert_eq!(user.coins, 30 + 8 * 10 - 30, "{backend}");
        assert_eq!(user.xp, 80, "{backend}");
        assert_eq!(user.level, 1, "{backend}");
        assert_eq!(ledger.list_completions(user_id, None).unwrap().len(), 8, "{backend}");
        assert_eq!(ledger.list_inventory(user_id).unwrap().len(), 1, "{backend}");
    }
}
