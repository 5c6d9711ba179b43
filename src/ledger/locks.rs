//! Per-account mutual exclusion for ledger operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::ledger::types::UserId;

/// Registry of one mutex per user id. Operations for the same account serialize; other
/// accounts proceed independently. A slot is dropped once no caller holds or waits on it,
/// so the registry only holds accounts with operations in flight.
#[derive(Default)]
pub struct UserLocks {
    slots: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, user_id: UserId) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(user_id).or_default().clone()
    }

    fn release(&self, user_id: UserId, slot: Arc<Mutex<()>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are taken and dropped under the registry lock, so the count is exact.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(&user_id);
        }
        drop(slot);
        drop(slots);
    }

    /// Run `op` while holding `user_id`'s lock.
    ///
    /// A poisoned slot is recovered: store batches are atomic, so a panic mid-operation
    /// cannot have left the account half-written.
    pub fn with_user<T>(&self, user_id: UserId, op: impl FnOnce() -> T) -> T {
        let slot = self.slot(user_id);
        let result = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            op()
        };
        self.release(user_id, slot);
        result
    }

    /// Number of accounts with an operation running or waiting.
    pub fn tracked_accounts(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_user_operations_do_not_overlap() {
        let locks = Arc::new(UserLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with_user(1, || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker");
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.tracked_accounts(), 0);
    }

    #[test]
    fn different_users_do_not_block_each_other() {
        let locks = UserLocks::new();
        let inside = locks.with_user(1, || locks.with_user(2, || locks.tracked_accounts()));
        assert_eq!(inside, 2);
        assert_eq!(locks.tracked_accounts(), 0);
    }

    #[test]
    fn poisoned_slot_is_recovered() {
        let locks = Arc::new(UserLocks::new());
        let cloned = Arc::clone(&locks);
        let _ = thread::spawn(move || cloned.with_user(3, || panic!("boom"))).join();
        assert_eq!(locks.with_user(3, || 1), 1);
    }
}
