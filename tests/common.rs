//! Test utilities & fixtures shared by the ledger integration tests.

use std::sync::Arc;

use habitquest::ledger::{
    ItemKind, ItemRecord, Ledger, LedgerSettings, LedgerStore, MemoryStore, SledStoreBuilder,
    UserRecord,
};
use tempfile::TempDir;

pub fn settings(starting_coins: u64) -> LedgerSettings {
    LedgerSettings {
        starting_coins,
        ..LedgerSettings::default()
    }
}

/// Ledger over an empty in-memory store.
pub fn memory_ledger(starting_coins: u64) -> Ledger {
    Ledger::new(Arc::new(MemoryStore::new()), settings(starting_coins))
}

/// Ledger over a throwaway sled database without the starter catalog. Keep the
/// returned `TempDir` alive for the duration of the test.
#[allow(dead_code)]
pub fn sled_ledger(starting_coins: u64) -> (TempDir, Ledger) {
    let dir = TempDir::new().expect("tempdir");
    let store = SledStoreBuilder::new(dir.path().join("ledger"))
        .without_catalog_seed()
        .open()
        .expect("sled store");
    (dir, Ledger::new(Arc::new(store), settings(starting_coins)))
}

/// Both backends, labelled for assertion messages.
#[allow(dead_code)]
pub fn both_backends(starting_coins: u64) -> Vec<(&'static str, Option<TempDir>, Ledger)> {
    let (dir, sled) = sled_ledger(starting_coins);
    vec![
        ("memory", None, memory_ledger(starting_coins)),
        ("sled", Some(dir), sled),
    ]
}

#[allow(dead_code)]
pub fn add_item(ledger: &Ledger, id: u64, name: &str, kind: ItemKind, price: u64) -> ItemRecord {
    let item = ItemRecord::new(id, name, kind, price);
    ledger.store().put_item(item.clone()).expect("put item");
    item
}

#[allow(dead_code)]
pub fn register(ledger: &Ledger, username: &str) -> UserRecord {
    ledger.register_user(username).expect("register user")
}

#[allow(dead_code)]
pub fn store_of(ledger: &Ledger) -> &dyn LedgerStore {
    ledger.store().as_ref()
}
