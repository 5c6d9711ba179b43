//! Purchases, seasonal windows, stackables and unlocks on both stores.
mod common;

use chrono::{Duration, TimeZone, Utc};
use habitquest::ledger::{ItemKind, ItemRecord, LedgerError, LedgerStore, SeasonWindow, UnlockCategory};

use common::{add_item, both_backends, register, store_of};

#[test]
fn test_purchase_then_repeat_is_already_owned() {
    for (backend, _dir, ledger) in both_backends(35) {
        let user = register(&ledger, "buyer");
        add_item(&ledger, 900, "Sunset Background", ItemKind::Cosmetic, 30);

        let owned = ledger.purchase(user.id, 900).unwrap();
        assert!(!owned.equipped, "{backend}");
        assert_eq!(ledger.get_user(user.id).unwrap().coins, 5, "{backend}");

        let err = ledger.purchase(user.id, 900).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyOwned), "{backend}");
        assert_eq!(ledger.get_user(user.id).unwrap().coins, 5, "{backend}");
        assert_eq!(ledger.list_inventory(user.id).unwrap().len(), 1, "{backend}");
    }
}

#[test]
fn test_insufficient_funds_changes_nothing() {
    for (backend, _dir, ledger) in both_backends(10) {
        let user = register(&ledger, "thrifty");
        add_item(&ledger, 901, "Crown", ItemKind::Cosmetic, 11);
        let err = ledger.purchase(user.id, 901).unwrap_err();
        assert!(
            matches!(err, LedgerError::InsufficientFunds { needed: 11, available: 10 }),
            "{backend}"
        );
        assert!(ledger.list_inventory(user.id).unwrap().is_empty(), "{backend}");
        assert_eq!(ledger.get_user(user.id).unwrap().coins, 10, "{backend}");
    }
}

#[test]
fn test_seasonal_window_is_half_open() {
    for (backend, _dir, ledger) in both_backends(100) {
        let user = register(&ledger, "seasonal");
        let start = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        store_of(&ledger)
            .put_item(
                ItemRecord::new(902, "Snow Globe", ItemKind::Cosmetic, 20)
                    .with_season(SeasonWindow::new(start, end)),
            )
            .unwrap();

        for at in [start - Duration::seconds(1), end] {
            assert!(
                matches!(ledger.purchase_at(user.id, 902, at), Err(LedgerError::NotAvailable(_))),
                "{backend}"
            );
        }
        assert_eq!(ledger.available_items_at(end).unwrap().len(), 0, "{backend}");
        ledger.purchase_at(user.id, 902, start).unwrap();
        assert_eq!(ledger.get_user(user.id).unwrap().coins, 80, "{backend}");
    }
}

#[test]
fn test_unlock_applied_with_purchase() {
    for (backend, _dir, ledger) in both_backends(100) {
        let user = register(&ledger, "collector");
        store_of(&ledger)
            .put_item(
                ItemRecord::new(903, "Campfire", ItemKind::Cosmetic, 40)
                    .with_unlock(UnlockCategory::Sounds, "campfire"),
            )
            .unwrap();
        ledger.purchase(user.id, 903).unwrap();
        let profile = ledger.get_user(user.id).unwrap();
        assert!(profile.unlocked(UnlockCategory::Sounds).contains("campfire"), "{backend}");
        assert!(profile.unlocked(UnlockCategory::Backgrounds).is_empty(), "{backend}");
    }
}

#[test]
fn test_stackables_accumulate_and_are_consumed() {
    for (backend, _dir, ledger) in both_backends(100) {
        let user = register(&ledger, "stacker");
        add_item(&ledger, 904, "Streak Shield", ItemKind::Powerup, 25);

        for expected in 1..=3 {
            let owned = ledger.purchase(user.id, 904).unwrap();
            assert_eq!(owned.quantity, expected, "{backend}");
        }
        assert_eq!(ledger.get_user(user.id).unwrap().coins, 25, "{backend}");

        assert_eq!(ledger.use_item(user.id, 904).unwrap().quantity, 2, "{backend}");
        assert!(
            matches!(ledger.use_item(user.id, 905), Err(LedgerError::NotFound(_))),
            "{backend}"
        );
    }
}

#[test]
fn test_equip_toggle() {
    for (backend, _dir, ledger) in both_backends(50) {
        let user = register(&ledger, "stylish");
        add_item(&ledger, 906, "Top Hat", ItemKind::Cosmetic, 50);
        ledger.purchase(user.id, 906).unwrap();

        assert!(ledger.set_equipped(user.id, 906, true).unwrap().equipped, "{backend}");
        let inventory = ledger.list_inventory(user.id).unwrap();
        assert!(inventory[0].owned.equipped, "{backend}");
        assert!(!ledger.set_equipped(user.id, 906, false).unwrap().equipped, "{backend}");
    }
}
