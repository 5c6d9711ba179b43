//! Starter shop catalog seeded into empty stores.

use crate::ledger::errors::LedgerError;
use crate::ledger::store::LedgerStore;
use crate::ledger::types::{ItemKind, ItemRecord, SeasonWindow, UnlockCategory};

pub const STARTER_ITEM_IDS: [u64; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

const DECEMBER: u32 = 12;

pub fn starter_catalog() -> Vec<ItemRecord> {
    vec![
        ItemRecord::new(1, "Rain Soundscape", ItemKind::Cosmetic, 50)
            .with_description("Gentle rainfall for focus sessions.")
            .with_unlock(UnlockCategory::Sounds, "rain"),
        ItemRecord::new(2, "Forest Background", ItemKind::Cosmetic, 75)
            .with_description("A calm pine forest behind your dashboard.")
            .with_unlock(UnlockCategory::Backgrounds, "forest"),
        ItemRecord::new(3, "Knight Character", ItemKind::Cosmetic, 120)
            .with_description("Armored hero for your profile.")
            .with_unlock(UnlockCategory::Characters, "knight"),
        ItemRecord::new(4, "Focus Tonic", ItemKind::Boost, 30)
            .with_description("A small boost for a productive day.")
            .with_effect("xp_multiplier:1.5:24h"),
        ItemRecord::new(5, "Streak Shield", ItemKind::Powerup, 60)
            .with_description("Protects a streak for one missed day.")
            .with_effect("streak_shield:1"),
        ItemRecord::new(6, "Puppy", ItemKind::PetTemplate, 100)
            .with_description("A loyal puppy companion."),
        ItemRecord::new(7, "Kitten", ItemKind::PetTemplate, 100)
            .with_description("A curious kitten companion."),
        ItemRecord::new(8, "Winter Scarf", ItemKind::Cosmetic, 40)
            .with_description("Seasonal cosmetic, on sale every December.")
            .with_unlock(UnlockCategory::Characters, "winter_scarf")
            .with_season(SeasonWindow::Month(DECEMBER)),
    ]
}

/// Insert the starter catalog when the store has no items yet. Returns how many were added.
pub fn seed_catalog_if_empty(store: &dyn LedgerStore) -> Result<usize, LedgerError> {
    if !store.list_items()?.is_empty() {
        return Ok(0);
    }
    let mut inserted = 0usize;
    for item in starter_catalog() {
        store.put_item(item)?;
        inserted += 1;
    }
    log::info!("seeded starter catalog with {} items", inserted);
    Ok(inserted)
}
