//! Shop transactions: purchases, equipment toggles and consumable use.

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::ledger::errors::LedgerError;
use crate::ledger::habits::load_user;
use crate::ledger::store::{LedgerStore, LedgerWrite};
use crate::ledger::types::{ItemId, ItemRecord, UserId, UserItemRecord};
use crate::logutil::log_label;

/// Owned item joined with its catalog entry, for inventory listings.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryEntry {
    pub item: ItemRecord,
    pub owned: UserItemRecord,
}

pub fn list_catalog(store: &dyn LedgerStore) -> Result<Vec<ItemRecord>, LedgerError> {
    store.list_items()
}

/// Catalog entries purchasable at `now` (seasonal windows applied).
pub fn available_items(store: &dyn LedgerStore, now: DateTime<Utc>) -> Result<Vec<ItemRecord>, LedgerError> {
    Ok(store
        .list_items()?
        .into_iter()
        .filter(|item| item.is_available_at(now))
        .collect())
}

/// Buy one unit of `item_id`.
///
/// Checks run in order: user and item exist, item is in season, non-stackable item is not
/// already owned, balance covers the price. The debit, the ownership grant and any unlock
/// are applied as one batch; the batch re-checks the balance so a concurrent debit can
/// never overdraw the account.
pub fn purchase(
    store: &dyn LedgerStore,
    user_id: UserId,
    item_id: ItemId,
    now: DateTime<Utc>,
) -> Result<UserItemRecord, LedgerError> {
    let user = load_user(store, user_id)?;
    let item = store.get_item(item_id)?;

    if !item.is_available_at(now) {
        debug!("item {} not on sale at {}", item_id, now);
        return Err(LedgerError::NotAvailable(format!(
            "'{}' is not available right now",
            item.name
        )));
    }

    let stackable = item.kind.is_stackable();
    if !stackable && store.get_user_item(user_id, item_id)?.is_some() {
        debug!("user {} already owns item {}", user_id, item_id);
        return Err(LedgerError::AlreadyOwned);
    }

    if user.coins < item.price {
        debug!(
            "user {} cannot afford item {} ({} < {})",
            user_id, item_id, user.coins, item.price
        );
        return Err(LedgerError::InsufficientFunds {
            needed: item.price,
            available: user.coins,
        });
    }

    let mut writes = vec![
        LedgerWrite::DebitCoins {
            user_id,
            amount: item.price,
        },
        LedgerWrite::GrantItem {
            record: UserItemRecord::new(user_id, item_id, now),
            stackable,
        },
    ];
    if let Some(unlock) = item.unlock.clone() {
        writes.push(LedgerWrite::Unlock { user_id, unlock });
    }
    store.apply(&writes)?;

    let owned = store.get_user_item(user_id, item_id)?.ok_or_else(|| {
        LedgerError::InvariantViolation(format!(
            "purchase of item {} by user {} left no ownership record",
            item_id, user_id
        ))
    })?;
    info!(
        "user {} bought '{}' for {} coins (quantity {})",
        user_id,
        log_label(&item.name),
        item.price,
        owned.quantity
    );
    Ok(owned)
}

pub fn set_equipped(
    store: &dyn LedgerStore,
    user_id: UserId,
    item_id: ItemId,
    equipped: bool,
) -> Result<UserItemRecord, LedgerError> {
    store.get_user(user_id)?;
    let record = store.set_equipped(user_id, item_id, equipped)?;
    debug!("user {} set item {} equipped={}", user_id, item_id, equipped);
    Ok(record)
}

/// Consume one unit of an owned boost or powerup. Interpreting the item's effect is left
/// to the caller.
pub fn use_item(
    store: &dyn LedgerStore,
    user_id: UserId,
    item_id: ItemId,
) -> Result<UserItemRecord, LedgerError> {
    store.get_user(user_id)?;
    let item = store.get_item(item_id)?;
    if !item.kind.is_stackable() {
        return Err(LedgerError::Invalid(format!(
            "'{}' is not a consumable item",
            item.name
        )));
    }
    store.apply(&[LedgerWrite::ConsumeItem { user_id, item_id }])?;
    let remaining = store.get_user_item(user_id, item_id)?.ok_or_else(|| {
        LedgerError::InvariantViolation(format!(
            "item {} vanished from user {} after use",
            item_id, user_id
        ))
    })?;
    info!(
        "user {} used '{}' ({} left)",
        user_id,
        log_label(&item.name),
        remaining.quantity
    );
    Ok(remaining)
}

pub fn list_inventory(store: &dyn LedgerStore, user_id: UserId) -> Result<Vec<InventoryEntry>, LedgerError> {
    store.get_user(user_id)?;
    store
        .list_user_items(user_id)?
        .into_iter()
        .map(|owned| {
            let item = store.get_item(owned.item_id)?;
            Ok(InventoryEntry { item, owned })
        })
        .collect()
}
