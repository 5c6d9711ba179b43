//! Storage abstraction consumed by the ledger engines.
//!
//! Engines never assume a particular backend. Anything that must change together for
//! one logical event is expressed as a batch of [`LedgerWrite`]s handed to
//! [`LedgerStore::apply`], which either applies every write or none of them. Both
//! backends share [`apply_writes`] so batch semantics cannot drift between them.

use crate::ledger::errors::LedgerError;
use crate::ledger::types::{
    CompletionRecord, HabitId, HabitRecord, ItemId, ItemRecord, ItemUnlock, PetId, PetRecord,
    UserId, UserItemRecord, UserRecord,
};

/// One mutation inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerWrite {
    /// Replace a habit record (progress, streak, descriptive fields).
    PutHabit(HabitRecord),
    /// Append an immutable completion; fails if the id is already present.
    InsertCompletion(CompletionRecord),
    CreditCoins { user_id: UserId, amount: u64 },
    /// Fails with `InsufficientFunds` when the balance (as staged so far) is short.
    DebitCoins { user_id: UserId, amount: u64 },
    /// Adds experience and recomputes the level in the same write.
    GrantXp { user_id: UserId, amount: u64 },
    /// Insert ownership. Stackable grants add to an existing record's quantity;
    /// non-stackable grants fail with `AlreadyOwned` when a record exists.
    GrantItem { record: UserItemRecord, stackable: bool },
    /// Remove one unit from a stackable record.
    ConsumeItem { user_id: UserId, item_id: ItemId },
    Unlock { user_id: UserId, unlock: ItemUnlock },
}

/// Read/write surface a backend exposes to [`apply_writes`] while a batch is staged.
/// Reads must observe writes made earlier in the same batch.
pub trait BatchView {
    type Error: From<LedgerError>;

    fn user(&mut self, id: UserId) -> Result<UserRecord, Self::Error>;
    fn put_user(&mut self, user: UserRecord) -> Result<(), Self::Error>;
    fn put_habit(&mut self, habit: HabitRecord) -> Result<(), Self::Error>;
    fn completion_exists(&mut self, completion: &CompletionRecord) -> Result<bool, Self::Error>;
    fn put_completion(&mut self, completion: CompletionRecord) -> Result<(), Self::Error>;
    fn user_item(
        &mut self,
        user_id: UserId,
        item_id: ItemId,
    ) -> Result<Option<UserItemRecord>, Self::Error>;
    fn put_user_item(&mut self, record: UserItemRecord) -> Result<(), Self::Error>;
}

/// Stage every write of a batch against `view`, stopping at the first failure.
/// The caller discards the staged state on error.
pub fn apply_writes<V: BatchView>(view: &mut V, writes: &[LedgerWrite]) -> Result<(), V::Error> {
    for write in writes {
        match write {
            LedgerWrite::PutHabit(habit) => {
                habit.check_invariants()?;
                view.put_habit(habit.clone())?;
            }
            LedgerWrite::InsertCompletion(completion) => {
                if view.completion_exists(completion)? {
                    return Err(LedgerError::InvariantViolation(format!(
                        "completion {} already recorded",
                        completion.id
                    ))
                    .into());
                }
                view.put_completion(completion.clone())?;
            }
            LedgerWrite::CreditCoins { user_id, amount } => {
                let mut user = view.user(*user_id)?;
                user.coins = user.coins.saturating_add(*amount);
                user.touch();
                view.put_user(user)?;
            }
            LedgerWrite::DebitCoins { user_id, amount } => {
                let mut user = view.user(*user_id)?;
                if user.coins < *amount {
                    return Err(LedgerError::InsufficientFunds {
                        needed: *amount,
                        available: user.coins,
                    }
                    .into());
                }
                user.coins -= *amount;
                user.touch();
                view.put_user(user)?;
            }
            LedgerWrite::GrantXp { user_id, amount } => {
                let mut user = view.user(*user_id)?;
                user.grant_xp(*amount);
                user.touch();
                view.put_user(user)?;
            }
            LedgerWrite::GrantItem { record, stackable } => {
                let merged = match view.user_item(record.user_id, record.item_id)? {
                    Some(_) if !*stackable => return Err(LedgerError::AlreadyOwned.into()),
                    Some(mut existing) => {
                        existing.quantity = existing.quantity.saturating_add(record.quantity);
                        existing
                    }
                    None => record.clone(),
                };
                view.put_user_item(merged)?;
            }
            LedgerWrite::ConsumeItem { user_id, item_id } => {
                let Some(mut owned) = view.user_item(*user_id, *item_id)? else {
                    return Err(LedgerError::NotFound(format!(
                        "user {} does not own item {}",
                        user_id, item_id
                    ))
                    .into());
                };
                if owned.quantity == 0 {
                    return Err(
                        LedgerError::Invalid(format!("no units of item {} left", item_id)).into(),
                    );
                }
                owned.quantity -= 1;
                view.put_user_item(owned)?;
            }
            LedgerWrite::Unlock { user_id, unlock } => {
                let mut user = view.user(*user_id)?;
                if user.unlocked_mut(unlock.category).insert(unlock.name.clone()) {
                    user.touch();
                    view.put_user(user)?;
                }
            }
        }
    }
    Ok(())
}

/// Abstract persistence for the ledger.
///
/// Implementations must make [`apply`](LedgerStore::apply) all-or-nothing and must keep
/// single-record writes atomic. Per-user serialization of read-modify-write sequences is
/// the engines' responsibility (see `UserLocks`); the store only guarantees that a batch
/// is never partially visible.
pub trait LedgerStore: Send + Sync {
    /// Allocate a fresh identifier. Identifiers are unique across all record kinds.
    fn next_id(&self) -> Result<u64, LedgerError>;

    /// Apply a batch atomically.
    fn apply(&self, writes: &[LedgerWrite]) -> Result<(), LedgerError>;

    // Users
    fn get_user(&self, id: UserId) -> Result<UserRecord, LedgerError>;
    fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, LedgerError>;
    /// Insert a new user; fails with `Invalid` when the username (case-insensitive) is taken.
    fn create_user(&self, user: UserRecord) -> Result<UserRecord, LedgerError>;
    fn set_active_pet(&self, user_id: UserId, pet_id: Option<PetId>)
        -> Result<UserRecord, LedgerError>;

    // Habits
    fn get_habit(&self, id: HabitId) -> Result<HabitRecord, LedgerError>;
    fn list_habits(&self, user_id: UserId) -> Result<Vec<HabitRecord>, LedgerError>;
    fn create_habit(&self, habit: HabitRecord) -> Result<HabitRecord, LedgerError>;
    fn update_habit(&self, habit: HabitRecord) -> Result<HabitRecord, LedgerError>;
    fn delete_habit(&self, id: HabitId) -> Result<(), LedgerError>;

    // Completions
    fn list_completions(
        &self,
        user_id: UserId,
        habit_id: Option<HabitId>,
    ) -> Result<Vec<CompletionRecord>, LedgerError>;

    // Catalog
    fn list_items(&self) -> Result<Vec<ItemRecord>, LedgerError>;
    fn get_item(&self, id: ItemId) -> Result<ItemRecord, LedgerError>;
    fn put_item(&self, item: ItemRecord) -> Result<(), LedgerError>;

    // Inventory
    fn get_user_item(
        &self,
        user_id: UserId,
        item_id: ItemId,
    ) -> Result<Option<UserItemRecord>, LedgerError>;
    fn list_user_items(&self, user_id: UserId) -> Result<Vec<UserItemRecord>, LedgerError>;
    fn set_equipped(
        &self,
        user_id: UserId,
        item_id: ItemId,
        equipped: bool,
    ) -> Result<UserItemRecord, LedgerError>;

    // Pets
    fn create_pet(&self, pet: PetRecord) -> Result<PetRecord, LedgerError>;
    fn get_pet(&self, id: PetId) -> Result<PetRecord, LedgerError>;
    fn list_pets(&self, user_id: UserId) -> Result<Vec<PetRecord>, LedgerError>;
    fn update_pet(&self, pet: PetRecord) -> Result<PetRecord, LedgerError>;

    /// Add experience and recompute the level atomically.
    fn add_xp(&self, user_id: UserId, amount: u64) -> Result<UserRecord, LedgerError> {
        self.apply(&[LedgerWrite::GrantXp { user_id, amount }])?;
        self.get_user(user_id)
    }

    fn add_coins(&self, user_id: UserId, amount: u64) -> Result<UserRecord, LedgerError> {
        self.apply(&[LedgerWrite::CreditCoins { user_id, amount }])?;
        self.get_user(user_id)
    }

    fn unlock_item(&self, user_id: UserId, unlock: ItemUnlock) -> Result<UserRecord, LedgerError> {
        self.apply(&[LedgerWrite::Unlock { user_id, unlock }])?;
        self.get_user(user_id)
    }

    fn create_completion(&self, completion: CompletionRecord) -> Result<CompletionRecord, LedgerError> {
        self.apply(&[LedgerWrite::InsertCompletion(completion.clone())])?;
        Ok(completion)
    }

    fn create_user_item(
        &self,
        record: UserItemRecord,
        stackable: bool,
    ) -> Result<UserItemRecord, LedgerError> {
        let (user_id, item_id) = (record.user_id, record.item_id);
        self.apply(&[LedgerWrite::GrantItem { record, stackable }])?;
        self.get_user_item(user_id, item_id)?.ok_or_else(|| {
            LedgerError::InvariantViolation(format!(
                "item {} missing for user {} after grant",
                item_id, user_id
            ))
        })
    }
}
