//! `Ledger` facade: the entry point callers use.
//!
//! Wraps an injected store together with the shared settings and the per-user lock
//! registry. Every mutating call holds the acting user's lock for its whole
//! read-check-write sequence. The `*_at` variants take an explicit clock reading; the
//! plain variants use `Utc::now()`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use log::info;

use crate::config::LedgerConfig;
use crate::ledger::calendar::DayBoundary;
use crate::ledger::errors::LedgerError;
use crate::ledger::habits::{self, CompletionOutcome};
use crate::ledger::locks::UserLocks;
use crate::ledger::pets;
use crate::ledger::progression::{level_progress, LevelProgress};
use crate::ledger::shop::{self, InventoryEntry};
use crate::ledger::store::LedgerStore;
use crate::ledger::types::{
    CompletionRecord, HabitId, HabitRecord, HabitUpdate, ItemId, ItemRecord, PetId, PetRecord,
    UserId, UserItemRecord, UserRecord,
};
use crate::logutil::log_label;
use crate::validation::validate_username;

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSettings {
    pub starting_coins: u64,
    pub day_boundary: DayBoundary,
    pub pet_decay_per_day: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            starting_coins: 0,
            day_boundary: DayBoundary::utc(),
            pet_decay_per_day: 10,
        }
    }
}

impl TryFrom<&LedgerConfig> for LedgerSettings {
    type Error = LedgerError;

    fn try_from(config: &LedgerConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            starting_coins: config.starting_coins,
            day_boundary: DayBoundary::from_offset_minutes(config.day_boundary_offset_minutes)?,
            pet_decay_per_day: config.pet_decay_per_day,
        })
    }
}

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    locks: UserLocks,
    settings: LedgerSettings,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, settings: LedgerSettings) -> Self {
        Self {
            store,
            locks: UserLocks::new(),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    fn store_ref(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Create an account with the configured starting balance. Usernames are unique
    /// ignoring case.
    pub fn register_user(&self, username: &str) -> Result<UserRecord, LedgerError> {
        let username = validate_username(username)?;
        let user = UserRecord::new(
            self.store.next_id()?,
            &username,
            self.settings.starting_coins,
        );
        let user = self.store.create_user(user)?;
        info!("registered user {} '{}'", user.id, log_label(&user.username));
        Ok(user)
    }

    pub fn get_user(&self, user_id: UserId) -> Result<UserRecord, LedgerError> {
        self.store.get_user(user_id)
    }

    pub fn find_user(&self, username: &str) -> Result<UserRecord, LedgerError> {
        self.store
            .find_user_by_username(username)?
            .ok_or_else(|| LedgerError::NotFound(format!("username: {}", username)))
    }

    pub fn level_progress(&self, user_id: UserId) -> Result<LevelProgress, LedgerError> {
        Ok(level_progress(self.store.get_user(user_id)?.xp))
    }

    // ------------------------------------------------------------------
    // Habits
    // ------------------------------------------------------------------

    pub fn create_habit(
        &self,
        user_id: UserId,
        name: &str,
        description: Option<&str>,
        target: u32,
    ) -> Result<HabitRecord, LedgerError> {
        self.locks.with_user(user_id, || {
            habits::create_habit(self.store_ref(), user_id, name, description, target)
        })
    }

    pub fn list_habits(&self, user_id: UserId) -> Result<Vec<HabitRecord>, LedgerError> {
        habits::list_habits(self.store_ref(), user_id)
    }

    pub fn get_habit(&self, user_id: UserId, habit_id: HabitId) -> Result<HabitRecord, LedgerError> {
        habits::get_habit(self.store_ref(), user_id, habit_id)
    }

    pub fn update_habit(
        &self,
        user_id: UserId,
        habit_id: HabitId,
        update: HabitUpdate,
    ) -> Result<HabitRecord, LedgerError> {
        self.locks.with_user(user_id, || {
            habits::update_habit(self.store_ref(), user_id, habit_id, update)
        })
    }

    pub fn delete_habit(&self, user_id: UserId, habit_id: HabitId) -> Result<(), LedgerError> {
        self.locks
            .with_user(user_id, || habits::delete_habit(self.store_ref(), user_id, habit_id))
    }

    pub fn complete_habit(
        &self,
        user_id: UserId,
        habit_id: HabitId,
    ) -> Result<CompletionOutcome, LedgerError> {
        self.complete_habit_at(user_id, habit_id, Utc::now())
    }

    pub fn complete_habit_at(
        &self,
        user_id: UserId,
        habit_id: HabitId,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, LedgerError> {
        self.locks.with_user(user_id, || {
            habits::complete_habit(
                self.store_ref(),
                &self.settings.day_boundary,
                user_id,
                habit_id,
                now,
            )
        })
    }

    pub fn list_completions(
        &self,
        user_id: UserId,
        habit_id: Option<HabitId>,
    ) -> Result<Vec<CompletionRecord>, LedgerError> {
        habits::list_completions(self.store_ref(), user_id, habit_id)
    }

    pub fn daily_completion_counts(
        &self,
        user_id: UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, u32>, LedgerError> {
        habits::daily_completion_counts(
            self.store_ref(),
            &self.settings.day_boundary,
            user_id,
            from,
            to,
        )
    }

    // ------------------------------------------------------------------
    // Shop
    // ------------------------------------------------------------------

    pub fn list_catalog(&self) -> Result<Vec<ItemRecord>, LedgerError> {
        shop::list_catalog(self.store_ref())
    }

    pub fn available_items_at(&self, now: DateTime<Utc>) -> Result<Vec<ItemRecord>, LedgerError> {
        shop::available_items(self.store_ref(), now)
    }

    pub fn purchase(&self, user_id: UserId, item_id: ItemId) -> Result<UserItemRecord, LedgerError> {
        self.purchase_at(user_id, item_id, Utc::now())
    }

    pub fn purchase_at(
        &self,
        user_id: UserId,
        item_id: ItemId,
        now: DateTime<Utc>,
    ) -> Result<UserItemRecord, LedgerError> {
        self.locks
            .with_user(user_id, || shop::purchase(self.store_ref(), user_id, item_id, now))
    }

    pub fn set_equipped(
        &self,
        user_id: UserId,
        item_id: ItemId,
        equipped: bool,
    ) -> Result<UserItemRecord, LedgerError> {
        self.locks.with_user(user_id, || {
            shop::set_equipped(self.store_ref(), user_id, item_id, equipped)
        })
    }

    pub fn use_item(&self, user_id: UserId, item_id: ItemId) -> Result<UserItemRecord, LedgerError> {
        self.locks
            .with_user(user_id, || shop::use_item(self.store_ref(), user_id, item_id))
    }

    pub fn list_inventory(&self, user_id: UserId) -> Result<Vec<InventoryEntry>, LedgerError> {
        shop::list_inventory(self.store_ref(), user_id)
    }

    // ------------------------------------------------------------------
    // Pets
    // ------------------------------------------------------------------

    pub fn create_pet(&self, user_id: UserId, item_id: ItemId, name: &str) -> Result<PetRecord, LedgerError> {
        self.create_pet_at(user_id, item_id, name, Utc::now())
    }

    pub fn create_pet_at(
        &self,
        user_id: UserId,
        item_id: ItemId,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<PetRecord, LedgerError> {
        self.locks.with_user(user_id, || {
            pets::create_pet(self.store_ref(), user_id, item_id, name, now)
        })
    }

    pub fn feed_pet(&self, user_id: UserId, pet_id: PetId) -> Result<PetRecord, LedgerError> {
        self.feed_pet_at(user_id, pet_id, Utc::now())
    }

    pub fn feed_pet_at(
        &self,
        user_id: UserId,
        pet_id: PetId,
        now: DateTime<Utc>,
    ) -> Result<PetRecord, LedgerError> {
        self.locks
            .with_user(user_id, || pets::feed_pet(self.store_ref(), user_id, pet_id, now))
    }

    pub fn set_active_pet(&self, user_id: UserId, pet_id: Option<PetId>) -> Result<UserRecord, LedgerError> {
        self.locks
            .with_user(user_id, || pets::set_active_pet(self.store_ref(), user_id, pet_id))
    }

    pub fn get_pet(&self, user_id: UserId, pet_id: PetId) -> Result<PetRecord, LedgerError> {
        self.get_pet_at(user_id, pet_id, Utc::now())
    }

    pub fn get_pet_at(
        &self,
        user_id: UserId,
        pet_id: PetId,
        now: DateTime<Utc>,
    ) -> Result<PetRecord, LedgerError> {
        pets::get_pet(
            self.store_ref(),
            user_id,
            pet_id,
            now,
            self.settings.pet_decay_per_day,
        )
    }

    pub fn list_pets(&self, user_id: UserId) -> Result<Vec<PetRecord>, LedgerError> {
        self.list_pets_at(user_id, Utc::now())
    }

    pub fn list_pets_at(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Vec<PetRecord>, LedgerError> {
        pets::list_pets(
            self.store_ref(),
            user_id,
            now,
            self.settings.pet_decay_per_day,
        )
    }
}
