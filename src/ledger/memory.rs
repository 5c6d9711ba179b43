//! In-memory [`LedgerStore`] used by tests and ephemeral deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ledger::catalog::starter_catalog;
use crate::ledger::errors::LedgerError;
use crate::ledger::store::{apply_writes, BatchView, LedgerStore, LedgerWrite};
use crate::ledger::types::{
    CompletionId, CompletionRecord, HabitId, HabitRecord, ItemId, ItemRecord, PetId, PetRecord,
    UserId, UserItemRecord, UserRecord,
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, UserRecord>,
    habits: BTreeMap<HabitId, HabitRecord>,
    completions: BTreeMap<CompletionId, CompletionRecord>,
    items: BTreeMap<ItemId, ItemRecord>,
    user_items: BTreeMap<(UserId, ItemId), UserItemRecord>,
    pets: BTreeMap<PetId, PetRecord>,
}

/// Every table lives behind a single lock; a batch stages its writes in an overlay and
/// merges them only once every write has succeeded.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    ids: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            ids: AtomicU64::new(1),
        }
    }

    /// Store pre-populated with the starter catalog.
    pub fn with_starter_catalog() -> Self {
        let store = Self::new();
        {
            let mut tables = store.write();
            for item in starter_catalog() {
                tables.items.insert(item.id, item);
            }
        }
        store
    }

    // A panic while holding the lock cannot leave a half-applied batch behind, so a
    // poisoned lock still guards consistent data.
    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Overlay of pending writes on top of the committed tables.
struct Staged<'a> {
    base: &'a Tables,
    users: HashMap<UserId, UserRecord>,
    habits: HashMap<HabitId, HabitRecord>,
    completions: HashMap<CompletionId, CompletionRecord>,
    user_items: HashMap<(UserId, ItemId), UserItemRecord>,
}

impl<'a> Staged<'a> {
    fn new(base: &'a Tables) -> Self {
        Self {
            base,
            users: HashMap::new(),
            habits: HashMap::new(),
            completions: HashMap::new(),
            user_items: HashMap::new(),
        }
    }
}

impl BatchView for Staged<'_> {
    type Error = LedgerError;

    fn user(&mut self, id: UserId) -> Result<UserRecord, LedgerError> {
        self.users
            .get(&id)
            .or_else(|| self.base.users.get(&id))
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("user: {}", id)))
    }

    fn put_user(&mut self, user: UserRecord) -> Result<(), LedgerError> {
        self.users.insert(user.id, user);
        Ok(())
    }

    fn put_habit(&mut self, habit: HabitRecord) -> Result<(), LedgerError> {
        self.habits.insert(habit.id, habit);
        Ok(())
    }

    fn completion_exists(&mut self, completion: &CompletionRecord) -> Result<bool, LedgerError> {
        Ok(self.completions.contains_key(&completion.id)
            || self.base.completions.contains_key(&completion.id))
    }

    fn put_completion(&mut self, completion: CompletionRecord) -> Result<(), LedgerError> {
        self.completions.insert(completion.id, completion);
        Ok(())
    }

    fn user_item(
        &mut self,
        user_id: UserId,
        item_id: ItemId,
    ) -> Result<Option<UserItemRecord>, LedgerError> {
        let key = (user_id, item_id);
        Ok(self
            .user_items
            .get(&key)
            .or_else(|| self.base.user_items.get(&key))
            .cloned())
    }

    fn put_user_item(&mut self, record: UserItemRecord) -> Result<(), LedgerError> {
        self.user_items
            .insert((record.user_id, record.item_id), record);
        Ok(())
    }
}

impl LedgerStore for MemoryStore {
    fn next_id(&self) -> Result<u64, LedgerError> {
        Ok(self.ids.fetch_add(1, Ordering::SeqCst))
    }

    fn apply(&self, writes: &[LedgerWrite]) -> Result<(), LedgerError> {
        let mut tables = self.write();
        let (users, habits, completions, user_items) = {
            let mut staged = Staged::new(&tables);
            apply_writes(&mut staged, writes)?;
            (
                staged.users,
                staged.habits,
                staged.completions,
                staged.user_items,
            )
        };
        tables.users.extend(users);
        tables.habits.extend(habits);
        tables.completions.extend(completions);
        tables.user_items.extend(user_items);
        Ok(())
    }

    fn get_user(&self, id: UserId) -> Result<UserRecord, LedgerError> {
        self.read()
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("user: {}", id)))
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, LedgerError> {
        Ok(self
            .read()
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    fn create_user(&self, user: UserRecord) -> Result<UserRecord, LedgerError> {
        let mut tables = self.write();
        if tables
            .users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(&user.username))
        {
            return Err(LedgerError::Invalid(format!(
                "username already taken: {}",
                user.username
            )));
        }
        if tables.users.contains_key(&user.id) {
            return Err(LedgerError::InvariantViolation(format!(
                "user id {} reused",
                user.id
            )));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn set_active_pet(
        &self,
        user_id: UserId,
        pet_id: Option<PetId>,
    ) -> Result<UserRecord, LedgerError> {
        let mut tables = self.write();
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| LedgerError::NotFound(format!("user: {}", user_id)))?;
        user.active_pet_id = pet_id;
        user.touch();
        Ok(user.clone())
    }

    fn get_habit(&self, id: HabitId) -> Result<HabitRecord, LedgerError> {
        self.read()
            .habits
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("habit: {}", id)))
    }

    fn list_habits(&self, user_id: UserId) -> Result<Vec<HabitRecord>, LedgerError> {
        Ok(self
            .read()
            .habits
            .values()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect())
    }

    fn create_habit(&self, habit: HabitRecord) -> Result<HabitRecord, LedgerError> {
        habit.check_invariants()?;
        self.write().habits.insert(habit.id, habit.clone());
        Ok(habit)
    }

    fn update_habit(&self, habit: HabitRecord) -> Result<HabitRecord, LedgerError> {
        habit.check_invariants()?;
        let mut tables = self.write();
        let slot = tables
            .habits
            .get_mut(&habit.id)
            .ok_or_else(|| LedgerError::NotFound(format!("habit: {}", habit.id)))?;
        *slot = habit.clone();
        Ok(habit)
    }

    fn delete_habit(&self, id: HabitId) -> Result<(), LedgerError> {
        self.write()
            .habits
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| LedgerError::NotFound(format!("habit: {}", id)))
    }

    fn list_completions(
        &self,
        user_id: UserId,
        habit_id: Option<HabitId>,
    ) -> Result<Vec<CompletionRecord>, LedgerError> {
        Ok(self
            .read()
            .completions
            .values()
            .filter(|c| c.user_id == user_id && habit_id.map_or(true, |h| c.habit_id == h))
            .cloned()
            .collect())
    }

    fn list_items(&self) -> Result<Vec<ItemRecord>, LedgerError> {
        Ok(self.read().items.values().cloned().collect())
    }

    fn get_item(&self, id: ItemId) -> Result<ItemRecord, LedgerError> {
        self.read()
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("item: {}", id)))
    }

    fn put_item(&self, item: ItemRecord) -> Result<(), LedgerError> {
        self.write().items.insert(item.id, item);
        Ok(())
    }

    fn get_user_item(
        &self,
        user_id: UserId,
        item_id: ItemId,
    ) -> Result<Option<UserItemRecord>, LedgerError> {
        Ok(self.read().user_items.get(&(user_id, item_id)).cloned())
    }

    fn list_user_items(&self, user_id: UserId) -> Result<Vec<UserItemRecord>, LedgerError> {
        Ok(self
            .read()
            .user_items
            .range((user_id, ItemId::MIN)..=(user_id, ItemId::MAX))
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn set_equipped(
        &self,
        user_id: UserId,
        item_id: ItemId,
        equipped: bool,
    ) -> Result<UserItemRecord, LedgerError> {
        let mut tables = self.write();
        let record = tables.user_items.get_mut(&(user_id, item_id)).ok_or_else(|| {
            LedgerError::NotFound(format!("user {} does not own item {}", user_id, item_id))
        })?;
        record.equipped = equipped;
        Ok(record.clone())
    }

    fn create_pet(&self, pet: PetRecord) -> Result<PetRecord, LedgerError> {
        self.write().pets.insert(pet.id, pet.clone());
        Ok(pet)
    }

    fn get_pet(&self, id: PetId) -> Result<PetRecord, LedgerError> {
        self.read()
            .pets
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("pet: {}", id)))
    }

    fn list_pets(&self, user_id: UserId) -> Result<Vec<PetRecord>, LedgerError> {
        Ok(self
            .read()
            .pets
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    fn update_pet(&self, pet: PetRecord) -> Result<PetRecord, LedgerError> {
        let mut tables = self.write();
        let slot = tables
            .pets
            .get_mut(&pet.id)
            .ok_or_else(|| LedgerError::NotFound(format!("pet: {}", pet.id)))?;
        *slot = pet.clone();
        Ok(pet)
    }
}
