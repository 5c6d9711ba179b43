use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree, UnabortableTransactionError,
};
use sled::{IVec, Transactional};

use crate::ledger::catalog::seed_catalog_if_empty;
use crate::ledger::errors::LedgerError;
use crate::ledger::store::{apply_writes, BatchView, LedgerStore, LedgerWrite};
use crate::ledger::types::{
    CompletionRecord, HabitId, HabitRecord, ItemId, ItemRecord, PetId, PetRecord, UserId,
    UserItemRecord, UserRecord, COMPLETION_SCHEMA_VERSION, HABIT_SCHEMA_VERSION,
    ITEM_SCHEMA_VERSION, PET_SCHEMA_VERSION, USER_ITEM_SCHEMA_VERSION, USER_SCHEMA_VERSION,
};

const TREE_USERS: &str = "ledger_users";
const TREE_USERNAMES: &str = "ledger_usernames";
const TREE_HABITS: &str = "ledger_habits";
const TREE_COMPLETIONS: &str = "ledger_completions";
const TREE_ITEMS: &str = "ledger_items";
const TREE_USER_ITEMS: &str = "ledger_user_items";
const TREE_PETS: &str = "ledger_pets";

/// Records persisted by [`SledStore`], each carrying a schema version checked on read.
trait Versioned: Serialize + DeserializeOwned {
    const ENTITY: &'static str;
    const VERSION: u8;
    fn schema_version(&self) -> u8;
}

macro_rules! versioned {
    ($ty:ty, $entity:literal, $version:expr) => {
        impl Versioned for $ty {
            const ENTITY: &'static str = $entity;
            const VERSION: u8 = $version;
            fn schema_version(&self) -> u8 {
                self.schema_version
            }
        }
    };
}

versioned!(UserRecord, "user", USER_SCHEMA_VERSION);
versioned!(HabitRecord, "habit", HABIT_SCHEMA_VERSION);
versioned!(CompletionRecord, "completion", COMPLETION_SCHEMA_VERSION);
versioned!(ItemRecord, "item", ITEM_SCHEMA_VERSION);
versioned!(UserItemRecord, "user_item", USER_ITEM_SCHEMA_VERSION);
versioned!(PetRecord, "pet", PET_SCHEMA_VERSION);

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, LedgerError> {
    Ok(bincode::serialize(value)?)
}

fn deserialize<T: Versioned>(bytes: &[u8]) -> Result<T, LedgerError> {
    let record: T = bincode::deserialize(bytes)?;
    if record.schema_version() != T::VERSION {
        return Err(LedgerError::SchemaMismatch {
            entity: T::ENTITY,
            expected: T::VERSION,
            found: record.schema_version(),
        });
    }
    Ok(record)
}

fn user_key(id: UserId) -> Vec<u8> {
    format!("users:{:020}", id).into_bytes()
}

fn username_key(username: &str) -> Vec<u8> {
    format!("usernames:{}", username.to_ascii_lowercase()).into_bytes()
}

fn habit_key(id: HabitId) -> Vec<u8> {
    format!("habits:{:020}", id).into_bytes()
}

fn completion_prefix(user_id: UserId) -> Vec<u8> {
    format!("completions:{:020}:", user_id).into_bytes()
}

fn completion_key(record: &CompletionRecord) -> Vec<u8> {
    format!("completions:{:020}:{:020}", record.user_id, record.id).into_bytes()
}

fn item_key(id: ItemId) -> Vec<u8> {
    format!("items:{:020}", id).into_bytes()
}

fn user_item_prefix(user_id: UserId) -> Vec<u8> {
    format!("user_items:{:020}:", user_id).into_bytes()
}

fn user_item_key(user_id: UserId, item_id: ItemId) -> Vec<u8> {
    format!("user_items:{:020}:{:020}", user_id, item_id).into_bytes()
}

fn pet_key(id: PetId) -> Vec<u8> {
    format!("pets:{:020}", id).into_bytes()
}

/// Error type threaded through a batch running inside a sled transaction. Conflicts must
/// surface unchanged so sled can retry the closure.
struct TxError(ConflictableTransactionError<LedgerError>);

impl From<LedgerError> for TxError {
    fn from(err: LedgerError) -> Self {
        TxError(ConflictableTransactionError::Abort(err))
    }
}

impl From<UnabortableTransactionError> for TxError {
    fn from(err: UnabortableTransactionError) -> Self {
        TxError(err.into())
    }
}

fn unwrap_tx<T>(result: Result<T, TransactionError<LedgerError>>) -> Result<T, LedgerError> {
    result.map_err(|err| match err {
        TransactionError::Abort(inner) => inner,
        TransactionError::Storage(inner) => LedgerError::Sled(inner),
    })
}

fn abort(err: LedgerError) -> ConflictableTransactionError<LedgerError> {
    ConflictableTransactionError::Abort(err)
}

struct SledBatch<'a> {
    users: &'a TransactionalTree,
    habits: &'a TransactionalTree,
    completions: &'a TransactionalTree,
    user_items: &'a TransactionalTree,
}

impl BatchView for SledBatch<'_> {
    type Error = TxError;

    fn user(&mut self, id: UserId) -> Result<UserRecord, TxError> {
        let bytes = self
            .users
            .get(user_key(id))?
            .ok_or_else(|| LedgerError::NotFound(format!("user: {}", id)))?;
        Ok(deserialize(&bytes)?)
    }

    fn put_user(&mut self, user: UserRecord) -> Result<(), TxError> {
        self.users.insert(user_key(user.id), serialize(&user)?)?;
        Ok(())
    }

    fn put_habit(&mut self, habit: HabitRecord) -> Result<(), TxError> {
        self.habits.insert(habit_key(habit.id), serialize(&habit)?)?;
        Ok(())
    }

    fn completion_exists(&mut self, completion: &CompletionRecord) -> Result<bool, TxError> {
        Ok(self.completions.get(completion_key(completion))?.is_some())
    }

    fn put_completion(&mut self, completion: CompletionRecord) -> Result<(), TxError> {
        self.completions
            .insert(completion_key(&completion), serialize(&completion)?)?;
        Ok(())
    }

    fn user_item(
        &mut self,
        user_id: UserId,
        item_id: ItemId,
    ) -> Result<Option<UserItemRecord>, TxError> {
        match self.user_items.get(user_item_key(user_id, item_id))? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_user_item(&mut self, record: UserItemRecord) -> Result<(), TxError> {
        self.user_items.insert(
            user_item_key(record.user_id, record.item_id),
            serialize(&record)?,
        )?;
        Ok(())
    }
}

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct SledStoreBuilder {
    path: PathBuf,
    seed_catalog: bool,
}

impl SledStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seed_catalog: true,
        }
    }

    /// Opt out of seeding the starter catalog (useful for targeted tests).
    pub fn without_catalog_seed(mut self) -> Self {
        self.seed_catalog = false;
        self
    }

    pub fn open(self) -> Result<SledStore, LedgerError> {
        SledStore::open_with_options(self.path, self.seed_catalog)
    }
}

/// Sled-backed persistence for the ledger. Batches run as multi-tree sled transactions.
pub struct SledStore {
    db: sled::Db,
    users: sled::Tree,
    usernames: sled::Tree,
    habits: sled::Tree,
    completions: sled::Tree,
    items: sled::Tree,
    user_items: sled::Tree,
    pets: sled::Tree,
}

impl SledStore {
    /// Open (or create) the store rooted at `path`, seeding the starter catalog when the
    /// catalog is empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        Self::open_with_options(path, true)
    }

    fn open_with_options<P: AsRef<Path>>(path: P, seed_catalog: bool) -> Result<Self, LedgerError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let store = Self {
            users: db.open_tree(TREE_USERS)?,
            usernames: db.open_tree(TREE_USERNAMES)?,
            habits: db.open_tree(TREE_HABITS)?,
            completions: db.open_tree(TREE_COMPLETIONS)?,
            items: db.open_tree(TREE_ITEMS)?,
            user_items: db.open_tree(TREE_USER_ITEMS)?,
            pets: db.open_tree(TREE_PETS)?,
            db,
        };

        if seed_catalog {
            seed_catalog_if_empty(&store)?;
        }

        Ok(store)
    }

    fn flush(&self) -> Result<(), LedgerError> {
        self.db.flush()?;
        Ok(())
    }

    fn get_record<T: Versioned>(
        tree: &sled::Tree,
        key: Vec<u8>,
        what: impl FnOnce() -> String,
    ) -> Result<T, LedgerError> {
        let Some(bytes) = tree.get(&key)? else {
            return Err(LedgerError::NotFound(what()));
        };
        deserialize(&bytes)
    }

    fn scan<T: Versioned>(tree: &sled::Tree, prefix: &[u8]) -> Result<Vec<T>, LedgerError> {
        tree.scan_prefix(prefix)
            .map(|entry| {
                entry
                    .map_err(LedgerError::from)
                    .and_then(|(_key, value): (IVec, IVec)| deserialize(&value))
            })
            .collect()
    }

    fn put_record<T: Versioned>(
        &self,
        tree: &sled::Tree,
        key: Vec<u8>,
        record: &T,
    ) -> Result<(), LedgerError> {
        tree.insert(key, serialize(record)?)?;
        self.flush()
    }

    /// Replace an existing record; `NotFound` when absent.
    fn replace_record<T: Versioned>(
        &self,
        tree: &sled::Tree,
        key: Vec<u8>,
        record: &T,
        what: impl Fn() -> String,
    ) -> Result<(), LedgerError> {
        let bytes = serialize(record)?;
        let result = tree.transaction(|tx| {
            if tx.get(&key)?.is_none() {
                return Err(abort(LedgerError::NotFound(what())));
            }
            tx.insert(key.as_slice(), bytes.as_slice())?;
            Ok(())
        });
        unwrap_tx(result)?;
        self.flush()
    }
}

impl LedgerStore for SledStore {
    fn next_id(&self) -> Result<u64, LedgerError> {
        Ok(self.db.generate_id()? + 1)
    }

    fn apply(&self, writes: &[LedgerWrite]) -> Result<(), LedgerError> {
        let result = (&self.users, &self.habits, &self.completions, &self.user_items).transaction(
            |(users, habits, completions, user_items)| {
                let mut batch = SledBatch {
                    users,
                    habits,
                    completions,
                    user_items,
                };
                apply_writes(&mut batch, writes).map_err(|TxError(err)| err)
            },
        );
        unwrap_tx(result)?;
        self.flush()
    }

    fn get_user(&self, id: UserId) -> Result<UserRecord, LedgerError> {
        Self::get_record(&self.users, user_key(id), || format!("user: {}", id))
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, LedgerError> {
        let Some(raw) = self.usernames.get(username_key(username))? else {
            return Ok(None);
        };
        let id = decode_id(&raw)?;
        self.get_user(id).map(Some)
    }

    fn create_user(&self, user: UserRecord) -> Result<UserRecord, LedgerError> {
        let user_bytes = serialize(&user)?;
        let name_key = username_key(&user.username);
        let id_key = user_key(user.id);
        let result = (&self.users, &self.usernames).transaction(|(users, usernames)| {
            if usernames.get(name_key.as_slice())?.is_some() {
                return Err(abort(LedgerError::Invalid(format!(
                    "username already taken: {}",
                    user.username
                ))));
            }
            if users.get(id_key.as_slice())?.is_some() {
                return Err(abort(LedgerError::InvariantViolation(format!(
                    "user id {} reused",
                    user.id
                ))));
            }
            users.insert(id_key.as_slice(), user_bytes.as_slice())?;
            usernames.insert(name_key.as_slice(), &user.id.to_be_bytes()[..])?;
            Ok(())
        });
        unwrap_tx(result)?;
        self.flush()?;
        Ok(user)
    }

    fn set_active_pet(
        &self,
        user_id: UserId,
        pet_id: Option<PetId>,
    ) -> Result<UserRecord, LedgerError> {
        let key = user_key(user_id);
        let result = self.users.transaction(|tx| {
            let bytes = tx
                .get(key.as_slice())?
                .ok_or_else(|| abort(LedgerError::NotFound(format!("user: {}", user_id))))?;
            let mut user: UserRecord = deserialize(&bytes).map_err(abort)?;
            user.active_pet_id = pet_id;
            user.touch();
            tx.insert(key.as_slice(), serialize(&user).map_err(abort)?)?;
            Ok(user)
        });
        let user = unwrap_tx(result)?;
        self.flush()?;
        Ok(user)
    }

    fn get_habit(&self, id: HabitId) -> Result<HabitRecord, LedgerError> {
        Self::get_record(&self.habits, habit_key(id), || format!("habit: {}", id))
    }

    fn list_habits(&self, user_id: UserId) -> Result<Vec<HabitRecord>, LedgerError> {
        let all: Vec<HabitRecord> = Self::scan(&self.habits, b"habits:")?;
        Ok(all.into_iter().filter(|h| h.user_id == user_id).collect())
    }

    fn create_habit(&self, habit: HabitRecord) -> Result<HabitRecord, LedgerError> {
        habit.check_invariants()?;
        self.put_record(&self.habits, habit_key(habit.id), &habit)?;
        Ok(habit)
    }

    fn update_habit(&self, habit: HabitRecord) -> Result<HabitRecord, LedgerError> {
        habit.check_invariants()?;
        self.replace_record(&self.habits, habit_key(habit.id), &habit, || {
            format!("habit: {}", habit.id)
        })?;
        Ok(habit)
    }

    fn delete_habit(&self, id: HabitId) -> Result<(), LedgerError> {
        if self.habits.remove(habit_key(id))?.is_none() {
            return Err(LedgerError::NotFound(format!("habit: {}", id)));
        }
        self.flush()
    }

    fn list_completions(
        &self,
        user_id: UserId,
        habit_id: Option<HabitId>,
    ) -> Result<Vec<CompletionRecord>, LedgerError> {
        let all: Vec<CompletionRecord> =
            Self::scan(&self.completions, &completion_prefix(user_id))?;
        Ok(all
            .into_iter()
            .filter(|c| habit_id.map_or(true, |h| c.habit_id == h))
            .collect())
    }

    fn list_items(&self) -> Result<Vec<ItemRecord>, LedgerError> {
        Self::scan(&self.items, b"items:")
    }

    fn get_item(&self, id: ItemId) -> Result<ItemRecord, LedgerError> {
        Self::get_record(&self.items, item_key(id), || format!("item: {}", id))
    }

    fn put_item(&self, item: ItemRecord) -> Result<(), LedgerError> {
        self.put_record(&self.items, item_key(item.id), &item)
    }

    fn get_user_item(
        &self,
        user_id: UserId,
        item_id: ItemId,
    ) -> Result<Option<UserItemRecord>, LedgerError> {
        match self.user_items.get(user_item_key(user_id, item_id))? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn list_user_items(&self, user_id: UserId) -> Result<Vec<UserItemRecord>, LedgerError> {
        Self::scan(&self.user_items, &user_item_prefix(user_id))
    }

    fn set_equipped(
        &self,
        user_id: UserId,
        item_id: ItemId,
        equipped: bool,
    ) -> Result<UserItemRecord, LedgerError> {
        let key = user_item_key(user_id, item_id);
        let result = self.user_items.transaction(|tx| {
            let bytes = tx.get(key.as_slice())?.ok_or_else(|| {
                abort(LedgerError::NotFound(format!(
                    "user {} does not own item {}",
                    user_id, item_id
                )))
            })?;
            let mut record: UserItemRecord = deserialize(&bytes).map_err(abort)?;
            record.equipped = equipped;
            tx.insert(key.as_slice(), serialize(&record).map_err(abort)?)?;
            Ok(record)
        });
        let record = unwrap_tx(result)?;
        self.flush()?;
        Ok(record)
    }

    fn create_pet(&self, pet: PetRecord) -> Result<PetRecord, LedgerError> {
        self.put_record(&self.pets, pet_key(pet.id), &pet)?;
        Ok(pet)
    }

    fn get_pet(&self, id: PetId) -> Result<PetRecord, LedgerError> {
        Self::get_record(&self.pets, pet_key(id), || format!("pet: {}", id))
    }

    fn list_pets(&self, user_id: UserId) -> Result<Vec<PetRecord>, LedgerError> {
        let all: Vec<PetRecord> = Self::scan(&self.pets, b"pets:")?;
        Ok(all.into_iter().filter(|p| p.user_id == user_id).collect())
    }

    fn update_pet(&self, pet: PetRecord) -> Result<PetRecord, LedgerError> {
        self.replace_record(&self.pets, pet_key(pet.id), &pet, || {
            format!("pet: {}", pet.id)
        })?;
        Ok(pet)
    }
}

fn decode_id(raw: &[u8]) -> Result<u64, LedgerError> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| {
        LedgerError::InvariantViolation(format!("username index entry has {} bytes", raw.len()))
    })?;
    Ok(u64::from_be_bytes(bytes))
}
