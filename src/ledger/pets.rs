//! Pet lifecycle: adoption from a pet-template item, feeding, and the active companion.
//!
//! Happiness is stored as of the last feeding and decays linearly on read; nothing runs in
//! the background.

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::ledger::errors::LedgerError;
use crate::ledger::store::LedgerStore;
use crate::ledger::types::{ItemId, ItemKind, PetId, PetRecord, UserId, UserRecord};
use crate::logutil::log_label;
use crate::validation::validate_label;

fn owned_pet(store: &dyn LedgerStore, user_id: UserId, pet_id: PetId) -> Result<PetRecord, LedgerError> {
    let pet = store.get_pet(pet_id)?;
    if pet.user_id != user_id {
        debug!("user {} denied access to pet {}", user_id, pet_id);
        return Err(LedgerError::Forbidden(format!(
            "pet {} does not belong to user {}",
            pet_id, user_id
        )));
    }
    Ok(pet)
}

/// Adopt a pet from an owned pet-template item. One pet per template per user.
pub fn create_pet(
    store: &dyn LedgerStore,
    user_id: UserId,
    item_id: ItemId,
    name: &str,
    now: DateTime<Utc>,
) -> Result<PetRecord, LedgerError> {
    store.get_user(user_id)?;
    let name = validate_label(name)?;
    let item = store.get_item(item_id)?;
    if item.kind != ItemKind::PetTemplate {
        return Err(LedgerError::Forbidden(format!(
            "'{}' is not a pet template",
            item.name
        )));
    }
    if store.get_user_item(user_id, item_id)?.is_none() {
        return Err(LedgerError::Forbidden(format!(
            "user {} does not own pet template {}",
            user_id, item_id
        )));
    }
    if store
        .list_pets(user_id)?
        .iter()
        .any(|pet| pet.source_item_id == item_id)
    {
        return Err(LedgerError::AlreadyOwned);
    }

    let pet = store.create_pet(PetRecord::new(store.next_id()?, user_id, item_id, &name, now))?;
    info!(
        "user {} adopted pet {} '{}' from item {}",
        user_id,
        pet.id,
        log_label(&pet.name),
        item_id
    );
    Ok(pet)
}

/// Reset happiness to full and `last_fed` to `now`.
pub fn feed_pet(
    store: &dyn LedgerStore,
    user_id: UserId,
    pet_id: PetId,
    now: DateTime<Utc>,
) -> Result<PetRecord, LedgerError> {
    let mut pet = owned_pet(store, user_id, pet_id)?;
    pet.feed(now);
    let pet = store.update_pet(pet)?;
    debug!("user {} fed pet {}", user_id, pet_id);
    Ok(pet)
}

/// Make `pet_id` the user's active companion, or clear it with `None`.
pub fn set_active_pet(
    store: &dyn LedgerStore,
    user_id: UserId,
    pet_id: Option<PetId>,
) -> Result<UserRecord, LedgerError> {
    if let Some(pet_id) = pet_id {
        owned_pet(store, user_id, pet_id)?;
    }
    store.set_active_pet(user_id, pet_id)
}

/// Pet with happiness decayed to `now`.
pub fn get_pet(
    store: &dyn LedgerStore,
    user_id: UserId,
    pet_id: PetId,
    now: DateTime<Utc>,
    decay_per_day: u32,
) -> Result<PetRecord, LedgerError> {
    Ok(owned_pet(store, user_id, pet_id)?.decayed(now, decay_per_day))
}

pub fn list_pets(
    store: &dyn LedgerStore,
    user_id: UserId,
    now: DateTime<Utc>,
    decay_per_day: u32,
) -> Result<Vec<PetRecord>, LedgerError> {
    store.get_user(user_id)?;
    Ok(store
        .list_pets(user_id)?
        .iter()
        .map(|pet| pet.decayed(now, decay_per_day))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::MemoryStore;
    use crate::ledger::types::{ItemRecord, UserItemRecord, MAX_HAPPINESS};
    use chrono::{Duration, TimeZone};

    const TEMPLATE: ItemId = 700;

    fn setup(owns_template: bool) -> (MemoryStore, UserId) {
        let store = MemoryStore::new();
        let id = store.next_id().unwrap();
        store.create_user(UserRecord::new(id, "keeper", 0)).unwrap();
        store
            .put_item(ItemRecord::new(TEMPLATE, "Puppy", ItemKind::PetTemplate, 100))
            .unwrap();
        if owns_template {
            store
                .create_user_item(UserItemRecord::new(id, TEMPLATE, Utc::now()), false)
                .unwrap();
        }
        (store, id)
    }

    #[test]
    fn adoption_requires_the_template() {
        let (store, user) = setup(false);
        assert!(matches!(
            create_pet(&store, user, TEMPLATE, "Rex", Utc::now()),
            Err(LedgerError::Forbidden(_))
        ));
    }

    #[test]
    fn one_pet_per_template() {
        let (store, user) = setup(true);
        let pet = create_pet(&store, user, TEMPLATE, "Rex", Utc::now()).unwrap();
        assert_eq!(pet.happiness, MAX_HAPPINESS);
        assert!(matches!(
            create_pet(&store, user, TEMPLATE, "Rex II", Utc::now()),
            Err(LedgerError::AlreadyOwned)
        ));
    }

    #[test]
    fn happiness_decays_on_read_and_feeding_restores_it() {
        let (store, user) = setup(true);
        let adopted = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let pet = create_pet(&store, user, TEMPLATE, "Rex", adopted).unwrap();

        let later = adopted + Duration::days(3);
        assert_eq!(get_pet(&store, user, pet.id, later, 10).unwrap().happiness, 70);
        // Reads never persist the decay.
        assert_eq!(store.get_pet(pet.id).unwrap().happiness, MAX_HAPPINESS);

        let fed = feed_pet(&store, user, pet.id, later).unwrap();
        assert_eq!(fed.happiness, MAX_HAPPINESS);
        assert_eq!(fed.last_fed, later);
        assert_eq!(list_pets(&store, user, later, 10).unwrap()[0].happiness, 100);
    }

    #[test]
    fn active_pet_must_be_owned() {
        let (store, user) = setup(true);
        let other = store.next_id().unwrap();
        store.create_user(UserRecord::new(other, "neighbor", 0)).unwrap();
        let pet = create_pet(&store, user, TEMPLATE, "Rex", Utc::now()).unwrap();

        assert!(matches!(
            set_active_pet(&store, other, Some(pet.id)),
            Err(LedgerError::Forbidden(_))
        ));
        assert!(matches!(
            feed_pet(&store, other, pet.id, Utc::now()),
            Err(LedgerError::Forbidden(_))
        ));
        let profile = set_active_pet(&store, user, Some(pet.id)).unwrap();
        assert_eq!(profile.active_pet_id, Some(pet.id));
        assert_eq!(set_active_pet(&store, user, None).unwrap().active_pet_id, None);
    }
}
