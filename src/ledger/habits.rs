//! Habit management and the completion engine.
//!
//! Functions here take an explicit acting user and a `now` so they can be driven
//! deterministically from tests. Callers are expected to hold that user's lock
//! (see [`crate::ledger::locks::UserLocks`]) around each call.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, error, info};

use crate::ledger::calendar::DayBoundary;
use crate::ledger::errors::LedgerError;
use crate::ledger::progression::reward_for_completion;
use crate::ledger::store::{LedgerStore, LedgerWrite};
use crate::ledger::types::{
    CompletionRecord, HabitId, HabitRecord, HabitUpdate, UserId, UserRecord,
    COMPLETION_SCHEMA_VERSION,
};
use crate::logutil::log_label;
use crate::validation::{sanitize_description, validate_label};

pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Result of a rewarded completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub habit: HabitRecord,
    pub completion: CompletionRecord,
    pub user: UserRecord,
}

/// Load a user and refuse to build on corrupted progression state.
pub(crate) fn load_user(store: &dyn LedgerStore, user_id: UserId) -> Result<UserRecord, LedgerError> {
    let user = store.get_user(user_id)?;
    if let Err(err) = user.check_invariants() {
        error!("{}", err);
        return Err(err);
    }
    Ok(user)
}

/// Fetch a habit, distinguishing "missing" from "belongs to someone else".
fn owned_habit(
    store: &dyn LedgerStore,
    user_id: UserId,
    habit_id: HabitId,
) -> Result<HabitRecord, LedgerError> {
    let habit = store.get_habit(habit_id)?;
    if habit.user_id != user_id {
        debug!("user {} denied access to habit {}", user_id, habit_id);
        return Err(LedgerError::Forbidden(format!(
            "habit {} does not belong to user {}",
            habit_id, user_id
        )));
    }
    Ok(habit)
}

fn validate_target(target: u32) -> Result<(), LedgerError> {
    if target == 0 {
        return Err(LedgerError::Invalid("habit target must be at least 1".to_string()));
    }
    Ok(())
}

pub fn create_habit(
    store: &dyn LedgerStore,
    user_id: UserId,
    name: &str,
    description: Option<&str>,
    target: u32,
) -> Result<HabitRecord, LedgerError> {
    store.get_user(user_id)?;
    let name = validate_label(name)?;
    let description = sanitize_description(description, MAX_DESCRIPTION_CHARS)?;
    validate_target(target)?;

    let mut habit = HabitRecord::new(store.next_id()?, user_id, &name, target);
    habit.description = description;
    let habit = store.create_habit(habit)?;
    info!(
        "user {} created habit {} '{}' (target {})",
        user_id,
        habit.id,
        log_label(&habit.name),
        habit.target
    );
    Ok(habit)
}

pub fn get_habit(
    store: &dyn LedgerStore,
    user_id: UserId,
    habit_id: HabitId,
) -> Result<HabitRecord, LedgerError> {
    owned_habit(store, user_id, habit_id)
}

pub fn list_habits(store: &dyn LedgerStore, user_id: UserId) -> Result<Vec<HabitRecord>, LedgerError> {
    store.get_user(user_id)?;
    store.list_habits(user_id)
}

/// Edit descriptive fields and the target. Lowering the target below the current
/// progress clamps the progress down to the new target.
pub fn update_habit(
    store: &dyn LedgerStore,
    user_id: UserId,
    habit_id: HabitId,
    update: HabitUpdate,
) -> Result<HabitRecord, LedgerError> {
    let mut habit = owned_habit(store, user_id, habit_id)?;

    if let Some(name) = update.name.as_deref() {
        habit.name = validate_label(name)?;
    }
    if let Some(description) = update.description {
        habit.description = sanitize_description(description.as_deref(), MAX_DESCRIPTION_CHARS)?;
    }
    if let Some(target) = update.target {
        validate_target(target)?;
        habit.target = target;
        habit.current = habit.current.min(target);
    }

    let habit = store.update_habit(habit)?;
    debug!("user {} updated habit {}", user_id, habit_id);
    Ok(habit)
}

/// Remove a habit. Its completions stay in the history.
pub fn delete_habit(store: &dyn LedgerStore, user_id: UserId, habit_id: HabitId) -> Result<(), LedgerError> {
    owned_habit(store, user_id, habit_id)?;
    store.delete_habit(habit_id)?;
    info!("user {} deleted habit {}", user_id, habit_id);
    Ok(())
}

/// Record a completion of `habit_id` at `now` and grant its reward.
///
/// The reward is computed from the streak before this completion counts. Habit progress,
/// the completion record, the coin credit and the xp grant are persisted as one batch.
pub fn complete_habit(
    store: &dyn LedgerStore,
    boundary: &DayBoundary,
    user_id: UserId,
    habit_id: HabitId,
    now: DateTime<Utc>,
) -> Result<CompletionOutcome, LedgerError> {
    load_user(store, user_id)?;
    let mut habit = owned_habit(store, user_id, habit_id)?;

    if let Some(last) = habit.last_completed {
        if boundary.same_day(last, now) {
            debug!(
                "habit {} already completed on {} by user {}",
                habit_id,
                boundary.day_of(now),
                user_id
            );
            return Err(LedgerError::AlreadyCompletedToday);
        }
    }

    let reward = reward_for_completion(habit.streak);
    habit.streak = habit.streak.saturating_add(1);
    habit.current = habit.current.saturating_add(1).min(habit.target);
    habit.last_completed = Some(now);

    let completion = CompletionRecord {
        id: store.next_id()?,
        habit_id,
        user_id,
        completed_at: now,
        coins_earned: reward.coins,
        xp_earned: reward.xp,
        schema_version: COMPLETION_SCHEMA_VERSION,
    };

    store.apply(&[
        LedgerWrite::PutHabit(habit.clone()),
        LedgerWrite::InsertCompletion(completion.clone()),
        LedgerWrite::CreditCoins {
            user_id,
            amount: reward.coins,
        },
        LedgerWrite::GrantXp {
            user_id,
            amount: reward.xp,
        },
    ])?;

    let user = store.get_user(user_id)?;
    info!(
        "user {} completed habit {} (streak {}): +{} coins, +{} xp, level {}",
        user_id, habit_id, habit.streak, reward.coins, reward.xp, user.level
    );
    Ok(CompletionOutcome {
        habit,
        completion,
        user,
    })
}

pub fn list_completions(
    store: &dyn LedgerStore,
    user_id: UserId,
    habit_id: Option<HabitId>,
) -> Result<Vec<CompletionRecord>, LedgerError> {
    store.get_user(user_id)?;
    store.list_completions(user_id, habit_id)
}

/// Completion counts per calendar day in `[from, to]` (inclusive), for heatmaps.
/// Days without completions are omitted.
pub fn daily_completion_counts(
    store: &dyn LedgerStore,
    boundary: &DayBoundary,
    user_id: UserId,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<BTreeMap<NaiveDate, u32>, LedgerError> {
    if from > to {
        return Err(LedgerError::Invalid(format!("empty date range {from}..={to}")));
    }
    let mut counts = BTreeMap::new();
    for completion in list_completions(store, user_id, None)? {
        let day = boundary.day_of(completion.completed_at);
        if day >= from && day <= to {
            *counts.entry(day).or_insert(0u32) += 1;
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn setup() -> (MemoryStore, UserId) {
        let store = MemoryStore::new();
        let id = store.next_id().unwrap();
        store.create_user(UserRecord::new(id, "walker", 0)).unwrap();
        (store, id)
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn first_completion_rewards_base_amounts() {
        let (store, user) = setup();
        let habit = create_habit(&store, user, "Stretch", None, 3).unwrap();
        let outcome =
            complete_habit(&store, &DayBoundary::utc(), user, habit.id, at(1, 8)).unwrap();
        assert_eq!(outcome.completion.coins_earned, 10);
        assert_eq!(outcome.completion.xp_earned, 10);
        assert_eq!(outcome.habit.streak, 1);
        assert_eq!(outcome.habit.current, 1);
        assert_eq!(outcome.user.coins, 10);
    }

    #[test]
    fn same_day_is_rejected_next_day_is_not() {
        let (store, user) = setup();
        let boundary = DayBoundary::utc();
        let habit = create_habit(&store, user, "Read", None, 1).unwrap();
        complete_habit(&store, &boundary, user, habit.id, at(2, 6)).unwrap();
        let err = complete_habit(&store, &boundary, user, habit.id, at(2, 23)).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyCompletedToday));
        complete_habit(&store, &boundary, user, habit.id, at(3, 0)).unwrap();
        assert_eq!(store.list_completions(user, Some(habit.id)).unwrap().len(), 2);
    }

    #[test]
    fn offset_boundary_moves_the_day_edge() {
        let (store, user) = setup();
        // UTC+2: 23:00Z on the 4th and 21:00Z on the 5th fall on local days 5th and 5th.
        let boundary = DayBoundary::from_offset_minutes(120).unwrap();
        let habit = create_habit(&store, user, "Journal", None, 1).unwrap();
        complete_habit(&store, &boundary, user, habit.id, at(4, 23)).unwrap();
        let err = complete_habit(&store, &boundary, user, habit.id, at(5, 21)).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyCompletedToday));
    }

    #[test]
    fn other_users_habits_are_forbidden() {
        let (store, owner) = setup();
        let intruder = store.next_id().unwrap();
        store.create_user(UserRecord::new(intruder, "intruder", 0)).unwrap();
        let habit = create_habit(&store, owner, "Run", None, 1).unwrap();
        let err = complete_habit(&store, &DayBoundary::utc(), intruder, habit.id, at(1, 9))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden(_)));
        assert!(matches!(
            get_habit(&store, owner, 9_999),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn lowering_target_clamps_progress() {
        let (store, user) = setup();
        let boundary = DayBoundary::utc();
        let habit = create_habit(&store, user, "Water", Some("8 glasses"), 5).unwrap();
        for day in 1..=4 {
            complete_habit(&store, &boundary, user, habit.id, at(day, 12)).unwrap();
        }
        let updated = update_habit(
            &store,
            user,
            habit.id,
            HabitUpdate {
                target: Some(2),
                description: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.target, 2);
        assert_eq!(updated.current, 2);
        assert_eq!(updated.streak, 4);
        assert_eq!(updated.description, None);
    }

    #[test]
    fn invalid_input_is_rejected() {
        let (store, user) = setup();
        assert!(matches!(
            create_habit(&store, user, "Meditate", None, 0),
            Err(LedgerError::Invalid(_))
        ));
        assert!(matches!(
            create_habit(&store, user, "  ", None, 1),
            Err(LedgerError::Invalid(_))
        ));
    }

    #[test]
    fn heatmap_counts_by_day() {
        let (store, user) = setup();
        let boundary = DayBoundary::utc();
        let a = create_habit(&store, user, "A", None, 1).unwrap();
        let b = create_habit(&store, user, "B", None, 1).unwrap();
        complete_habit(&store, &boundary, user, a.id, at(10, 7)).unwrap();
        complete_habit(&store, &boundary, user, b.id, at(10, 20)).unwrap();
        complete_habit(&store, &boundary, user, a.id, at(11, 7)).unwrap();
        complete_habit(&store, &boundary, user, a.id, at(20, 7)).unwrap();

        let from = at(10, 0).date_naive();
        let to = from + Duration::days(1);
        let counts = daily_completion_counts(&store, &boundary, user, from, to).unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[&from], 2);
        assert_eq!(counts[&to], 1);
    }

    #[test]
    fn deleting_a_habit_keeps_history() {
        let (store, user) = setup();
        let habit = create_habit(&store, user, "Floss", None, 1).unwrap();
        complete_habit(&store, &DayBoundary::utc(), user, habit.id, at(1, 21)).unwrap();
        delete_habit(&store, user, habit.id).unwrap();
        assert!(list_habits(&store, user).unwrap().is_empty());
        assert_eq!(list_completions(&store, user, None).unwrap().len(), 1);
    }
}
