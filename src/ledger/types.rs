use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ledger::errors::LedgerError;
use crate::ledger::progression::level_for_xp;

pub const USER_SCHEMA_VERSION: u8 = 1;
pub const HABIT_SCHEMA_VERSION: u8 = 1;
pub const COMPLETION_SCHEMA_VERSION: u8 = 1;
pub const ITEM_SCHEMA_VERSION: u8 = 2;
pub const USER_ITEM_SCHEMA_VERSION: u8 = 1;
pub const PET_SCHEMA_VERSION: u8 = 1;

pub const MAX_HAPPINESS: u8 = 100;

pub type UserId = u64;
pub type HabitId = u64;
pub type CompletionId = u64;
pub type ItemId = u64;
pub type PetId = u64;

// ============================================================================
// Users
// ============================================================================

/// Which unlocked-content set an item contributes to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UnlockCategory {
    Sounds,
    Backgrounds,
    Characters,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub xp: u64,
    /// Always `level_for_xp(xp)`; only `grant_xp` writes it.
    pub level: u32,
    pub coins: u64,
    #[serde(default)]
    pub unlocked_sounds: BTreeSet<String>,
    #[serde(default)]
    pub unlocked_backgrounds: BTreeSet<String>,
    #[serde(default)]
    pub unlocked_characters: BTreeSet<String>,
    #[serde(default)]
    pub active_pet_id: Option<PetId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl UserRecord {
    pub fn new(id: UserId, username: &str, starting_coins: u64) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: username.to_string(),
            xp: 0,
            level: level_for_xp(0),
            coins: starting_coins,
            unlocked_sounds: BTreeSet::new(),
            unlocked_backgrounds: BTreeSet::new(),
            unlocked_characters: BTreeSet::new(),
            active_pet_id: None,
            created_at: now,
            updated_at: now,
            schema_version: USER_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Add experience and recompute the level from the new total.
    pub fn grant_xp(&mut self, amount: u64) {
        self.xp = self.xp.saturating_add(amount);
        self.level = level_for_xp(self.xp);
    }

    pub fn unlocked(&self, category: UnlockCategory) -> &BTreeSet<String> {
        match category {
            UnlockCategory::Sounds => &self.unlocked_sounds,
            UnlockCategory::Backgrounds => &self.unlocked_backgrounds,
            UnlockCategory::Characters => &self.unlocked_characters,
        }
    }

    pub fn unlocked_mut(&mut self, category: UnlockCategory) -> &mut BTreeSet<String> {
        match category {
            UnlockCategory::Sounds => &mut self.unlocked_sounds,
            UnlockCategory::Backgrounds => &mut self.unlocked_backgrounds,
            UnlockCategory::Characters => &mut self.unlocked_characters,
        }
    }

    pub fn check_invariants(&self) -> Result<(), LedgerError> {
        let expected = level_for_xp(self.xp);
        if self.level != expected {
            return Err(LedgerError::InvariantViolation(format!(
                "user {} has level {} but xp {} implies level {}",
                self.id, self.level, self.xp, expected
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Habits and completions
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HabitRecord {
    pub id: HabitId,
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Completions needed to satisfy a period (>= 1)
    pub target: u32,
    /// Progress within the active period (<= target)
    pub current: u32,
    pub streak: u32,
    #[serde(default)]
    pub last_completed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl HabitRecord {
    pub fn new(id: HabitId, user_id: UserId, name: &str, target: u32) -> Self {
        Self {
            id,
            user_id,
            name: name.to_string(),
            description: None,
            target,
            current: 0,
            streak: 0,
            last_completed: None,
            created_at: Utc::now(),
            schema_version: HABIT_SCHEMA_VERSION,
        }
    }

    pub fn check_invariants(&self) -> Result<(), LedgerError> {
        if self.target == 0 {
            return Err(LedgerError::InvariantViolation(format!(
                "habit {} has a zero target",
                self.id
            )));
        }
        if self.current > self.target {
            return Err(LedgerError::InvariantViolation(format!(
                "habit {} progress {} exceeds target {}",
                self.id, self.current, self.target
            )));
        }
        Ok(())
    }
}

/// Descriptive fields a user may edit on an existing habit. Progress and streak are
/// owned by the completion engine and cannot be set here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HabitUpdate {
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub target: Option<u32>,
}

/// Immutable record of one rewarded completion. The reward is frozen at grant time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRecord {
    pub id: CompletionId,
    pub habit_id: HabitId,
    pub user_id: UserId,
    pub completed_at: DateTime<Utc>,
    pub coins_earned: u64,
    pub xp_earned: u64,
    pub schema_version: u8,
}

// ============================================================================
// Catalog and inventory
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Cosmetic,
    Boost,
    Powerup,
    PetTemplate,
}

impl ItemKind {
    /// Stackable kinds accumulate quantity instead of being owned once.
    pub fn is_stackable(self) -> bool {
        matches!(self, ItemKind::Boost | ItemKind::Powerup)
    }
}

/// When a seasonal item is on sale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeasonWindow {
    /// Half-open window `[start, end)`.
    Between {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// The same calendar month (1-12, UTC) every year.
    Month(u32),
}

impl SeasonWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        SeasonWindow::Between { start, end }
    }

    pub fn every(month: u32) -> Result<Self, LedgerError> {
        if !(1..=12).contains(&month) {
            return Err(LedgerError::Invalid(format!("month out of range: {month}")));
        }
        Ok(SeasonWindow::Month(month))
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        match *self {
            SeasonWindow::Between { start, end } => start <= at && at < end,
            SeasonWindow::Month(month) => at.month() == month,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemUnlock {
    pub category: UnlockCategory,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemRecord {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub kind: ItemKind,
    pub price: u64,
    #[serde(default)]
    pub season: Option<SeasonWindow>,
    /// Content added to the buyer's unlocked sets on purchase
    #[serde(default)]
    pub unlock: Option<ItemUnlock>,
    /// Opaque effect descriptor interpreted by the caller
    #[serde(default)]
    pub effect: Option<String>,
    pub schema_version: u8,
}

impl ItemRecord {
    pub fn new(id: ItemId, name: &str, kind: ItemKind, price: u64) -> Self {
        Self {
            id,
            name: name.to_string(),
            description: String::new(),
            kind,
            price,
            season: None,
            unlock: None,
            effect: None,
            schema_version: ITEM_SCHEMA_VERSION,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_season(mut self, window: SeasonWindow) -> Self {
        self.season = Some(window);
        self
    }

    pub fn with_unlock(mut self, category: UnlockCategory, name: &str) -> Self {
        self.unlock = Some(ItemUnlock {
            category,
            name: name.to_string(),
        });
        self
    }

    pub fn with_effect(mut self, effect: &str) -> Self {
        self.effect = Some(effect.to_string());
        self
    }

    pub fn is_available_at(&self, at: DateTime<Utc>) -> bool {
        self.season.map_or(true, |window| window.contains(at))
    }
}

/// Ownership of one catalog item by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserItemRecord {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub equipped: bool,
    /// Units on hand; always 1 for non-stackable kinds
    pub quantity: u32,
    pub acquired_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl UserItemRecord {
    pub fn new(user_id: UserId, item_id: ItemId, acquired_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            item_id,
            equipped: false,
            quantity: 1,
            acquired_at,
            schema_version: USER_ITEM_SCHEMA_VERSION,
        }
    }
}

// ============================================================================
// Pets
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PetRecord {
    pub id: PetId,
    pub user_id: UserId,
    /// Pet-template item this pet was adopted from
    pub source_item_id: ItemId,
    pub name: String,
    /// Happiness as of `last_fed` (0-100); see `happiness_at` for the current value
    pub happiness: u8,
    pub last_fed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl PetRecord {
    pub fn new(
        id: PetId,
        user_id: UserId,
        source_item_id: ItemId,
        name: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            source_item_id,
            name: name.to_string(),
            happiness: MAX_HAPPINESS,
            last_fed: now,
            created_at: now,
            schema_version: PET_SCHEMA_VERSION,
        }
    }

    pub fn feed(&mut self, now: DateTime<Utc>) {
        self.happiness = MAX_HAPPINESS;
        self.last_fed = now;
    }

    /// Happiness after linear decay of `decay_per_day` points per 24h since `last_fed`.
    /// A `last_fed` in the future counts as zero elapsed time.
    pub fn happiness_at(&self, now: DateTime<Utc>, decay_per_day: u32) -> u8 {
        let elapsed_secs = now.signed_duration_since(self.last_fed).num_seconds().max(0) as u64;
        let lost = elapsed_secs.saturating_mul(decay_per_day as u64) / 86_400;
        let lost = lost.min(self.happiness as u64) as u8;
        self.happiness - lost
    }

    /// Copy of this record with `happiness` replaced by its decayed value.
    pub fn decayed(&self, now: DateTime<Utc>, decay_per_day: u32) -> Self {
        let mut view = self.clone();
        view.happiness = self.happiness_at(now, decay_per_day);
        view
    }
}
