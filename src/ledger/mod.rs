//! Progression and reward ledger.
//!
//! - [`types`] - persisted records and their schema versions
//! - [`progression`] - xp/level curve and completion rewards
//! - [`calendar`] - the day boundary used for "once per day" rules
//! - [`store`] - the [`LedgerStore`] abstraction and atomic write batches
//! - [`memory`], [`storage`] - in-memory and sled-backed stores
//! - [`habits`], [`shop`], [`pets`] - the engines
//! - [`service`] - the [`Ledger`] facade with per-user locking

pub mod calendar;
pub mod catalog;
pub mod errors;
pub mod habits;
pub mod locks;
pub mod memory;
pub mod pets;
pub mod progression;
pub mod service;
pub mod shop;
pub mod storage;
pub mod store;
pub mod types;

pub use calendar::DayBoundary;
pub use errors::LedgerError;
pub use habits::CompletionOutcome;
pub use memory::MemoryStore;
pub use progression::{level_for_xp, level_progress, reward_for_completion, LevelProgress, Reward};
pub use service::{Ledger, LedgerSettings};
pub use shop::InventoryEntry;
pub use storage::{SledStore, SledStoreBuilder};
pub use store::{LedgerStore, LedgerWrite};
pub use types::*;
