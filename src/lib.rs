//! # Habitquest - progression and reward ledger for a gamified habit tracker
//!
//! Users complete habits to earn coins and experience, level up along a square-root
//! curve, spend coins in a shop of cosmetics, consumables and pet templates, and keep
//! pets whose happiness fades unless they are fed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use habitquest::ledger::{Ledger, LedgerSettings, MemoryStore};
//!
//! fn main() -> Result<(), habitquest::ledger::LedgerError> {
//!     let ledger = Ledger::new(
//!         Arc::new(MemoryStore::with_starter_catalog()),
//!         LedgerSettings::default(),
//!     );
//!     let user = ledger.register_user("ada")?;
//!     let habit = ledger.create_habit(user.id, "Walk", None, 1)?;
//!     let outcome = ledger.complete_habit(user.id, habit.id)?;
//!     println!("earned {} coins", outcome.completion.coins_earned);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`ledger`] - records, stores, engines and the [`ledger::Ledger`] facade
//! - [`config`] - TOML configuration
//! - [`validation`] - name and description validation
//! - [`logutil`] - log-safe rendering of user-supplied labels

pub mod config;
pub mod ledger;
pub mod logutil;
pub mod validation;
