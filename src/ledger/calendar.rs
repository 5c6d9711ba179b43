//! Calendar-day boundary used for "already completed today" and daily counts.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

use crate::ledger::errors::LedgerError;

/// A fixed UTC offset at whose local midnight one day ends and the next begins.
/// User-local days are not modelled; every account shares the same boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    offset: FixedOffset,
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self::utc()
    }
}

impl DayBoundary {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Offset east of UTC in minutes; must be strictly within ±24h.
    pub fn from_offset_minutes(minutes: i32) -> Result<Self, LedgerError> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(|offset| Self { offset })
            .ok_or_else(|| {
                LedgerError::Invalid(format!("day boundary offset out of range: {minutes} minutes"))
            })
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset.local_minus_utc() / 60
    }

    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    pub fn same_day(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        self.day_of(a) == self.day_of(b)
    }
}
