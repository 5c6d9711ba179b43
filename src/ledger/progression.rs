//! Pure progression rules: experience to level, and the reward for one completion.

use serde::{Deserialize, Serialize};

/// Experience granted for every qualifying completion.
pub const XP_PER_COMPLETION: u64 = 10;
/// Coins granted for a completion before any streak bonus.
pub const BASE_COINS_PER_COMPLETION: u64 = 10;
/// Extra coins per full week of streak.
pub const STREAK_BONUS_COINS: u64 = 5;
pub const STREAK_BONUS_INTERVAL: u32 = 7;
/// Divisor applied to xp before taking the square root.
pub const XP_LEVEL_DIVISOR: u64 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reward {
    pub coins: u64,
    pub xp: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelProgress {
    pub level: u32,
    /// Experience earned since reaching `level`
    pub xp_into_level: u64,
    /// Experience span between `level` and the next one
    pub xp_for_next_level: u64,
}

fn isqrt(n: u64) -> u64 {
    let mut root = (n as f64).sqrt() as u64;
    // Correct float rounding in either direction.
    while root.checked_mul(root).map_or(true, |sq| sq > n) {
        root -= 1;
    }
    while (root + 1).checked_mul(root + 1).map_or(false, |sq| sq <= n) {
        root += 1;
    }
    root
}

/// `floor(sqrt(xp / 100)) + 1`, in exact integer arithmetic.
pub fn level_for_xp(xp: u64) -> u32 {
    (isqrt(xp / XP_LEVEL_DIVISOR) + 1) as u32
}

/// Minimum total experience at which `level` is reached.
pub fn xp_for_level(level: u32) -> u64 {
    let steps = level.saturating_sub(1) as u64;
    steps.saturating_mul(steps).saturating_mul(XP_LEVEL_DIVISOR)
}

pub fn level_progress(xp: u64) -> LevelProgress {
    let level = level_for_xp(xp);
    let floor = xp_for_level(level);
    let next = xp_for_level(level.saturating_add(1));
    LevelProgress {
        level,
        xp_into_level: xp - floor,
        xp_for_next_level: next - floor,
    }
}

/// Reward for a completion, given the habit's streak *before* this completion counts.
pub fn reward_for_completion(streak_before_increment: u32) -> Reward {
    let weeks = (streak_before_increment / STREAK_BONUS_INTERVAL) as u64;
    Reward {
        coins: BASE_COINS_PER_COMPLETION + weeks * STREAK_BONUS_COINS,
        xp: XP_PER_COMPLETION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_level(xp: u64) -> u32 {
        ((xp as f64 / 100.0).sqrt().floor() as u32) + 1
    }

    #[test]
    fn level_matches_formula_on_small_range() {
        for xp in 0..=50_000u64 {
            assert_eq!(level_for_xp(xp), reference_level(xp), "xp {}", xp);
        }
    }

    #[test]
    fn level_boundaries() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(99), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(399), 2);
        assert_eq!(level_for_xp(400), 3);
        assert_eq!(level_for_xp(900), 4);
    }

    #[test]
    fn level_is_monotonic_and_total() {
        let mut last = 0;
        for xp in (0..2_000_000u64).step_by(37) {
            let level = level_for_xp(xp);
            assert!(level >= last);
            last = level;
        }
        // Largest input must not overflow.
        assert!(level_for_xp(u64::MAX) > 1);
    }

    #[test]
    fn xp_for_level_inverts_level_for_xp() {
        for level in 1..200u32 {
            let xp = xp_for_level(level);
            assert_eq!(level_for_xp(xp), level);
            if xp > 0 {
                assert_eq!(level_for_xp(xp - 1), level - 1);
            }
        }
    }

    #[test]
    fn progress_within_level() {
        let p = level_progress(150);
        assert_eq!(p.level, 2);
        assert_eq!(p.xp_into_level, 50);
        assert_eq!(p.xp_for_next_level, 300);

        let fresh = level_progress(0);
        assert_eq!(fresh.level, 1);
        assert_eq!(fresh.xp_into_level, 0);
        assert_eq!(fresh.xp_for_next_level, 100);
    }

    #[test]
    fn reward_streak_bonus_steps_weekly() {
        assert_eq!(reward_for_completion(0), Reward { coins: 10, xp: 10 });
        assert_eq!(reward_for_completion(6).coins, 10);
        assert_eq!(reward_for_completion(7).coins, 15);
        assert_eq!(reward_for_completion(13).coins, 15);
        assert_eq!(reward_for_completion(14).coins, 20);
        assert_eq!(reward_for_completion(70).coins, 60);
    }

    #[test]
    fn reward_is_non_decreasing_in_streak() {
        let mut last = reward_for_completion(0).coins;
        for streak in 1..500 {
            let coins = reward_for_completion(streak).coins;
            assert!(coins >= last);
            last = coins;
        }
    }
}
