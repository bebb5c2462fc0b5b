// SPDX-License-Identifier: MPL-2.0

//! Daily reflection streak arithmetic.
//!
//! Days are counted between calendar dates in the caller's time zone, not
//! in elapsed hours: 23:59 followed by 00:01 is one day apart. None of
//! these functions fail. A missing or unparseable timestamp means the user
//! has never reflected.

use crate::model::parse_timestamp;
use chrono::{DateTime, Local, TimeZone};

/// Outcome of checking whether a streak is still alive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakValidation {
    pub is_valid: bool,
    /// Whole calendar days since the last reflection, `None` if there never was one
    pub days_since_last_reflection: Option<i64>,
}

/// Calendar days between `last_reflect_date` and `now`.
/// Timestamps in the future count as today.
pub fn days_since_last_reflection<Tz: TimeZone>(
    last_reflect_date: Option<&str>,
    now: &DateTime<Tz>,
) -> Option<i64> {
    let last = parse_timestamp(last_reflect_date?)?.with_timezone(&now.timezone());
    let days = (now.date_naive() - last.date_naive()).num_days();
    Some(days.max(0))
}

pub fn validate_streak_at<Tz: TimeZone>(
    last_reflect_date: Option<&str>,
    now: &DateTime<Tz>,
) -> StreakValidation {
    match days_since_last_reflection(last_reflect_date, now) {
        Some(days) => StreakValidation {
            is_valid: days <= 1,
            days_since_last_reflection: Some(days),
        },
        None => StreakValidation {
            is_valid: false,
            days_since_last_reflection: None,
        },
    }
}

pub fn validate_streak(last_reflect_date: Option<&str>) -> StreakValidation {
    validate_streak_at(last_reflect_date, &Local::now())
}

/// Streak after posting a reflection at `now`.
///
/// Same day keeps the streak (a zero streak becomes 1), the next day
/// extends it, anything else starts over at 1. A nonzero streak on a
/// same-day post is taken as-is without checking it against older gaps.
pub fn calculate_new_streak_at<Tz: TimeZone>(
    current_streak: u32,
    last_reflect_date: Option<&str>,
    now: &DateTime<Tz>,
) -> u32 {
    match days_since_last_reflection(last_reflect_date, now) {
        Some(0) if current_streak == 0 => 1,
        Some(0) => current_streak,
        Some(1) => current_streak.saturating_add(1),
        _ => 1,
    }
}

pub fn calculate_new_streak(current_streak: u32, last_reflect_date: Option<&str>) -> u32 {
    calculate_new_streak_at(current_streak, last_reflect_date, &Local::now())
}

/// True only for a real gap; a user who never reflected has nothing to reset
pub fn should_reset_streak_at<Tz: TimeZone>(
    last_reflect_date: Option<&str>,
    now: &DateTime<Tz>,
) -> bool {
    let validation = validate_streak_at(last_reflect_date, now);
    !validation.is_valid
        && validation
            .days_since_last_reflection
            .is_some_and(|days| days > 1)
}

pub fn should_reset_streak(last_reflect_date: Option<&str>) -> bool {
    should_reset_streak_at(last_reflect_date, &Local::now())
}
