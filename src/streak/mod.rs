// SPDX-License-Identifier: MPL-2.0

mod calculator;
mod recorder;

pub use calculator::{
    StreakValidation, calculate_new_streak, calculate_new_streak_at, days_since_last_reflection,
    should_reset_streak, should_reset_streak_at, validate_streak, validate_streak_at,
};
pub use recorder::StreakRecorder;

use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreakError {
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}
