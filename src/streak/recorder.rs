// SPDX-License-Identifier: MPL-2.0

use crate::config::USERS_COLLECTION;
use crate::model::{User, fields};
use crate::store::{Document, DocumentStore};
use crate::streak::{StreakError, calculate_new_streak_at, should_reset_streak_at};
use chrono::{DateTime, Local, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Applies streak rules to stored user records
pub struct StreakRecorder {
    store: Arc<dyn DocumentStore>,
    users: String,
}

impl StreakRecorder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_collection(store, USERS_COLLECTION)
    }

    pub fn with_collection(store: Arc<dyn DocumentStore>, users: &str) -> Self {
        Self {
            store,
            users: users.to_string(),
        }
    }

    /// Update the author's streak after they post a reflection.
    /// Returns the new streak.
    pub async fn record_reflection(&self, user_id: &str) -> Result<u32, StreakError> {
        self.record_reflection_at(user_id, Local::now()).await
    }

    pub async fn record_reflection_at<Tz: TimeZone>(
        &self,
        user_id: &str,
        now: DateTime<Tz>,
    ) -> Result<u32, StreakError> {
        let user = self.load_user(user_id).await?;
        let streak =
            calculate_new_streak_at(user.streak_count, user.last_reflect_date.as_deref(), &now);

        let mut update = Document::new();
        update.insert(fields::STREAK_COUNT.to_string(), Value::from(streak));
        update.insert(
            fields::LAST_REFLECT_DATE.to_string(),
            Value::from(
                now.with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        );
        self.store.set(&self.users, user_id, update).await?;
        self.store
            .increment(&self.users, user_id, fields::TOTAL_REFLECTIONS, 1)
            .await?;

        info!(user = user_id, previous = user.streak_count, streak, "recorded reflection");
        Ok(streak)
    }

    /// Validation pass: zero out a streak that a gap has broken.
    /// Returns the streak as it stands afterwards.
    pub async fn validate_user_streak(&self, user_id: &str) -> Result<u32, StreakError> {
        self.validate_user_streak_at(user_id, Local::now()).await
    }

    pub async fn validate_user_streak_at<Tz: TimeZone>(
        &self,
        user_id: &str,
        now: DateTime<Tz>,
    ) -> Result<u32, StreakError> {
        let user = self.load_user(user_id).await?;
        if user.streak_count == 0
            || !should_reset_streak_at(user.last_reflect_date.as_deref(), &now)
        {
            return Ok(user.streak_count);
        }

        let mut update = Document::new();
        update.insert(fields::STREAK_COUNT.to_string(), Value::from(0));
        self.store.set(&self.users, user_id, update).await?;

        info!(user = user_id, previous = user.streak_count, "streak reset after gap");
        Ok(0)
    }

    async fn load_user(&self, user_id: &str) -> Result<User, StreakError> {
        let doc = self
            .store
            .get(&self.users, user_id)
            .await?
            .ok_or_else(|| StreakError::UserNotFound(user_id.to_string()))?;
        debug!(user = user_id, "loaded user for streak update");
        Ok(User::from_document(user_id, &doc))
    }
}
