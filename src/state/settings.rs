// SPDX-License-Identifier: MPL-2.0

use crate::config::{
    APP_ID, DEFAULT_LOG_FILTER, DEVEL_LOG_FILTER, IS_DEVEL, REFLECTIONS_COLLECTION,
    USERS_COLLECTION,
};
use crate::echo::{EchoManager, EchoReconciler};
use crate::store::{DocumentStore, SqliteStore, StoreError};
use crate::streak::StreakRecorder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to write settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize settings: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistent settings for the reflections core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub users_collection: String,
    pub reflections_collection: String,
    /// Overrides the per-user database under the data directory
    pub database_path: Option<PathBuf>,
    /// `tracing` filter directives; `RUST_LOG` wins when set
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            users_collection: USERS_COLLECTION.to_string(),
            reflections_collection: REFLECTIONS_COLLECTION.to_string(),
            database_path: None,
            log_filter: if IS_DEVEL {
                DEVEL_LOG_FILTER
            } else {
                DEFAULT_LOG_FILTER
            }
            .to_string(),
        }
    }
}

impl Settings {
    /// Get the settings file path (~/.config/io.github.sethcottle.Reflections/settings.json)
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push(APP_ID);
            p.push("settings.json");
            p
        })
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Open the SQLite document store for a signed-in user
    pub fn open_store(&self, user_id: &str) -> Result<SqliteStore, StoreError> {
        match &self.database_path {
            Some(path) => SqliteStore::open(path),
            None => SqliteStore::open_default(user_id),
        }
    }

    pub fn echo_manager(&self, store: Arc<dyn DocumentStore>) -> EchoManager {
        EchoManager::with_collections(store, &self.users_collection, &self.reflections_collection)
    }

    pub fn echo_reconciler(&self, store: Arc<dyn DocumentStore>) -> EchoReconciler {
        EchoReconciler::with_collections(
            store,
            &self.users_collection,
            &self.reflections_collection,
        )
    }

    pub fn streak_recorder(&self, store: Arc<dyn DocumentStore>) -> StreakRecorder {
        StreakRecorder::with_collection(store, &self.users_collection)
    }
}
