// SPDX-License-Identifier: MPL-2.0

//! Document store contract consumed by the streak and echo bookkeeping.
//!
//! Records are JSON objects addressed by `(collection, id)`. Stores support
//! merge-style partial writes, atomic integer increments, and live
//! subscriptions that deliver the current record immediately and again on
//! every change.

mod document;
mod listeners;
mod memory;
mod schema;
mod sqlite;

pub use document::{Document, increment_field, merge_fields};
pub use listeners::{Callback, Subscription};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub(crate) use listeners::Listeners;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database path error: {0}")]
    Path(String),
    #[error("stored record {collection}/{id} is not an object")]
    Malformed { collection: String, id: String },
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Remote-style document store.
///
/// Implementations serialize individual writes to a single document; there
/// is no multi-document transaction.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a record, `None` when it does not exist
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Merge `fields` into the record, creating it if absent.
    /// Nested objects merge recursively and a `null` value deletes the field.
    async fn set(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError>;

    /// Atomically add `delta` to an integer field. A missing or non-integer
    /// field counts as zero.
    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), StoreError>;

    /// Watch a record. The callback runs once with the current value before
    /// this returns, then after every change until the subscription is
    /// released.
    async fn subscribe(
        &self,
        collection: &str,
        id: &str,
        callback: Callback,
    ) -> Result<Subscription, StoreError>;
}
