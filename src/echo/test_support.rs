// SPDX-License-Identifier: MPL-2.0

//! Store wrapper that counts writes and fails on demand.

use crate::store::{Callback, Document, DocumentStore, MemoryStore, StoreError, Subscription};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    writes: AtomicUsize,
    /// Fail increments against this collection
    fail_increments_on: Mutex<Option<String>>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_increments_on(&self, collection: Option<&str>) {
        *self.fail_increments_on.lock().unwrap() = collection.map(str::to_string);
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn set(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(collection, id, fields).await
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), StoreError> {
        let failing = self.fail_increments_on.lock().unwrap().clone();
        if failing.as_deref() == Some(collection) {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.increment(collection, id, field, delta).await
    }

    async fn subscribe(
        &self,
        collection: &str,
        id: &str,
        callback: Callback,
    ) -> Result<Subscription, StoreError> {
        self.inner.subscribe(collection, id, callback).await
    }
}
