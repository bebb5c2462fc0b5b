// SPDX-License-Identifier: MPL-2.0

use crate::store::{
    Callback, Document, DocumentStore, Listeners, StoreError, Subscription, increment_field,
    merge_fields,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
struct Versioned {
    version: u64,
    doc: Document,
}

/// Process-local document store with live subscriptions.
///
/// Cheap to clone; clones share the same documents and listeners.
#[derive(Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<HashMap<(String, String), Versioned>>>,
    listeners: Listeners,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.listeners.len()
    }

    /// Apply a mutation to a document and fan the result out to listeners
    fn mutate(&self, collection: &str, id: &str, apply: impl FnOnce(&mut Document)) {
        let (version, doc) = {
            let mut docs = self.docs.write().expect("store lock poisoned");
            let entry = docs
                .entry((collection.to_string(), id.to_string()))
                .or_insert_with(|| Versioned {
                    version: 0,
                    doc: Document::new(),
                });
            apply(&mut entry.doc);
            entry.version += 1;
            (entry.version, entry.doc.clone())
        };
        self.listeners.notify(collection, id, version, Some(&doc));
    }

    fn snapshot(&self, collection: &str, id: &str) -> (u64, Option<Document>) {
        let docs = self.docs.read().expect("store lock poisoned");
        match docs.get(&(collection.to_string(), id.to_string())) {
            Some(entry) => (entry.version, Some(entry.doc.clone())),
            None => (0, None),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.snapshot(collection, id).1)
    }

    async fn set(&self, collection: &str, id: &str, fields: Document) -> Result<(), StoreError> {
        self.mutate(collection, id, |doc| merge_fields(doc, fields));
        Ok(())
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), StoreError> {
        self.mutate(collection, id, |doc| {
            increment_field(doc, field, delta);
        });
        Ok(())
    }

    async fn subscribe(
        &self,
        collection: &str,
        id: &str,
        callback: Callback,
    ) -> Result<Subscription, StoreError> {
        let (listener, subscription) = self.listeners.register(collection, id, callback);
        let (version, doc) = self.snapshot(collection, id);
        Listeners::deliver_initial(&listener, version, doc.as_ref());
        Ok(subscription)
    }
}
