// SPDX-License-Identifier: MPL-2.0

//! In-process listener registry backing store subscriptions.
//!
//! Every change to a document carries a version number. Delivery to one
//! listener is serialized, and a listener never sees an older version after
//! a newer one, so a late initial delivery or a slow writer can't overwrite
//! a fresher update. Callbacks must not write back to the store
//! synchronously.

use crate::store::Document;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

/// Invoked with the current record, or `None` when it does not exist
pub type Callback = Box<dyn Fn(Option<&Document>) + Send + Sync>;

type DocKey = (String, String);

pub(crate) struct Listener {
    id: u64,
    /// Highest delivered version, held while the callback runs
    delivered: Mutex<Option<u64>>,
    callback: Callback,
}

impl Listener {
    fn deliver(&self, version: u64, doc: Option<&Document>) {
        let mut delivered = self.delivered.lock().expect("listener lock poisoned");
        if delivered.is_some_and(|seen| seen >= version) {
            return;
        }
        (self.callback)(doc);
        *delivered = Some(version);
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    by_key: HashMap<DocKey, Vec<Arc<Listener>>>,
}

#[derive(Clone, Default)]
pub(crate) struct Listeners {
    inner: Arc<Mutex<Registry>>,
}

impl Listeners {
    /// Register a callback for a document. The caller must follow up with
    /// [`Listeners::deliver_initial`] using the value it read.
    pub fn register(
        &self,
        collection: &str,
        id: &str,
        callback: Callback,
    ) -> (Arc<Listener>, Subscription) {
        let key = (collection.to_string(), id.to_string());
        let mut registry = self.inner.lock().expect("listener lock poisoned");
        registry.next_id += 1;
        let listener = Arc::new(Listener {
            id: registry.next_id,
            delivered: Mutex::new(None),
            callback,
        });
        registry
            .by_key
            .entry(key.clone())
            .or_default()
            .push(Arc::clone(&listener));

        let weak = Arc::downgrade(&self.inner);
        let listener_id = listener.id;
        let subscription = Subscription::new(move || Self::remove(&weak, &key, listener_id));
        (listener, subscription)
    }

    pub fn deliver_initial(listener: &Listener, version: u64, doc: Option<&Document>) {
        listener.deliver(version, doc);
    }

    /// Fan a change out to every live listener of the document.
    /// Callbacks run after the registry lock is released.
    pub fn notify(&self, collection: &str, id: &str, version: u64, doc: Option<&Document>) {
        let targets: Vec<Arc<Listener>> = {
            let registry = self.inner.lock().expect("listener lock poisoned");
            registry
                .by_key
                .get(&(collection.to_string(), id.to_string()))
                .cloned()
                .unwrap_or_default()
        };

        for listener in targets {
            listener.deliver(version, doc);
        }
    }

    /// Number of live listeners across all documents
    pub fn len(&self) -> usize {
        let registry = self.inner.lock().expect("listener lock poisoned");
        registry.by_key.values().map(Vec::len).sum()
    }

    fn remove(registry: &Weak<Mutex<Registry>>, key: &DocKey, listener_id: u64) {
        let Some(registry) = registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock().expect("listener lock poisoned");
        if let Some(list) = registry.by_key.get_mut(key) {
            list.retain(|l| l.id != listener_id);
            if list.is_empty() {
                registry.by_key.remove(key);
            }
        }
    }
}

/// Handle to a live subscription.
///
/// Call [`Subscription::unsubscribe`] when the view goes away; dropping the
/// handle releases it as well.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Stop receiving updates
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}
