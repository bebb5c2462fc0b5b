// SPDX-License-Identifier: MPL-2.0

use crate::config::{REFLECTIONS_COLLECTION, USERS_COLLECTION};
use crate::echo::{EchoError, EchoWrite};
use crate::model::{Reflection, User, counter, echoed_set, fields};
use crate::store::{Document, DocumentStore, StoreError, Subscription};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Echo,
    Unecho,
}

impl Direction {
    fn delta(self) -> i64 {
        match self {
            Direction::Echo => 1,
            Direction::Unecho => -1,
        }
    }

    /// Like-set entry value: `true` adds, `null` removes
    fn entry(self) -> Value {
        match self {
            Direction::Echo => Value::Bool(true),
            Direction::Unecho => Value::Null,
        }
    }
}

/// Keeps the three echo counters in step and exposes live views of them.
///
/// Callers pass the acting user explicitly; nothing here reads session
/// state. Guards are check-then-act against the store, so two devices
/// racing as the same user can still double-echo. The UI disables the
/// echo control while a call is in flight.
pub struct EchoManager {
    store: Arc<dyn DocumentStore>,
    users: String,
    reflections: String,
}

impl EchoManager {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_collections(store, USERS_COLLECTION, REFLECTIONS_COLLECTION)
    }

    pub fn with_collections(store: Arc<dyn DocumentStore>, users: &str, reflections: &str) -> Self {
        Self {
            store,
            users: users.to_string(),
            reflections: reflections.to_string(),
        }
    }

    /// Echo a reflection on behalf of `liker_id`
    pub async fn like(
        &self,
        liker_id: &str,
        reflection_id: &str,
        author_id: &str,
    ) -> Result<(), EchoError> {
        if liker_id == author_id {
            warn!(user = liker_id, reflection = reflection_id, "rejected self echo");
            return Err(EchoError::SelfLike);
        }
        self.check_author(Direction::Echo, liker_id, reflection_id, author_id)
            .await?;

        let liker = self.load_user(liker_id).await?;
        if liker.has_echoed(reflection_id) {
            warn!(
                user = liker_id,
                reflection = reflection_id,
                "reflection already echoed, ignoring"
            );
            return Err(EchoError::AlreadyLiked {
                user_id: liker_id.to_string(),
                reflection_id: reflection_id.to_string(),
            });
        }
        self.load_user(author_id).await?;

        self.apply(Direction::Echo, liker_id, reflection_id, author_id)
            .await?;
        info!(user = liker_id, reflection = reflection_id, author = author_id, "echoed");
        Ok(())
    }

    /// Remove an echo previously made by `liker_id`
    pub async fn unlike(
        &self,
        liker_id: &str,
        reflection_id: &str,
        author_id: &str,
    ) -> Result<(), EchoError> {
        if liker_id == author_id {
            warn!(user = liker_id, reflection = reflection_id, "rejected self unecho");
            return Err(EchoError::SelfUnlike);
        }
        self.check_author(Direction::Unecho, liker_id, reflection_id, author_id)
            .await?;

        let liker = self.load_user(liker_id).await?;
        if !liker.has_echoed(reflection_id) {
            warn!(
                user = liker_id,
                reflection = reflection_id,
                "reflection not echoed, ignoring"
            );
            return Err(EchoError::NotLiked {
                user_id: liker_id.to_string(),
                reflection_id: reflection_id.to_string(),
            });
        }
        self.load_user(author_id).await?;

        self.apply(Direction::Unecho, liker_id, reflection_id, author_id)
            .await?;
        info!(user = liker_id, reflection = reflection_id, author = author_id, "unechoed");
        Ok(())
    }

    /// Point-in-time check; an unknown user has echoed nothing
    pub async fn has_liked(&self, liker_id: &str, reflection_id: &str) -> Result<bool, EchoError> {
        Ok(self.list_liked_reflection_ids(liker_id).await?.contains(reflection_id))
    }

    pub async fn list_liked_reflection_ids(
        &self,
        liker_id: &str,
    ) -> Result<HashSet<String>, EchoError> {
        let doc = self.store.get(&self.users, liker_id).await?;
        Ok(doc.as_ref().map(echoed_set).unwrap_or_default())
    }

    /// Live view of everything `user_id` has echoed
    pub async fn subscribe_echoed_reflections<F>(
        &self,
        user_id: &str,
        on_change: F,
    ) -> Result<Subscription, EchoError>
    where
        F: Fn(&HashSet<String>) + Send + Sync + 'static,
    {
        let subscription = self
            .store
            .subscribe(
                &self.users,
                user_id,
                Box::new(move |doc: Option<&Document>| {
                    on_change(&doc.map(echoed_set).unwrap_or_default())
                }),
            )
            .await?;
        debug!(user = user_id, "subscribed to echoed reflections");
        Ok(subscription)
    }

    /// Live view of a reflection's echo count
    pub async fn subscribe_echo_count<F>(
        &self,
        reflection_id: &str,
        on_change: F,
    ) -> Result<Subscription, EchoError>
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.subscribe_counter(&self.reflections, reflection_id, fields::ECHO_COUNT, on_change)
            .await
    }

    /// Live view of the echoes a user has received
    pub async fn subscribe_total_echoes<F>(
        &self,
        user_id: &str,
        on_change: F,
    ) -> Result<Subscription, EchoError>
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.subscribe_counter(&self.users, user_id, fields::TOTAL_ECHOES, on_change)
            .await
    }

    /// Live echo state of one reflection for one user, derived from the
    /// user's like-set
    pub async fn subscribe_like_status<F>(
        &self,
        user_id: &str,
        reflection_id: &str,
        on_change: F,
    ) -> Result<Subscription, EchoError>
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let reflection_id = reflection_id.to_string();
        self.subscribe_echoed_reflections(user_id, move |echoed| {
            on_change(echoed.contains(&reflection_id))
        })
        .await
    }

    async fn subscribe_counter<F>(
        &self,
        collection: &str,
        id: &str,
        field: &'static str,
        on_change: F,
    ) -> Result<Subscription, EchoError>
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let subscription = self
            .store
            .subscribe(
                collection,
                id,
                Box::new(move |doc: Option<&Document>| {
                    on_change(doc.map(|d| counter(d, field)).unwrap_or(0))
                }),
            )
            .await?;
        debug!(collection, id, field, "subscribed to counter");
        Ok(subscription)
    }

    /// Hold the caller's `author_id` to the reflection's stored author.
    /// A reflection that isn't stored yet, or has no author, is taken on trust.
    async fn check_author(
        &self,
        direction: Direction,
        liker_id: &str,
        reflection_id: &str,
        author_id: &str,
    ) -> Result<(), EchoError> {
        let Some(doc) = self.store.get(&self.reflections, reflection_id).await? else {
            return Ok(());
        };
        let Some(stored) = Reflection::from_document(reflection_id, &doc).author_id else {
            return Ok(());
        };

        if stored == liker_id {
            warn!(
                user = liker_id,
                reflection = reflection_id,
                "rejected echo on own reflection"
            );
            return Err(match direction {
                Direction::Echo => EchoError::SelfLike,
                Direction::Unecho => EchoError::SelfUnlike,
            });
        }
        if stored != author_id {
            warn!(
                reflection = reflection_id,
                stored = %stored,
                given = author_id,
                "author does not match reflection"
            );
            return Err(EchoError::AuthorMismatch {
                reflection_id: reflection_id.to_string(),
                stored,
                given: author_id.to_string(),
            });
        }
        Ok(())
    }

    async fn load_user(&self, user_id: &str) -> Result<User, EchoError> {
        let doc = self
            .store
            .get(&self.users, user_id)
            .await?
            .ok_or_else(|| EchoError::UserNotFound(user_id.to_string()))?;
        Ok(User::from_document(user_id, &doc))
    }

    /// The three writes, liker set first. A failure after the first write is
    /// reported as a partial application.
    async fn apply(
        &self,
        direction: Direction,
        liker_id: &str,
        reflection_id: &str,
        author_id: &str,
    ) -> Result<(), EchoError> {
        let mut entry = Document::new();
        entry.insert(reflection_id.to_string(), direction.entry());
        let mut update = Document::new();
        update.insert(fields::ECHOED_REFLECTIONS.to_string(), Value::Object(entry));

        self.store.set(&self.users, liker_id, update).await?;
        let mut completed = vec![EchoWrite::LikerSet];

        let counters = [
            (
                EchoWrite::ReflectionCount,
                self.reflections.as_str(),
                reflection_id,
                fields::ECHO_COUNT,
            ),
            (
                EchoWrite::AuthorTotal,
                self.users.as_str(),
                author_id,
                fields::TOTAL_ECHOES,
            ),
        ];

        for (write, collection, id, field) in counters {
            if let Err(source) = self
                .store
                .increment(collection, id, field, direction.delta())
                .await
            {
                return Err(Self::partial(direction, completed, write, source));
            }
            completed.push(write);
        }

        Ok(())
    }

    fn partial(
        direction: Direction,
        completed: Vec<EchoWrite>,
        failed: EchoWrite,
        source: StoreError,
    ) -> EchoError {
        error!(
            ?direction,
            failed = %failed,
            landed = completed.len(),
            error = %source,
            "echo partially applied, counters need reconciliation"
        );
        EchoError::PartiallyApplied { completed, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::echo::test_support::FaultyStore;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Mutex;

    async fn seed(store: &MemoryStore, collection: &str, id: &str, value: Value) {
        store
            .set(collection, id, value.as_object().cloned().unwrap())
            .await
            .unwrap();
    }

    /// B, C and D exist; X is C's reflection
    async fn scenario() -> (Arc<FaultyStore>, EchoManager) {
        let memory = MemoryStore::new();
        seed(&memory, USERS_COLLECTION, "b", json!({ "totalEchoes": 0 })).await;
        seed(&memory, USERS_COLLECTION, "c", json!({ "totalEchoes": 0 })).await;
        seed(&memory, USERS_COLLECTION, "d", json!({})).await;
        seed(
            &memory,
            REFLECTIONS_COLLECTION,
            "x",
            json!({ "authorId": "c", "echoCount": 0 }),
        )
        .await;

        let store = Arc::new(FaultyStore::new(memory));
        let manager = EchoManager::new(store.clone());
        (store, manager)
    }

    async fn echo_count(store: &FaultyStore, id: &str) -> u64 {
        let doc = store.get(REFLECTIONS_COLLECTION, id).await.unwrap().unwrap();
        counter(&doc, fields::ECHO_COUNT)
    }

    async fn total_echoes(store: &FaultyStore, id: &str) -> u64 {
        let doc = store.get(USERS_COLLECTION, id).await.unwrap().unwrap();
        counter(&doc, fields::TOTAL_ECHOES)
    }

    #[tokio::test]
    async fn test_like_then_unlike_restores_all_counters() {
        let (store, manager) = scenario().await;

        manager.like("b", "x", "c").await.unwrap();
        assert!(manager.has_liked("b", "x").await.unwrap());
        assert_eq!(
            manager.list_liked_reflection_ids("b").await.unwrap(),
            HashSet::from(["x".to_string()])
        );
        assert_eq!(echo_count(&store, "x").await, 1);
        assert_eq!(total_echoes(&store, "c").await, 1);

        manager.unlike("b", "x", "c").await.unwrap();
        assert!(!manager.has_liked("b", "x").await.unwrap());
        assert_eq!(echo_count(&store, "x").await, 0);
        assert_eq!(total_echoes(&store, "c").await, 0);

        let b = store.get(USERS_COLLECTION, "b").await.unwrap().unwrap();
        assert_eq!(b.get(fields::ECHOED_REFLECTIONS), Some(&json!({})));
    }

    #[tokio::test]
    async fn test_self_like_writes_nothing() {
        let (store, manager) = scenario().await;
        let before = store.writes();

        let err = manager.like("c", "x", "c").await.unwrap_err();
        assert!(matches!(err, EchoError::SelfLike));
        let err = manager.unlike("c", "x", "c").await.unwrap_err();
        assert!(matches!(err, EchoError::SelfUnlike));

        assert_eq!(store.writes(), before);
        assert_eq!(echo_count(&store, "x").await, 0);
    }

    #[tokio::test]
    async fn test_double_like_is_rejected_without_writes() {
        let (store, manager) = scenario().await;
        manager.like("b", "x", "c").await.unwrap();
        let after_first = store.writes();
        assert_eq!(after_first, 3);

        let err = manager.like("b", "x", "c").await.unwrap_err();
        assert!(matches!(err, EchoError::AlreadyLiked { .. }));
        assert!(err.is_validation());
        assert_eq!(store.writes(), after_first);
        assert_eq!(echo_count(&store, "x").await, 1);
    }

    #[tokio::test]
    async fn test_unlike_without_like_is_rejected() {
        let (store, manager) = scenario().await;
        let err = manager.unlike("b", "x", "c").await.unwrap_err();
        assert!(matches!(
            err,
            EchoError::NotLiked { ref user_id, ref reflection_id }
                if user_id == "b" && reflection_id == "x"
        ));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_missing_users_are_rejected_before_writing() {
        let (store, manager) = scenario().await;

        let err = manager.like("ghost", "x", "c").await.unwrap_err();
        assert!(matches!(err, EchoError::UserNotFound(ref id) if id == "ghost"));

        let err = manager.like("b", "unstored", "nobody").await.unwrap_err();
        assert!(matches!(err, EchoError::UserNotFound(ref id) if id == "nobody"));

        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_echo_count_matches_likers() {
        let (store, manager) = scenario().await;
        manager.like("b", "x", "c").await.unwrap();
        manager.like("d", "x", "c").await.unwrap();
        manager.unlike("b", "x", "c").await.unwrap();
        manager.like("b", "x", "c").await.unwrap();
        manager.unlike("d", "x", "c").await.unwrap();

        let mut likers = 0;
        for user in ["b", "c", "d"] {
            if manager.has_liked(user, "x").await.unwrap() {
                likers += 1;
            }
        }
        assert_eq!(echo_count(&store, "x").await, likers);
        assert_eq!(total_echoes(&store, "c").await, likers);
    }

    #[tokio::test]
    async fn test_failure_on_count_write_is_partial() {
        let (store, manager) = scenario().await;
        store.fail_increments_on(Some(REFLECTIONS_COLLECTION));

        let err = manager.like("b", "x", "c").await.unwrap_err();
        match &err {
            EchoError::PartiallyApplied { completed, .. } => {
                assert_eq!(completed, &vec![EchoWrite::LikerSet]);
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
        assert!(err.needs_reconciliation());

        // The like-set is the source of truth and already holds the echo
        assert!(manager.has_liked("b", "x").await.unwrap());
        assert_eq!(echo_count(&store, "x").await, 0);
        assert_eq!(total_echoes(&store, "c").await, 0);
    }

    #[tokio::test]
    async fn test_failure_on_author_write_reports_two_landed() {
        let (store, manager) = scenario().await;
        manager.like("b", "x", "c").await.unwrap();
        store.fail_increments_on(Some(USERS_COLLECTION));

        let err = manager.unlike("b", "x", "c").await.unwrap_err();
        assert!(matches!(
            err,
            EchoError::PartiallyApplied { ref completed, .. }
                if completed == &vec![EchoWrite::LikerSet, EchoWrite::ReflectionCount]
        ));
        assert_eq!(echo_count(&store, "x").await, 0);
        assert_eq!(total_echoes(&store, "c").await, 1);
    }

    #[tokio::test]
    async fn test_subscriptions_track_an_echo() {
        let (store, manager) = scenario().await;
        let counts: Arc<Mutex<Vec<u64>>> = Arc::default();
        let totals: Arc<Mutex<Vec<u64>>> = Arc::default();
        let statuses: Arc<Mutex<Vec<bool>>> = Arc::default();
        let sets: Arc<Mutex<Vec<usize>>> = Arc::default();

        let c = Arc::clone(&counts);
        let _count_sub = manager
            .subscribe_echo_count("x", move |n| c.lock().unwrap().push(n))
            .await
            .unwrap();
        let t = Arc::clone(&totals);
        let _total_sub = manager
            .subscribe_total_echoes("c", move |n| t.lock().unwrap().push(n))
            .await
            .unwrap();
        let s = Arc::clone(&statuses);
        let _status_sub = manager
            .subscribe_like_status("b", "x", move |liked| s.lock().unwrap().push(liked))
            .await
            .unwrap();
        let e = Arc::clone(&sets);
        let _set_sub = manager
            .subscribe_echoed_reflections("b", move |set| e.lock().unwrap().push(set.len()))
            .await
            .unwrap();

        manager.like("b", "x", "c").await.unwrap();
        manager.unlike("b", "x", "c").await.unwrap();

        assert_eq!(*counts.lock().unwrap(), vec![0, 1, 0]);
        assert_eq!(*totals.lock().unwrap(), vec![0, 1, 0]);
        assert_eq!(*statuses.lock().unwrap(), vec![false, true, false]);
        assert_eq!(*sets.lock().unwrap(), vec![0, 1, 0]);

        assert_eq!(store.inner.subscription_count(), 4);
    }

    #[tokio::test]
    async fn test_unsubscribed_views_stop_updating() {
        let (store, manager) = scenario().await;
        let counts: Arc<Mutex<Vec<u64>>> = Arc::default();
        let c = Arc::clone(&counts);

        let sub = manager
            .subscribe_echo_count("x", move |n| c.lock().unwrap().push(n))
            .await
            .unwrap();
        sub.unsubscribe();
        assert_eq!(store.inner.subscription_count(), 0);

        manager.like("b", "x", "c").await.unwrap();
        assert_eq!(*counts.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_subscriptions_decode_malformed_records_as_empty() {
        let (store, manager) = scenario().await;
        seed(
            &store.inner,
            USERS_COLLECTION,
            "b",
            json!({ "echoedReflections": "oops", "totalEchoes": "many" }),
        )
        .await;
        seed(
            &store.inner,
            REFLECTIONS_COLLECTION,
            "x",
            json!({ "echoCount": -3 }),
        )
        .await;

        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let (a, b, c) = (Arc::clone(&seen), Arc::clone(&seen), Arc::clone(&seen));
        let _s1 = manager
            .subscribe_echoed_reflections("b", move |set| {
                a.lock().unwrap().push(format!("set:{}", set.len()))
            })
            .await
            .unwrap();
        let _s2 = manager
            .subscribe_total_echoes("b", move |n| b.lock().unwrap().push(format!("total:{n}")))
            .await
            .unwrap();
        let _s3 = manager
            .subscribe_echo_count("x", move |n| c.lock().unwrap().push(format!("count:{n}")))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["set:0", "total:0", "count:0"]);
    }

    #[tokio::test]
    async fn test_subscribing_to_missing_records_delivers_zero() {
        let (_store, manager) = scenario().await;
        let seen: Arc<Mutex<Vec<u64>>> = Arc::default();
        let s = Arc::clone(&seen);
        let _sub = manager
            .subscribe_echo_count("not-yet-written", move |n| s.lock().unwrap().push(n))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_stored_author_overrides_wrong_author_argument() {
        let (store, manager) = scenario().await;

        // C claims D wrote X, but X is stored as C's own reflection
        let err = manager.like("c", "x", "d").await.unwrap_err();
        assert!(matches!(err, EchoError::SelfLike));
        let err = manager.unlike("c", "x", "d").await.unwrap_err();
        assert!(matches!(err, EchoError::SelfUnlike));

        let err = manager.like("b", "x", "d").await.unwrap_err();
        assert!(matches!(
            err,
            EchoError::AuthorMismatch { ref stored, ref given, .. }
                if stored == "c" && given == "d"
        ));
        assert!(err.is_validation());

        assert_eq!(store.writes(), 0);
        assert_eq!(echo_count(&store, "x").await, 0);
    }

    #[tokio::test]
    async fn test_unstored_reflection_trusts_given_author() {
        let (store, manager) = scenario().await;
        manager.like("b", "fresh", "c").await.unwrap();
        assert_eq!(echo_count(&store, "fresh").await, 1);
        assert_eq!(total_echoes(&store, "c").await, 1);
    }
}
