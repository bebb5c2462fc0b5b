// SPDX-License-Identifier: MPL-2.0

use crate::config::{REFLECTIONS_COLLECTION, USERS_COLLECTION};
use crate::echo::EchoError;
use crate::model::{echoed_set, fields};
use crate::store::{Document, DocumentStore};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// A stored counter that disagrees with the like-sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterDrift {
    pub collection: String,
    pub id: String,
    pub field: &'static str,
    /// `None` when the field is missing or not an integer
    pub stored: Option<i64>,
    pub expected: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub drifts: Vec<CounterDrift>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.drifts.is_empty()
    }
}

/// Rebuilds `echoCount` and `totalEchoes` from the users' like-sets.
///
/// The store has no queries, so callers supply the population: every user
/// whose like-set should be counted, and every reflection (with its author)
/// whose counters should be checked. An author's total is only correct if
/// all of that author's reflections are listed.
pub struct EchoReconciler {
    store: Arc<dyn DocumentStore>,
    users: String,
    reflections: String,
}

impl EchoReconciler {
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

    /// Compare stored counters against the like-sets without writing
    pub async fn plan(
        &self,
        user_ids: &[String],
        reflection_authors: &HashMap<String, String>,
    ) -> Result<ReconciliationReport, EchoError> {
        // BTreeMap keeps the report order stable
        let mut echo_counts: BTreeMap<&str, u64> = reflection_authors
            .keys()
            .map(|id| (id.as_str(), 0))
            .collect();

        // A like-set counts once however often its owner is listed
        let user_ids: BTreeSet<&str> = user_ids.iter().map(String::as_str).collect();
        for user_id in user_ids {
            let Some(doc) = self.store.get(&self.users, user_id).await? else {
                warn!(user = user_id, "user listed for reconciliation does not exist");
                continue;
            };
            for reflection_id in echoed_set(&doc) {
                if let Some(count) = echo_counts.get_mut(reflection_id.as_str()) {
                    *count += 1;
                }
            }
        }

        let mut author_totals: BTreeMap<&str, u64> = BTreeMap::new();
        for (reflection_id, author_id) in reflection_authors {
            *author_totals.entry(author_id.as_str()).or_default() +=
                echo_counts[reflection_id.as_str()];
        }

        let mut report = ReconciliationReport::default();
        for (reflection_id, expected) in &echo_counts {
            let doc = self.store.get(&self.reflections, reflection_id).await?;
            if let Some(drift) = Self::check(
                &self.reflections,
                reflection_id,
                doc.as_ref(),
                fields::ECHO_COUNT,
                *expected,
            ) {
                report.drifts.push(drift);
            }
        }
        for (author_id, expected) in &author_totals {
            let doc = self.store.get(&self.users, author_id).await?;
            if let Some(drift) = Self::check(
                &self.users,
                author_id,
                doc.as_ref(),
                fields::TOTAL_ECHOES,
                *expected,
            ) {
                report.drifts.push(drift);
            }
        }

        Ok(report)
    }

    /// Plan, then overwrite every drifted counter with its expected value
    pub async fn reconcile(
        &self,
        user_ids: &[String],
        reflection_authors: &HashMap<String, String>,
    ) -> Result<ReconciliationReport, EchoError> {
        let report = self.plan(user_ids, reflection_authors).await?;

        for drift in &report.drifts {
            let mut update = Document::new();
            update.insert(drift.field.to_string(), Value::from(drift.expected));
            self.store.set(&drift.collection, &drift.id, update).await?;
        }

        if !report.is_consistent() {
            info!(corrected = report.drifts.len(), "reconciled echo counters");
        }
        Ok(report)
    }

    fn check(
        collection: &str,
        id: &str,
        doc: Option<&Document>,
        field: &'static str,
        expected: u64,
    ) -> Option<CounterDrift> {
        let raw = doc.and_then(|d| d.get(field));
        let stored = raw.and_then(Value::as_i64);
        let consistent = match raw {
            // Counters start implicitly at zero
            None => expected == 0,
            Some(_) => stored == i64::try_from(expected).ok(),
        };
        if consistent {
            return None;
        }

        Some(CounterDrift {
            collection: collection.to_string(),
            id: id.to_string(),
            field,
            stored,
            expected,
        })
    }
}
