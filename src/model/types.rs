// SPDX-License-Identifier: MPL-2.0

//! Typed views over stored records.
//!
//! Decoding never fails: counters that are missing, negative, or not
//! integers read as zero, a malformed like-set reads as empty, and an
//! unparseable timestamp reads as absent.

use crate::store::Document;
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::collections::HashSet;

/// Stored field names
pub mod fields {
    pub const STREAK_COUNT: &str = "streakCount";
    pub const LAST_REFLECT_DATE: &str = "lastReflectDate";
    pub const TOTAL_REFLECTIONS: &str = "totalReflections";
    pub const TOTAL_ECHOES: &str = "totalEchoes";
    pub const ECHOED_REFLECTIONS: &str = "echoedReflections";
    pub const AUTHOR_ID: &str = "authorId";
    pub const ECHO_COUNT: &str = "echoCount";
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub streak_count: u32,
    /// Raw timestamp as stored, kept so callers can pass it straight to the
    /// streak calculator
    pub last_reflect_date: Option<String>,
    pub total_reflections: u64,
    pub total_echoes: u64,
    pub echoed_reflections: HashSet<String>,
}

impl User {
    pub fn from_document(id: &str, doc: &Document) -> Self {
        Self {
            id: id.to_string(),
            streak_count: u32::try_from(counter(doc, fields::STREAK_COUNT)).unwrap_or(u32::MAX),
            last_reflect_date: doc
                .get(fields::LAST_REFLECT_DATE)
                .and_then(Value::as_str)
                .filter(|s| parse_timestamp(s).is_some())
                .map(str::to_string),
            total_reflections: counter(doc, fields::TOTAL_REFLECTIONS),
            total_echoes: counter(doc, fields::TOTAL_ECHOES),
            echoed_reflections: echoed_set(doc),
        }
    }

    pub fn has_echoed(&self, reflection_id: &str) -> bool {
        self.echoed_reflections.contains(reflection_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reflection {
    pub id: String,
    pub author_id: Option<String>,
    pub echo_count: u64,
}

impl Reflection {
    pub fn from_document(id: &str, doc: &Document) -> Self {
        Self {
            id: id.to_string(),
            author_id: doc
                .get(fields::AUTHOR_ID)
                .and_then(Value::as_str)
                .map(str::to_string),
            echo_count: counter(doc, fields::ECHO_COUNT),
        }
    }
}

/// Read a non-negative counter, treating anything unusable as zero
pub fn counter(doc: &Document, field: &str) -> u64 {
    match doc.get(field) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            })
            .unwrap_or(0),
        _ => 0,
    }
}

/// Ids whose like-set entry is exactly `true`
pub fn echoed_set(doc: &Document) -> HashSet<String> {
    match doc.get(fields::ECHOED_REFLECTIONS) {
        Some(Value::Object(entries)) => entries
            .iter()
            .filter(|(_, liked)| liked.as_bool() == Some(true))
            .map(|(id, _)| id.clone())
            .collect(),
        _ => HashSet::new(),
    }
}

/// Parse an RFC 3339 timestamp, `None` when malformed
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw.trim()).ok()
}
