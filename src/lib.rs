// SPDX-License-Identifier: MPL-2.0

//! Streak and echo bookkeeping for the Reflections journaling client.
//!
//! - [`streak`]: calendar-day streak rules and the recorder that applies
//!   them to stored users.
//! - [`echo`]: the echo (like) protocol across the liker's set, the
//!   reflection's count and the author's total, with live views and a
//!   reconciler.
//! - [`store`]: the document store contract plus in-memory and SQLite
//!   implementations.

pub mod config;
pub mod echo;
pub mod logging;
pub mod model;
pub mod state;
pub mod store;
pub mod streak;

pub use echo::{EchoError, EchoManager, EchoReconciler, EchoWrite, ReconciliationReport};
pub use model::{Reflection, User};
pub use state::Settings;
pub use store::{Document, DocumentStore, MemoryStore, SqliteStore, StoreError, Subscription};
pub use streak::{StreakError, StreakRecorder, StreakValidation};
