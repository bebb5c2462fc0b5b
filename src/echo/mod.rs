// SPDX-License-Identifier: MPL-2.0

//! Echo (like) bookkeeping.
//!
//! An echo touches three documents with three independent writes: the
//! liker's `echoedReflections` set, the reflection's `echoCount`, and the
//! author's `totalEchoes`. The like-set is written first and is the source
//! of truth; [`EchoReconciler`] rebuilds the counters from it after a
//! partial failure.

mod manager;
mod reconcile;
#[cfg(test)]
pub(crate) mod test_support;

pub use manager::EchoManager;
pub use reconcile::{CounterDrift, EchoReconciler, ReconciliationReport};

use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

/// The three writes an echo or un-echo performs, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoWrite {
    LikerSet,
    ReflectionCount,
    AuthorTotal,
}

impl fmt::Display for EchoWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EchoWrite::LikerSet => "liker set",
            EchoWrite::ReflectionCount => "reflection count",
            EchoWrite::AuthorTotal => "author total",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum EchoError {
    #[error("cannot echo your own reflection")]
    SelfLike,
    #[error("cannot remove an echo from your own reflection")]
    SelfUnlike,
    #[error("{user_id} already echoed reflection {reflection_id}")]
    AlreadyLiked {
        user_id: String,
        reflection_id: String,
    },
    #[error("{user_id} has not echoed reflection {reflection_id}")]
    NotLiked {
        user_id: String,
        reflection_id: String,
    },
    #[error("reflection {reflection_id} belongs to {stored}, not {given}")]
    AuthorMismatch {
        reflection_id: String,
        stored: String,
        given: String,
    },
    #[error("user not found: {0}")]
    UserNotFound(String),
    /// Nothing was written
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    /// Some writes landed; counters may be off until reconciled
    #[error("echo partially applied after {} of 3 writes: {source}", .completed.len())]
    PartiallyApplied {
        completed: Vec<EchoWrite>,
        #[source]
        source: StoreError,
    },
}

impl EchoError {
    /// Rejected before any write; safe to show as a refused action
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EchoError::SelfLike
                | EchoError::SelfUnlike
                | EchoError::AlreadyLiked { .. }
                | EchoError::NotLiked { .. }
                | EchoError::AuthorMismatch { .. }
        )
    }

    /// Storage may hold a half-applied echo and should be refreshed
    pub fn needs_reconciliation(&self) -> bool {
        matches!(self, EchoError::PartiallyApplied { .. })
    }
}
