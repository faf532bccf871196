//! Mood tracking for mylove
//!
//! One mood entry per day, stored in the `moods` store with a unique
//! `by-date` index. Entries start unsynced and are marked synced once the
//! remote copy exists; [`MoodService::sync_pending_moods`] drives that
//! round with a caller-supplied upload function.

mod model;
mod service;

pub use model::*;
pub use service::*;

use mylove_store::StoreError;
use mylove_util::OfflineError;
use thiserror::Error;

/// Mood service errors
#[derive(Debug, Error)]
pub enum MoodError {
    #[error("Invalid mood entry: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Offline(#[from] OfflineError),
}

impl MoodError {
    /// Whether a mood was already logged for the same day
    pub fn is_duplicate_day(&self) -> bool {
        matches!(self, MoodError::Store(StoreError::Constraint(_)))
    }
}

pub type MoodResult<T> = Result<T, MoodError>;
