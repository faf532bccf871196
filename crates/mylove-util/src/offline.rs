//! Offline/online error handling
//!
//! Writes that need the remote backend are attempted only while the device is
//! online. There is no offline write queue: an offline attempt fails right
//! away with an [`OfflineError`] that the caller can surface as a retry prompt.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::debug;

/// Message shown when a change could not be sent but will be retried later
pub const OFFLINE_ERROR_MESSAGE: &str = "You're offline. Changes will sync when reconnected.";

/// Message shown when the user has to retry manually
pub const OFFLINE_RETRY_MESSAGE: &str =
    "You're offline. Please check your connection and try again.";

/// Source of the current network status
pub trait NetworkStatus: Send + Sync {
    fn is_online(&self) -> bool;

    fn is_offline(&self) -> bool {
        !self.is_online()
    }
}

/// Shared, settable network status. Starts online.
#[derive(Debug, Clone)]
pub struct ConnectivityFlag {
    online: Arc<AtomicBool>,
}

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    /// Record a status change, returning whether it actually changed
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            debug!(online, "Network status changed");
        }
        previous != online
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkStatus for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// An operation was refused because the device is offline
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct OfflineError {
    pub operation: String,
    pub message: String,
}

impl OfflineError {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: OFFLINE_RETRY_MESSAGE.to_string(),
        }
    }

    pub fn with_message(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Offline failures can always be retried once connectivity returns
    pub fn is_retryable(&self) -> bool {
        true
    }
}

/// Run `op` only if the device is online.
///
/// The operation's own error type must be able to absorb an [`OfflineError`].
pub async fn with_offline_check<T, E, F>(
    status: &dyn NetworkStatus,
    operation: &str,
    op: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<OfflineError>,
{
    if status.is_offline() {
        debug!(operation, "Operation blocked - device is offline");
        return Err(OfflineError::new(operation).into());
    }

    op.await
}

/// Outcome of [`safe_offline_operation`], suitable for driving UI state
#[derive(Debug)]
pub enum OperationOutcome<T> {
    Success(T),
    Offline { message: String },
    Failed { message: String },
}

impl<T> OperationOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline { .. })
    }

    /// Offline outcomes can be retried; failures depend on the error
    pub fn can_retry(&self) -> bool {
        self.is_offline()
    }

    pub fn into_success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Run `op`, folding the offline check and any failure into an outcome value
/// instead of an error.
pub async fn safe_offline_operation<T, E, F>(
    status: &dyn NetworkStatus,
    operation: &str,
    op: F,
) -> OperationOutcome<T>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    if status.is_offline() {
        debug!(operation, "Operation skipped - device is offline");
        return OperationOutcome::Offline {
            message: OFFLINE_RETRY_MESSAGE.to_string(),
        };
    }

    match op.await {
        Ok(value) => OperationOutcome::Success(value),
        Err(e) => {
            let message = e.to_string();
            debug!(operation, error = %message, "Operation failed");
            OperationOutcome::Failed {
                message: if message.is_empty() {
                    "An error occurred".to_string()
                } else {
                    message
                },
            }
        }
    }
}
