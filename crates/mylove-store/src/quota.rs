//! Storage usage estimates

use serde::Serialize;

/// Usage at or above this share of the quota triggers a warning
pub const QUOTA_WARNING_PERCENT: f64 = 80.0;

/// Usage at or above this share of the quota is treated as critical
pub const QUOTA_CRITICAL_PERCENT: f64 = 95.0;

/// Snapshot of how much space the database uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageEstimate {
    pub usage_bytes: u64,
    /// `None` when the database has no quota
    pub quota_bytes: Option<u64>,
}

impl StorageEstimate {
    /// Share of the quota in use, 0-100. Always 0 without a quota.
    pub fn percent_used(&self) -> f64 {
        match self.quota_bytes {
            Some(quota) if quota > 0 => (self.usage_bytes as f64 / quota as f64) * 100.0,
            _ => 0.0,
        }
    }

    pub fn remaining_bytes(&self) -> Option<u64> {
        self.quota_bytes
            .map(|quota| quota.saturating_sub(self.usage_bytes))
    }

    pub fn is_near_quota(&self) -> bool {
        self.percent_used() >= QUOTA_WARNING_PERCENT
    }

    pub fn is_critical(&self) -> bool {
        self.percent_used() >= QUOTA_CRITICAL_PERCENT
    }
}
