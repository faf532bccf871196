//! Shared utilities for mylove
//!
//! This crate provides:
//! - Record identifiers
//! - Time utilities (mockable wall clock, ISO date helpers)
//! - Offline/online error handling
//! - Default paths for config and data directories

mod ids;
mod offline;
mod paths;
mod time;

pub use ids::*;
pub use offline::*;
pub use paths::*;
pub use time::*;
