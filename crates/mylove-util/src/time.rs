//! Time utilities for mylove
//!
//! # Mock Time for Development
//!
//! In debug builds, the `MYLOVE_MOCK_TIME` environment variable can be set
//! to override the system time. Useful for exercising per-day records such as
//! mood entries without waiting for midnight.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-02-14 09:30:00`)

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "MYLOVE_MOCK_TIME";

/// Format used for day keys such as a mood entry's `date`
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Offset between mock time and real time, captured once per process so that
/// mock time keeps advancing.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    Ok(naive_dt) => {
                        if let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() {
                            let offset = mock_dt.signed_duration_since(chrono::Local::now());
                            tracing::info!(
                                mock_time = %mock_time_str,
                                offset_secs = offset.num_seconds(),
                                "Mock time enabled"
                            );
                            return Some(offset);
                        }
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        );
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = "%Y-%m-%d %H:%M:%S",
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    if let Some(offset) = get_mock_time_offset() {
        real_now + offset
    } else {
        real_now
    }
}

/// Today's local date
pub fn today() -> NaiveDate {
    now().date_naive()
}

/// Format a date as `YYYY-MM-DD`
pub fn format_iso_date(date: NaiveDate) -> String {
    date.format(ISO_DATE_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_iso_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, ISO_DATE_FORMAT)
        .map_err(|e| format!("Expected YYYY-MM-DD date, got '{}': {}", s, e))
}

/// Format a duration in milliseconds with two decimals, e.g. `12.34ms`
pub fn format_millis(d: std::time::Duration) -> String {
    format!("{:.2}ms", d.as_secs_f64() * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn iso_date_round_trip() {
        let date = NaiveDate::from_ymd_opt(2025, 2, 14).unwrap();
        let s = format_iso_date(date);
        assert_eq!(s, "2025-02-14");
        assert_eq!(parse_iso_date(&s).unwrap(), date);
    }

    #[test]
    fn parse_iso_date_rejects_garbage() {
        assert!(parse_iso_date("14/02/2025").is_err());
        assert!(parse_iso_date("2025-13-01").is_err());
    }

    #[test]
    fn format_millis_two_decimals() {
        assert_eq!(format_millis(Duration::from_micros(12_500)), "12.50ms");
        assert_eq!(format_millis(Duration::ZERO), "0.00ms");
    }

    #[test]
    fn today_matches_now() {
        assert_eq!(today(), now().date_naive());
    }
}
