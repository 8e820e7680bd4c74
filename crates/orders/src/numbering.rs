//! Human-facing numbers of the form `PREFIX-YYYYMMDD-NNNN`.

use chrono::NaiveDate;

/// Format a per-day counter as `PREFIX-YYYYMMDD-NNNN`.
///
/// The counter is zero-padded to four digits; larger counters simply widen.
pub fn daily_number(prefix: &str, day: NaiveDate, counter: u32) -> String {
    format!("{}-{}-{:04}", prefix, day.format("%Y%m%d"), counter)
}
