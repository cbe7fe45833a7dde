//! Clock helpers.

use chrono::Utc;

/// Current wall-clock time in epoch milliseconds.
///
/// All record timestamps (`updated_at`, `deleted_at`, ...) use this unit.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
