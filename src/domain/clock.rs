use chrono::{Local, NaiveDate, TimeZone};

/// Current wall-clock instant in milliseconds since the epoch.
///
/// Every accounting computation takes an explicit `now_ms` so callers read
/// the clock exactly once per transition.
pub fn now_ms() -> i64 {
    Local::now().timestamp_millis()
}

/// Derive the local calendar day from an epoch-millisecond timestamp.
///
/// Used to bucket completions for the date filter and the 7-day statistics
/// series. Falls back to today for timestamps the local timezone cannot map
/// (DST gaps).
pub fn local_day(ms: i64) -> NaiveDate {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.date_naive())
        .unwrap_or_else(|| Local::now().date_naive())
}

/// Today's local calendar day
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Local, TimeZone};

    #[test]
    fn test_local_day_round_trip() {
        // Build the timestamp from a local date so the test is timezone-safe
        let noon = Local.with_ymd_and_hms(2025, 3, 5, 12, 0, 0).unwrap();
        assert_eq!(
            local_day(noon.timestamp_millis()),
            noon.date_naive()
        );
    }

    #[test]
    fn test_local_day_respects_day_boundaries() {
        let late = Local.with_ymd_and_hms(2025, 3, 5, 23, 59, 59).unwrap();
        let next = late + Duration::seconds(2);
        assert_ne!(
            local_day(late.timestamp_millis()),
            local_day(next.timestamp_millis())
        );
    }

    #[test]
    fn test_now_ms_is_current() {
        let before = Local::now().timestamp_millis();
        let now = now_ms();
        let after = Local::now().timestamp_millis();
        assert!(before <= now && now <= after);
    }
}
