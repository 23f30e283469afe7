use crate::domain::{DailyCompletionStat, Priority};
use crate::store::TaskStore;
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;

/// Number of days in the completion-count series
pub const SERIES_DAYS: usize = 7;

/// Read-only productivity summary derived from the store's aggregate queries
#[derive(Debug, Clone, PartialEq)]
pub struct ProductivityStats {
    /// Total focused time across completed tasks
    pub total_focused_ms: i64,
    /// Focused time of completed tasks per priority tier; absent tiers are 0
    pub time_by_priority: HashMap<Priority, i64>,
    /// Dense series of daily completion counts, oldest first, ending today.
    /// Days with no completions carry an explicit zero.
    pub completed_by_day: Vec<DailyCompletionStat>,
}

/// Pull the three aggregate queries and back-fill the 7-day series so the
/// output is always contiguous
pub fn load_productivity_stats(store: &TaskStore, today: NaiveDate) -> ProductivityStats {
    let total_focused_ms = store.total_focused_time_of_completed();

    let mut time_by_priority: HashMap<Priority, i64> =
        Priority::all().iter().map(|p| (*p, 0)).collect();
    for stat in store.time_by_priority_of_completed() {
        time_by_priority.insert(stat.priority, stat.total_ms);
    }

    let raw: HashMap<NaiveDate, u32> = store
        .completion_counts_by_day(SERIES_DAYS)
        .into_iter()
        .map(|stat| (stat.date, stat.count))
        .collect();
    let completed_by_day = (0..SERIES_DAYS as i64)
        .rev()
        .map(|back| {
            let date = today - Duration::days(back);
            DailyCompletionStat {
                date,
                count: raw.get(&date).copied().unwrap_or(0),
            }
        })
        .collect();

    ProductivityStats {
        total_focused_ms,
        time_by_priority,
        completed_by_day,
    }
}
