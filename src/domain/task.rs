use super::clock::local_day;
use super::enums::Priority;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A user-defined unit of work with priority, completion state, and accrued
/// focus time.
///
/// All timestamps are wall-clock milliseconds since the epoch. The stopwatch
/// transitions (`started`, `paused`, `finished`, ...) are pure: they take an
/// explicit `now_ms` and return a new record, so they can be replayed with
/// fixed clocks in tests and recomputed safely on duplicate alarm delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Assigned by the store on insert (0 = not yet stored)
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub is_completed: bool,
    /// True iff the stopwatch is currently advancing
    #[serde(default)]
    pub is_running: bool,
    /// Instant of the most recent start transition; meaningful only while running
    #[serde(default)]
    pub last_start_time: i64,
    /// Total focused duration accrued across all start/pause cycles
    #[serde(default)]
    pub accumulated_time: i64,
    /// User-set target duration; 0 means no limit
    #[serde(default)]
    pub total_time: i64,
    /// When the task was marked complete
    #[serde(default)]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub priority: Priority,
    // Legacy fields, kept for the stored layout and zeroed on reset
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub elapsed_time: i64,
}

impl Task {
    pub fn new(name: String, priority: Priority) -> Self {
        Self {
            id: 0,
            name,
            is_completed: false,
            is_running: false,
            last_start_time: 0,
            accumulated_time: 0,
            total_time: 0,
            completed_at: None,
            priority,
            start_time: None,
            elapsed_time: 0,
        }
    }

    /// Milliseconds left until the target; only meaningful when `total_time > 0`
    pub fn remaining_time(&self) -> i64 {
        self.total_time - self.accumulated_time
    }

    /// Start the stopwatch. Returns the record unchanged if already running
    /// or completed.
    pub fn started(&self, now_ms: i64) -> Task {
        if self.is_running || self.is_completed {
            return self.clone();
        }
        Task {
            is_running: true,
            last_start_time: now_ms,
            ..self.clone()
        }
    }

    /// Pause the stopwatch, folding the elapsed delta into the accumulated
    /// total. Returns the record unchanged if not running.
    ///
    /// The delta is floored at zero against clock skew, and the new total is
    /// clamped to `total_time` when a target is set: the stopwatch never
    /// overshoots its target, regardless of scheduling jitter.
    pub fn paused(&self, now_ms: i64) -> Task {
        if !self.is_running {
            return self.clone();
        }
        let delta = (now_ms - self.last_start_time).max(0);
        let mut accumulated = self.accumulated_time + delta;
        if self.total_time > 0 && accumulated > self.total_time {
            accumulated = self.total_time;
        }
        Task {
            is_running: false,
            accumulated_time: accumulated,
            ..self.clone()
        }
    }

    /// Freeze the stopwatch when the target time expires.
    ///
    /// Same arithmetic as `paused`; this snapshot is what the finished signal
    /// carries. Completion stays a separate, explicit step.
    pub fn finished(&self, now_ms: i64) -> Task {
        self.paused(now_ms)
    }

    /// Flip completion. Completing a running task first applies the pause
    /// arithmetic so no focused time is lost; un-completing clears the
    /// completion timestamp.
    pub fn with_completion_toggled(&self, now_ms: i64) -> Task {
        let settled = if self.is_running {
            self.paused(now_ms)
        } else {
            self.clone()
        };
        let completing = !self.is_completed;
        Task {
            is_completed: completing,
            completed_at: if completing { Some(now_ms) } else { None },
            ..settled
        }
    }

    /// Clear all stopwatch progress, leaving completion state alone
    pub fn with_progress_reset(&self) -> Task {
        Task {
            is_running: false,
            accumulated_time: 0,
            start_time: None,
            ..self.clone()
        }
    }

    pub fn with_target_time(&self, total_time: i64) -> Task {
        Task {
            total_time,
            ..self.clone()
        }
    }

    pub fn with_priority(&self, priority: Priority) -> Task {
        Task {
            priority,
            ..self.clone()
        }
    }

    pub fn with_name(&self, name: String) -> Task {
        Task {
            name,
            ..self.clone()
        }
    }

    /// Live elapsed time for display while running; never persisted.
    /// Recomputed on each presentation tick from the stored timestamps.
    pub fn live_elapsed(&self, now_ms: i64) -> i64 {
        if self.is_running {
            self.accumulated_time + (now_ms - self.last_start_time).max(0)
        } else {
            self.accumulated_time
        }
    }

    /// Whether a running task has reached its target time
    pub fn is_over_target(&self, now_ms: i64) -> bool {
        self.is_running && self.total_time > 0 && self.live_elapsed(now_ms) >= self.total_time
    }

    /// Local calendar day the task was completed on
    pub fn completed_day(&self) -> Option<NaiveDate> {
        self.completed_at.map(local_day)
    }

    /// Fraction of the target reached (0.0 to 1.0+); 1.0 when no target set
    pub fn progress_ratio(&self, now_ms: i64) -> f64 {
        if self.total_time == 0 {
            return 1.0;
        }
        self.live_elapsed(now_ms) as f64 / self.total_time as f64
    }
}

/// Completion count for one local calendar day (query projection, not stored)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyCompletionStat {
    pub date: NaiveDate,
    pub count: u32,
}

/// Focused time total for one priority tier (query projection, not stored)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityStat {
    pub priority: Priority,
    pub total_ms: i64,
}

/// Format milliseconds for the stopwatch readout (e.g. "1:30:15" or "30:15")
pub fn format_time_display(ms: i64) -> String {
    let total_seconds = ms.max(0) / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Format milliseconds for labels and statistics (e.g. "1h 30m" or "05m 12s")
pub fn format_time_label(ms: i64) -> String {
    let total_seconds = ms.max(0) / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else {
        format!("{:02}m {:02}s", minutes, seconds)
    }
}
