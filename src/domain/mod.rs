pub mod clock;
pub mod enums;
pub mod task;

pub use clock::{local_day, now_ms, today};
pub use enums::Priority;
pub use task::{
    format_time_display, format_time_label, DailyCompletionStat, PriorityStat, Task,
};
