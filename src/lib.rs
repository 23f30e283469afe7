//! Core of a personal task focus timer: tasks with priorities, a per-task
//! stopwatch with an optional target duration, a one-shot wake alarm when the
//! target expires, and daily/weekly productivity statistics.
//!
//! The presentation layer is an external collaborator: it renders the
//! controller's projection and forwards user intents, nothing more.

pub mod controller;
pub mod domain;
pub mod notifications;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod ticker;
pub mod widget;

pub use controller::{Controller, UiState};
pub use domain::{Priority, Task};
pub use scheduler::{AlarmEvent, AlarmScheduler};
pub use stats::{load_productivity_stats, ProductivityStats};
pub use store::TaskStore;
pub use widget::{NoopWidget, WidgetSink, WidgetSnapshot};
