use crate::domain::{now_ms, today, Priority, Task};
use crate::notifications;
use crate::scheduler::{AlarmEvent, AlarmScheduler};
use crate::store::TaskStore;
use crate::widget::{WidgetSink, WidgetSnapshot};
use chrono::NaiveDate;
use std::sync::Arc;

/// What the presentation layer needs to render one frame: the filtered task
/// list for the selected date plus counts and toggles.
#[derive(Debug, Clone)]
pub struct UiState {
    pub tasks: Vec<Task>,
    pub new_task_text: String,
    pub selected_date: NaiveDate,
    pub show_completed_history: bool,
    pub voice_enabled: bool,
    pub completed_count: usize,
    pub total_count: usize,
}

impl UiState {
    /// Progress bar fraction, 0.0 to 1.0
    pub fn progress(&self) -> f32 {
        if self.total_count == 0 {
            0.0
        } else {
            self.completed_count as f32 / self.total_count as f32
        }
    }
}

/// Orchestrates the accounting engine, the store, and the alarm scheduler in
/// response to user intents, and owns the UI-facing projection.
///
/// All collaborators are injected at the composition root. Failed persistence
/// is logged and the operation degrades to "state unchanged"; validation
/// misses (blank names, start-when-running, stale ids) are silent no-ops.
/// Nothing here may crash the process.
pub struct Controller {
    store: Arc<TaskStore>,
    scheduler: AlarmScheduler,
    widget: Box<dyn WidgetSink>,
    new_task_text: String,
    new_task_priority: Priority,
    selected_date: NaiveDate,
    finished_task: Option<Task>,
    show_completed_history: bool,
    voice_enabled: bool,
}

impl Controller {
    pub fn new(store: Arc<TaskStore>, scheduler: AlarmScheduler, widget: Box<dyn WidgetSink>) -> Self {
        Self {
            store,
            scheduler,
            widget,
            new_task_text: String::new(),
            new_task_priority: Priority::Low,
            selected_date: today(),
            finished_task: None,
            show_completed_history: false,
            voice_enabled: true,
        }
    }

    // --- draft / toggles / date filter ---

    pub fn set_new_task_text(&mut self, text: &str) {
        self.new_task_text = text.to_string();
    }

    pub fn set_new_task_priority(&mut self, priority: Priority) {
        self.new_task_priority = priority;
    }

    pub fn set_selected_date(&mut self, date: NaiveDate) {
        self.selected_date = date;
    }

    pub fn toggle_show_completed_history(&mut self) {
        self.show_completed_history = !self.show_completed_history;
    }

    pub fn toggle_voice(&mut self) {
        self.voice_enabled = !self.voice_enabled;
    }

    // --- lifecycle operations ---

    /// Insert a task from the current draft; blank text is a no-op.
    /// A successful insert clears the draft back to empty text and LOW.
    pub fn add_task(&mut self) -> Option<Task> {
        if self.new_task_text.trim().is_empty() {
            return None;
        }
        let task = Task::new(self.new_task_text.clone(), self.new_task_priority);
        match self.store.insert(task) {
            Ok(stored) => {
                self.new_task_text.clear();
                self.new_task_priority = Priority::Low;
                self.refresh_widget();
                Some(stored)
            }
            Err(err) => {
                log::error!("failed to add task: {}", err);
                None
            }
        }
    }

    /// Start the stopwatch. Already-running and completed tasks are no-ops.
    /// When a positive amount of target time remains, a completion alarm is
    /// armed for `now + remaining`.
    pub fn start_task(&mut self, id: i64) {
        let Some(task) = self.store.find(id) else { return };
        if task.is_running || task.is_completed {
            return;
        }
        let now = now_ms();
        let remaining = task.remaining_time();
        if !self.persist(&task.started(now)) {
            return;
        }
        if task.total_time > 0 && remaining > 0 {
            self.scheduler.schedule(task.id, &task.name, now + remaining);
        }
        self.refresh_widget();
    }

    /// Pause the stopwatch and disarm the task's alarm; not-running is a no-op
    pub fn pause_task(&mut self, id: i64) {
        let Some(task) = self.store.find(id) else { return };
        if !task.is_running {
            return;
        }
        self.scheduler.cancel(task.id);
        if self.persist(&task.paused(now_ms())) {
            self.refresh_widget();
        }
    }

    /// The task's target time has elapsed, via the in-app countdown or the
    /// delivered alarm. Freezes the stopwatch and raises the finished signal.
    ///
    /// Safe under duplicate delivery: recomputation on a frozen record is
    /// unchanged, so time is never double-counted.
    pub fn on_timer_expired(&mut self, id: i64) {
        let Some(task) = self.store.find(id) else {
            log::debug!("timer expiry for unknown task id {} ignored", id);
            return;
        };
        self.scheduler.cancel(task.id);
        let snapshot = task.finished(now_ms());
        if self.persist(&snapshot) {
            self.raise_finished(snapshot);
            self.refresh_widget();
        }
    }

    /// Alarm delivery entry point. The event only carries an id and a name;
    /// the task is re-resolved from the store before anything else happens.
    pub fn on_alarm_delivered(&mut self, event: &AlarmEvent) {
        log::debug!("alarm delivered for task {}", event.task_id);
        self.on_timer_expired(event.task_id);
    }

    /// Cold-start re-entry: the host was launched from a notification and
    /// only knows the task id. Re-resolves and raises the finished signal.
    pub fn set_finished_by_id(&mut self, id: i64) {
        if let Some(task) = self.store.find(id) {
            self.raise_finished(task);
        }
    }

    /// Consume the finished signal; it is acted upon exactly once
    pub fn take_finished(&mut self) -> Option<Task> {
        self.finished_task.take()
    }

    pub fn toggle_complete(&mut self, id: i64) {
        let Some(task) = self.store.find(id) else { return };
        self.scheduler.cancel(task.id);
        if self.persist(&task.with_completion_toggled(now_ms())) {
            self.refresh_widget();
        }
    }

    /// Widget entry point: checking a task complete inside the widget applies
    /// the same semantics as the main surface, then refreshes the snapshot
    pub fn complete_from_widget(&mut self, id: i64) {
        self.toggle_complete(id);
    }

    pub fn delete_task(&mut self, id: i64) {
        self.scheduler.cancel(id);
        match self.store.delete(id) {
            Ok(()) => self.refresh_widget(),
            Err(err) => log::error!("failed to delete task {}: {}", id, err),
        }
    }

    pub fn delete_all(&mut self) {
        for task in self.store.list() {
            self.scheduler.cancel(task.id);
        }
        match self.store.delete_all() {
            Ok(()) => self.refresh_widget(),
            Err(err) => log::error!("failed to delete all tasks: {}", err),
        }
    }

    pub fn restore_all(&mut self) {
        match self.store.restore_all_completed() {
            Ok(()) => self.refresh_widget(),
            Err(err) => log::error!("failed to restore completed tasks: {}", err),
        }
    }

    pub fn reset_all_timers(&mut self) {
        for task in self.store.list() {
            self.scheduler.cancel(task.id);
        }
        match self.store.reset_all_timers() {
            Ok(()) => self.refresh_widget(),
            Err(err) => log::error!("failed to reset timers: {}", err),
        }
    }

    pub fn reset_task_progress(&mut self, id: i64) {
        let Some(task) = self.store.find(id) else { return };
        self.scheduler.cancel(task.id);
        if self.persist(&task.with_progress_reset()) {
            self.refresh_widget();
        }
    }

    pub fn set_task_target_time(&mut self, id: i64, total_time: i64) {
        let Some(task) = self.store.find(id) else { return };
        if self.persist(&task.with_target_time(total_time)) {
            self.refresh_widget();
        }
    }

    pub fn set_task_priority(&mut self, id: i64, priority: Priority) {
        let Some(task) = self.store.find(id) else { return };
        if self.persist(&task.with_priority(priority)) {
            self.refresh_widget();
        }
    }

    /// Rename a task; blank titles are a no-op
    pub fn rename_task(&mut self, id: i64, name: &str) {
        if name.trim().is_empty() {
            return;
        }
        let Some(task) = self.store.find(id) else { return };
        if self.persist(&task.with_name(name.to_string())) {
            self.refresh_widget();
        }
    }

    /// First task in default order that is incomplete and not the excluded
    /// id; used to chain into the next task after one finishes
    pub fn find_next_incomplete(&self, excluding_id: i64) -> Option<Task> {
        self.store
            .list()
            .into_iter()
            .find(|t| !t.is_completed && t.id != excluding_id)
    }

    // --- projection ---

    /// The visible-list policy: incomplete tasks show only when the selected
    /// date is today; completed tasks show on their completion day
    pub fn visible_tasks(&self) -> Vec<Task> {
        let today = today();
        self.store
            .list()
            .into_iter()
            .filter(|task| {
                if task.is_completed {
                    task.completed_day().unwrap_or(today) == self.selected_date
                } else {
                    self.selected_date == today
                }
            })
            .collect()
    }

    pub fn ui_state(&self) -> UiState {
        let tasks = self.visible_tasks();
        let completed_count = tasks.iter().filter(|t| t.is_completed).count();
        let total_count = tasks.len();
        UiState {
            tasks,
            new_task_text: self.new_task_text.clone(),
            selected_date: self.selected_date,
            show_completed_history: self.show_completed_history,
            voice_enabled: self.voice_enabled,
            completed_count,
            total_count,
        }
    }

    /// Full completion history across all dates, newest tier-order first
    pub fn completed_history(&self) -> Vec<Task> {
        self.store
            .list()
            .into_iter()
            .filter(|t| t.is_completed)
            .collect()
    }

    // --- internals ---

    fn raise_finished(&mut self, task: Task) {
        if self.voice_enabled {
            notifications::announce(&format!("Time's up for {}", task.name));
        }
        self.finished_task = Some(task);
    }

    fn persist(&self, task: &Task) -> bool {
        match self.store.update(task) {
            Ok(()) => true,
            Err(err) => {
                log::error!("failed to persist task {}: {}", task.id, err);
                false
            }
        }
    }

    /// Fire-and-forget, post-commit: push the next-focus snapshot to the
    /// widget collaborator
    fn refresh_widget(&self) {
        let next = self
            .store
            .list()
            .into_iter()
            .find(|t| !t.is_completed)
            .map(|t| WidgetSnapshot {
                task_id: t.id,
                name: t.name.clone(),
                total_time: t.total_time,
            });
        self.widget.refresh(next.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::WidgetSink;
    use chrono::{Duration as ChronoDuration, Local};
    use pretty_assertions::assert_eq;
    use std::sync::mpsc::{channel, Receiver};
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingWidget(Arc<Mutex<Vec<Option<WidgetSnapshot>>>>);

    impl WidgetSink for RecordingWidget {
        fn refresh(&self, next: Option<&WidgetSnapshot>) {
            self.0.lock().unwrap().push(next.cloned());
        }
    }

    struct Harness {
        controller: Controller,
        alarms: Receiver<AlarmEvent>,
        widget_log: Arc<Mutex<Vec<Option<WidgetSnapshot>>>>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TaskStore::open(dir.path().join("tasks.json")).unwrap());
        let (tx, rx) = channel();
        let scheduler = AlarmScheduler::new(tx);
        let widget_log = Arc::new(Mutex::new(Vec::new()));
        let widget = Box::new(RecordingWidget(Arc::clone(&widget_log)));
        Harness {
            controller: Controller::new(store, scheduler, widget),
            alarms: rx,
            widget_log,
            _dir: dir,
        }
    }

    fn add_named(h: &mut Harness, name: &str) -> Task {
        h.controller.set_new_task_text(name);
        h.controller.add_task().unwrap()
    }

    #[test]
    fn test_add_task_blank_is_noop() {
        let mut h = harness();
        h.controller.set_new_task_text("   ");
        assert!(h.controller.add_task().is_none());
        assert!(h.controller.ui_state().tasks.is_empty());
        assert!(h.widget_log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_add_task_clears_draft() {
        let mut h = harness();
        h.controller.set_new_task_text("Read inbox");
        h.controller.set_new_task_priority(Priority::High);
        let task = h.controller.add_task().unwrap();

        assert_eq!(task.priority, Priority::High);
        let state = h.controller.ui_state();
        assert_eq!(state.new_task_text, "");
        assert_eq!(state.tasks.len(), 1);
        // Next add falls back to the LOW default
        h.controller.set_new_task_text("Second");
        assert_eq!(h.controller.add_task().unwrap().priority, Priority::Low);
    }

    #[test]
    fn test_start_and_pause_round_trip() {
        let mut h = harness();
        let task = add_named(&mut h, "Focus");

        h.controller.start_task(task.id);
        let running = h.controller.ui_state().tasks[0].clone();
        assert!(running.is_running);

        // Starting again is a no-op, not a restart
        let before = running.last_start_time;
        h.controller.start_task(task.id);
        assert_eq!(h.controller.ui_state().tasks[0].last_start_time, before);

        h.controller.pause_task(task.id);
        let paused = h.controller.ui_state().tasks[0].clone();
        assert!(!paused.is_running);

        // Pausing a paused task is a no-op
        h.controller.pause_task(task.id);
        assert_eq!(h.controller.ui_state().tasks[0], paused);
    }

    #[test]
    fn test_start_arms_alarm_and_expiry_freezes_at_target() {
        let mut h = harness();
        let task = add_named(&mut h, "Sprint");
        h.controller.set_task_target_time(task.id, 60);

        h.controller.start_task(task.id);
        let event = h.alarms.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.task_id, task.id);

        h.controller.on_alarm_delivered(&event);
        let frozen = h.controller.ui_state().tasks[0].clone();
        assert!(!frozen.is_running);
        // The stopwatch never overshoots its target
        assert_eq!(frozen.accumulated_time, 60);

        let finished = h.controller.take_finished().unwrap();
        assert_eq!(finished.id, task.id);
        // Consumed exactly once
        assert!(h.controller.take_finished().is_none());
    }

    #[test]
    fn test_duplicate_expiry_does_not_double_count() {
        let mut h = harness();
        let task = add_named(&mut h, "Twice");
        h.controller.set_task_target_time(task.id, 50);
        h.controller.start_task(task.id);

        let event = h.alarms.recv_timeout(Duration::from_secs(2)).unwrap();
        h.controller.on_alarm_delivered(&event);
        let first = h.controller.ui_state().tasks[0].accumulated_time;

        // Re-delivery of the same alarm
        h.controller.on_alarm_delivered(&event);
        let second = h.controller.ui_state().tasks[0].accumulated_time;
        assert_eq!(first, second);
    }

    #[test]
    fn test_pause_cancels_pending_alarm() {
        let mut h = harness();
        let task = add_named(&mut h, "Interrupted");
        h.controller.set_task_target_time(task.id, 5_000);

        h.controller.start_task(task.id);
        h.controller.pause_task(task.id);

        assert!(h.alarms.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn test_start_without_target_arms_nothing() {
        let mut h = harness();
        let task = add_named(&mut h, "Open-ended");

        h.controller.start_task(task.id);

        assert!(h.alarms.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn test_toggle_complete_sets_timestamp_and_cancels() {
        let mut h = harness();
        let task = add_named(&mut h, "Ship it");
        h.controller.set_task_target_time(task.id, 5_000);
        h.controller.start_task(task.id);

        h.controller.toggle_complete(task.id);
        let done = h.controller.ui_state().tasks[0].clone();
        assert!(done.is_completed);
        assert!(!done.is_running);
        assert!(done.completed_at.is_some());
        assert!(h.alarms.recv_timeout(Duration::from_millis(300)).is_err());

        h.controller.toggle_complete(task.id);
        let reopened = h.controller.ui_state().tasks[0].clone();
        assert!(!reopened.is_completed);
        assert_eq!(reopened.completed_at, None);
    }

    #[test]
    fn test_expired_task_is_unknown_id_noop() {
        let mut h = harness();
        h.controller.on_timer_expired(404);
        assert!(h.controller.take_finished().is_none());
    }

    #[test]
    fn test_find_next_incomplete_follows_default_order() {
        let mut h = harness();
        h.controller.set_new_task_priority(Priority::Low);
        let low = add_named(&mut h, "low");
        h.controller.set_new_task_priority(Priority::High);
        let high_old = add_named(&mut h, "high-old");
        h.controller.set_new_task_priority(Priority::High);
        let high_new = add_named(&mut h, "high-new");

        h.controller.toggle_complete(high_new.id);
        // Highest-priority newest incomplete, excluding the finisher
        let next = h.controller.find_next_incomplete(high_new.id).unwrap();
        assert_eq!(next.id, high_old.id);

        let next = h.controller.find_next_incomplete(high_old.id).unwrap();
        assert_eq!(next.id, low.id);
    }

    #[test]
    fn test_visible_tasks_filter_policy() {
        let mut h = harness();
        let today_task = add_named(&mut h, "today-open");
        let done_past = add_named(&mut h, "done-past");

        // Move the completion three days back
        let three_days_ago = (Local::now() - ChronoDuration::days(3)).timestamp_millis();
        h.controller.toggle_complete(done_past.id);
        let mut record = h.controller.completed_history()[0].clone();
        record.completed_at = Some(three_days_ago);
        h.controller.store.update(&record).unwrap();

        // Today: only the incomplete task
        h.controller.set_selected_date(today());
        let visible: Vec<i64> = h.controller.visible_tasks().iter().map(|t| t.id).collect();
        assert_eq!(visible, vec![today_task.id]);

        // Three days ago: only the task completed that day
        h.controller
            .set_selected_date(today() - ChronoDuration::days(3));
        let visible: Vec<i64> = h.controller.visible_tasks().iter().map(|t| t.id).collect();
        assert_eq!(visible, vec![done_past.id]);

        // Any other day: nothing
        h.controller
            .set_selected_date(today() - ChronoDuration::days(1));
        assert!(h.controller.visible_tasks().is_empty());
    }

    #[test]
    fn test_ui_state_counts_and_progress() {
        let mut h = harness();
        let a = add_named(&mut h, "a");
        add_named(&mut h, "b");
        h.controller.toggle_complete(a.id);

        let state = h.controller.ui_state();
        assert_eq!(state.completed_count, 1);
        assert_eq!(state.total_count, 2);
        assert!((state.progress() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_widget_gets_post_commit_snapshots() {
        let mut h = harness();
        let task = add_named(&mut h, "Widgeted");

        {
            let log = h.widget_log.lock().unwrap();
            let last = log.last().unwrap().as_ref().unwrap();
            assert_eq!(last.task_id, task.id);
            assert_eq!(last.name, "Widgeted");
        }

        h.controller.complete_from_widget(task.id);
        let log = h.widget_log.lock().unwrap();
        // No incomplete task left: the widget is told "none"
        assert_eq!(log.last().unwrap(), &None);
    }

    #[test]
    fn test_rename_blank_is_noop() {
        let mut h = harness();
        let task = add_named(&mut h, "Original");

        h.controller.rename_task(task.id, "  ");
        assert_eq!(h.controller.ui_state().tasks[0].name, "Original");

        h.controller.rename_task(task.id, "Renamed");
        assert_eq!(h.controller.ui_state().tasks[0].name, "Renamed");
    }

    #[test]
    fn test_bulk_operations() {
        let mut h = harness();
        let a = add_named(&mut h, "a");
        let b = add_named(&mut h, "b");
        h.controller.start_task(a.id);
        h.controller.toggle_complete(a.id);

        h.controller.restore_all();
        assert!(h.controller.ui_state().tasks.iter().all(|t| !t.is_completed));

        h.controller.start_task(b.id);
        h.controller.reset_all_timers();
        let state = h.controller.ui_state();
        assert!(state.tasks.iter().all(|t| !t.is_running));
        assert!(state.tasks.iter().all(|t| t.accumulated_time == 0));

        h.controller.delete_all();
        assert!(h.controller.ui_state().tasks.is_empty());
    }

    #[test]
    fn test_set_finished_by_id_cold_start() {
        let mut h = harness();
        let task = add_named(&mut h, "Cold start");

        h.controller.set_finished_by_id(task.id);
        assert_eq!(h.controller.take_finished().unwrap().id, task.id);

        // Unknown ids never raise the signal
        h.controller.set_finished_by_id(999);
        assert!(h.controller.take_finished().is_none());
    }
}
