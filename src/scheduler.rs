use crate::domain::now_ms;
use crate::notifications;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Delivered when a scheduled alarm fires.
///
/// This is the cross-process boundary of the design: the payload carries only
/// the task id and name, and the receiving side must re-resolve the full
/// record from the store. Treat it as untrusted, idempotent input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmEvent {
    pub task_id: i64,
    pub task_name: String,
}

#[derive(Debug, Clone)]
struct PendingAlarm {
    task_id: i64,
    task_name: String,
    trigger_at_ms: i64,
}

struct SchedulerState {
    pending: Vec<PendingAlarm>,
    shutdown: bool,
}

/// One-shot wake alarm per running, time-bounded task.
///
/// At most one pending entry exists per task id; re-arming implicitly cancels
/// the prior entry. A single worker thread sleeps until the earliest trigger,
/// then raises a user-visible alert and emits an `AlarmEvent` on the delivery
/// channel. Without exact-alarm permission every `schedule` degrades to a
/// logged no-op; the task flow continues unaffected.
pub struct AlarmScheduler {
    shared: Arc<(Mutex<SchedulerState>, Condvar)>,
    worker: Option<JoinHandle<()>>,
    exact_allowed: bool,
}

impl AlarmScheduler {
    pub fn new(events: Sender<AlarmEvent>) -> Self {
        Self::with_permission(events, true)
    }

    /// `exact_allowed` models the host environment's exact-alarm permission
    pub fn with_permission(events: Sender<AlarmEvent>, exact_allowed: bool) -> Self {
        let shared = Arc::new((
            Mutex::new(SchedulerState {
                pending: Vec::new(),
                shutdown: false,
            }),
            Condvar::new(),
        ));
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("alarm-scheduler".to_string())
            .spawn(move || run_worker(worker_shared, events))
            .ok();
        if worker.is_none() {
            log::error!("failed to spawn alarm worker; notifications disabled");
        }
        Self {
            shared,
            worker,
            exact_allowed,
        }
    }

    /// Arm a one-shot alarm for the task. No-op when `trigger_at_ms` is not
    /// strictly in the future. The task id is the dedup key: any pending
    /// entry for the same id is replaced.
    pub fn schedule(&self, task_id: i64, task_name: &str, trigger_at_ms: i64) {
        if trigger_at_ms <= now_ms() {
            return;
        }
        if !self.exact_allowed {
            log::warn!(
                "exact alarms not permitted; skipping notification for task {}",
                task_id
            );
            return;
        }

        let (lock, cvar) = &*self.shared;
        let mut state = lock_state(lock);
        state.pending.retain(|p| p.task_id != task_id);
        state.pending.push(PendingAlarm {
            task_id,
            task_name: task_name.to_string(),
            trigger_at_ms,
        });
        log::debug!("alarm armed for task {} at {}", task_id, trigger_at_ms);
        cvar.notify_all();
    }

    /// Disarm any pending alarm for the task. Idempotent.
    pub fn cancel(&self, task_id: i64) {
        let (lock, cvar) = &*self.shared;
        let mut state = lock_state(lock);
        let before = state.pending.len();
        state.pending.retain(|p| p.task_id != task_id);
        if state.pending.len() != before {
            log::debug!("alarm cancelled for task {}", task_id);
        }
        cvar.notify_all();
    }
}

impl Drop for AlarmScheduler {
    fn drop(&mut self) {
        let (lock, cvar) = &*self.shared;
        lock_state(lock).shutdown = true;
        cvar.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn lock_state(lock: &Mutex<SchedulerState>) -> std::sync::MutexGuard<'_, SchedulerState> {
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn run_worker(shared: Arc<(Mutex<SchedulerState>, Condvar)>, events: Sender<AlarmEvent>) {
    let (lock, cvar) = &*shared;
    let mut state = lock_state(lock);
    loop {
        if state.shutdown {
            return;
        }

        let next = state
            .pending
            .iter()
            .min_by_key(|p| p.trigger_at_ms)
            .cloned();
        match next {
            None => {
                state = cvar.wait(state).unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            Some(alarm) => {
                let now = now_ms();
                if alarm.trigger_at_ms <= now {
                    state.pending.retain(|p| p.task_id != alarm.task_id);
                    // Deliver without holding the lock
                    drop(state);
                    deliver(&alarm, &events);
                    state = lock_state(lock);
                } else {
                    let wait = Duration::from_millis((alarm.trigger_at_ms - now) as u64);
                    state = cvar
                        .wait_timeout(state, wait)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0;
                }
            }
        }
    }
}

fn deliver(alarm: &PendingAlarm, events: &Sender<AlarmEvent>) {
    log::debug!("alarm fired for task {}", alarm.task_id);
    notifications::notify_time_up(&alarm.task_name);
    let event = AlarmEvent {
        task_id: alarm.task_id,
        task_name: alarm.task_name.clone(),
    };
    if events.send(event).is_err() {
        log::debug!("alarm delivery channel closed; event for task {} dropped", alarm.task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_alarm_fires_and_delivers_event() {
        let (tx, rx) = channel();
        let scheduler = AlarmScheduler::new(tx);

        scheduler.schedule(1, "Write report", now_ms() + 50);

        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(
            event,
            AlarmEvent {
                task_id: 1,
                task_name: "Write report".to_string()
            }
        );
    }

    #[test]
    fn test_past_trigger_is_noop() {
        let (tx, rx) = channel();
        let scheduler = AlarmScheduler::new(tx);

        scheduler.schedule(1, "stale", now_ms() - 1_000);
        scheduler.schedule(2, "now", now_ms());

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_cancel_disarms_pending_alarm() {
        let (tx, rx) = channel();
        let scheduler = AlarmScheduler::new(tx);

        scheduler.schedule(1, "cancelled", now_ms() + 100);
        scheduler.cancel(1);
        // Cancelling again is fine
        scheduler.cancel(1);

        assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());
    }

    #[test]
    fn test_rearm_replaces_prior_entry() {
        let (tx, rx) = channel();
        let scheduler = AlarmScheduler::new(tx);

        scheduler.schedule(1, "first", now_ms() + 5_000);
        scheduler.schedule(1, "second", now_ms() + 50);

        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.task_name, "second");
        // Exactly one pending entry existed for the id
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn test_alarms_fire_in_trigger_order() {
        let (tx, rx) = channel();
        let scheduler = AlarmScheduler::new(tx);

        scheduler.schedule(2, "later", now_ms() + 250);
        scheduler.schedule(1, "sooner", now_ms() + 50);

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.task_id, 1);
        assert_eq!(second.task_id, 2);
    }

    #[test]
    fn test_without_permission_schedule_is_noop() {
        let (tx, rx) = channel();
        let scheduler = AlarmScheduler::with_permission(tx, false);

        scheduler.schedule(1, "quiet", now_ms() + 50);

        assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());
    }
}
