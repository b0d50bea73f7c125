use std::sync::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Deadline is the wake time shared between a timer handle and its task. The task holds it weakly,
/// so dropping the handle stops the task at its next wake-up.
pub(super) struct Deadline {
    wake_time: Mutex<Option<Instant>>,
    moved_earlier: Notify,
}

impl Deadline {
    pub(super) fn new(initial: Option<Instant>) -> Self {
        Deadline {
            wake_time: Mutex::new(initial),
            moved_earlier: Notify::new(),
        }
    }

    /// `None` means already expired.
    pub(super) fn wake_time(&self) -> Option<Instant> {
        *self.wake_time.lock().expect("Deadline mutex guard poison")
    }

    /// Postpones or replaces the wake time. A sleeping task picks it up when it next wakes.
    pub(super) fn set(&self, wake_time: Instant) {
        self.wake_time
            .lock()
            .expect("Deadline mutex guard poison")
            .replace(wake_time);
    }

    /// Only moves the wake time later, never earlier.
    pub(super) fn postpone_to(&self, wake_time: Instant) {
        let mut guard = self.wake_time.lock().expect("Deadline mutex guard poison");
        match *guard {
            Some(current) if current >= wake_time => {}
            _ => {
                guard.replace(wake_time);
            }
        }
    }

    /// Moves the wake time to `now` and interrupts the task's sleep.
    pub(super) fn expire(&self, now: Instant) {
        self.set(now);
        self.moved_earlier.notify_one();
    }

    pub(super) async fn moved_earlier(&self) {
        self.moved_earlier.notified().await;
    }
}
