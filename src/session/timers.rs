use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use log::debug;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};

/// Owner of the periodic tasks that run alongside a race: the race clock and
/// auto-save. Clones share the same set of tasks, so whoever pauses racing
/// can cancel timers started elsewhere.
#[derive(Clone, Default)]
pub struct TimerHandle {
    tasks: Arc<Mutex<Vec<(String, JoinHandle<()>)>>>,
}

impl TimerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` every `period`, first after one full period.
    /// Must be called from within a tokio runtime.
    pub fn start<F>(&self, label: &str, period: Duration, mut task: F)
    where
        F: FnMut() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task();
            }
        });

        debug!("Started {} timer every {:?}", label, period);
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((label.to_string(), handle));
    }

    /// Abort every task as a unit. Returns how many were still registered.
    pub fn cancel_all(&self) -> usize {
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for (label, handle) in &tasks {
            handle.abort();
            debug!("Cancelled {} timer", label);
        }
        tasks.len()
    }

    pub fn active_count(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|(_, handle)| !handle.is_finished());
        tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_timer_ticks_until_cancelled() {
        let timers = TimerHandle::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        timers.start("counter", Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(550)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 5);

        assert_eq!(timers.cancel_all(), 1);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 5);
        assert_eq!(timers.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_stops_every_timer() {
        let timers = TimerHandle::new();
        let shared = timers.clone();
        let ticks = Arc::new(AtomicUsize::new(0));

        for label in ["clock", "autosave"] {
            let counter = Arc::clone(&ticks);
            timers.start(label, Duration::from_millis(50), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(timers.active_count(), 2);

        assert_eq!(shared.cancel_all(), 2);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        assert_eq!(timers.active_count(), 0);
        assert_eq!(timers.cancel_all(), 0);
    }
}
