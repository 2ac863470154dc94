//! Periodic maintenance task host.
//!
//! Each scheduled task runs once immediately and then on a fixed period
//! inside its own spawned loop. The loop awaits the task body before the
//! next tick, so one task never overlaps itself; a slow run delays the next
//! one instead. Cancellation aborts the loop between runs.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub mod sweeps;

/// Cancellation handle for one scheduled task.
pub struct ScheduledTask {
    name: String,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop future runs. An in-flight run is not interrupted mid-await by
    /// anything other than task abort at its next yield point.
    pub fn cancel(self) {
        info!("Cancelling scheduled task '{}'", self.name);
        self.handle.abort();
    }
}

#[derive(Default)]
pub struct SchedulerRunner {
    tasks: Vec<ScheduledTask>,
}

impl SchedulerRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a periodic task owned by this runner.
    pub fn schedule<F, Fut>(&mut self, name: &str, period: Duration, task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(spawn_periodic(name, period, task));
    }

    /// Cancel one task by name. Returns false when no such task is running.
    pub fn cancel(&mut self, name: &str) -> bool {
        if let Some(index) = self.tasks.iter().position(|t| t.name == name) {
            self.tasks.swap_remove(index).cancel();
            true
        } else {
            false
        }
    }

    /// Cancel everything this runner owns.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.cancel();
        }
    }
}

/// Run `task` once immediately, then every `period`, sequentially.
pub fn spawn_periodic<F, Fut>(name: &str, period: Duration, mut task: F) -> ScheduledTask
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task_name = name.to_string();
    info!(
        "Scheduling task '{}' every {}s",
        task_name,
        period.as_secs()
    );

    let loop_name = task_name.clone();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            // First tick fires immediately.
            ticker.tick().await;
            debug!("Running scheduled task '{}'", loop_name);
            task().await;
        }
    });

    ScheduledTask {
        name: task_name,
        handle,
    }
}
