// src/scheduler.rs

use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{self, select, Sender, TryRecvError};
use tracing::{debug, error};

/// A job running on its own thread every `interval` until stopped.
///
/// Stopping drops the stop sender, which wakes the thread immediately instead
/// of waiting for the next tick. Dropping the task stops it.
pub struct RecurringTask {
    label: String,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RecurringTask {
    /// Starts `job` on a new thread. With `run_immediately` the first run
    /// happens right away instead of after one interval.
    pub fn start<F>(label: &str, interval: Duration, run_immediately: bool, mut job: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (stop, stopped) = channel::bounded::<()>(0);
        let ticker = channel::tick(interval);
        let thread_label = label.to_string();

        let handle = thread::spawn(move || {
            debug!("{} -> Recurring task started ({}ms)", thread_label, interval.as_millis());
            if run_immediately {
                job();
            }
            loop {
                select! {
                    recv(ticker) -> _ => {
                        // A tick queued during a long run must not outlive a stop.
                        if let Err(TryRecvError::Disconnected) = stopped.try_recv() {
                            break;
                        }
                        job()
                    }
                    recv(stopped) -> _ => break,
                }
            }
            debug!("{} -> Recurring task stopped", thread_label);
        });

        Self {
            label: label.to_string(),
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the task and waits for a run in progress to finish.
    pub fn stop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("{} -> Recurring task panicked", self.label);
            }
        }
    }
}

impl Drop for RecurringTask {
    fn drop(&mut self) {
        self.stop();
    }
}
