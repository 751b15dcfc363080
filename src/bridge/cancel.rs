// src/bridge/cancel.rs

use std::sync::{Arc, Mutex};

use crossbeam::channel::{bounded, Receiver, Sender};

/// Cooperative cancellation for in-flight executions.
///
/// Clones share state: cancelling any clone cancels them all. Cancellation
/// works by dropping the only sender, which disconnects every receiver and so
/// wakes any `select!` waiting on [`CancelToken::signal`].
#[derive(Debug, Clone)]
pub struct CancelToken {
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(0);
        Self {
            trigger: Arc::new(Mutex::new(Some(sender))),
            signal: receiver,
        }
    }

    pub fn cancel(&self) {
        let mut trigger = self.trigger.lock().unwrap_or_else(|e| e.into_inner());
        trigger.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.trigger
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Becomes ready (disconnected) once the token is cancelled. Nothing is
    /// ever sent on it.
    pub fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}
