// src/events.rs

use crossbeam::channel::Sender;
use serde::Serialize;

use crate::{cleaner::AutoCleanRun, telemetry::SystemMetrics};

/// Messages pushed to the UI without a matching request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    InstallProgress {
        app_id: String,
        action: String,
        index: usize,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    InstallError { app_id: String, error: String },
    #[serde(rename_all = "camelCase")]
    InstallComplete {
        action: String,
        succeeded: usize,
        failed: usize,
    },
    #[serde(rename_all = "camelCase")]
    RealtimeMetrics { session: u64, metrics: SystemMetrics },
    AutoCleanCompleted { run: AutoCleanRun },
}

/// Where components publish events. `None` sinks discard them.
pub type EventSink = Option<Sender<Event>>;

pub fn emit(sink: &EventSink, event: Event) {
    if let Some(sender) = sink {
        // A gone receiver just means nobody is listening any more.
        let _ = sender.send(event);
    }
}
