// src/cleaner.rs

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    bridge::ScriptBridge,
    constants::MAX_AUTO_CLEAN_HISTORY,
    errors::TweakError,
    events::{emit, Event, EventSink},
    scheduler::RecurringTask,
    tweaks::{self, Tweak, TweakId},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanFailure {
    pub id: TweakId,
    pub error: String,
}

/// One pass over a set of cleanup entries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoCleanRun {
    pub started_at: DateTime<Utc>,
    pub freed_bytes: u64,
    pub succeeded: Vec<TweakId>,
    pub failed: Vec<CleanFailure>,
    /// Started by the timer rather than on request.
    pub scheduled: bool,
}

/// Cleanup scripts end by printing how many bytes they removed. Anything
/// unparseable counts as zero.
pub fn parse_freed_bytes(output: &str) -> u64 {
    let Some(last) = output.lines().map(str::trim).filter(|l| !l.is_empty()).last() else {
        return 0;
    };
    last.parse::<u64>()
        .ok()
        .or_else(|| {
            last.parse::<f64>()
                .ok()
                .filter(|value| value.is_finite() && *value >= 0.0)
                .map(|value| value as u64)
        })
        .unwrap_or(0)
}

/// Runs the given cleanup entries one after another.
pub fn run_cleanups(bridge: &ScriptBridge, cleanups: &[&Tweak], scheduled: bool) -> AutoCleanRun {
    let mut run = AutoCleanRun {
        started_at: Utc::now(),
        freed_bytes: 0,
        succeeded: Vec::new(),
        failed: Vec::new(),
        scheduled,
    };

    for tweak in cleanups {
        match tweak.method.apply(bridge) {
            Ok(output) => {
                let freed = parse_freed_bytes(&output);
                info!("{} -> Freed {} bytes", tweak.id, freed);
                run.freed_bytes = run.freed_bytes.saturating_add(freed);
                run.succeeded.push(tweak.id);
            }
            Err(e) => {
                warn!("{} -> Cleanup failed: {:#}", tweak.id, e);
                run.failed.push(CleanFailure {
                    id: tweak.id,
                    error: format!("{:#}", e),
                });
            }
        }
    }
    run
}

/// Resolves wire ids to cleanup entries. An empty selection means every
/// entry that is safe to run unattended.
pub fn resolve_cleanups(selections: &[String], scheduled: bool) -> Result<Vec<&'static Tweak>, TweakError> {
    if selections.is_empty() {
        return Ok(tweaks::cleanups().filter(|t| t.safe_for_auto).collect());
    }
    selections
        .iter()
        .map(|selection| {
            let tweak = tweaks::find(selection)?;
            if !tweak.is_cleanup() {
                return Err(TweakError::NotCleanup(tweak.id));
            }
            if scheduled && !tweak.safe_for_auto {
                return Err(TweakError::NotSafeForAuto(tweak.id));
            }
            Ok(tweak)
        })
        .collect()
}

type History = Arc<Mutex<VecDeque<AutoCleanRun>>>;

fn lock(history: &History) -> MutexGuard<'_, VecDeque<AutoCleanRun>> {
    history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn record(history: &History, run: AutoCleanRun) {
    let mut history = lock(history);
    history.push_front(run);
    history.truncate(MAX_AUTO_CLEAN_HISTORY);
}

/// Periodic cleaning with a bounded history of past runs, newest first.
pub struct AutoCleaner {
    bridge: Arc<ScriptBridge>,
    events: EventSink,
    history: History,
    task: Mutex<Option<RecurringTask>>,
}

impl AutoCleaner {
    pub fn new(bridge: Arc<ScriptBridge>, events: EventSink) -> Self {
        Self {
            bridge,
            events,
            history: Arc::new(Mutex::new(VecDeque::new())),
            task: Mutex::new(None),
        }
    }

    fn task(&self) -> MutexGuard<'_, Option<RecurringTask>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Schedules the selected cleanups every `interval`, replacing any
    /// schedule already running.
    ///
    /// # Returns
    ///
    /// The entries that will run, or an error if a selection is unknown, not
    /// a cleanup, or not safe to run unattended.
    pub fn start(&self, selections: &[String], interval: Duration) -> Result<Vec<TweakId>, TweakError> {
        let cleanups = resolve_cleanups(selections, true)?;
        let ids = cleanups.iter().map(|t| t.id).collect();
        self.schedule(cleanups, interval);
        Ok(ids)
    }

    pub(crate) fn schedule(&self, cleanups: Vec<&'static Tweak>, interval: Duration) {
        // Stop outside the lock; a run may be in flight.
        let previous = self.task().take();
        if let Some(mut previous) = previous {
            previous.stop();
        }

        let bridge = Arc::clone(&self.bridge);
        let history = Arc::clone(&self.history);
        let events = self.events.clone();
        info!(
            "Auto-clean scheduled every {}s for {} entries",
            interval.as_secs(),
            cleanups.len()
        );
        let task = RecurringTask::start("auto-clean", interval, false, move || {
            let run = run_cleanups(&bridge, &cleanups, true);
            if !run.failed.is_empty() {
                error!("auto-clean -> {} cleanup(s) failed", run.failed.len());
            }
            record(&history, run.clone());
            emit(&events, Event::AutoCleanCompleted { run });
        });

        // A racing `schedule` may have installed a task; it is dropped, and
        // so stopped, after the guard is released.
        let replaced = self.task().replace(task);
        drop(replaced);
    }

    /// Cancels the schedule. Returns whether one was running.
    pub fn stop(&self) -> bool {
        let task = self.task().take();
        match task {
            Some(mut task) => {
                task.stop();
                info!("Auto-clean stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task().as_ref().is_some_and(RecurringTask::is_running)
    }

    /// Runs the selected cleanups now, on the calling thread. Entries not
    /// safe for automation are allowed here.
    pub fn run_once(&self, selections: &[String]) -> Result<AutoCleanRun, TweakError> {
        let cleanups = resolve_cleanups(selections, false)?;
        let run = run_cleanups(&self.bridge, &cleanups, false);
        record(&self.history, run.clone());
        Ok(run)
    }

    pub fn history(&self) -> Vec<AutoCleanRun> {
        lock(&self.history).iter().cloned().collect()
    }
}
