// src/orchestrator.rs

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::anyhow;
use crossbeam::channel::{self, Receiver, Sender};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::{
    bridge::ScriptBridge,
    tweaks::{self, Tweak, TweakId, TweakMethod},
};

/// Represents the result of a processed task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TweakResult {
    pub id: TweakId,
    pub action: TweakAction,
    pub success: bool,
    /// Some(true) if enabled, Some(false) if disabled, None if unknown.
    pub enabled_state: Option<bool>,
    /// What the apply script printed. Empty for the other actions.
    pub output: String,
    pub error: Option<String>,
}

/// Represents a task to be processed.
#[derive(Clone)]
pub struct TweakTask {
    pub id: TweakId,
    pub method: Arc<dyn TweakMethod>,
    pub action: TweakAction,
}

impl TweakTask {
    pub fn new(tweak: &Tweak, action: TweakAction) -> Self {
        Self {
            id: tweak.id,
            method: Arc::clone(&tweak.method),
            action,
        }
    }
}

/// Actions that can be performed on a tweak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TweakAction {
    Apply,
    Revert,
    ReadInitialState,
}

struct Job {
    task: TweakTask,
    reply: Sender<TweakResult>,
}

/// Fixed pool of worker threads running tweak scripts through a shared
/// bridge.
pub struct TaskOrchestrator {
    task_sender: Option<Sender<Job>>,
    result_sender: Sender<TweakResult>,
    result_receiver: Receiver<TweakResult>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskOrchestrator {
    /// Creates a pool with one worker per logical CPU (at least two).
    pub fn new(bridge: Arc<ScriptBridge>) -> Self {
        Self::with_workers(bridge, num_cpus::get().max(2))
    }

    pub fn with_workers(bridge: Arc<ScriptBridge>, count: usize) -> Self {
        let (task_sender, task_receiver) = channel::unbounded::<Job>();
        let (result_sender, result_receiver) = channel::unbounded::<TweakResult>();

        let workers = (0..count.max(1))
            .map(|index| {
                let receiver = task_receiver.clone();
                let bridge = Arc::clone(&bridge);
                thread::spawn(move || worker_loop(index, &bridge, &receiver))
            })
            .collect();

        info!("Task orchestrator started with {} worker(s)", count.max(1));
        Self {
            task_sender: Some(task_sender),
            result_sender,
            result_receiver,
            workers,
        }
    }

    fn dispatch(&self, task: TweakTask, reply: Sender<TweakResult>) -> anyhow::Result<()> {
        let sender = self
            .task_sender
            .as_ref()
            .ok_or_else(|| anyhow!("Task orchestrator is shut down"))?;
        sender
            .send(Job { task, reply })
            .map_err(|_| anyhow!("All workers have exited"))
    }

    /// Submits a new task. Its result arrives on the shared result queue.
    pub fn submit_task(&self, task: TweakTask) -> anyhow::Result<()> {
        debug!("{} -> Queued {:?}", task.id, task.action);
        self.dispatch(task, self.result_sender.clone())
    }

    /// Attempts to receive a task result without blocking.
    pub fn try_recv_result(&self) -> Option<TweakResult> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<TweakResult> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    /// Runs one task on the pool and waits for its result, bypassing the
    /// shared result queue.
    pub fn run(&self, task: TweakTask) -> anyhow::Result<TweakResult> {
        let (reply, receiver) = channel::bounded(1);
        self.dispatch(task, reply)?;
        receiver
            .recv()
            .map_err(|_| anyhow!("Worker dropped the task without a result"))
    }

    /// Reads the state of every readable tweak in `tweaks` concurrently.
    /// Results come back in the order the tweaks were given.
    pub fn check_tweaks<'a>(
        &self,
        tweaks: impl IntoIterator<Item = &'a Tweak>,
    ) -> anyhow::Result<Vec<TweakResult>> {
        let (reply, receiver) = channel::unbounded();
        let mut order = Vec::new();
        for tweak in tweaks.into_iter().filter(|tweak| tweak.is_readable()) {
            order.push(tweak.id);
            self.dispatch(TweakTask::new(tweak, TweakAction::ReadInitialState), reply.clone())?;
        }
        drop(reply);

        let mut results: Vec<TweakResult> = receiver.iter().collect();
        results.sort_by_key(|result| order.iter().position(|id| *id == result.id));
        Ok(results)
    }

    /// Reads the state of every readable catalog entry.
    pub fn check_all(&self) -> anyhow::Result<Vec<TweakResult>> {
        self.check_tweaks(tweaks::catalog().values())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for TaskOrchestrator {
    fn drop(&mut self) {
        self.task_sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Worker thread panicked during shutdown");
            }
        }
        debug!("Task orchestrator stopped");
    }
}

fn worker_loop(index: usize, bridge: &ScriptBridge, receiver: &Receiver<Job>) {
    while let Ok(Job { task, reply }) = receiver.recv() {
        let id = task.id;
        let action = task.action;
        // A panicking tweak must not take the worker down with it.
        let result = panic::catch_unwind(AssertUnwindSafe(|| execute(bridge, &task)))
            .unwrap_or_else(|_| {
                error!("{} -> Worker {} panicked while running {:?}", id, index, action);
                TweakResult {
                    id,
                    action,
                    success: false,
                    enabled_state: None,
                    output: String::new(),
                    error: Some("Worker panicked while running the task".to_string()),
                }
            });
        if reply.send(result).is_err() {
            debug!("{} -> Result receiver is gone, dropping result", id);
        }
    }
    debug!("Worker {} terminating", index);
}

fn execute(bridge: &ScriptBridge, task: &TweakTask) -> TweakResult {
    let readable = task.method.readable();
    let outcome = match task.action {
        TweakAction::Apply => task
            .method
            .apply(bridge)
            .map(|output| (readable.then_some(true), output)),
        TweakAction::Revert => task
            .method
            .revert(bridge)
            .map(|()| (readable.then_some(false), String::new())),
        TweakAction::ReadInitialState => task
            .method
            .initial_state(bridge)
            .map(|state| (Some(state), String::new())),
    };

    match outcome {
        Ok((enabled_state, output)) => {
            info!("{} -> {:?} completed successfully.", task.id, task.action);
            TweakResult {
                id: task.id,
                action: task.action,
                success: true,
                enabled_state,
                output,
                error: None,
            }
        }
        Err(e) => {
            error!("{} -> {:?} failed: {:#}", task.id, task.action, e);
            TweakResult {
                id: task.id,
                action: task.action,
                success: false,
                enabled_state: None,
                output: String::new(),
                error: Some(format!("{:#}", e)),
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{
        bridge::{bridge_at, Interpreter},
        tweaks::{PowershellTweak, TweakCategory},
    };

    fn pool(workers: usize) -> (TempDir, TaskOrchestrator) {
        let tmp = TempDir::new().unwrap();
        let bridge = Arc::new(bridge_at(tmp.path(), Interpreter::posix_shell()));
        (tmp, TaskOrchestrator::with_workers(bridge, workers))
    }

    fn toggle(id: TweakId, check: &'static str) -> Tweak {
        Tweak::powershell_tweak(
            "Test",
            "Test toggle",
            TweakCategory::System,
            PowershellTweak {
                id,
                check_script: Some(check),
                apply_script: "echo applied",
                restore_script: Some("echo restored"),
                target_state: Some("enabled"),
            },
            false,
        )
    }

    struct Panicking;

    impl TweakMethod for Panicking {
        fn initial_state(&self, _: &ScriptBridge) -> anyhow::Result<bool> {
            panic!("boom")
        }
        fn apply(&self, _: &ScriptBridge) -> anyhow::Result<String> {
            panic!("boom")
        }
        fn revert(&self, _: &ScriptBridge) -> anyhow::Result<()> {
            panic!("boom")
        }
        fn readable(&self) -> bool {
            true
        }
        fn reversible(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_submit_and_receive() {
        let (_tmp, orchestrator) = pool(2);
        let tweak = toggle(TweakId::FastStartup, "echo enabled");
        orchestrator
            .submit_task(TweakTask::new(&tweak, TweakAction::Apply))
            .unwrap();

        let result = orchestrator
            .recv_result_timeout(Duration::from_secs(10))
            .expect("result");
        assert!(result.success);
        assert_eq!(result.action, TweakAction::Apply);
        assert_eq!(result.enabled_state, Some(true));
        assert_eq!(result.output, "applied");
        assert!(orchestrator.try_recv_result().is_none());
    }

    #[test]
    fn test_run_reports_failure_text() {
        let (_tmp, orchestrator) = pool(1);
        let tweak = toggle(TweakId::FastStartup, "echo denied >&2; exit 5");
        let result = orchestrator
            .run(TweakTask::new(&tweak, TweakAction::ReadInitialState))
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.enabled_state, None);
        let error = result.error.unwrap();
        assert!(error.contains("denied"), "{}", error);
    }

    #[test]
    fn test_panicking_task_keeps_worker_alive() {
        let (_tmp, orchestrator) = pool(1);
        let task = TweakTask {
            id: TweakId::StorageSense,
            method: Arc::new(Panicking),
            action: TweakAction::Revert,
        };
        let result = orchestrator.run(task).unwrap();
        assert!(!result.success);

        let tweak = toggle(TweakId::FastStartup, "echo enabled");
        let result = orchestrator
            .run(TweakTask::new(&tweak, TweakAction::ReadInitialState))
            .unwrap();
        assert_eq!(result.enabled_state, Some(true));
    }

    #[test]
    fn test_check_tweaks_keeps_order_and_skips_unreadable() {
        let (_tmp, orchestrator) = pool(4);
        let tweaks = vec![
            toggle(TweakId::StorageSense, "sleep 0.2; echo enabled"),
            Tweak::action(
                TweakId::FlushDnsCache,
                "Flush",
                "Action",
                TweakCategory::Network,
                "echo flushed",
            ),
            toggle(TweakId::FastStartup, "echo disabled"),
        ];

        let results = orchestrator.check_tweaks(&tweaks).unwrap();
        let states: Vec<(TweakId, Option<bool>)> = results
            .iter()
            .map(|result| (result.id, result.enabled_state))
            .collect();
        assert_eq!(
            states,
            vec![
                (TweakId::StorageSense, Some(true)),
                (TweakId::FastStartup, Some(false)),
            ]
        );
    }

    #[test]
    fn test_drop_joins_workers() {
        let (_tmp, orchestrator) = pool(3);
        assert_eq!(orchestrator.worker_count(), 3);
        drop(orchestrator);
    }
}
