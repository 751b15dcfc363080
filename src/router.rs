// src/router.rs

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{bail, Context};
use crossbeam::channel::Sender;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::{
    apps::{AppAction, AppManager},
    bridge::{ExecOptions, ScriptBridge},
    cleaner::AutoCleaner,
    config::AppConfig,
    constants::{DEFAULT_MONITOR_INTERVAL, DEFAULT_SCRIPT_LABEL},
    errors::{RouterError, TweakError},
    events::Event,
    orchestrator::{TaskOrchestrator, TweakAction, TweakTask},
    telemetry::{MonitorRegistry, Sampler, SessionHandle},
    tweaks,
};

/// One request from the UI layer.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRequest {
    pub channel: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl RawRequest {
    pub fn new(channel: &str, payload: Value) -> Self {
        Self {
            channel: channel.to_string(),
            payload: Some(payload),
        }
    }

    fn parse<T: DeserializeOwned>(&self) -> Result<T, RouterError> {
        let payload = match &self.payload {
            Some(Value::Null) | None => json!({}),
            Some(payload) => payload.clone(),
        };
        serde_json::from_value(payload).map_err(|source| RouterError::InvalidPayload {
            channel: self.channel.clone(),
            source,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunScriptPayload {
    #[serde(alias = "script")]
    body: String,
    #[serde(default, alias = "name")]
    label: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WindowPayload {
    #[serde(alias = "script")]
    body: String,
    #[serde(default, alias = "name")]
    label: Option<String>,
    #[serde(default = "keep_window_open")]
    no_exit: bool,
}

fn keep_window_open() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct TweakPayload {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AppsPayload {
    action: AppAction,
    #[serde(default)]
    apps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MonitorPayload {
    /// Milliseconds between samples.
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    session: Option<SessionHandle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CleanPayload {
    #[serde(default)]
    selections: Vec<String>,
    #[serde(default)]
    interval_secs: Option<u64>,
}

/// Routes requests by channel name to the component that serves them. Every
/// answer is a JSON object with a `success` flag; failures carry `error`.
pub struct Router {
    bridge: Arc<ScriptBridge>,
    orchestrator: TaskOrchestrator,
    cleaner: AutoCleaner,
    apps: AppManager,
    monitors: MonitorRegistry,
    sampler: Mutex<Sampler>,
    events: Sender<Event>,
    auto_clean_interval: Duration,
}

impl Router {
    pub fn new(config: &AppConfig, events: Sender<Event>) -> Self {
        let bridge = Arc::new(ScriptBridge::new(config.bridge.clone()));
        Self::with_bridge(bridge, config.auto_clean_interval, events)
    }

    pub fn with_bridge(bridge: Arc<ScriptBridge>, auto_clean_interval: Duration, events: Sender<Event>) -> Self {
        Self {
            orchestrator: TaskOrchestrator::new(Arc::clone(&bridge)),
            cleaner: AutoCleaner::new(Arc::clone(&bridge), Some(events.clone())),
            apps: AppManager::new(Arc::clone(&bridge), Some(events.clone())),
            monitors: MonitorRegistry::new(),
            sampler: Mutex::new(Sampler::new()),
            bridge,
            events,
            auto_clean_interval,
        }
    }

    pub fn bridge(&self) -> &ScriptBridge {
        &self.bridge
    }

    fn sampler(&self) -> MutexGuard<'_, Sampler> {
        self.sampler.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Handles one request. Never fails; errors become
    /// `{ "success": false, "error": ... }`.
    pub fn handle(&self, request: RawRequest) -> Value {
        debug!("{} -> Request received", request.channel);
        match self.dispatch(&request) {
            Ok(response) => response,
            Err(e) => {
                error!("{} -> {:#}", request.channel, e);
                json!({ "success": false, "error": format!("{:#}", e) })
            }
        }
    }

    fn dispatch(&self, request: &RawRequest) -> anyhow::Result<Value> {
        match request.channel.as_str() {
            "run-powershell" => self.run_script(request.parse()?),
            "run-powershell-window" => self.open_script_window(request.parse()?),
            "tweaks:fetch" => Ok(json!({
                "success": true,
                "tweaks": tweaks::catalog().values().map(|t| t.info()).collect::<Vec<_>>(),
            })),
            "tweak:check" => self.run_tweak(request.parse()?, TweakAction::ReadInitialState),
            "tweak:apply" => self.run_tweak(request.parse()?, TweakAction::Apply),
            "tweak:restore" => self.run_tweak(request.parse()?, TweakAction::Revert),
            "tweaks:check-all" => {
                let results = self.orchestrator.check_all()?;
                Ok(json!({ "success": true, "results": results }))
            }
            "handle-apps" => self.handle_apps(request.parse()?),
            "get-system-metrics" => {
                let metrics = self.sampler().sample();
                Ok(json!({ "success": true, "metrics": metrics }))
            }
            "get-network-metrics" => {
                let interfaces = self.sampler().sample_network();
                Ok(json!({ "success": true, "interfaces": interfaces }))
            }
            // sysinfo exposes no GPU counters.
            "get-gpu-metrics" => Err(RouterError::Unsupported(request.channel.clone()).into()),
            "start-realtime-monitoring" => {
                let payload: MonitorPayload = request.parse()?;
                let interval = payload
                    .interval
                    .filter(|ms| *ms > 0)
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_MONITOR_INTERVAL);
                let session = self.monitors.subscribe(interval, self.events.clone());
                Ok(json!({ "success": true, "session": session }))
            }
            "stop-realtime-monitoring" => {
                let payload: MonitorPayload = request.parse()?;
                let stopped = match payload.session {
                    Some(session) => usize::from(self.monitors.unsubscribe(session)),
                    None => {
                        let count = self.monitors.active().len();
                        self.monitors.stop_all();
                        count
                    }
                };
                Ok(json!({ "success": true, "stopped": stopped }))
            }
            "auto-clean:start" => {
                let payload: CleanPayload = request.parse()?;
                let interval = match payload.interval_secs {
                    Some(0) => bail!("Auto-clean interval must be positive"),
                    Some(secs) => Duration::from_secs(secs),
                    None => self.auto_clean_interval,
                };
                let scheduled = self.cleaner.start(&payload.selections, interval)?;
                Ok(json!({
                    "success": true,
                    "selections": scheduled,
                    "intervalSecs": interval.as_secs(),
                }))
            }
            "auto-clean:stop" => Ok(json!({ "success": true, "wasRunning": self.cleaner.stop() })),
            "auto-clean:history" => Ok(json!({
                "success": true,
                "running": self.cleaner.is_running(),
                "history": self.cleaner.history(),
            })),
            "clean:run" => {
                let payload: CleanPayload = request.parse()?;
                let run = self.cleaner.run_once(&payload.selections)?;
                Ok(json!({ "success": run.failed.is_empty(), "run": run }))
            }
            "test-connection" => Ok(json!({ "success": true, "message": "Connected to Maxify core" })),
            other => Err(RouterError::UnknownChannel(other.to_string()).into()),
        }
    }

    fn run_script(&self, payload: RunScriptPayload) -> anyhow::Result<Value> {
        let label = payload.label.as_deref().unwrap_or(DEFAULT_SCRIPT_LABEL);
        let mut options = ExecOptions::default();
        if let Some(ms) = payload.timeout_ms.filter(|ms| *ms > 0) {
            options = options.timeout_ms(ms);
        }
        let result = self.bridge.execute_with(label, &payload.body, &options);
        serde_json::to_value(result.to_response()).context("Failed to serialize script result")
    }

    fn open_script_window(&self, payload: WindowPayload) -> anyhow::Result<Value> {
        let label = payload.label.as_deref().unwrap_or(DEFAULT_SCRIPT_LABEL);
        let launched = self
            .bridge
            .launch_detached(label, &payload.body, payload.no_exit)?;
        Ok(json!({ "success": true, "label": launched.label, "pid": launched.pid }))
    }

    fn run_tweak(&self, payload: TweakPayload, action: TweakAction) -> anyhow::Result<Value> {
        let tweak = tweaks::find(&payload.id)?;
        if action == TweakAction::ReadInitialState && !tweak.is_readable() {
            return Err(TweakError::NotReadable(tweak.id).into());
        }
        let result = self.orchestrator.run(TweakTask::new(tweak, action))?;
        serde_json::to_value(result).context("Failed to serialize tweak result")
    }

    fn handle_apps(&self, payload: AppsPayload) -> anyhow::Result<Value> {
        match payload.action {
            AppAction::Install | AppAction::Uninstall => {
                let report = if payload.action == AppAction::Install {
                    self.apps.install(&payload.apps)?
                } else {
                    self.apps.uninstall(&payload.apps)?
                };
                Ok(json!({ "success": report.failed.is_empty(), "report": report }))
            }
            AppAction::CheckInstalled => {
                let installed = self.apps.check_installed(&payload.apps)?;
                Ok(json!({ "success": true, "installed": installed }))
            }
        }
    }

    /// Stops background work: monitoring sessions and the auto-clean timer.
    pub fn shutdown(&self) {
        self.monitors.stop_all();
        self.cleaner.stop();
    }
}
