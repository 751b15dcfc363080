// src/telemetry.rs

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use crossbeam::channel::Sender;
use serde::{Deserialize, Serialize};
use sysinfo::{Networks, ProcessesToUpdate, System};
use tracing::{debug, info};

use crate::{
    constants::{GAME_PROCESS_KEYWORDS, MAX_GAME_PROCESSES, MIN_MONITOR_INTERVAL},
    events::Event,
    scheduler::RecurringTask,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuMetrics {
    /// Average over all cores, in percent.
    pub usage: f32,
    pub per_core: Vec<f32>,
    pub core_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetrics {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMetrics {
    pub pid: u32,
    pub name: String,
    pub cpu: f32,
    pub memory_bytes: u64,
}

/// One snapshot of the machine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub timestamp: DateTime<Utc>,
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub process_count: usize,
    /// Busiest processes that look like games or launchers.
    pub game_processes: Vec<ProcessMetrics>,
}

/// Traffic on one network interface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMetrics {
    pub name: String,
    /// Bytes per second received since the previous network sample.
    pub rx_sec: f64,
    pub tx_sec: f64,
    pub rx_total: u64,
    pub tx_total: u64,
}

pub fn is_game_process(name: &str) -> bool {
    let name = name.to_lowercase();
    GAME_PROCESS_KEYWORDS
        .iter()
        .any(|keyword| name.contains(keyword))
}

pub fn memory_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (used as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

pub fn per_second(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    bytes as f64 / secs
}

/// Wraps a `sysinfo::System` and `sysinfo::Networks`. CPU usage and network
/// rates are deltas between refreshes, so the first sample after creation
/// reads low; keep a sampler alive between samples.
pub struct Sampler {
    system: System,
    networks: Networks,
    networks_refreshed: Instant,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            system,
            networks: Networks::new_with_refreshed_list(),
            networks_refreshed: Instant::now(),
        }
    }

    /// Per-interface traffic, sorted by interface name. Rates cover the time
    /// since the previous call (or since the sampler was created).
    pub fn sample_network(&mut self) -> Vec<NetworkMetrics> {
        self.networks.refresh(true);
        let elapsed = self.networks_refreshed.elapsed();
        self.networks_refreshed = Instant::now();

        let mut interfaces: Vec<NetworkMetrics> = self
            .networks
            .list()
            .iter()
            .map(|(name, data)| NetworkMetrics {
                name: name.clone(),
                rx_sec: per_second(data.received(), elapsed),
                tx_sec: per_second(data.transmitted(), elapsed),
                rx_total: data.total_received(),
                tx_total: data.total_transmitted(),
            })
            .collect();
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));
        interfaces
    }

    pub fn sample(&mut self) -> SystemMetrics {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let per_core: Vec<f32> = self.system.cpus().iter().map(|cpu| cpu.cpu_usage()).collect();
        let total = self.system.total_memory();
        let used = self.system.used_memory();

        let mut game_processes: Vec<ProcessMetrics> = self
            .system
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let name = process.name().to_string_lossy().to_string();
                is_game_process(&name).then(|| ProcessMetrics {
                    pid: pid.as_u32(),
                    name,
                    cpu: process.cpu_usage(),
                    memory_bytes: process.memory(),
                })
            })
            .collect();
        game_processes.sort_by(|a, b| b.cpu.total_cmp(&a.cpu));
        game_processes.truncate(MAX_GAME_PROCESSES);

        SystemMetrics {
            timestamp: Utc::now(),
            cpu: CpuMetrics {
                usage: self.system.global_cpu_usage(),
                core_count: per_core.len(),
                per_core,
            },
            memory: MemoryMetrics {
                total_bytes: total,
                used_bytes: used,
                available_bytes: self.system.available_memory(),
                percent: memory_percent(used, total),
            },
            process_count: self.system.processes().len(),
            game_processes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(pub u64);

/// Live monitoring sessions, each pushing metrics on its own timer.
#[derive(Default)]
pub struct MonitorRegistry {
    next_id: AtomicU64,
    sessions: Mutex<BTreeMap<SessionHandle, RecurringTask>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, BTreeMap<SessionHandle, RecurringTask>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts sampling every `interval` (never faster than
    /// `MIN_MONITOR_INTERVAL`), sending `Event::RealtimeMetrics` into `sink`.
    pub fn subscribe(&self, interval: Duration, sink: Sender<Event>) -> SessionHandle {
        let handle = SessionHandle(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let interval = interval.max(MIN_MONITOR_INTERVAL);
        let mut sampler = Sampler::new();

        let task = RecurringTask::start(
            &format!("monitor-{}", handle.0),
            interval,
            true,
            move || {
                let metrics = sampler.sample();
                if sink
                    .send(Event::RealtimeMetrics {
                        session: handle.0,
                        metrics,
                    })
                    .is_err()
                {
                    debug!("monitor-{} -> Event receiver is gone", handle.0);
                }
            },
        );

        info!("monitor-{} -> Started ({}ms)", handle.0, interval.as_millis());
        self.sessions().insert(handle, task);
        handle
    }

    /// Stops a session. Returns whether it existed.
    pub fn unsubscribe(&self, handle: SessionHandle) -> bool {
        // Stop outside the lock; a sample may be in flight.
        let task = self.sessions().remove(&handle);
        match task {
            Some(mut task) => {
                task.stop();
                info!("monitor-{} -> Stopped", handle.0);
                true
            }
            None => false,
        }
    }

    pub fn active(&self) -> Vec<SessionHandle> {
        self.sessions().keys().copied().collect()
    }

    pub fn stop_all(&self) {
        let sessions = std::mem::take(&mut *self.sessions());
        for (handle, mut task) in sessions {
            task.stop();
            debug!("monitor-{} -> Stopped", handle.0);
        }
    }
}
