//! Resource guardian: CPU/memory backpressure ahead of costly operations.
//!
//! Each [`ResourceGuardian::check`] samples the system, appends the sample to
//! a rolling history of [`HISTORY_CAPACITY`] snapshots, writes the history to
//! disk every [`PERSIST_EVERY`] appends, and compares the sample against the
//! configured thresholds. A breach comes back as `Err(ThresholdExceeded)`: a
//! signal to back off and retry, not a fault.
//!
//! The history sits behind one mutex held only for append/evict/read.
//! Sampling and disk writes happen outside it, so the guardian can be shared
//! across threads (`Arc<ResourceGuardian>`).

pub mod sampler;

pub use sampler::{FixedSampler, ProcSampler, Sampler, Usage};

use crate::persist;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Number of snapshots kept in memory and on disk.
pub const HISTORY_CAPACITY: usize = 100;

/// History is written to disk on every Nth append.
pub const PERSIST_EVERY: u64 = 10;

pub const DEFAULT_MAX_CPU_PERCENT: f64 = 90.0;
pub const DEFAULT_MAX_MEMORY_PERCENT: f64 = 85.0;
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on how long a single check may block sampling CPU.
pub const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// One CPU/memory sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    /// Unix time in seconds (fractional)
    pub timestamp: f64,
}

impl Snapshot {
    /// A snapshot stamped with the current time.
    pub fn new(cpu_percent: f64, memory_percent: f64) -> Self {
        Self {
            cpu_percent,
            memory_percent,
            timestamp: now_secs(),
        }
    }

    /// 0% CPU, 0% memory, stamped now.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
}

fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A monitored resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Cpu,
    Memory,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Cpu => write!(f, "CPU"),
            Resource::Memory => write!(f, "Memory"),
        }
    }
}

/// One exceeded threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breach {
    pub resource: Resource,
    pub measured: f64,
    pub limit: f64,
}

impl std::fmt::Display for Breach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} usage too high: {:.1}% (limit {:.1}%)",
            self.resource, self.measured, self.limit
        )
    }
}

/// Backpressure signal: the sample exceeded one or more thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("Resource threshold exceeded: {}", describe(.breaches))]
pub struct ThresholdExceeded {
    pub snapshot: Snapshot,
    pub breaches: Vec<Breach>,
}

impl ThresholdExceeded {
    /// Whether `resource` is among the breaches.
    pub fn breached(&self, resource: Resource) -> bool {
        self.breaches.iter().any(|b| b.resource == resource)
    }
}

fn describe(breaches: &[Breach]) -> String {
    breaches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Guardian thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardianSettings {
    pub max_cpu_percent: f64,
    pub max_memory_percent: f64,
    /// CPU sampling window; values above [`MAX_CHECK_INTERVAL`] are capped
    pub check_interval: Duration,
}

impl Default for GuardianSettings {
    fn default() -> Self {
        Self {
            max_cpu_percent: DEFAULT_MAX_CPU_PERCENT,
            max_memory_percent: DEFAULT_MAX_MEMORY_PERCENT,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

impl GuardianSettings {
    /// The sampling window actually used: `check_interval` capped at one second.
    pub fn effective_interval(&self) -> Duration {
        self.check_interval.min(MAX_CHECK_INTERVAL)
    }

    /// Every threshold `snapshot` exceeds (strictly greater than the limit).
    pub fn evaluate(&self, snapshot: &Snapshot) -> Vec<Breach> {
        let mut breaches = Vec::new();
        if snapshot.cpu_percent > self.max_cpu_percent {
            breaches.push(Breach {
                resource: Resource::Cpu,
                measured: snapshot.cpu_percent,
                limit: self.max_cpu_percent,
            });
        }
        if snapshot.memory_percent > self.max_memory_percent {
            breaches.push(Breach {
                resource: Resource::Memory,
                measured: snapshot.memory_percent,
                limit: self.max_memory_percent,
            });
        }
        breaches
    }
}

/// On-disk form of the history.
#[derive(Debug, Serialize, Deserialize)]
struct HistoryFile {
    snapshots: Vec<Snapshot>,
    last_updated: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct History {
    snapshots: VecDeque<Snapshot>,
    appends: u64,
}

/// Samples system load and applies threshold backpressure.
pub struct ResourceGuardian {
    settings: GuardianSettings,
    history_path: PathBuf,
    sampler: Arc<dyn Sampler>,
    history: Mutex<History>,
    /// Serializes history writes so the newest content lands last
    persist_lock: Mutex<()>,
}

impl std::fmt::Debug for ResourceGuardian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGuardian")
            .field("settings", &self.settings)
            .field("history_path", &self.history_path)
            .finish_non_exhaustive()
    }
}

impl ResourceGuardian {
    /// Guardian sampling the host through `/proc`.
    pub fn new(settings: GuardianSettings, history_path: impl Into<PathBuf>) -> Self {
        Self::with_sampler(settings, history_path, Arc::new(ProcSampler::new()))
    }

    /// Guardian with an explicit sampler. Loads any persisted history.
    pub fn with_sampler(
        settings: GuardianSettings,
        history_path: impl Into<PathBuf>,
        sampler: Arc<dyn Sampler>,
    ) -> Self {
        let history_path = history_path.into();
        let snapshots = load_history(&history_path);
        Self {
            settings,
            history_path,
            sampler,
            history: Mutex::new(History {
                snapshots,
                appends: 0,
            }),
            persist_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &GuardianSettings {
        &self.settings
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    fn lock(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sample, record, and evaluate thresholds.
    ///
    /// Blocks for up to [`GuardianSettings::effective_interval`]. If sampling
    /// fails the result is a zero-valued snapshot, which is not recorded.
    pub fn check(&self) -> Result<Snapshot, ThresholdExceeded> {
        let usage = match self.sampler.sample(self.settings.effective_interval()) {
            Ok(usage) => usage,
            Err(e) => {
                tracing::error!("Error checking resources: {}", e);
                return Ok(Snapshot::zero());
            }
        };

        let snapshot = Snapshot::new(usage.cpu_percent, usage.memory_percent);
        tracing::debug!(
            "Resource sample: cpu={:.1}% memory={:.1}%",
            snapshot.cpu_percent,
            snapshot.memory_percent
        );

        if self.record(snapshot) {
            self.flush();
        }

        let breaches = self.settings.evaluate(&snapshot);
        if breaches.is_empty() {
            Ok(snapshot)
        } else {
            let exceeded = ThresholdExceeded { snapshot, breaches };
            tracing::warn!("{}", exceeded);
            Err(exceeded)
        }
    }

    /// Append under the lock, evicting the oldest past capacity.
    /// Returns true when this append is due for persistence.
    fn record(&self, snapshot: Snapshot) -> bool {
        let mut history = self.lock();
        history.snapshots.push_back(snapshot);
        while history.snapshots.len() > HISTORY_CAPACITY {
            history.snapshots.pop_front();
        }
        history.appends += 1;
        history.appends % PERSIST_EVERY == 0
    }

    /// Write the current history to disk now.
    pub fn flush(&self) -> bool {
        let _guard = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let file = HistoryFile {
            snapshots: self.history(),
            last_updated: Utc::now(),
        };
        match persist::write_json_atomic(&self.history_path, &file) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error saving resource history: {}", e);
                false
            }
        }
    }

    /// Copy of the history, oldest first.
    pub fn history(&self) -> Vec<Snapshot> {
        self.lock().snapshots.iter().copied().collect()
    }

    /// Mean CPU/memory over the trailing `last_n` snapshots (default: all).
    ///
    /// Returns zeros when the history is empty.
    pub fn average_usage(&self, last_n: Option<usize>) -> Snapshot {
        self.aggregate(last_n, |window| {
            let n = window.len() as f64;
            let cpu = window.iter().map(|s| s.cpu_percent).sum::<f64>() / n;
            let memory = window.iter().map(|s| s.memory_percent).sum::<f64>() / n;
            (cpu, memory)
        })
    }

    /// Maximum CPU/memory over the trailing `last_n` snapshots (default: all).
    ///
    /// Returns zeros when the history is empty.
    pub fn peak_usage(&self, last_n: Option<usize>) -> Snapshot {
        self.aggregate(last_n, |window| {
            let cpu = window.iter().map(|s| s.cpu_percent).fold(0.0, f64::max);
            let memory = window.iter().map(|s| s.memory_percent).fold(0.0, f64::max);
            (cpu, memory)
        })
    }

    fn aggregate(&self, last_n: Option<usize>, f: impl FnOnce(&[Snapshot]) -> (f64, f64)) -> Snapshot {
        let history = self.lock();
        let len = history.snapshots.len();
        if len == 0 {
            return Snapshot::zero();
        }
        // 0 means "everything", matching the unset default.
        let n = last_n.filter(|n| *n > 0).unwrap_or(len).min(len);
        let window: Vec<Snapshot> = history.snapshots.iter().skip(len - n).copied().collect();
        drop(history);

        let (cpu, memory) = f(&window);
        Snapshot::new(cpu, memory)
    }
}

fn load_history(path: &Path) -> VecDeque<Snapshot> {
    match persist::read_json::<HistoryFile>(path) {
        Ok(Some(file)) => {
            let skip = file.snapshots.len().saturating_sub(HISTORY_CAPACITY);
            file.snapshots.into_iter().skip(skip).collect()
        }
        Ok(None) => VecDeque::new(),
        Err(e) => {
            tracing::error!("Error loading resource history: {}", e);
            VecDeque::new()
        }
    }
}
