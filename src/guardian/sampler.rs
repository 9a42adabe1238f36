//! CPU and memory samplers.
//!
//! [`ProcSampler`] reads `/proc/stat` and `/proc/meminfo` on Linux. Other
//! platforms get `ErrorKind::Unsupported`, which the guardian maps to a
//! zero-valued snapshot.

use std::io;
use std::time::Duration;

/// One CPU/memory reading, both in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Usage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

/// Source of system utilization readings.
pub trait Sampler: Send + Sync {
    /// Measure CPU utilization over `interval` (blocking) and current memory use.
    fn sample(&self, interval: Duration) -> io::Result<Usage>;
}

/// Linux sampler backed by `/proc`.
#[derive(Debug, Clone, Default)]
pub struct ProcSampler;

impl ProcSampler {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "linux")]
impl Sampler for ProcSampler {
    fn sample(&self, interval: Duration) -> io::Result<Usage> {
        let before = parse_cpu_times(&std::fs::read_to_string("/proc/stat")?)?;
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
        let after = parse_cpu_times(&std::fs::read_to_string("/proc/stat")?)?;
        let memory_percent = parse_memory_percent(&std::fs::read_to_string("/proc/meminfo")?)?;

        Ok(Usage {
            cpu_percent: before.busy_percent_until(&after),
            memory_percent,
        })
    }
}

#[cfg(not(target_os = "linux"))]
impl Sampler for ProcSampler {
    fn sample(&self, _interval: Duration) -> io::Result<Usage> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "resource sampling is only implemented for Linux",
        ))
    }
}

/// Sampler that always reports the same reading.
#[derive(Debug, Clone, Copy)]
pub struct FixedSampler {
    usage: Usage,
}

impl FixedSampler {
    pub fn new(cpu_percent: f64, memory_percent: f64) -> Self {
        Self {
            usage: Usage {
                cpu_percent,
                memory_percent,
            },
        }
    }
}

impl Sampler for FixedSampler {
    fn sample(&self, _interval: Duration) -> io::Result<Usage> {
        Ok(self.usage)
    }
}

/// Aggregate jiffy counters from the `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

impl CpuTimes {
    /// Percentage of non-idle time between `self` and a later reading.
    pub fn busy_percent_until(&self, later: &CpuTimes) -> f64 {
        let total = later.total.saturating_sub(self.total);
        if total == 0 {
            return 0.0;
        }
        let idle = later.idle.saturating_sub(self.idle).min(total);
        let busy = (total - idle) as f64 / total as f64 * 100.0;
        busy.clamp(0.0, 100.0)
    }
}

fn invalid(reason: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.into())
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
///
/// Columns: user nice system idle iowait irq softirq steal [guest guest_nice].
/// Guest time is already folded into user/nice, so only the first eight count.
pub fn parse_cpu_times(contents: &str) -> io::Result<CpuTimes> {
    let line = contents
        .lines()
        .find(|line| line.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| invalid("cpu line missing from /proc/stat"))?;

    let fields = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|v| {
            v.parse::<u64>()
                .map_err(|e| invalid(format!("invalid /proc/stat value {}: {}", v, e)))
        })
        .collect::<io::Result<Vec<u64>>>()?;

    if fields.len() < 4 {
        return Err(invalid("cpu line in /proc/stat has fewer than 4 columns"));
    }

    let iowait = fields.get(4).copied().unwrap_or(0);
    Ok(CpuTimes {
        idle: fields[3] + iowait,
        total: fields.iter().sum(),
    })
}

/// Parse `/proc/meminfo` into a used-memory percentage.
///
/// Uses `MemAvailable` when present; older kernels fall back to
/// `MemFree + Buffers + Cached`.
pub fn parse_memory_percent(contents: &str) -> io::Result<f64> {
    let mut total = None;
    let mut available = None;
    let mut free = 0u64;
    let mut buffers = 0u64;
    let mut cached = 0u64;

    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let key = fields.next().unwrap_or_default();
        let Some(value) = fields.next().and_then(|v| v.parse::<u64>().ok()) else {
            continue;
        };
        match key {
            "MemTotal:" => total = Some(value),
            "MemAvailable:" => available = Some(value),
            "MemFree:" => free = value,
            "Buffers:" => buffers = value,
            "Cached:" => cached = value,
            _ => {}
        }
    }

    let total = total
        .filter(|t| *t > 0)
        .ok_or_else(|| invalid("MemTotal missing from /proc/meminfo"))?;
    let available = available.unwrap_or(free + buffers + cached).min(total);

    Ok((total - available) as f64 / total as f64 * 100.0)
}
