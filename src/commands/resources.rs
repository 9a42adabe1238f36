//! Resource guardian commands.

use super::{Context, Output, format_percent, json};
use crate::guardian::{GuardianSettings, Snapshot};
use crate::Result;
use serde::Serialize;

#[derive(Serialize)]
pub struct CheckResult {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub max_cpu_percent: f64,
    pub max_memory_percent: f64,
}

impl Output for CheckResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "CPU {} (limit {}) | Memory {} (limit {})",
            format_percent(self.snapshot.cpu_percent),
            format_percent(self.max_cpu_percent),
            format_percent(self.snapshot.memory_percent),
            format_percent(self.max_memory_percent),
        )
    }
}

/// Take one sample. A breach is returned as `ResourceThresholdExceeded`.
pub fn check(ctx: &Context) -> Result<CheckResult> {
    let guardian = ctx.open_guardian();
    let outcome = guardian.check();
    // One-shot processes never reach the periodic persistence point.
    guardian.flush();

    let snapshot = outcome?;
    let GuardianSettings {
        max_cpu_percent,
        max_memory_percent,
        ..
    } = *guardian.settings();
    Ok(CheckResult {
        snapshot,
        max_cpu_percent,
        max_memory_percent,
    })
}

#[derive(Serialize)]
pub struct UsageResult {
    pub samples: usize,
    pub average: Snapshot,
    pub peak: Snapshot,
}

impl Output for UsageResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.samples == 0 {
            return "No samples recorded yet. Run `cust check`.".to_string();
        }
        format!(
            "{} sample{}\nAverage: CPU {} | Memory {}\nPeak:    CPU {} | Memory {}",
            self.samples,
            if self.samples == 1 { "" } else { "s" },
            format_percent(self.average.cpu_percent),
            format_percent(self.average.memory_percent),
            format_percent(self.peak.cpu_percent),
            format_percent(self.peak.memory_percent),
        )
    }
}

/// Average and peak over the trailing `last` samples (all when `None`).
pub fn usage(ctx: &Context, last: Option<usize>) -> Result<UsageResult> {
    let guardian = ctx.open_guardian();
    let total = guardian.history().len();
    let samples = match last {
        Some(n) if n > 0 => n.min(total),
        _ => total,
    };
    Ok(UsageResult {
        samples,
        average: guardian.average_usage(last),
        peak: guardian.peak_usage(last),
    })
}

#[derive(Serialize)]
pub struct HistoryResult {
    pub count: usize,
    pub snapshots: Vec<Snapshot>,
}

impl Output for HistoryResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.snapshots.is_empty() {
            return "No samples recorded yet.".to_string();
        }
        self.snapshots
            .iter()
            .map(|s| {
                let when = chrono::DateTime::from_timestamp_millis((s.timestamp * 1000.0) as i64)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| format!("{:.3}", s.timestamp));
                format!(
                    "{}  CPU {:>6}  Memory {:>6}",
                    when,
                    format_percent(s.cpu_percent),
                    format_percent(s.memory_percent)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn history(ctx: &Context) -> Result<HistoryResult> {
    let snapshots = ctx.open_guardian().history();
    Ok(HistoryResult {
        count: snapshots.len(),
        snapshots,
    })
}
