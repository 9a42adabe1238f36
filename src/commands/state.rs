//! State map commands.

use super::{Context, Output, json};
use crate::persist::resolve_path;
use crate::state::FileRecord;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn describe_record(path: &Path, record: &FileRecord) -> String {
    format!(
        "{}  {} bytes  modified {}  ({} functions, {} classes, {} variables)",
        path.display(),
        record.size,
        record.last_modified.format("%Y-%m-%d %H:%M:%S"),
        record.functions.len(),
        record.classes.len(),
        record.variables.len()
    )
}

#[derive(Serialize)]
pub struct TrackResult {
    pub path: PathBuf,
    #[serde(flatten)]
    pub record: FileRecord,
}

impl Output for TrackResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Tracked {}", describe_record(&self.path, &self.record))
    }
}

/// Record a file in the state map, through the full access and resource checks.
pub fn track(ctx: &Context, file: &Path) -> Result<TrackResult> {
    let mut orchestrator = ctx.orchestrator();
    let result = orchestrator.track_file(ctx.token(), file);
    orchestrator.shutdown();
    Ok(TrackResult {
        record: result?,
        path: resolve_path(file)?,
    })
}

#[derive(Serialize)]
pub struct ForgetResult {
    pub path: PathBuf,
    pub removed: bool,
}

impl Output for ForgetResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.removed {
            format!("Forgot {}", self.path.display())
        } else {
            format!("{} was not tracked", self.path.display())
        }
    }
}

/// Drop a file from the state map. The file itself need not exist anymore.
pub fn forget(ctx: &Context, file: &Path) -> Result<ForgetResult> {
    ctx.authorize(&ctx.open_gate())?;
    let mut store = ctx.open_store();
    let path = resolve_path(file)?;
    let tracked = store.get(&path).is_some();
    if tracked && !store.remove_file(&path) {
        return Err(Error::StateCorruption(
            "Failed to save state map; see log for details".to_string(),
        ));
    }
    Ok(ForgetResult {
        path,
        removed: tracked,
    })
}

#[derive(Serialize)]
pub struct StateShowResult {
    pub count: usize,
    pub last_updated: DateTime<Utc>,
    pub files: BTreeMap<PathBuf, FileRecord>,
}

impl Output for StateShowResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.files.is_empty() {
            return "No files tracked.".to_string();
        }
        let mut lines = vec![format!(
            "{} tracked file{} (updated {})",
            self.count,
            if self.count == 1 { "" } else { "s" },
            self.last_updated.format("%Y-%m-%d %H:%M:%S")
        )];
        lines.extend(
            self.files
                .iter()
                .map(|(path, record)| format!("  {}", describe_record(path, record))),
        );
        lines.join("\n")
    }
}

pub fn state_show(ctx: &Context) -> Result<StateShowResult> {
    ctx.authorize(&ctx.open_gate())?;
    let store = ctx.open_store();
    let map = store.map();
    Ok(StateShowResult {
        count: map.files.len(),
        last_updated: map.last_updated,
        files: map.files.clone(),
    })
}

/// Look up one tracked file.
pub fn state_get(ctx: &Context, file: &Path) -> Result<TrackResult> {
    ctx.authorize(&ctx.open_gate())?;
    let store = ctx.open_store();
    let path = resolve_path(file)?;
    let record = store
        .get(&path)
        .cloned()
        .ok_or_else(|| Error::InvalidInput(format!("Not tracked: {}", path.display())))?;
    Ok(TrackResult { path, record })
}
