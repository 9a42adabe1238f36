//! Crash-tolerant state map persistence.
//!
//! The state map records per-file metadata keyed by absolute path. It is
//! rewritten wholesale on every mutation:
//!
//! 1. the current primary file (if any) is copied to the `.bak` sibling,
//! 2. the new content is written to a temp file in the same directory,
//! 3. the temp file is renamed over the primary.
//!
//! So the backup is always exactly one generation behind the primary, and the
//! primary is never observed half-written. Loading falls back
//! primary -> backup (promoting it back to primary) -> empty map.
//!
//! `StateStore` does no internal locking; callers serialize mutations.

use crate::persist::{self, resolve_path};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One extracted symbol (function, class or variable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    /// 1-based line of the definition
    pub line: usize,
}

/// Metadata recorded for one tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Modification time of the file when it was recorded
    pub last_modified: DateTime<Utc>,
    /// Content length in bytes
    pub size: u64,
    #[serde(default)]
    pub functions: Vec<Symbol>,
    #[serde(default)]
    pub classes: Vec<Symbol>,
    #[serde(default)]
    pub variables: Vec<Symbol>,
}

/// The persisted map of tracked files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMap {
    #[serde(default)]
    pub files: BTreeMap<PathBuf, FileRecord>,
    pub last_updated: DateTime<Utc>,
}

impl StateMap {
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

impl Default for StateMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Symbols pulled out of one file's content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Symbols {
    pub functions: Vec<Symbol>,
    pub classes: Vec<Symbol>,
    pub variables: Vec<Symbol>,
}

/// Analyzer that extracts symbols from source text.
pub trait SymbolExtractor: Send + Sync {
    fn extract(&self, path: &Path, content: &str) -> Symbols;
}

/// Extractor used when no analyzer is plugged in: every sequence is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExtractor;

impl SymbolExtractor for NoExtractor {
    fn extract(&self, _path: &Path, _content: &str) -> Symbols {
        Symbols::default()
    }
}

/// State map with atomic, backup-protected persistence.
pub struct StateStore {
    primary: PathBuf,
    backup: PathBuf,
    map: StateMap,
    extractor: Box<dyn SymbolExtractor>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("primary", &self.primary)
            .field("backup", &self.backup)
            .field("files", &self.map.files.len())
            .finish_non_exhaustive()
    }
}

/// `code_map.json` -> `code_map.json.bak`
fn backup_path_for(primary: &Path) -> PathBuf {
    let mut name = primary
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".bak");
    primary.with_file_name(name)
}

impl StateStore {
    /// Open the store at `primary`, loading whatever can be recovered.
    pub fn open(primary: impl Into<PathBuf>) -> Self {
        let primary = primary.into();
        let backup = backup_path_for(&primary);
        let mut store = Self {
            primary,
            backup,
            map: StateMap::new(),
            extractor: Box::new(NoExtractor),
        };
        store.load();
        store
    }

    /// Replace the symbol extractor.
    pub fn with_extractor(mut self, extractor: Box<dyn SymbolExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    pub fn map(&self) -> &StateMap {
        &self.map
    }

    pub fn files(&self) -> &BTreeMap<PathBuf, FileRecord> {
        &self.map.files
    }

    pub fn len(&self) -> usize {
        self.map.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.files.is_empty()
    }

    /// Look up the record for `path` (resolved to absolute first).
    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        let resolved = resolve_path(path).ok()?;
        self.map.files.get(&resolved)
    }

    /// Reload from disk: primary, then backup (restoring the primary from it),
    /// then an empty map. Never fails.
    pub fn load(&mut self) -> StateMap {
        self.map = self.recover();
        self.map.clone()
    }

    fn recover(&self) -> StateMap {
        match read_state(&self.primary) {
            Ok(Some(map)) => return map,
            Ok(None) => {}
            Err(e) => tracing::warn!(
                "State file {} corrupted, trying backup: {}",
                self.primary.display(),
                e
            ),
        }

        match read_state(&self.backup) {
            Ok(Some(map)) => {
                match persist::write_json_atomic(&self.primary, &map) {
                    Ok(()) => tracing::info!("Restored state from {}", self.backup.display()),
                    Err(e) => tracing::error!("Error restoring state from backup: {}", e),
                }
                return map;
            }
            Ok(None) => {}
            Err(e) => tracing::error!(
                "Backup state file {} also corrupted: {}",
                self.backup.display(),
                e
            ),
        }

        StateMap::new()
    }

    /// Persist the whole map. On failure the files on disk are untouched.
    pub fn save(&mut self) -> bool {
        match self.try_save() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error saving state: {}", e);
                false
            }
        }
    }

    fn try_save(&mut self) -> Result<()> {
        let previous = self.map.last_updated;
        self.map.last_updated = Utc::now();
        let result = self.write();
        if result.is_err() {
            self.map.last_updated = previous;
        }
        result
    }

    /// Copy the primary to the backup, then replace the primary.
    fn write(&self) -> Result<()> {
        match fs::read(&self.primary) {
            Ok(previous) => persist::write_bytes_atomic(&self.backup, &previous)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        persist::write_json_atomic(&self.primary, &self.map)
    }

    /// Record `path` with its `content` and persist.
    ///
    /// The file must exist. Its entry is keyed by the resolved absolute path
    /// and replaces any previous entry.
    pub fn add_file(&mut self, path: &Path, content: &str) -> bool {
        match self.try_add_file(path, content) {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Error adding file to state: {}", e);
                false
            }
        }
    }

    pub(crate) fn try_add_file(&mut self, path: &Path, content: &str) -> Result<FileRecord> {
        let resolved = resolve_path(path)?;
        let metadata = match fs::metadata(&resolved) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::InvalidInput(format!(
                    "File does not exist: {}",
                    resolved.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(Error::InvalidInput(format!(
                "Not a regular file: {}",
                resolved.display()
            )));
        }

        let symbols = self.extractor.extract(&resolved, content);
        let record = FileRecord {
            last_modified: metadata.modified()?.into(),
            size: content.len() as u64,
            functions: symbols.functions,
            classes: symbols.classes,
            variables: symbols.variables,
        };

        let previous = self.map.files.insert(resolved.clone(), record.clone());
        if let Err(e) = self.try_save() {
            match previous {
                Some(old) => self.map.files.insert(resolved, old),
                None => self.map.files.remove(&resolved),
            };
            return Err(e);
        }
        Ok(record)
    }

    /// Drop `path` from the map and persist. False if it wasn't tracked.
    pub fn remove_file(&mut self, path: &Path) -> bool {
        let Ok(resolved) = resolve_path(path) else {
            return false;
        };
        let Some(old) = self.map.files.remove(&resolved) else {
            return false;
        };
        if self.save() {
            true
        } else {
            self.map.files.insert(resolved, old);
            false
        }
    }
}

fn read_state(path: &Path) -> Result<Option<StateMap>> {
    persist::read_json(path).map_err(|e| match e {
        Error::Json(e) => Error::StateCorruption(format!("{}: {}", path.display(), e)),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;

    fn store_with_file(env: &TestEnv) -> (StateStore, PathBuf) {
        let mut store = env.open_store();
        let file = env.write_file("src/lib.rs", "fn main() {}\n");
        assert!(store.add_file(&file, "fn main() {}\n"));
        (store, file)
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path_for(Path::new("/d/memory/code_map.json")),
            PathBuf::from("/d/memory/code_map.json.bak")
        );
    }

    #[test]
    fn test_fresh_store_is_empty() {
        let env = TestEnv::new();
        let store = env.open_store();
        assert!(store.is_empty());
        assert!(!store.primary_path().exists());
        assert!(!store.backup_path().exists());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let env = TestEnv::new();
        let (mut store, _) = store_with_file(&env);
        let other = env.write_file("b.py", "x = 1\n");
        assert!(store.add_file(&other, "x = 1\n"));
        let in_memory = store.map().clone();

        assert_eq!(store.load(), in_memory);

        let reopened = env.open_store();
        assert_eq!(reopened.map(), &in_memory);
    }

    #[test]
    fn test_add_file_records_metadata() {
        let env = TestEnv::new();
        let (store, file) = store_with_file(&env);

        let record = store.get(&file).unwrap();
        assert_eq!(record.size, 13);
        assert!(record.functions.is_empty());
        assert!(record.classes.is_empty());
        assert!(record.variables.is_empty());

        let key = file.canonicalize().unwrap();
        assert!(store.files().contains_key(&key));
    }

    #[test]
    fn test_add_file_keys_by_resolved_path() {
        let env = TestEnv::new();
        let (mut store, file) = store_with_file(&env);
        let dotted = env.path().join("src/../src/./lib.rs");
        assert!(store.add_file(&dotted, "fn main() { }\n"));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&file).unwrap().size, 14);
    }

    #[test]
    fn test_add_missing_file_fails() {
        let env = TestEnv::new();
        let mut store = env.open_store();
        assert!(!store.add_file(&env.path().join("ghost.rs"), "x"));
        assert!(store.is_empty());
        assert!(!store.primary_path().exists());
    }

    #[test]
    fn test_add_directory_fails() {
        let env = TestEnv::new();
        let mut store = env.open_store();
        assert!(!store.add_file(env.path(), ""));
    }

    #[test]
    fn test_first_save_has_no_backup() {
        let env = TestEnv::new();
        let (store, _) = store_with_file(&env);
        assert!(store.primary_path().exists());
        assert!(!store.backup_path().exists());
    }

    #[test]
    fn test_backup_is_previous_generation() {
        let env = TestEnv::new();
        let (mut store, _) = store_with_file(&env);
        let generation_one = fs::read(store.primary_path()).unwrap();

        let other = env.write_file("c.rs", "struct C;\n");
        assert!(store.add_file(&other, "struct C;\n"));

        assert_eq!(fs::read(store.backup_path()).unwrap(), generation_one);
        let generation_two = fs::read(store.primary_path()).unwrap();
        assert_ne!(generation_two, generation_one);

        assert!(store.save());
        assert_eq!(fs::read(store.backup_path()).unwrap(), generation_two);
    }

    #[test]
    fn test_corrupt_primary_restored_from_backup() {
        let env = TestEnv::new();
        let (mut store, first) = store_with_file(&env);
        let other = env.write_file("d.rs", "const D: u8 = 1;\n");
        assert!(store.add_file(&other, "const D: u8 = 1;\n"));

        let backup_text = fs::read_to_string(store.backup_path()).unwrap();
        let backup_map: StateMap = serde_json::from_str(&backup_text).unwrap();
        fs::write(store.primary_path(), "{\"files\": {\"trunc").unwrap();

        let recovered = env.open_store();
        assert_eq!(recovered.map(), &backup_map);
        assert!(recovered.get(&first).is_some());
        assert!(recovered.get(&other).is_none());

        // Primary was rewritten from the backup content.
        let healed: StateMap =
            serde_json::from_str(&fs::read_to_string(store.primary_path()).unwrap()).unwrap();
        assert_eq!(healed, backup_map);
    }

    #[test]
    fn test_missing_primary_restored_from_backup() {
        let env = TestEnv::new();
        let (mut store, _) = store_with_file(&env);
        assert!(store.save());
        fs::remove_file(store.primary_path()).unwrap();

        let recovered = env.open_store();
        assert_eq!(recovered.len(), 1);
        assert!(store.primary_path().exists());
    }

    #[test]
    fn test_double_corruption_yields_empty_map() {
        let env = TestEnv::new();
        let (mut store, _) = store_with_file(&env);
        assert!(store.save());
        fs::write(store.primary_path(), "garbage").unwrap();
        fs::write(store.backup_path(), "more garbage").unwrap();

        let recovered = env.open_store();
        assert!(recovered.is_empty());
    }

    #[test]
    fn test_failed_save_leaves_disk_intact() {
        let env = TestEnv::new();
        let (mut store, file) = store_with_file(&env);
        let before = fs::read(store.primary_path()).unwrap();
        let stamped = store.map().last_updated;

        // A directory squatting on the backup path makes the backup step fail.
        fs::create_dir_all(store.backup_path().join("blocker")).unwrap();

        let other = env.write_file("e.rs", "x");
        assert!(!store.add_file(&other, "x"));
        assert_eq!(fs::read(store.primary_path()).unwrap(), before);
        assert!(store.get(&other).is_none());
        assert!(store.get(&file).is_some());

        assert!(!store.save());
        assert_eq!(store.map().last_updated, stamped);
    }

    #[test]
    fn test_remove_file() {
        let env = TestEnv::new();
        let (mut store, file) = store_with_file(&env);
        assert!(store.remove_file(&file));
        assert!(!store.remove_file(&file));
        assert!(env.open_store().is_empty());
    }

    #[test]
    fn test_persisted_schema() {
        let env = TestEnv::new();
        let (store, file) = store_with_file(&env);
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.primary_path()).unwrap()).unwrap();

        assert!(value["last_updated"].is_string());
        let key = file.canonicalize().unwrap().to_string_lossy().to_string();
        let entry = &value["files"][key.as_str()];
        assert!(entry["last_modified"].is_string());
        assert_eq!(entry["size"], 13);
        assert_eq!(entry["functions"], serde_json::json!([]));
        assert_eq!(entry["classes"], serde_json::json!([]));
        assert_eq!(entry["variables"], serde_json::json!([]));
    }

    struct FnNames;

    impl SymbolExtractor for FnNames {
        fn extract(&self, _path: &Path, content: &str) -> Symbols {
            let functions = content
                .lines()
                .enumerate()
                .filter_map(|(i, line)| {
                    let rest = line.trim_start().strip_prefix("fn ")?;
                    let name = rest.split(['(', '<']).next()?.trim();
                    Some(Symbol {
                        name: name.to_string(),
                        line: i + 1,
                    })
                })
                .collect();
            Symbols {
                functions,
                ..Symbols::default()
            }
        }
    }

    #[test]
    fn test_custom_extractor() {
        let env = TestEnv::new();
        let mut store = env.open_store().with_extractor(Box::new(FnNames));
        let content = "use x;\nfn alpha() {}\n\nfn beta<T>() {}\n";
        let file = env.write_file("f.rs", content);
        assert!(store.add_file(&file, content));

        let record = store.get(&file).unwrap();
        let names: Vec<_> = record.functions.iter().map(|s| (s.name.as_str(), s.line)).collect();
        assert_eq!(names, vec![("alpha", 2), ("beta", 4)]);
    }
}
