//! Low-level file helpers shared by the access gate, state store and guardian.
//!
//! All JSON documents are written through [`write_json_atomic`]: the content
//! goes to a temporary file in the destination directory, is synced, and is
//! then renamed over the destination. A crash mid-write leaves either the old
//! file or the new one, never a truncated mix.

use crate::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// Creates the parent directory if it doesn't exist.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_bytes_atomic(path, &json)
}

/// Atomically replace `path` with `bytes`.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// Read and parse a JSON document.
///
/// # Returns
/// * `Ok(Some(value))` if the file exists and parsed
/// * `Ok(None)` if the file doesn't exist
/// * `Err(e)` on any other IO error or on malformed JSON
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Resolve `path` to an absolute, normalized path.
///
/// The longest leading run of components that exists is canonicalized by the
/// OS, so symlinks are followed before any `..` after them is applied. The
/// remaining components do not exist yet and are folded lexically onto it.
pub fn resolve_path(path: &Path) -> Result<PathBuf> {
    let abs = std::path::absolute(path)?;
    let components: Vec<Component> = abs.components().collect();

    for split in (1..=components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        if let Ok(canon) = prefix.canonicalize() {
            return Ok(fold_onto(canon, &components[split..]));
        }
    }
    Ok(fold_onto(PathBuf::new(), &components))
}

fn fold_onto(mut base: PathBuf, tail: &[Component]) -> PathBuf {
    for component in tail {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                base.pop();
            }
            other => base.push(other.as_os_str()),
        }
    }
    base
}

/// Set Unix permission bits on `path`. No-op on other platforms.
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/doc.json");
        let doc = Doc {
            name: "x".to_string(),
            count: 3,
        };

        write_json_atomic(&path, &doc).unwrap();

        let back: Option<Doc> = read_json(&path).unwrap();
        assert_eq!(back, Some(doc));
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        write_bytes_atomic(&path, b"{}").unwrap();
        write_bytes_atomic(&path, b"[]").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("doc.json")]);
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let back: Option<Doc> = read_json(&dir.path().join("nope.json")).unwrap();
        assert!(back.is_none());
    }

    #[test]
    fn test_read_malformed_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let back: Result<Option<Doc>> = read_json(&path);
        assert!(matches!(back, Err(crate::Error::Json(_))));
    }

    #[test]
    fn test_resolve_path_folds_dots() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().canonicalize().unwrap();
        fs::create_dir(base.join("a")).unwrap();

        let resolved = resolve_path(&base.join("a/./b/../c")).unwrap();
        assert_eq!(resolved, base.join("a/c"));
    }

    #[test]
    fn test_resolve_path_missing_tail() {
        let dir = TempDir::new().unwrap();
        let resolved = resolve_path(&dir.path().join("x/y/z.txt")).unwrap();
        assert_eq!(
            resolved,
            dir.path().canonicalize().unwrap().join("x/y/z.txt")
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_resolve_path_follows_symlink_before_dotdot() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().canonicalize().unwrap();
        fs::create_dir_all(base.join("allowed")).unwrap();
        fs::create_dir_all(base.join("elsewhere/deep")).unwrap();
        std::os::unix::fs::symlink(base.join("elsewhere/deep"), base.join("allowed/link")).unwrap();

        let existing = resolve_path(&base.join("allowed/link/../")).unwrap();
        assert_eq!(existing, base.join("elsewhere"));

        let missing = resolve_path(&base.join("allowed/link/../secret.txt")).unwrap();
        assert_eq!(missing, base.join("elsewhere/secret.txt"));
    }

    #[test]
    fn test_resolve_path_dotdot_past_missing_dir() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let resolved = resolve_path(&base.join("ghost/../x.txt")).unwrap();
        assert_eq!(resolved, base.join("x.txt"));
    }

    #[test]
    fn test_resolve_path_relative_is_absolute() {
        let resolved = resolve_path(Path::new("some/relative")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("some/relative"));
    }

    #[test]
    #[cfg(unix)]
    fn test_set_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secret");
        fs::write(&path, "x").unwrap();
        set_mode(&path, 0o600).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
