//! Atomically-persisted JSON cache files
//!
//! Each of a project's four cache files (config, log, recipe, result) is a JSON
//! document with a top-level `__type__` discriminator. Writes are atomic
//! (temp-file + rename within the same directory so the rename is atomic on every
//! platform) and land at file mode 0600 inside a directory created at mode 0700.
//! Reads verify the discriminator against what the caller expects before handing
//! back a deserialized value.

use crate::errors::{Result, WebinizerError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// A document persisted as one of a project's cache files.
///
/// Implementors carry their own `__type__` tag so [`read_cache_file`] can verify
/// it matches what the caller expected before trusting the rest of the payload.
pub trait CacheDocument: Serialize + DeserializeOwned {
    /// The `__type__` discriminator this document is persisted under.
    fn type_tag() -> &'static str;
}

fn to_io_err(path: &Path, source: std::io::Error) -> WebinizerError {
    WebinizerError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| to_io_err(parent, e))?;
        set_dir_mode(parent)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_dir_mode(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(0o700);
    fs::set_permissions(dir, perms).map_err(|e| to_io_err(dir, e))
}

#[cfg(not(unix))]
fn set_dir_mode(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_file_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, perms).map_err(|e| to_io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_mode(_path: &Path) -> Result<()> {
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("cache");
    match path.parent() {
        Some(parent) => parent.join(format!(".{name}.tmp")),
        None => PathBuf::from(format!(".{name}.tmp")),
    }
}

/// Read a cache document from `path`. Returns `Ok(None)` if the file does not
/// exist yet (a fresh project simply has no log/recipe/result history).
/// Fails if the file exists but its `__type__` does not match `T::type_tag()`.
pub fn read_cache_file<T: CacheDocument>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|e| to_io_err(path, e))?;
    let value: serde_json::Value = serde_json::from_str(&contents).map_err(|e| WebinizerError::Json {
        context: path.display().to_string(),
        source: e,
    })?;

    let found_tag = value
        .get("__type__")
        .and_then(|v| v.as_str())
        .unwrap_or("<missing>")
        .to_string();
    if found_tag != T::type_tag() {
        return Err(WebinizerError::CacheTypeMismatch {
            path: path.display().to_string(),
            expected: T::type_tag().to_string(),
            found: found_tag,
        });
    }

    let doc: T = serde_json::from_value(value).map_err(|e| WebinizerError::Json {
        context: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(doc))
}

/// Write a cache document to `path` atomically: serialize, write to a sibling
/// temp file in the same directory, then rename over the destination. The
/// parent directory is created (mode 0700) if missing, and the final file is
/// set to mode 0600.
pub fn write_cache_file<T: CacheDocument>(path: &Path, doc: &T) -> Result<()> {
    ensure_parent_dir(path)?;

    let mut value = serde_json::to_value(doc).map_err(|e| WebinizerError::Json {
        context: path.display().to_string(),
        source: e,
    })?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert(
            "__type__".to_string(),
            serde_json::Value::String(T::type_tag().to_string()),
        );
    }

    let json = serde_json::to_string_pretty(&value).map_err(|e| WebinizerError::Json {
        context: path.display().to_string(),
        source: e,
    })?;

    let temp_path = temp_path_for(path);
    fs::write(&temp_path, json.as_bytes()).map_err(|e| to_io_err(&temp_path, e))?;
    set_file_mode(&temp_path)?;
    fs::rename(&temp_path, path).map_err(|e| to_io_err(path, e))?;
    Ok(())
}

/// Remove a cache file if present. Used when a build clears the log/result/recipe
/// caches before it starts.
pub fn clear_cache_file(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).map_err(|e| to_io_err(path, e))?;
    }
    Ok(())
}

fn backup_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("cache");
    match path.parent() {
        Some(parent) => parent.join(format!("backup_{name}")),
        None => PathBuf::from(format!("backup_{name}")),
    }
}

/// Copy `path` to a sibling `backup_<name>` file. A no-op if `path` does not exist.
pub fn backup_cache_file(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let backup = backup_path_for(path);
    fs::copy(path, &backup).map_err(|e| to_io_err(&backup, e))?;
    Ok(())
}

/// Rename the sibling `backup_<name>` file back over `path`, restoring the last
/// backed-up version. A no-op if no backup exists.
pub fn restore_cache_file(path: &Path) -> Result<()> {
    let backup = backup_path_for(path);
    if !backup.exists() {
        return Ok(());
    }
    fs::rename(&backup, path).map_err(|e| to_io_err(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: i64,
    }

    impl CacheDocument for Sample {
        fn type_tag() -> &'static str {
            "Sample"
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct OtherDoc {
        value: i64,
    }

    impl CacheDocument for OtherDoc {
        fn type_tag() -> &'static str {
            "OtherDoc"
        }
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".webinizer").join("config.json");
        assert!(read_cache_file::<Sample>(&path).unwrap().is_none());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".webinizer").join("config.json");
        let doc = Sample { value: 7 };
        write_cache_file(&path, &doc).unwrap();
        let loaded = read_cache_file::<Sample>(&path).unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn write_sets_restrictive_permissions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".webinizer").join("config.json");
        write_cache_file(&path, &Sample { value: 1 }).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(file_mode, 0o600);
            let dir_mode = fs::metadata(path.parent().unwrap())
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(dir_mode, 0o700);
        }
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".webinizer").join("config.json");
        write_cache_file(&path, &OtherDoc { value: 1 }).unwrap();
        let err = read_cache_file::<Sample>(&path).unwrap_err();
        assert_eq!(err.kind(), "CACHE_TYPE_MISMATCH");
    }

    #[test]
    fn backup_and_restore_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".webinizer").join("config.json");
        write_cache_file(&path, &Sample { value: 1 }).unwrap();
        backup_cache_file(&path).unwrap();

        write_cache_file(&path, &Sample { value: 2 }).unwrap();
        assert_eq!(
            read_cache_file::<Sample>(&path).unwrap().unwrap(),
            Sample { value: 2 }
        );

        restore_cache_file(&path).unwrap();
        assert_eq!(
            read_cache_file::<Sample>(&path).unwrap().unwrap(),
            Sample { value: 1 }
        );
    }

    #[test]
    fn clear_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".webinizer").join("config.json");
        write_cache_file(&path, &Sample { value: 1 }).unwrap();
        clear_cache_file(&path).unwrap();
        assert!(read_cache_file::<Sample>(&path).unwrap().is_none());
    }
}
