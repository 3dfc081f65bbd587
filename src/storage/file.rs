//! Atomic JSON file persistence
//!
//! Every data file is replaced wholesale: the new content goes to a sibling
//! temporary file, is optionally fsynced, then renamed over the target.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// How data files are written
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// fsync the temporary file before the rename
    pub sync: bool,
    /// indent JSON output
    pub pretty: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            sync: true,
            pretty: true,
        }
    }
}

/// Write `bytes` to `path` via temp file and rename
pub fn write_atomic(path: &Path, bytes: &[u8], options: WriteOptions) -> Result<()> {
    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        if options.sync {
            file.sync_all()?;
        }
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Serialize `value` as JSON and write it atomically
pub fn write_json<T: Serialize>(path: &Path, value: &T, options: WriteOptions) -> Result<()> {
    let bytes = if options.pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };
    write_atomic(path, &bytes, options)
}

/// Read a JSON file, `Ok(None)` if it does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Remove a file, ignoring a missing one
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");

        write_json(&path, &vec![1, 2, 3], WriteOptions::default()).unwrap();
        let back: Option<Vec<i32>> = read_json(&path).unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
        assert!(!dir.path().join("doc.json.tmp").exists());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");

        let back: Option<Vec<i32>> = read_json(&path).unwrap();
        assert!(back.is_none());
        remove_if_exists(&path).unwrap();
    }
}
