//! Atomic file publication helpers.
//!
//! Readers must never see a half-written manifest or catalog: content is
//! written to a hidden temporary sibling, flushed, then moved into place.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::util::IoResultExt;
use crate::error::Result;

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .at_path(path)?;
    file.write_all(bytes).at_path(path)?;
    file.sync_all().at_path(path)
}

/// Flush a directory entry so a rename inside it survives a crash
pub fn sync_dir(dir: &Path) -> Result<()> {
    // Directories cannot be opened for syncing on every platform
    let synced = File::open(dir).and_then(|handle| {
        handle.sync_all().or_else(|e| match e.kind() {
            io::ErrorKind::PermissionDenied | io::ErrorKind::Unsupported => Ok(()),
            _ => Err(e),
        })
    });
    synced.at_path(dir)
}

/// Serialize `value` as pretty JSON and atomically replace `path`
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = temp_sibling(path);
    write_synced(&tmp, &bytes)?;
    fs::rename(&tmp, path).at_path(path)?;
    if let Some(parent) = path.parent() {
        sync_dir(parent)?;
    }
    Ok(())
}

/// Serialize `value` as pretty JSON and publish it at `path` only if nothing
/// is there yet
///
/// Returns `Ok(false)` when `path` already exists; the existing file is left
/// untouched.
pub fn publish_json_no_clobber<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = temp_sibling(path);
    write_synced(&tmp, &bytes)?;

    let linked = fs::hard_link(&tmp, path);
    fs::remove_file(&tmp).at_path(&tmp)?;
    match linked {
        Ok(()) => {
            if let Some(parent) = path.parent() {
                sync_dir(parent)?;
            }
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e).at_path(path),
    }
}

/// Read and deserialize a JSON file
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).at_path(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_clobber_keeps_first_writer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("00000000000000000001.json");

        assert!(publish_json_no_clobber(&path, &"first").expect("publish"));
        assert!(!publish_json_no_clobber(&path, &"second").expect("publish"));

        let stored: String = read_json(&path).expect("read");
        assert_eq!(stored, "first");
        let leftovers = fs::read_dir(dir.path()).expect("read_dir").count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn atomic_write_replaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("_catalog.json");
        write_json_atomic(&path, &vec![1, 2]).expect("write");
        write_json_atomic(&path, &vec![3]).expect("write");
        let stored: Vec<i32> = read_json(&path).expect("read");
        assert_eq!(stored, vec![3]);
    }
}
