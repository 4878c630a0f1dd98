//! Filesystem utilities for trestle.

use std::io::Write;
use std::path::Path;

use crate::error::UtilError;

/// Create a directory and all parent directories if they do not exist.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), UtilError> {
    std::fs::create_dir_all(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Write `data` to `path` with write-then-rename semantics.
///
/// The data is written to a temporary sibling file which is then renamed
/// over the destination, so a crash mid-write never leaves a truncated
/// file at `path`. Parent directories are created as needed.
///
/// # Errors
/// Returns an error if the temporary file cannot be written or the rename
/// fails.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), UtilError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let tmp = path.with_extension("tmp");
    let io_err = |source| UtilError::Io {
        path: tmp.display().to_string(),
        source,
    };

    let mut file = std::fs::File::create(&tmp).map_err(io_err)?;
    file.write_all(data).map_err(io_err)?;
    // Flush to disk before the rename makes the new content visible.
    file.sync_all().map_err(io_err)?;
    drop(file);

    std::fs::rename(&tmp, path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Remove a file. No error if the file is absent.
///
/// # Errors
/// Returns an error if the file exists but cannot be removed.
pub fn remove_file_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn ensure_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b").join("c");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn ensure_dir_existing_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        ensure_dir(tmp.path()).unwrap(); // already exists
    }

    #[test]
    fn write_atomic_creates_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("state.json");
        write_atomic(&dest, b"payload").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn write_atomic_creates_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("sub").join("dir").join("state.json");
        write_atomic(&dest, b"payload").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn write_atomic_replaces_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("state.json");
        fs::write(&dest, b"old").unwrap();
        write_atomic(&dest, b"new").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn write_atomic_leaves_no_temp_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("state.json");
        write_atomic(&dest, b"payload").unwrap();
        assert!(!dest.with_extension("tmp").exists());
    }

    #[test]
    fn remove_file_if_exists_removes() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("out.bin");
        fs::write(&file, b"x").unwrap();
        remove_file_if_exists(&file).unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn remove_file_if_exists_absent_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        remove_file_if_exists(&tmp.path().join("nonexistent")).unwrap();
    }
}
