//! Crash-safe whole-file replacement.

use crate::error::StoreResult;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes `data` to `path` so that readers see either the old or the new
/// contents, never a mix.
///
/// 1. Write to a sibling temporary file
/// 2. Sync the temporary file
/// 3. Rename over the target
/// 4. Fsync the parent directory
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_path_for(path);
    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    if let Some(parent) = parent {
        sync_directory(parent)?;
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> StoreResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> StoreResult<()> {
    // NTFS journals metadata; directory handles cannot be fsynced
    Ok(())
}
