//! Data directory preparation before the synchronizer starts.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use candela::{CandelaError, LOCK_FILE_NAME, SyncConfig};
use candela_core::CsvStore;

/// Create `data_dir` (and parents) if it does not exist.
///
/// # Errors
/// Returns `Storage` when the directory cannot be created.
pub fn prepare_data_dir(data_dir: &Path) -> Result<(), CandelaError> {
    fs::create_dir_all(data_dir)
        .map_err(|e| CandelaError::storage(data_dir.display().to_string(), e))
}

/// Remove regular files in `data_dir` that belong to no configured series.
///
/// Configured series files, their in-flight `.tmp` siblings and the lock file are
/// kept; subdirectories are never touched. Returns the removed paths.
///
/// # Errors
/// Returns `Storage` when the directory cannot be read or a file cannot be removed.
pub fn cleanup(data_dir: &Path, cfg: &SyncConfig) -> Result<Vec<PathBuf>, CandelaError> {
    let dir_err = |e: std::io::Error| CandelaError::storage(data_dir.display().to_string(), e);

    let mut keep: HashSet<String> = HashSet::from([LOCK_FILE_NAME.to_string()]);
    for key in cfg.series_keys() {
        keep.insert(CsvStore::temp_file_name(&key));
        keep.insert(key.file_name());
    }

    let mut removed = Vec::new();
    for entry in fs::read_dir(data_dir).map_err(dir_err)? {
        let entry = entry.map_err(dir_err)?;
        if !entry.file_type().map_err(dir_err)?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if keep.contains(&name) {
            continue;
        }
        let path = entry.path();
        fs::remove_file(&path).map_err(|e| CandelaError::storage(name.clone(), e))?;
        tracing::info!(file = %name, "removed file outside the configured series");
        removed.push(path);
    }
    removed.sort();
    Ok(removed)
}
