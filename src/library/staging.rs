use crate::error::{Result, PdfChatError};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const BATCH_PREFIX: &str = "batch-";

/// Isolated copy of one ingestion attempt's PDFs.
///
/// The directory lives as long as the value: dropping a `StagingBatch`
/// (normal return, `?` propagation, panic unwind, or a cancelled future)
/// removes it, and removes the staging root too when nothing else is in it.
#[derive(Debug)]
pub struct StagingBatch {
    dir: Option<TempDir>,
    root: PathBuf,
    files: Vec<String>,
}

impl StagingBatch {
    /// Copy `files` (names inside `source_dir`) into a fresh directory under
    /// `staging_root`. The first failed copy aborts the whole batch.
    pub fn stage<'a>(
        staging_root: &Path,
        source_dir: &Path,
        files: impl IntoIterator<Item = &'a String>,
    ) -> Result<Self> {
        let dir = std::fs::create_dir_all(staging_root)
            .and_then(|()| tempfile::Builder::new().prefix(BATCH_PREFIX).tempdir_in(staging_root))
            .map_err(|e| {
                PdfChatError::Staging(format!(
                    "could not create staging directory in {}: {}",
                    staging_root.display(),
                    e
                ))
            })?;

        let mut batch = Self {
            dir: Some(dir),
            root: staging_root.to_path_buf(),
            files: Vec::new(),
        };

        for name in files {
            let from = source_dir.join(name);
            let to = batch.path().join(name);
            std::fs::copy(&from, &to).map_err(|e| {
                PdfChatError::Staging(format!("could not copy {}: {}", from.display(), e))
            })?;
            batch.files.push(name.clone());
        }

        log::debug!("Staged {} file(s) in {}", batch.files.len(), batch.path().display());
        Ok(batch)
    }

    /// Directory holding the staged copies
    pub fn path(&self) -> &Path {
        self.dir.as_ref().map(|d| d.path()).unwrap_or(self.root.as_path())
    }

    /// Names of the staged files, in staging order
    pub fn files(&self) -> &[String] {
        &self.files
    }
}

impl Drop for StagingBatch {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                log::warn!("Could not remove staging directory {}: {}", path.display(), e);
            }
        }
        // Only succeeds when the root is empty
        let _ = std::fs::remove_dir(&self.root);
    }
}

/// Remove batch directories left behind by a process that died mid-ingestion.
/// Returns how many were removed.
pub fn sweep_stale(staging_root: &Path) -> Result<usize> {
    if !staging_root.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(staging_root)? {
        let entry = entry?;
        let is_batch = entry.file_name().to_string_lossy().starts_with(BATCH_PREFIX);
        if is_batch && entry.file_type()?.is_dir() {
            match std::fs::remove_dir_all(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    let path = entry.path();
                    log::warn!("Could not remove stale staging dir {}: {}", path.display(), e)
                }
            }
        }
    }

    if removed > 0 {
        log::info!("Cleared {} stale staging batch(es) in {}", removed, staging_root.display());
    }
    let _ = std::fs::remove_dir(staging_root);
    Ok(removed)
}
