// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Atomic file replacement.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::ast::content_hash;
use crate::error::CommitError;
#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

/// Replace `path` with `text` if its content still hashes to `expected_hash`.
///
/// The new content is written to a sibling temporary file, synced, and
/// renamed over the target. Readers see either the old file or the new one.
/// The on-disk hash is checked right before the rename; a mismatch leaves the
/// file untouched and the temporary file is removed.
pub fn commit_atomic(path: &Path, expected_hash: &str, text: &str) -> Result<(), CommitError> {
    let start = Instant::now();

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(text.as_bytes())?;
    tmp.as_file().sync_all()?;
    if let Ok(meta) = std::fs::metadata(path) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }

    let current = std::fs::read(path)?;
    if content_hash(&current) != expected_hash {
        return Err(CommitError::ChangedOnDisk(path.to_path_buf()));
    }

    tmp.persist(path).map_err(|e| CommitError::from(e.error))?;
    debug!(path = %path.display(), bytes = text.len(), "Committed");

    #[cfg(feature = "telemetry")]
    GLOBAL_METRICS.record_operation("commit.write", start.elapsed());
    #[cfg(not(feature = "telemetry"))]
    let _ = start;

    Ok(())
}

/// [`commit_atomic`] on the blocking pool.
pub async fn commit(path: PathBuf, expected_hash: String, text: String) -> Result<(), CommitError> {
    tokio::task::spawn_blocking(move || commit_atomic(&path, &expected_hash, &text))
        .await
        .map_err(|e| CommitError::IoError(format!("commit task failed: {}", e)))?
}
