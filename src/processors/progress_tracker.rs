use crate::error::Result;
use crate::models::IngestionProgress;
use crate::utils::constants::PROGRESS_FLUSH_THRESHOLD;
use crate::utils::write_atomic;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

type ProgressMap = BTreeMap<String, IngestionProgress>;

/// Buffered per-file progress, persisted as JSON for diagnostics.
///
/// Entries are held in memory and written out once the buffer reaches the
/// flush threshold, or straight away for a file that produced no records.
/// Call [`ProgressTracker::flush`] at the end of a run for the remainder.
pub struct ProgressTracker {
    path: PathBuf,
    threshold: usize,
    pending: Mutex<ProgressMap>,
}

impl ProgressTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            threshold: PROGRESS_FLUSH_THRESHOLD,
            pending: Mutex::new(ProgressMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mark_processed(&self, file: &str, count: usize) -> Result<()> {
        let mut pending = self.lock();
        pending.insert(file.to_string(), IngestionProgress::now(count));

        if count == 0 || pending.len() >= self.threshold {
            self.write_merged(&mut pending)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        let mut pending = self.lock();
        if pending.is_empty() {
            return Ok(());
        }
        self.write_merged(&mut pending)
    }

    pub fn pending_len(&self) -> usize {
        self.lock().len()
    }

    /// Read the persisted progress. A missing or corrupt file reads as empty.
    pub fn load(&self) -> ProgressMap {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return ProgressMap::new(),
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Ignoring corrupt progress file");
            ProgressMap::new()
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressMap> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Called with the buffer locked, so concurrent flushes never interleave
    // their read-merge-write.
    fn write_merged(&self, pending: &mut ProgressMap) -> Result<()> {
        let mut merged = self.load();
        let flushed = pending.len();
        merged.append(pending);

        let json = serde_json::to_vec_pretty(&merged)?;
        write_atomic(&self.path, &json)?;

        debug!(path = %self.path.display(), flushed, total = merged.len(), "Progress flushed");
        Ok(())
    }
}
