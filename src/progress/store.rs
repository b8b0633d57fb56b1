//! Progress directory access

use super::atomic::write_atomic;
use super::{ProgressError, ProgressRecord};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Maximum allowed progress file size (10 MB) to prevent memory exhaustion
pub const MAX_PROGRESS_FILE_SIZE: u64 = 10 * 1024 * 1024;

const FILE_PREFIX: &str = "students_range_chunk_";
const FILE_SUFFIX: &str = "_progress.json";

/// One JSON progress file per chunk inside a directory
#[derive(Debug, Clone)]
pub struct ProgressStore {
    dir: PathBuf,
}

impl ProgressStore {
    /// Store rooted at `dir` (created lazily on first save)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Progress directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds the record of `chunk_id`
    pub fn path_for(&self, chunk_id: usize) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{chunk_id}{FILE_SUFFIX}"))
    }

    /// Load the record of `chunk_id`, `None` if it was never saved
    pub fn load(&self, chunk_id: usize) -> Result<Option<ProgressRecord>, ProgressError> {
        let path = self.path_for(chunk_id);
        if !path.exists() {
            return Ok(None);
        }
        read_record(&path).map(Some)
    }

    /// Atomically persist `record`
    pub fn save(&self, record: &ProgressRecord) -> Result<(), ProgressError> {
        let path = self.path_for(record.chunk_id());
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| ProgressError::Serialization(e.to_string()))?;

        write_atomic(&path, &json).map_err(|e| {
            ProgressError::Io(format!("Failed to write {}: {e}", path.display()))
        })?;

        debug!(
            chunk_id = record.chunk_id(),
            current = record.current(),
            failed = record.failed().len(),
            status = %record.status(),
            "Progress saved"
        );
        Ok(())
    }

    /// Reset the record of `chunk_id` to pending. Absent records stay absent;
    /// unreadable ones are removed so the chunk starts fresh.
    pub fn reset(&self, chunk_id: usize) -> Result<Option<ProgressRecord>, ProgressError> {
        let path = self.path_for(chunk_id);
        if !path.exists() {
            return Ok(None);
        }

        match read_record(&path) {
            Ok(mut record) => {
                record.reset();
                self.save(&record)?;
                info!(chunk_id, "Progress reset");
                Ok(Some(record))
            }
            Err(e) => {
                warn!(chunk_id, error = %e, "Removing unreadable progress file on reset");
                std::fs::remove_file(&path).map_err(|e| ProgressError::Io(e.to_string()))?;
                Ok(None)
            }
        }
    }

    /// Every readable record in the directory, sorted by chunk id.
    ///
    /// Never writes. A missing directory yields no records; unreadable files
    /// are skipped with a warning.
    pub fn list_all(&self) -> Result<Vec<ProgressRecord>, ProgressError> {
        let mut records = Vec::new();

        for (chunk_id, path) in self.chunk_files()? {
            match read_record(&path) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    chunk_id,
                    path = %path.display(),
                    error = %e,
                    "Skipping unreadable progress file"
                ),
            }
        }

        records.sort_by_key(|record| record.chunk_id());
        Ok(records)
    }

    /// Delete every chunk progress file, returning how many were removed
    pub fn remove_all(&self) -> Result<usize, ProgressError> {
        let files = self.chunk_files()?;
        for (_, path) in &files {
            std::fs::remove_file(path).map_err(|e| {
                ProgressError::Io(format!("Failed to remove {}: {e}", path.display()))
            })?;
        }
        info!(removed = files.len(), dir = %self.dir.display(), "Progress files removed");
        Ok(files.len())
    }

    fn chunk_files(&self) -> Result<Vec<(usize, PathBuf)>, ProgressError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ProgressError::Io(e.to_string())),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ProgressError::Io(e.to_string()))?;
            let name = entry.file_name();
            if let Some(chunk_id) = name.to_str().and_then(parse_chunk_id) {
                files.push((chunk_id, entry.path()));
            }
        }
        files.sort();
        Ok(files)
    }
}

fn parse_chunk_id(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse()
        .ok()
}

fn read_record(path: &Path) -> Result<ProgressRecord, ProgressError> {
    let metadata = std::fs::metadata(path).map_err(|e| ProgressError::Io(e.to_string()))?;
    if metadata.len() > MAX_PROGRESS_FILE_SIZE {
        return Err(ProgressError::FileTooLarge {
            size: metadata.len(),
            max: MAX_PROGRESS_FILE_SIZE,
        });
    }

    let contents = std::fs::read_to_string(path).map_err(|e| ProgressError::Io(e.to_string()))?;
    let record: ProgressRecord = serde_json::from_str(&contents)
        .map_err(|e| ProgressError::Deserialization(e.to_string()))?;
    record.validate()?;
    Ok(record)
}
