//! Crash-safe file replacement.

use std::io::Write;
use std::path::Path;

/// Replace `path` with `contents` so readers see either the old or the new
/// file, never a torn one.
///
/// The bytes go to a temporary file in the same directory, are synced, and
/// the temporary file is renamed over `path`. The parent directory is synced
/// afterwards so the rename itself survives a crash.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent_dir)?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)?;
    temp_file.write_all(contents)?;

    // Flush buffer to OS and sync to disk before the rename
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;

    temp_file.persist(path).map_err(|e| e.error)?;

    if let Ok(dir) = std::fs::File::open(parent_dir) {
        let _ = dir.sync_all();
    }

    Ok(())
}
