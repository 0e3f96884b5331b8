//! Crash-safe file replacement.

use std::io::Write;
use std::path::Path;

use crate::errors::Result;

/// Replace `path` with `body`.
///
/// The bytes go to a temporary file in the same directory, are flushed to
/// disk, and only then renamed over `path`. A crash leaves either the old
/// document or the new one, never a truncated file.
pub fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".sift-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(body)?;
    tmp.as_file().sync_all()?;
    let _ = tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
