// src/state/mod.rs

//! Durable checkpoint state.
//!
//! - [`store`] owns the checkpoint map and its TOML file.
//! - [`atomic_write`] is the write-to-temp-then-rename primitive shared with
//!   the health marker, so a crash mid-write never leaves a torn file.

pub mod store;

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

pub use store::CheckpointStore;

/// Atomically write `data` to `path` using a tempfile in the same directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
