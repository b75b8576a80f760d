//! Atomic JSON document persistence shared by the two registries
//!
//! Both registry files are single JSON arrays rewritten whole on every
//! mutation. Writes go to a temp file in the same directory, are synced,
//! and then renamed over the target so readers observe either the old or
//! the new document, never a torn one.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Read a JSON array document. A missing file is an empty set; a file
/// that exists but does not parse is [`Error::RegistryCorrupt`].
pub(crate) fn load_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&data)
        .map_err(|e| Error::RegistryCorrupt(format!("{}: {}", path.display(), e)))
}

/// Atomically replace `path` with the pretty-printed JSON of `entries`.
pub(crate) fn store_array<T: Serialize>(path: &Path, entries: &[T]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Config(format!("registry path has no parent: {}", path.display())))?;
    fs::create_dir_all(parent)?;

    let data = serde_json::to_vec_pretty(entries)?;

    let tmp_path = path.with_extension("json.tmp");
    {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o644);

        let mut tmp = options.open(&tmp_path)?;
        tmp.write_all(&data)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    // Best effort: make the rename itself durable
    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}
