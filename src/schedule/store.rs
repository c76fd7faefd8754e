use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use log::{debug, error};
use serde::{de::DeserializeOwned, Serialize};

use super::Block;

/// The whole schedule, persisted as one pretty printed json array.
/// Nothing is cached: every operation reads the document and every
/// mutation rewrites it.
#[derive(Debug, Clone)]
pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every block. A missing or unreadable document is an empty schedule.
    pub fn load(&self) -> Vec<Block> {
        match read_json(&self.path) {
            Ok(Some(blocks)) => blocks,
            Ok(None) => {
                debug!("no schedule at {}, starting empty", self.path.display());
                Vec::new()
            }
            Err(err) => {
                error!("failed to read the schedule, treating it as empty: {:?}", err);
                Vec::new()
            }
        }
    }

    /// Rewrites the whole document.
    pub fn save(&self, blocks: &[Block]) -> Result<(), anyhow::Error> {
        write_json(&self.path, blocks)
    }
}

/// Reads a json document. `Ok(None)` means the file does not exist yet.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, anyhow::Error> {
    match fs::read(path) {
        Ok(data) => Ok(Some(serde_json::from_slice(&data).with_context(|| {
            format!("{} is not a valid document", path.display())
        })?)),
        // The only case where we can accept an error is when the file does not exists
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Writes a json document next to its destination, then moves it in place
/// so a crash never leaves a truncated file behind.
pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), anyhow::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let data = serde_json::to_vec_pretty(value).context("failed to serialize the document")?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, data).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;

    Ok(())
}
