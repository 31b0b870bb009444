//! File-backed store for the last successfully mirrored post id.
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Persists the cursor as a decimal string in a single text file.
///
/// Reads never fail: an absent, empty, or garbled file is treated as "no
/// cursor yet" so a bad state can only cause re-mirroring, never a crash.
/// Writes go through a temp file and rename so an interrupted write never
/// leaves a corrupt value readable afterward.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the persisted cursor, or `None` if nothing usable is stored.
    pub fn read(&self) -> Option<u64> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no cursor file yet; mirroring from scratch");
                return None;
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "cursor file unreadable; treating as absent");
                return None;
            }
        };
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.parse::<u64>() {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "cursor file is not a post id; treating as absent");
                None
            }
        }
    }

    /// Persist `id`, fully overwriting any prior value.
    pub fn write(&self, id: u64) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, id.to_string())
            .with_context(|| format!("failed to write cursor temp file {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to move cursor into place at {}", self.path.display()))?;
        Ok(())
    }
}
