//! Persistent record of tiles discarded by the no-data filter.
//!
//! One image path per line, UTF-8, rewritten as a whole at the end of each
//! fresh filter pass.

use crate::error::{Result, TilingError};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

pub const CACHE_DIR: &str = "flag";
pub const CACHE_FILE: &str = ".nodata_checked";

pub struct NoDataCache {
    path: PathBuf,
}

impl NoDataCache {
    /// Cache for a run whose working directory is `out_dir`.
    pub fn in_dir(out_dir: &Path) -> Self {
        Self {
            path: out_dir.join(CACHE_DIR).join(CACHE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Discarded image paths from a previous run. `Ok(None)` when there is
    /// no cache; `CacheCorrupt` when it exists but cannot be read.
    pub fn load(&self) -> Result<Option<Vec<PathBuf>>> {
        if !self.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path).map_err(|e| self.corrupt(e))?;
        let text = String::from_utf8(bytes).map_err(|e| self.corrupt(e))?;
        let entries: Vec<PathBuf> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect();
        debug!("Loaded {} cached discards from {}", entries.len(), self.path.display());
        Ok(Some(entries))
    }

    /// Like `load`, but an unreadable cache is reported and treated as absent.
    pub fn load_or_miss(&self) -> Option<Vec<PathBuf>> {
        match self.load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("{}; recomputing no-data decisions", e);
                None
            }
        }
    }

    /// Replace the cache content with `discarded`.
    pub fn store(&self, discarded: &[PathBuf]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut content = String::new();
        for p in discarded {
            content.push_str(&p.display().to_string());
            content.push('\n');
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Stored {} discards in {}", discarded.len(), self.path.display());
        Ok(())
    }

    fn corrupt(&self, reason: impl ToString) -> TilingError {
        TilingError::CacheCorrupt {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}
