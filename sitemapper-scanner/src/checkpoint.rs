//! Durable snapshots of crawl progress, one JSON file per site fingerprint.

use crate::error::Result;
use crate::layout::{PageRecord, TraversalKey};
use crate::state::{CrawlState, SiteTree};
use crate::stats::StatsSnapshot;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static SAVE_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub pages: Vec<PageRecord>,
    /// Ordered list of traversal keys already dispatched.
    pub visited: Vec<TraversalKey>,
    pub stats: StatsSnapshot,
    pub site_tree: SiteTree,
}

impl Checkpoint {
    pub fn capture(state: &CrawlState, stats: StatsSnapshot) -> Self {
        Self {
            pages: state.pages.clone(),
            visited: state.visited.iter().copied().collect(),
            stats,
            site_tree: state.site_tree.clone(),
        }
    }

    /// Split back into live state and the statistics to restore.
    pub fn into_state(self) -> (CrawlState, StatsSnapshot) {
        let state = CrawlState {
            pages: self.pages,
            visited: self.visited.into_iter().collect(),
            site_tree: self.site_tree,
        };
        (state, self.stats)
    }
}

/// Location of the checkpoint file for one site.
#[derive(Debug, Clone)]
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/state_<fingerprint>.json`
    pub fn for_site(dir: &Path, site_fingerprint: &str) -> Self {
        Self::new(dir.join(format!("state_{}.json", site_fingerprint)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// `Ok(None)` when no checkpoint has been written yet.
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let checkpoint = serde_json::from_str(&content)?;
        Ok(Some(checkpoint))
    }

    /// Replace the previous checkpoint. The snapshot is written to a sibling
    /// temporary file first and then renamed into place. Every save uses its
    /// own temporary file, so concurrent saves never share one.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let seq = SAVE_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .path
            .with_extension(format!("json.{}.{}.tmp", process::id(), seq));
        let content = serde_json::to_string_pretty(checkpoint)?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;

        debug!(
            "Checkpoint written to {} ({} pages)",
            self.path.display(),
            checkpoint.pages.len()
        );
        Ok(())
    }

    pub fn remove(&self) -> Result<bool> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
