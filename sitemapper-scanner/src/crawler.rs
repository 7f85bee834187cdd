use crate::cache::ResultCache;
use crate::checkpoint::{Checkpoint, CheckpointFile};
use crate::error::{Result, ScanError};
use crate::fingerprint::{fetch_fingerprint, site_fingerprint};
use crate::layout::{LayoutEntry, PageRecord, TraversalKey, parse_layouts};
use crate::state::{CrawlState, SiteNode, SiteTree};
use crate::stats::{CrawlStats, StatsSnapshot};
use crate::transport::Transport;
use futures::future::{BoxFuture, FutureExt, join_all};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(30);
const LAYOUTS_ENDPOINT: &str = "/api/jsonws/layout/get-layouts";

/// Called once per discovered page with the current counters and the page URL.
pub type ProgressCallback = Arc<dyn Fn(&StatsSnapshot, &str) + Send + Sync>;

/// The portal and site (group) being crawled.
#[derive(Debug, Clone)]
pub struct SiteTarget {
    pub base_url: String,
    pub group_id: String,
}

impl SiteTarget {
    pub fn new(base_url: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            group_id: group_id.into(),
        }
    }

    /// Like [`SiteTarget::new`], but rejects anything that is not an absolute
    /// http(s) URL or an empty group id.
    pub fn parse(base_url: &str, group_id: &str) -> Result<Self> {
        let parsed = Url::parse(base_url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ScanError::InvalidUrl(base_url.to_string()));
        }
        if group_id.trim().is_empty() {
            return Err(ScanError::Other("group id must not be empty".to_string()));
        }
        Ok(Self::new(base_url.trim_end_matches('/'), group_id.trim()))
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), LAYOUTS_ENDPOINT)
    }

    pub fn fingerprint(&self) -> String {
        site_fingerprint(&self.base_url, &self.group_id)
    }
}

/// What a finished crawl hands to the exporters.
#[derive(Debug, Clone)]
pub struct CrawlOutput {
    pub pages: Vec<PageRecord>,
    pub site_tree: SiteTree,
    pub stats: StatsSnapshot,
    pub peak_in_flight: usize,
}

/// Recursive layout crawler.
///
/// Nodes are `(parent id, private)` pairs; edges are "is a child layout of".
/// Each node is claimed in the visited set before its fetch is issued, so a
/// key is fetched at most once per run. Children of a node are expanded
/// concurrently and awaited together; the transport's admission gate is the
/// only throttle, so tree depth and width are bounded only by remote data.
pub struct Crawler {
    site: SiteTarget,
    transport: Transport,
    cache: ResultCache,
    state: Arc<Mutex<CrawlState>>,
    stats: Arc<CrawlStats>,
    checkpoint: Option<CheckpointFile>,
    checkpoint_interval: Duration,
    progress_callback: Option<ProgressCallback>,
}

impl Crawler {
    pub fn new(site: SiteTarget, transport: Transport, cache: ResultCache) -> Self {
        Self {
            site,
            transport,
            cache,
            state: Arc::new(Mutex::new(CrawlState::new())),
            stats: Arc::new(CrawlStats::new()),
            checkpoint: None,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            progress_callback: None,
        }
    }

    pub fn with_checkpoint(mut self, file: CheckpointFile) -> Self {
        self.checkpoint = Some(file);
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn site(&self) -> &SiteTarget {
        &self.site
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Restore pages, visited keys, statistics and the site tree from the
    /// checkpoint, if one exists. Returns `true` when state was restored.
    ///
    /// A checkpoint that cannot be read is logged and ignored. Restored pages
    /// are not re-validated against the remote site.
    pub async fn resume(&self) -> bool {
        let Some(ref file) = self.checkpoint else {
            return false;
        };

        info!("Trying to restore previous state from {}", file.path().display());
        match file.load() {
            Ok(Some(checkpoint)) => {
                let (state, stats) = checkpoint.into_state();
                info!(
                    "State restored: {} pages already extracted, {} keys visited",
                    state.pages.len(),
                    state.visited.len()
                );
                warn!(
                    "Keys dispatched before the checkpoint are not fetched again; \
                     pages still in flight at that point are missing unless the crawl is restarted without resume"
                );
                *self.state.lock().await = state;
                self.stats.restore(&stats);
                true
            }
            Ok(None) => {
                debug!("No checkpoint at {}", file.path().display());
                false
            }
            Err(e) => {
                error!("Failed to load checkpoint {}: {}", file.path().display(), e);
                false
            }
        }
    }

    /// Walk both partitions to completion and return the result.
    ///
    /// A background task checkpoints every `checkpoint_interval`; it is
    /// cancelled once the traversal finishes and a final checkpoint is
    /// written before returning.
    pub async fn crawl(&self) -> CrawlOutput {
        info!(
            "Starting crawl of {} (group {})",
            self.site.base_url, self.site.group_id
        );
        self.stats.start_timer();

        let saver = self.spawn_periodic_checkpoint();

        let roots = TraversalKey::roots().map(|key| self.expand(key, String::new(), Vec::new()));
        join_all(roots).await;

        if let Some(saver) = saver {
            saver.stop().await;
        }

        self.stats.stop_timer();
        self.save_checkpoint().await;

        let output = self.output().await;
        info!(
            "Crawl complete. {} pages in {:.2}s",
            output.pages.len(),
            output.stats.elapsed_secs()
        );
        output
    }

    pub async fn output(&self) -> CrawlOutput {
        let state = self.state.lock().await;
        CrawlOutput {
            pages: state.pages.clone(),
            site_tree: state.site_tree.clone(),
            stats: self.stats.snapshot(),
            peak_in_flight: self.transport.gate().peak(),
        }
    }

    /// Write a checkpoint of the current state now, if a checkpoint file is
    /// configured. Used after an interrupted crawl.
    pub async fn save_checkpoint(&self) {
        if let Some(ref file) = self.checkpoint {
            write_checkpoint(&self.state, &self.stats, file).await;
        }
    }

    /// Flush the result cache. Call once at the end of a run, also on error paths.
    pub fn close(&self) {
        if let Err(e) = self.cache.close() {
            warn!("Failed to close cache: {}", e);
        }
    }

    fn spawn_periodic_checkpoint(&self) -> Option<CheckpointTask> {
        let file = self.checkpoint.clone()?;
        if self.checkpoint_interval.is_zero() {
            return None;
        }
        Some(CheckpointTask(Some(spawn_checkpoint_task(
            self.state.clone(),
            self.stats.clone(),
            file,
            self.checkpoint_interval,
        ))))
    }

    fn expand(&self, key: TraversalKey, parent_path: String, ancestors: Vec<String>) -> BoxFuture<'_, ()> {
        async move {
            let children = self.fetch_children(key).await;
            if children.is_empty() {
                return;
            }

            let mut branches = Vec::with_capacity(children.len());
            {
                let mut state = self.state.lock().await;
                for child in &children {
                    let record = PageRecord::from_layout(child, &parent_path, key.private, &self.site.base_url);
                    let segment = child.segment().to_string();

                    let node = SiteNode::new(child.layout_id, child.name.clone());
                    if !state.site_tree.insert(key.private, &ancestors, &segment, node) {
                        warn!("No tree slot for parent of {} (layout {})", record.url, child.layout_id);
                    }
                    state.pages.push(record.clone());
                    self.stats.record_layout();

                    let mut child_ancestors = ancestors.clone();
                    child_ancestors.push(segment);
                    branches.push((TraversalKey::new(child.layout_id, key.private), record, child_ancestors));
                }
            }

            if let Some(ref callback) = self.progress_callback {
                let snapshot = self.stats.snapshot();
                for (_, record, _) in &branches {
                    callback(&snapshot, &record.url);
                }
            }

            let expansions = branches
                .into_iter()
                .map(|(child_key, record, child_ancestors)| self.expand(child_key, record.path, child_ancestors));
            join_all(expansions).await;
        }
        .boxed()
    }

    /// Claim `key` and fetch its children through the cache. A key that was
    /// already claimed yields no children.
    async fn fetch_children(&self, key: TraversalKey) -> Vec<LayoutEntry> {
        if !self.state.lock().await.claim(key) {
            debug!("Skipping already visited {}", key);
            return Vec::new();
        }

        let cache_key = fetch_fingerprint(&self.site.group_id, key.parent_id, key.private);
        let (payload, hit) = self
            .cache
            .get_or_fetch(&cache_key, || self.fetch_remote(key))
            .await;
        self.stats.record_cache_lookup(hit);

        parse_layouts(&payload)
    }

    async fn fetch_remote(&self, key: TraversalKey) -> Value {
        let params = [
            ("groupId", self.site.group_id.clone()),
            ("privateLayout", key.private.to_string()),
            ("parentLayoutId", key.parent_id.to_string()),
        ];
        let response = self
            .transport
            .request(Method::POST, &self.site.endpoint(), &params)
            .await;
        self.stats.record_attempts(response.attempts, response.failures);
        response.body
    }
}

/// Handle to the periodic saver. Aborts the task when dropped, so an
/// interrupted crawl does not leave it running.
struct CheckpointTask(Option<JoinHandle<()>>);

impl CheckpointTask {
    async fn stop(mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
            match handle.await {
                Err(e) if !e.is_cancelled() => warn!("Checkpoint task failed: {}", e),
                _ => {}
            }
        }
    }
}

impl Drop for CheckpointTask {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// Save a checkpoint on a fixed interval until aborted.
pub fn spawn_checkpoint_task(
    state: Arc<Mutex<CrawlState>>,
    stats: Arc<CrawlStats>,
    file: CheckpointFile,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            write_checkpoint(&state, &stats, &file).await;
            debug!("State saved automatically ({} pages processed)", stats.layouts_processed());
        }
    })
}

async fn write_checkpoint(state: &Mutex<CrawlState>, stats: &CrawlStats, file: &CheckpointFile) {
    // held across the save so the newest snapshot is always renamed last
    let state = state.lock().await;
    let checkpoint = Checkpoint::capture(&state, stats.snapshot());
    let saved = file.save(&checkpoint);
    drop(state);

    match saved {
        Ok(()) => info!("Current state saved to {}", file.path().display()),
        Err(e) => error!("Failed to save state to {}: {}", file.path().display(), e),
    }
}
