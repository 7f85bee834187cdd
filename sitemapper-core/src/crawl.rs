use crate::config::CrawlerConfig;
use crate::data::Database;
use anyhow::{Context, Result, bail};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use sitemapper_scanner::{
    CacheStore, CrawlOutput, Crawler, MemoryCacheStore, ProgressCallback, ResultCache, SiteTarget,
    StatsSnapshot, Transport,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Shown when a crawl is stopped with Ctrl-C. Keys dispatched before the
/// interrupt are in the checkpoint, so resuming cannot finish their subtrees.
pub const INTERRUPTED_MESSAGE: &str = "crawl interrupted; pages that were in flight are not fetched again on resume, \
     run again with --resume false for a complete inventory (cached results keep it fast)";

/// Open the cache store for one site, falling back to memory when the
/// SQLite file cannot be opened. Entries older than the TTL are purged on
/// open. A disabled cache never touches disk.
pub fn open_cache_store(config: &CrawlerConfig, site_fingerprint: &str) -> Box<dyn CacheStore> {
    if config.cache_ttl.is_zero() {
        info!("Result cache disabled");
        return Box::new(MemoryCacheStore::new());
    }

    let path = config.cache_db_path(site_fingerprint);
    match Database::new(&path) {
        Ok(db) => {
            if let Err(e) = db.purge_expired(config.cache_ttl) {
                warn!("Cannot purge expired cache entries: {}", e);
            }
            match db.entry_count() {
                Ok(count) => info!("Using cache database {} ({} entries)", path.display(), count),
                Err(_) => info!("Using cache database {}", path.display()),
            }
            Box::new(db)
        }
        Err(e) => {
            warn!(
                "Cannot open cache database {}: {}. Falling back to an in-memory cache",
                path.display(),
                e
            );
            Box::new(MemoryCacheStore::new())
        }
    }
}

/// Resolves on Ctrl-C. Never resolves where the signal cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn spinner() -> Arc<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Starting crawl...");
    Arc::new(pb)
}

/// Run one complete crawl: validate, open the cache, optionally resume,
/// traverse both partitions and close the cache.
pub async fn execute_crawl(config: &CrawlerConfig) -> Result<CrawlOutput> {
    config.validate()?;
    let site: SiteTarget = config.site()?;
    let fingerprint = site.fingerprint();

    fs::create_dir_all(&config.cache_dir)
        .with_context(|| format!("Cannot create cache directory {}", config.cache_dir.display()))?;

    let transport = Transport::new(config.transport()).context("Cannot build HTTP client")?;
    let store = open_cache_store(config, &fingerprint);
    let cache = ResultCache::new(store, config.cache_ttl, fingerprint.clone());

    let progress_bar = config.show_progress.then(spinner);

    let mut crawler = Crawler::new(site, transport, cache)
        .with_checkpoint(config.checkpoint_file(&fingerprint))
        .with_checkpoint_interval(config.checkpoint_interval);

    if let Some(ref pb) = progress_bar {
        let pb_clone = pb.clone();
        let callback: ProgressCallback = Arc::new(move |stats: &StatsSnapshot, _url: &str| {
            pb_clone.set_message(format!(
                "Crawling... {} pages | cache {}/{} hits/misses",
                stats.layouts_processed, stats.cache_hits, stats.cache_misses
            ));
        });
        crawler = crawler.with_progress_callback(callback);
    }

    if config.resume {
        if crawler.resume().await {
            info!("Resuming previous extraction");
        }
    } else {
        info!("Resume disabled, starting a fresh extraction");
    }

    let output = tokio::select! {
        output = crawler.crawl() => output,
        _ = interrupted() => {
            warn!("Interrupted, saving current state before exiting");
            crawler.save_checkpoint().await;
            crawler.close();
            if let Some(ref pb) = progress_bar {
                pb.abandon_with_message("Crawl interrupted");
            }
            bail!(INTERRUPTED_MESSAGE);
        }
    };
    crawler.close();

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!("Crawl complete! {} pages found", output.pages.len()));
    }

    Ok(output)
}

/// Files removed by [`clear_cache`].
#[derive(Debug, Default)]
pub struct ClearedCache {
    pub removed: Vec<PathBuf>,
}

/// Delete the cache database and checkpoint belonging to the configured site.
pub fn clear_cache(config: &CrawlerConfig) -> Result<ClearedCache> {
    let fingerprint = config.site()?.fingerprint();
    let mut cleared = ClearedCache::default();

    let db_path = config.cache_db_path(&fingerprint);
    if Database::exists(&db_path) {
        Database::drop(&db_path).with_context(|| format!("Cannot remove {}", db_path.display()))?;
        cleared.removed.push(db_path);
    }

    let checkpoint = config.checkpoint_file(&fingerprint);
    if checkpoint
        .remove()
        .with_context(|| format!("Cannot remove {}", checkpoint.path().display()))?
    {
        cleared.removed.push(checkpoint.path().to_path_buf());
    }

    Ok(cleared)
}

/// Resident memory of this process in MB. `None` where `/proc` is unavailable.
fn resident_memory_mb() -> Option<f64> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss_mb(&status)
}

fn parse_vm_rss_mb(status: &str) -> Option<f64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024.0)
}

/// Generate the end-of-run summary
pub fn generate_crawl_report(output: &CrawlOutput) -> String {
    let stats = &output.stats;
    let public = output.pages.iter().filter(|p| !p.private).count();
    let private = output.pages.len() - public;
    let elapsed = stats.elapsed_secs();
    let rate = if elapsed > 0.0 {
        output.pages.len() as f64 / elapsed
    } else {
        0.0
    };

    let errors = if stats.request_errors > 0 {
        stats.request_errors.to_string().red().to_string()
    } else {
        stats.request_errors.to_string().green().to_string()
    };

    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str(&format!("{}\n", "# Summary:".bold()));
    report.push_str(&format!("  Total pages:        {}\n", output.pages.len().to_string().bold()));
    report.push_str(&format!("  Public pages:       {}\n", public));
    report.push_str(&format!("  Private pages:      {}\n", private));
    report.push_str(&format!("  Max depth:          {}\n", output.site_tree.max_depth()));
    report.push('\n');
    report.push_str(&format!("{}\n", "# Requests:".bold()));
    report.push_str(&format!("  Requests made:      {}\n", stats.requests_made));
    report.push_str(&format!("  Request errors:     {}\n", errors));
    report.push_str(&format!("  Retries:            {}\n", stats.retries));
    report.push_str(&format!("  Peak in flight:     {}\n", output.peak_in_flight));
    report.push('\n');
    report.push_str(&format!("{}\n", "# Cache:".bold()));
    report.push_str(&format!("  Cache hits:         {}\n", stats.cache_hits.to_string().cyan()));
    report.push_str(&format!("  Cache misses:       {}\n", stats.cache_misses));
    report.push_str(&format!("  Cache efficiency:   {:.1}%\n", stats.cache_efficiency()));
    report.push('\n');
    report.push_str(&format!("{}\n", "# Timing:".bold()));
    report.push_str(&format!("  Elapsed:            {:.2}s\n", elapsed));
    report.push_str(&format!("  Pages per second:   {:.2}\n", rate));
    match resident_memory_mb() {
        Some(mb) => report.push_str(&format!("  Memory usage:       {:.1} MB\n", mb)),
        None => report.push_str("  Memory usage:       n/a\n"),
    }
    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitemapper_scanner::{PageRecord, SiteTree};

    fn page(id: i64, private: bool) -> PageRecord {
        PageRecord {
            id,
            path: format!("p{}", id),
            url: format!("https://portal.example.com/p{}", id),
            title: format!("P{}", id),
            parent_id: 0,
            private,
        }
    }

    #[test]
    fn test_report_counts_partitions() {
        colored::control::set_override(false);
        let output = CrawlOutput {
            pages: vec![page(1, false), page(2, false), page(3, true)],
            site_tree: SiteTree::default(),
            stats: StatsSnapshot {
                requests_made: 4,
                request_errors: 1,
                cache_hits: 1,
                cache_misses: 3,
                start_time: Some(0),
                end_time: Some(2000),
                ..Default::default()
            },
            peak_in_flight: 2,
        };

        let report = generate_crawl_report(&output);
        assert!(report.contains("Total pages:        3"));
        assert!(report.contains("Public pages:       2"));
        assert!(report.contains("Private pages:      1"));
        assert!(report.contains("Request errors:     1"));
        assert!(report.contains("Cache efficiency:   25.0%"));
        assert!(report.contains("Pages per second:   1.50"));
        assert!(report.contains("Peak in flight:     2"));
        assert!(report.contains("Memory usage:"));
    }

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tsitemapper\nVmPeak:\t  20480 kB\nVmRSS:\t   10240 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss_mb(status), Some(10.0));
        assert_eq!(parse_vm_rss_mb("Name:\tsitemapper\n"), None);
    }

    #[test]
    fn test_interrupted_message_recommends_fresh_run() {
        assert!(INTERRUPTED_MESSAGE.contains("--resume false"));
        assert!(!INTERRUPTED_MESSAGE.contains("--resume true"));
    }
}
