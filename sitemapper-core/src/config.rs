use anyhow::{Context, Result, bail};
use sitemapper_scanner::checkpoint::CheckpointFile;
use sitemapper_scanner::crawler::{DEFAULT_CHECKPOINT_INTERVAL, SiteTarget};
use sitemapper_scanner::transport::{
    Credentials, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS, TransportConfig,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CACHE_DIR: &str = ".cache";
pub const DEFAULT_CACHE_TTL_HOURS: u64 = 24;
pub const DEFAULT_CSV_OUTPUT: &str = "all_liferay_urls.csv";
pub const DEFAULT_TXT_OUTPUT: &str = "all_urls.txt";
pub const DEFAULT_SITEMAP_OUTPUT: &str = "site_structure.html";

/// Where the three exports are written.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub csv: PathBuf,
    pub txt: PathBuf,
    pub sitemap: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            csv: PathBuf::from(DEFAULT_CSV_OUTPUT),
            txt: PathBuf::from(DEFAULT_TXT_OUTPUT),
            sitemap: PathBuf::from(DEFAULT_SITEMAP_OUTPUT),
        }
    }
}

/// Everything one crawl run needs.
#[derive(Clone)]
pub struct CrawlerConfig {
    pub base_url: String,
    pub email: String,
    pub password: String,
    pub group_id: String,
    pub max_concurrent: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub cache_dir: PathBuf,
    /// Zero disables the result cache.
    pub cache_ttl: Duration,
    pub resume: bool,
    pub checkpoint_interval: Duration,
    pub accept_invalid_certs: bool,
    pub show_progress: bool,
    pub outputs: OutputPaths,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            email: String::new(),
            password: String::new(),
            group_id: String::new(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_HOURS * 3600),
            resume: true,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            accept_invalid_certs: false,
            show_progress: true,
            outputs: OutputPaths::default(),
        }
    }
}

impl CrawlerConfig {
    pub fn new(
        base_url: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            email: email.into(),
            password: password.into(),
            group_id: group_id.into(),
            ..Default::default()
        }
    }

    pub fn cache_ttl_hours(hours: u64) -> Duration {
        Duration::from_secs(hours.saturating_mul(3600))
    }

    pub fn validate(&self) -> Result<()> {
        SiteTarget::parse(&self.base_url, &self.group_id).context("Invalid Liferay site")?;
        if self.max_concurrent == 0 {
            bail!("max concurrent requests must be at least 1");
        }
        if self.max_retries == 0 {
            bail!("retries must be at least 1");
        }
        if self.timeout.is_zero() {
            bail!("timeout must be greater than zero");
        }
        Ok(())
    }

    pub fn site(&self) -> Result<SiteTarget> {
        SiteTarget::parse(&self.base_url, &self.group_id).context("Invalid Liferay site")
    }

    pub fn transport(&self) -> TransportConfig {
        let credentials = if self.email.is_empty() {
            None
        } else {
            Some(Credentials {
                username: self.email.clone(),
                password: self.password.clone(),
            })
        };
        TransportConfig {
            max_concurrent: self.max_concurrent,
            timeout: self.timeout,
            max_retries: self.max_retries,
            credentials,
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }

    /// `<cache_dir>/<site_fp>_cache.db`
    pub fn cache_db_path(&self, site_fingerprint: &str) -> PathBuf {
        self.cache_dir.join(format!("{}_cache.db", site_fingerprint))
    }

    pub fn checkpoint_file(&self, site_fingerprint: &str) -> CheckpointFile {
        CheckpointFile::for_site(&self.cache_dir, site_fingerprint)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}

impl fmt::Debug for CrawlerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlerConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("password", &mask(&self.password))
            .field("group_id", &self.group_id)
            .field("max_concurrent", &self.max_concurrent)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("cache_dir", &self.cache_dir)
            .field("cache_ttl", &self.cache_ttl)
            .field("resume", &self.resume)
            .field("checkpoint_interval", &self.checkpoint_interval)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("outputs", &self.outputs)
            .finish()
    }
}

impl fmt::Display for CrawlerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  URL:             {}", self.base_url)?;
        writeln!(f, "  Group ID:        {}", self.group_id)?;
        writeln!(f, "  User:            {}", self.email)?;
        writeln!(f, "  Password:        {}", mask(&self.password))?;
        writeln!(f, "  Max concurrent:  {}", self.max_concurrent)?;
        writeln!(f, "  Retries:         {}", self.max_retries)?;
        writeln!(f, "  Timeout:         {}s", self.timeout.as_secs())?;
        writeln!(f, "  Cache dir:       {}", self.cache_dir.display())?;
        if self.cache_ttl.is_zero() {
            writeln!(f, "  Cache TTL:       disabled")?;
        } else {
            writeln!(f, "  Cache TTL:       {}h", self.cache_ttl.as_secs() / 3600)?;
        }
        write!(f, "  Resume:          {}", if self.resume { "yes" } else { "no" })
    }
}
