pub mod cache;
pub mod checkpoint;
pub mod crawler;
pub mod error;
pub mod fingerprint;
pub mod layout;
pub mod state;
pub mod stats;
pub mod transport;

pub use cache::{CacheEntry, CacheStore, MemoryCacheStore, ResultCache};
pub use checkpoint::{Checkpoint, CheckpointFile};
pub use crawler::{CrawlOutput, Crawler, ProgressCallback, SiteTarget};
pub use error::{Result, ScanError};
pub use layout::{LayoutEntry, PageRecord, TraversalKey};
pub use state::{CrawlState, SiteNode, SiteTree};
pub use stats::{CrawlStats, StatsSnapshot};
pub use transport::{Credentials, Transport, TransportConfig};
