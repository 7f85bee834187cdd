pub mod commands;
pub mod handlers;

pub use commands::{CLAP_STYLING, command_argument_builder};
pub use handlers::{build_cache_config, build_crawl_config, default_log_level, expand_path};
