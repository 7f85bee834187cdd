use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use sitemapper_core::config::{CrawlerConfig, OutputPaths};
use sitemapper_core::crawl::{clear_cache, execute_crawl, generate_crawl_report};
use sitemapper_core::report::export_all;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Install the stderr log subscriber. `RUST_LOG` wins over the flags.
pub fn init_logging(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(verbose, quiet)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn default_log_level(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

/// Expand `~` and environment variables in a user supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(raw).map(|p| p.into_owned()).unwrap_or_else(|_| raw.to_string()))
}

fn required<'a>(args: &'a ArgMatches, id: &str) -> Result<&'a String> {
    args.get_one::<String>(id)
        .with_context(|| format!("missing required argument --{}", id))
}

fn site_config(args: &ArgMatches) -> Result<CrawlerConfig> {
    let url = args
        .get_one::<Url>("url")
        .context("missing required argument --url")?;
    let mut config = CrawlerConfig::default();
    config.base_url = url.as_str().trim_end_matches('/').to_string();
    config.group_id = required(args, "group-id")?.trim().to_string();
    if let Some(dir) = args.get_one::<String>("cache-dir") {
        config.cache_dir = expand_path(dir);
    }
    Ok(config)
}

/// Build the run configuration from the `crawl` sub-command arguments.
pub fn build_crawl_config(args: &ArgMatches, quiet: bool) -> Result<CrawlerConfig> {
    let mut config = site_config(args)?;
    config.email = required(args, "email")?.clone();
    config.password = required(args, "password")?.clone();

    if let Some(threads) = args.get_one::<usize>("threads") {
        config.max_concurrent = *threads;
    }
    if let Some(hours) = args.get_one::<u64>("cache-ttl") {
        config.cache_ttl = CrawlerConfig::cache_ttl_hours(*hours);
    }
    if let Some(resume) = args.get_one::<bool>("resume") {
        config.resume = *resume;
    }
    if let Some(timeout) = args.get_one::<u64>("timeout") {
        config.timeout = Duration::from_secs(*timeout);
    }
    if let Some(retries) = args.get_one::<u32>("retries") {
        config.max_retries = *retries;
    }
    if let Some(interval) = args.get_one::<u64>("checkpoint-interval") {
        config.checkpoint_interval = Duration::from_secs(*interval);
    }
    config.accept_invalid_certs = args.get_flag("insecure");
    config.show_progress = !quiet;

    let defaults = OutputPaths::default();
    config.outputs = OutputPaths {
        csv: args.get_one::<String>("csv-output").map_or(defaults.csv, |p| expand_path(p)),
        txt: args.get_one::<String>("txt-output").map_or(defaults.txt, |p| expand_path(p)),
        sitemap: args
            .get_one::<String>("sitemap-output")
            .map_or(defaults.sitemap, |p| expand_path(p)),
    };

    config.validate()?;
    Ok(config)
}

pub fn build_cache_config(args: &ArgMatches) -> Result<CrawlerConfig> {
    let config = site_config(args)?;
    config.site()?;
    Ok(config)
}

pub async fn handle_crawl(sub_matches: &ArgMatches, quiet: bool) {
    let config = match build_crawl_config(sub_matches, quiet) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ {:#}", e);
            std::process::exit(1);
        }
    };

    if !quiet {
        println!("\n🕷️  Crawling Liferay site");
        println!("{}\n", config);
    }

    let output = match execute_crawl(&config).await {
        Ok(output) => output,
        Err(e) => {
            eprintln!("✗ Crawl failed: {:#}", e);
            std::process::exit(1);
        }
    };

    println!("\n✓ Crawl complete!\n");
    print!("{}", generate_crawl_report(&output));

    let mut failed = false;
    for outcome in export_all(&output, &config.base_url, &config.outputs).await {
        match outcome.result {
            Ok(count) => println!(
                "{} {} written to {} ({} entries)",
                "✓".green(),
                outcome.format.as_str(),
                outcome.path.display(),
                count
            ),
            Err(e) => {
                failed = true;
                eprintln!(
                    "{} {} export to {} failed: {:#}",
                    "✗".red(),
                    outcome.format.as_str(),
                    outcome.path.display(),
                    e
                );
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}

pub fn handle_cache_clear(sub_matches: &ArgMatches) {
    let result = build_cache_config(sub_matches).and_then(|config| clear_cache(&config));
    match result {
        Ok(cleared) if cleared.removed.is_empty() => println!("Nothing to clear"),
        Ok(cleared) => {
            for path in cleared.removed {
                println!("{} Removed {}", "✓".green(), path.display());
            }
        }
        Err(e) => {
            eprintln!("✗ {:#}", e);
            std::process::exit(1);
        }
    }
}
