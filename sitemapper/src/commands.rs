use clap::{Arg, arg, command};
use sitemapper_core::config::{
    DEFAULT_CACHE_DIR, DEFAULT_CSV_OUTPUT, DEFAULT_SITEMAP_OUTPUT, DEFAULT_TXT_OUTPUT,
};
use url::Url;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

/// Arguments that identify a site and its cache files.
fn site_arguments() -> [Arg; 3] {
    [
        arg!(-u --"url" <URL>)
            .required(true)
            .env("LIFERAY_URL")
            .help("Base URL of the Liferay portal")
            .value_parser(clap::value_parser!(Url)),
        arg!(-g --"group-id" <GROUP_ID>)
            .required(true)
            .env("GROUP_ID")
            .help("Site (group) id whose layouts are crawled"),
        arg!(--"cache-dir" <PATH>)
            .required(false)
            .env("CACHE_DIR")
            .help("Directory holding the result cache and checkpoints")
            .default_value(DEFAULT_CACHE_DIR),
    ]
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("sitemapper")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("sitemapper")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner, progress spinner and info logs")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Enable debug logging")
                .required(false)
                .global(true)
                .conflicts_with("quiet"),
        )
        .subcommand_required(false)
        .subcommand(
            command!("crawl")
                .about(
                    "Recursively extract every public and private page of a Liferay site and \
                export them as CSV, a URL list and an HTML site map.",
                )
                .args(site_arguments())
                .arg(
                    arg!(-e --"email" <EMAIL>)
                        .required(true)
                        .env("EMAIL")
                        .help("User for HTTP basic authentication"),
                )
                .arg(
                    arg!(-p --"password" <PASSWORD>)
                        .required(true)
                        .env("PASSWORD")
                        .hide_env_values(true)
                        .help("Password for HTTP basic authentication"),
                )
                .arg(
                    arg!(-t --"threads" <NUM>)
                        .required(false)
                        .env("MAX_CONCURRENT_REQUESTS")
                        .help("Maximum number of requests in flight at once")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"cache-ttl" <HOURS>)
                        .required(false)
                        .env("CACHE_TTL")
                        .help("How long cached responses stay valid, in hours (0 disables the cache)")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("24"),
                )
                .arg(
                    arg!(--"resume" <BOOL>)
                        .required(false)
                        .env("RESUME_EXTRACTION")
                        .help("Continue from the last checkpoint of this site if one exists")
                        .value_parser(clap::builder::BoolishValueParser::new())
                        .default_value("true"),
                )
                .arg(
                    arg!(--"csv-output" <PATH>)
                        .required(false)
                        .env("OUTPUT_FILE")
                        .help("CSV file listing every page")
                        .default_value(DEFAULT_CSV_OUTPUT),
                )
                .arg(
                    arg!(--"txt-output" <PATH>)
                        .required(false)
                        .env("OUTPUT_TXT")
                        .help("Plain text file with one URL per line")
                        .default_value(DEFAULT_TXT_OUTPUT),
                )
                .arg(
                    arg!(--"sitemap-output" <PATH>)
                        .required(false)
                        .env("SITE_MAP_FILE")
                        .help("HTML site map")
                        .default_value(DEFAULT_SITEMAP_OUTPUT),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("60"),
                )
                .arg(
                    arg!(--"retries" <NUM>)
                        .required(false)
                        .help("Attempts per request before giving up")
                        .value_parser(clap::value_parser!(u32))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"checkpoint-interval" <SECONDS>)
                        .required(false)
                        .help("Seconds between automatic checkpoints")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                )
                .arg(
                    arg!(-k --"insecure")
                        .required(false)
                        .help("Accept invalid TLS certificates")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("cache")
                .about("Manage the result cache and checkpoints")
                .subcommand_required(true)
                .subcommand(
                    command!("clear")
                        .about("Delete the cache database and checkpoint of one site")
                        .args(site_arguments()),
                ),
        )
}
