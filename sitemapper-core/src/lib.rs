pub mod config;
pub mod crawl;
pub mod data;
pub mod report;

use colored::Colorize;

pub fn print_banner() {
    let banner = r#"
     _ _
 ___(_) |_ ___ _ __ ___   __ _ _ __  _ __   ___ _ __
/ __| | __/ _ \ '_ ` _ \ / _` | '_ \| '_ \ / _ \ '__|
\__ \ | ||  __/ | | | | | (_| | |_) | |_) |  __/ |
|___/_|\__\___|_| |_| |_|\__,_| .__/| .__/ \___|_|
                              |_|   |_|
"#;
    println!("{}", banner.cyan());
    println!(
        "  {} {}\n",
        "Liferay layout crawler".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
