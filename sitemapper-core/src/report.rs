// Export of crawl results: CSV listing, plain URL list and HTML site map

use anyhow::{Context, Result};
use chrono::Utc;
use sitemapper_scanner::layout::{absolute_url, join_path};
use sitemapper_scanner::state::{SiteBranch, SiteTree};
use sitemapper_scanner::{CrawlOutput, PageRecord};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::OutputPaths;

pub const CSV_HEADER: [&str; 6] = ["Path", "Full URL", "Title", "ID", "Parent ID", "Type"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Txt,
    Sitemap,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "CSV",
            ExportFormat::Txt => "TXT",
            ExportFormat::Sitemap => "HTML site map",
        }
    }
}

/// Result of one exporter. `result` carries the number of entries written.
#[derive(Debug)]
pub struct ExportOutcome {
    pub format: ExportFormat,
    pub path: PathBuf,
    pub result: Result<usize>,
}

/// Pages ordered public-first, then by path.
pub fn sorted_pages(pages: &[PageRecord]) -> Vec<&PageRecord> {
    let mut sorted: Vec<&PageRecord> = pages.iter().collect();
    sorted.sort_by(|a, b| (a.private, &a.path).cmp(&(b.private, &b.path)));
    sorted
}

pub fn write_csv<W: Write>(pages: &[PageRecord], writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_HEADER)?;

    let sorted = sorted_pages(pages);
    for page in &sorted {
        csv_writer.write_record([
            page.path.as_str(),
            page.url.as_str(),
            page.title.as_str(),
            page.id.to_string().as_str(),
            page.parent_id.to_string().as_str(),
            page.display_type(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(sorted.len())
}

pub fn export_csv(pages: &[PageRecord], path: &Path) -> Result<usize> {
    ensure_parent(path)?;
    let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    let written = write_csv(pages, file)?;
    info!("Exported {} pages to {}", written, path.display());
    Ok(written)
}

/// Sorted, de-duplicated absolute URLs, one per line.
pub fn generate_url_list(pages: &[PageRecord]) -> String {
    let urls: BTreeSet<&str> = pages.iter().map(|p| p.url.trim_end_matches('/')).collect();
    let mut list = String::new();
    for url in urls {
        list.push_str(url);
        list.push('\n');
    }
    list
}

pub fn export_txt(pages: &[PageRecord], path: &Path) -> Result<usize> {
    let list = generate_url_list(pages);
    save_report(&list, path).with_context(|| format!("Cannot write {}", path.display()))?;
    let written = list.lines().count();
    info!("Exported {} unique URLs to {}", written, path.display());
    Ok(written)
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

const SITEMAP_STYLE: &str = r#"
        body { font-family: Arial, sans-serif; margin: 20px; }
        h1 { color: #2c3e50; }
        h2 { color: #34495e; border-bottom: 1px solid #ccc; padding-bottom: 4px; }
        ul { list-style-type: none; padding-left: 20px; }
        li { margin: 4px 0; }
        a { color: #2980b9; text-decoration: none; }
        a:hover { text-decoration: underline; }
        .toggle { cursor: pointer; color: #7f8c8d; font-family: monospace; margin-right: 4px; }
        .collapsed { display: none; }
        .id { color: #95a5a6; font-size: 0.85em; }
        .summary { background: #f4f6f7; padding: 10px; margin-bottom: 20px; }
        button { margin-right: 8px; }
"#;

const SITEMAP_SCRIPT: &str = r#"
        function toggle(el) {
            var list = el.parentElement.querySelector('ul');
            if (!list) return;
            var hidden = list.classList.toggle('collapsed');
            el.textContent = hidden ? '[+]' : '[-]';
        }
        function expandAll() {
            document.querySelectorAll('ul.tree ul').forEach(function (ul) { ul.classList.remove('collapsed'); });
            document.querySelectorAll('.toggle').forEach(function (t) { t.textContent = '[-]'; });
        }
        function collapseAll() {
            document.querySelectorAll('ul.tree ul').forEach(function (ul) { ul.classList.add('collapsed'); });
            document.querySelectorAll('.toggle').forEach(function (t) { t.textContent = '[+]'; });
        }
"#;

fn render_branch(html: &mut String, branch: &SiteBranch, parent_path: &str, base_url: &str, depth: usize) {
    let indent = "    ".repeat(depth + 2);
    for (key, node) in branch {
        let path = join_path(parent_path, key);
        let url = absolute_url(base_url, &path);
        let title = if node.title.is_empty() { key.as_str() } else { node.title.as_str() };

        html.push_str(&format!("{}<li>", indent));
        if !node.children.is_empty() {
            html.push_str("<span class=\"toggle\" onclick=\"toggle(this)\">[+]</span>");
        }
        html.push_str(&format!(
            "<a href=\"{}\" target=\"_blank\">{}</a> <span class=\"id\">(ID: {})</span>",
            escape_html(&url),
            escape_html(title),
            node.id
        ));
        if node.children.is_empty() {
            html.push_str("</li>\n");
        } else {
            html.push_str(&format!("\n{}    <ul class=\"collapsed\">\n", indent));
            render_branch(html, &node.children, &path, base_url, depth + 2);
            html.push_str(&format!("{}    </ul>\n{}</li>\n", indent, indent));
        }
    }
}

fn render_section(html: &mut String, heading: &str, branch: &SiteBranch, base_url: &str) {
    html.push_str(&format!("    <h2>{}</h2>\n", heading));
    if branch.is_empty() {
        html.push_str("    <p><em>No pages</em></p>\n");
        return;
    }
    html.push_str("    <ul class=\"tree\">\n");
    render_branch(html, branch, "", base_url, 0);
    html.push_str("    </ul>\n");
}

pub fn generate_sitemap_html(tree: &SiteTree, base_url: &str) -> String {
    let public = tree.count(false);
    let private = tree.count(true);

    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("    <meta charset=\"UTF-8\">\n");
    html.push_str(&format!("    <title>Site map - {}</title>\n", escape_html(base_url)));
    html.push_str(&format!("    <style>{}    </style>\n", SITEMAP_STYLE));
    html.push_str(&format!("    <script>{}    </script>\n", SITEMAP_SCRIPT));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("    <h1>Site map: {}</h1>\n", escape_html(base_url)));

    html.push_str("    <div class=\"summary\">\n");
    html.push_str(&format!("        <p>Total pages: <strong>{}</strong></p>\n", public + private));
    html.push_str(&format!("        <p>Public pages: <strong>{}</strong></p>\n", public));
    html.push_str(&format!("        <p>Private pages: <strong>{}</strong></p>\n", private));
    html.push_str(&format!("        <p>Max depth: <strong>{}</strong></p>\n", tree.max_depth()));
    html.push_str(&format!(
        "        <p>Generated: {}</p>\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("    </div>\n");
    html.push_str("    <button onclick=\"expandAll()\">Expand all</button>");
    html.push_str("<button onclick=\"collapseAll()\">Collapse all</button>\n");

    render_section(&mut html, "Public pages", &tree.public, base_url);
    render_section(&mut html, "Private pages", &tree.private, base_url);

    html.push_str("</body>\n</html>\n");
    html
}

pub fn export_sitemap(tree: &SiteTree, base_url: &str, path: &Path) -> Result<usize> {
    let html = generate_sitemap_html(tree, base_url);
    save_report(&html, path).with_context(|| format!("Cannot write {}", path.display()))?;
    let written = tree.count(false) + tree.count(true);
    info!("Site map with {} pages written to {}", written, path.display());
    Ok(written)
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    ensure_parent(path)?;
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

async fn run_blocking<F>(format: ExportFormat, path: PathBuf, job: F) -> ExportOutcome
where
    F: FnOnce(&Path) -> Result<usize> + Send + 'static,
{
    let target = path.clone();
    let result = match tokio::task::spawn_blocking(move || job(&target)).await {
        Ok(result) => result,
        Err(e) => Err(anyhow::Error::new(e).context(format!("{} export task failed", format.as_str()))),
    };
    if let Err(ref e) = result {
        error!("{} export to {} failed: {:#}", format.as_str(), path.display(), e);
    }
    ExportOutcome { format, path, result }
}

/// Run the three exporters concurrently. A failing exporter does not stop
/// the others.
pub async fn export_all(output: &CrawlOutput, base_url: &str, paths: &OutputPaths) -> Vec<ExportOutcome> {
    let pages = Arc::new(output.pages.clone());
    let csv_pages = pages.clone();
    let tree = output.site_tree.clone();
    let base_url = base_url.to_string();

    let (csv, txt, sitemap) = tokio::join!(
        run_blocking(ExportFormat::Csv, paths.csv.clone(), move |path| {
            export_csv(&csv_pages, path)
        }),
        run_blocking(ExportFormat::Txt, paths.txt.clone(), move |path| {
            export_txt(&pages, path)
        }),
        run_blocking(ExportFormat::Sitemap, paths.sitemap.clone(), move |path| {
            export_sitemap(&tree, &base_url, path)
        }),
    );

    vec![csv, txt, sitemap]
}
