//! Deterministic fingerprints used to namespace cache entries and checkpoint files.

use sha2::{Digest, Sha256};

/// Fingerprint of the site being crawled: `sha256("<base_url>:<group_id>")`.
///
/// Distinct sites never share a cache database or a checkpoint file.
pub fn site_fingerprint(base_url: &str, group_id: &str) -> String {
    digest(format!("{}:{}", base_url, group_id).as_bytes())
}

/// Fingerprint of one child-layout fetch.
pub fn fetch_fingerprint(group_id: &str, parent_id: i64, private: bool) -> String {
    // JSON encoding keeps the argument boundaries unambiguous
    let args = serde_json::json!(["layouts", group_id, parent_id, private]);
    digest(args.to_string().as_bytes())
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
