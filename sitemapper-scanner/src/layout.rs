use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tracing::warn;

/// One child layout as returned by `layout/get-layouts`.
///
/// Only the fields the crawl needs are kept; missing fields fall back to
/// zero / empty string so that a sparse response still yields a record.
/// An explicit `null` is treated the same as a missing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub layout_id: i64,
    #[serde(default, rename = "friendlyURL", deserialize_with = "null_as_default")]
    pub friendly_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parent_layout_id: i64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl LayoutEntry {
    /// The friendly URL with surrounding slashes removed, used as the path
    /// segment and as the key in the site tree.
    pub fn segment(&self) -> &str {
        self.friendly_url.trim_matches('/')
    }
}

/// Convert a raw response payload into layout entries.
///
/// Anything that is not a JSON array (the API reports failures as an object
/// with an `exception` field) is treated as "no children". Individual
/// entries that do not deserialize are skipped.
pub fn parse_layouts(payload: &serde_json::Value) -> Vec<LayoutEntry> {
    let Some(items) = payload.as_array() else {
        warn!("Expected a JSON array of layouts, got: {}", truncate(&payload.to_string(), 200));
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<LayoutEntry>(item.clone()) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping malformed layout entry: {}", e);
                None
            }
        })
        .collect()
}

/// Dedup key for child fetches: "have the children of this parent under
/// this visibility partition already been requested?"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraversalKey {
    pub parent_id: i64,
    pub private: bool,
}

impl TraversalKey {
    pub fn new(parent_id: i64, private: bool) -> Self {
        Self { parent_id, private }
    }

    /// The two partition roots every crawl starts from.
    pub fn roots() -> [TraversalKey; 2] {
        [TraversalKey::new(0, false), TraversalKey::new(0, true)]
    }
}

impl fmt::Display for TraversalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.parent_id, self.private)
    }
}

/// A discovered page. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: i64,
    pub path: String,
    pub url: String,
    pub title: String,
    pub parent_id: i64,
    pub private: bool,
}

impl PageRecord {
    pub fn from_layout(entry: &LayoutEntry, parent_path: &str, private: bool, base_url: &str) -> Self {
        let path = join_path(parent_path, entry.segment());
        let url = absolute_url(base_url, &path);

        Self {
            id: entry.layout_id,
            path,
            url,
            title: entry.name.clone(),
            parent_id: entry.parent_layout_id,
            private,
        }
    }

    pub fn display_type(&self) -> &'static str {
        if self.private { "Private" } else { "Public" }
    }
}

/// Join a parent path and a child segment with a single slash.
pub fn join_path(parent_path: &str, segment: &str) -> String {
    if parent_path.is_empty() {
        segment.to_string()
    } else if segment.is_empty() {
        parent_path.to_string()
    } else {
        format!("{}/{}", parent_path, segment)
    }
}

/// Resolve a page path against the portal base URL. The result never ends
/// with a slash.
pub fn absolute_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: i64, friendly_url: &str) -> LayoutEntry {
        LayoutEntry {
            layout_id: id,
            friendly_url: friendly_url.to_string(),
            name: format!("Page {}", id),
            parent_layout_id: 1,
        }
    }

    #[test]
    fn test_path_construction_strips_slashes() {
        let record = PageRecord::from_layout(&entry(7, "/c/"), "a/b", false, "https://portal.example.com");
        assert_eq!(record.path, "a/b/c");
        assert_eq!(record.url, "https://portal.example.com/a/b/c");
        assert!(!record.url.ends_with('/'));
    }

    #[test]
    fn test_top_level_record_has_no_leading_slash() {
        let record = PageRecord::from_layout(&entry(1, "/home"), "", true, "https://portal.example.com/");
        assert_eq!(record.path, "home");
        assert_eq!(record.url, "https://portal.example.com/home");
        assert!(record.private);
        assert_eq!(record.display_type(), "Private");
    }

    #[test]
    fn test_empty_friendly_url_resolves_to_parent() {
        let record = PageRecord::from_layout(&entry(3, ""), "", false, "https://portal.example.com/");
        assert_eq!(record.path, "");
        assert_eq!(record.url, "https://portal.example.com");
    }

    #[test]
    fn test_parse_layouts_fills_missing_fields() {
        let payload = json!([
            {"layoutId": 11, "friendlyURL": "/news", "name": "News", "parentLayoutId": 0},
            {"layoutId": 12}
        ]);
        let layouts = parse_layouts(&payload);
        assert_eq!(layouts.len(), 2);
        assert_eq!(layouts[0].segment(), "news");
        assert_eq!(layouts[1].friendly_url, "");
        assert_eq!(layouts[1].name, "");
        assert_eq!(layouts[1].parent_layout_id, 0);
    }

    #[test]
    fn test_parse_layouts_accepts_null_fields() {
        let payload = json!([
            {"layoutId": 21, "friendlyURL": null, "name": null, "parentLayoutId": null}
        ]);
        let layouts = parse_layouts(&payload);
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts[0].layout_id, 21);
        assert_eq!(layouts[0].friendly_url, "");
        assert_eq!(layouts[0].name, "");
        assert_eq!(layouts[0].parent_layout_id, 0);

        let record = PageRecord::from_layout(&layouts[0], "home", false, "https://portal.example.com");
        assert_eq!(record.path, "home");
    }

    #[test]
    fn test_parse_layouts_rejects_non_array() {
        let payload = json!({"exception": "No JSON web service action"});
        assert!(parse_layouts(&payload).is_empty());
    }

    #[test]
    fn test_parse_layouts_skips_malformed_entries() {
        let payload = json!([
            {"layoutId": "not-a-number", "friendlyURL": "/bad"},
            {"layoutId": 2, "friendlyURL": "/good"}
        ]);
        let layouts = parse_layouts(&payload);
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts[0].layout_id, 2);
    }

    #[test]
    fn test_traversal_key_display() {
        assert_eq!(TraversalKey::new(42, true).to_string(), "42-true");
        assert_eq!(TraversalKey::roots()[0], TraversalKey::new(0, false));
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
        assert_eq!(truncate("ééé", 2), "éé...");
    }
}
