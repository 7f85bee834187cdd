use crate::layout::{PageRecord, TraversalKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Children keyed by their own URL segment.
pub type SiteBranch = BTreeMap<String, SiteNode>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteNode {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub children: SiteBranch,
}

impl SiteNode {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            children: SiteBranch::new(),
        }
    }

    /// Number of nodes in this subtree, including this one.
    pub fn count(&self) -> usize {
        1 + self.children.values().map(SiteNode::count).sum::<usize>()
    }

    /// Depth of this subtree; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        1 + self.children.values().map(SiteNode::depth).max().unwrap_or(0)
    }
}

/// The hierarchical site map, one branch per visibility partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteTree {
    #[serde(default)]
    pub public: SiteBranch,
    #[serde(default)]
    pub private: SiteBranch,
}

impl SiteTree {
    pub fn partition(&self, private: bool) -> &SiteBranch {
        if private { &self.private } else { &self.public }
    }

    fn partition_mut(&mut self, private: bool) -> &mut SiteBranch {
        if private { &mut self.private } else { &mut self.public }
    }

    /// Insert `node` under `key` in the children map reached by following
    /// `ancestors` from the partition root. An existing slot is replaced.
    ///
    /// Returns `false` when an ancestor is missing.
    pub fn insert(&mut self, private: bool, ancestors: &[String], key: &str, node: SiteNode) -> bool {
        let mut branch = self.partition_mut(private);
        for ancestor in ancestors {
            match branch.get_mut(ancestor) {
                Some(parent) => branch = &mut parent.children,
                None => return false,
            }
        }
        branch.insert(key.to_string(), node);
        true
    }

    pub fn count(&self, private: bool) -> usize {
        self.partition(private).values().map(SiteNode::count).sum()
    }

    pub fn max_depth(&self) -> usize {
        self.public
            .values()
            .chain(self.private.values())
            .map(SiteNode::depth)
            .max()
            .unwrap_or(0)
    }
}

/// Everything the traversal accumulates and a checkpoint persists (apart
/// from statistics, which live in [`crate::stats::CrawlStats`]).
#[derive(Debug, Clone, Default)]
pub struct CrawlState {
    pub pages: Vec<PageRecord>,
    pub visited: BTreeSet<TraversalKey>,
    pub site_tree: SiteTree,
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` for dispatch. Returns `true` exactly once per key.
    pub fn claim(&mut self, key: TraversalKey) -> bool {
        self.visited.insert(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive() {
        let mut state = CrawlState::new();
        let key = TraversalKey::new(12, false);
        assert!(state.claim(key));
        assert!(!state.claim(key));
        assert!(state.claim(TraversalKey::new(12, true)));
        assert!(state.visited.contains(&key));
    }

    #[test]
    fn test_insert_follows_ancestors() {
        let mut tree = SiteTree::default();
        assert!(tree.insert(false, &[], "home", SiteNode::new(1, "Home")));
        assert!(tree.insert(false, &["home".to_string()], "news", SiteNode::new(2, "News")));
        assert!(tree.insert(
            false,
            &["home".to_string(), "news".to_string()],
            "2024",
            SiteNode::new(3, "2024")
        ));

        let home = &tree.public["home"];
        assert_eq!(home.children["news"].children["2024"].id, 3);
        assert_eq!(tree.count(false), 3);
        assert_eq!(tree.count(true), 0);
        assert_eq!(tree.max_depth(), 3);
    }

    #[test]
    fn test_insert_with_missing_ancestor_fails() {
        let mut tree = SiteTree::default();
        assert!(!tree.insert(true, &["ghost".to_string()], "child", SiteNode::new(9, "Child")));
        assert!(tree.private.is_empty());
    }

    #[test]
    fn test_same_segment_under_different_parents() {
        let mut tree = SiteTree::default();
        tree.insert(false, &[], "a", SiteNode::new(1, "A"));
        tree.insert(false, &[], "b", SiteNode::new(2, "B"));
        tree.insert(false, &["a".to_string()], "about", SiteNode::new(3, "About A"));
        tree.insert(false, &["b".to_string()], "about", SiteNode::new(4, "About B"));

        assert_eq!(tree.public["a"].children["about"].id, 3);
        assert_eq!(tree.public["b"].children["about"].id, 4);
        assert_eq!(tree.count(false), 4);
    }

    #[test]
    fn test_empty_tree_depth() {
        assert_eq!(SiteTree::default().max_depth(), 0);
    }
}
