//! Embed Paths - Dotted relation paths expanded into a traversal tree
//!
//! `["images.tags", "images.gallery", "detail"]` becomes
//! `{images: {tags: {}, gallery: {}}, detail: {}}`; every level is embedded
//! with a single batch fetch per relation, children after their parent.

use indexmap::IndexMap;

/// Tree of relation names to embed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedTree {
    children: IndexMap<String, EmbedTree>,
}

impl EmbedTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand dotted paths; duplicate prefixes are merged, empty segments ignored
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = Self::new();
        for path in paths {
            tree.insert(path.as_ref());
        }
        tree
    }

    /// Add a single dotted path
    pub fn insert(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split('.').map(str::trim).filter(|s| !s.is_empty()) {
            node = node.children.entry(segment.to_string()).or_default();
        }
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &EmbedTree)> {
        self.children.iter().map(|(name, tree)| (name.as_str(), tree))
    }

    pub fn get(&self, name: &str) -> Option<&EmbedTree> {
        self.children.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of levels below this node
    pub fn depth(&self) -> usize {
        self.children
            .values()
            .map(|child| child.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Dotted paths of every node, parents before children
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_paths("", &mut paths);
        paths
    }

    fn collect_paths(&self, prefix: &str, paths: &mut Vec<String>) {
        for (name, child) in &self.children {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };
            paths.push(path.clone());
            child.collect_paths(&path, paths);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_merge_into_tree() {
        let tree = EmbedTree::from_paths(["images.tags", "images.gallery", "detail", "images"]);
        let names: Vec<&str> = tree.children().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["images", "detail"]);

        let images = tree.get("images").unwrap();
        let nested: Vec<&str> = images.children().map(|(name, _)| name).collect();
        assert_eq!(nested, vec!["tags", "gallery"]);
        assert!(tree.get("detail").unwrap().is_empty());
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn test_paths_listing_and_empty_segments() {
        let tree = EmbedTree::from_paths(["a..b", " c ", ""]);
        assert_eq!(tree.paths(), vec!["a", "a.b", "c"]);
        assert!(EmbedTree::from_paths(Vec::<String>::new()).is_empty());
    }
}
