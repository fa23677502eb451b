//! Hierarchy Resolution
//!
//! Ancestor layouts are found purely from the logical path: for every
//! directory depth above the leaf, look up `<dir>/<layout name>`.

use tracing::debug;

use crate::accessor::ContentAccessor;
use crate::error::ContentError;
use crate::location::{join_path, split_logical_path, ViewLocation};

/// Root-first ancestors followed by the leaf.
#[derive(Debug, Clone)]
pub struct HierarchyChain {
    ancestors: Vec<ViewLocation>,
    leaf: ViewLocation,
}

impl HierarchyChain {
    /// `ancestors` must already be root-first.
    pub fn new(ancestors: Vec<ViewLocation>, leaf: ViewLocation) -> Self {
        Self { ancestors, leaf }
    }

    pub fn leaf_only(leaf: ViewLocation) -> Self {
        Self { ancestors: vec![], leaf }
    }

    pub fn ancestors(&self) -> &[ViewLocation] {
        &self.ancestors
    }

    pub fn leaf(&self) -> &ViewLocation {
        &self.leaf
    }

    pub fn len(&self) -> usize {
        self.ancestors.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Members in discovery order, leaf last.
    pub fn members(&self) -> impl Iterator<Item = &ViewLocation> {
        self.ancestors.iter().chain(std::iter::once(&self.leaf))
    }
}

pub struct HierarchyResolver<'a> {
    accessor: &'a ContentAccessor,
    layout_name: &'a str,
}

impl<'a> HierarchyResolver<'a> {
    pub fn new(accessor: &'a ContentAccessor, layout_name: &'a str) -> Self {
        Self { accessor, layout_name }
    }

    /// Candidate ancestor paths for a leaf, root first: `a/b/c` gives
    /// `_ViewStart`, `a/_ViewStart`, `a/b/_ViewStart`.
    pub fn candidate_paths(&self, leaf_path: &str) -> Vec<String> {
        let (location, _) = split_logical_path(leaf_path);
        let segments: Vec<&str> = location.split('/').filter(|s| !s.is_empty()).collect();

        (0..=segments.len())
            .map(|depth| join_path(&segments[..depth].join("/"), self.layout_name))
            .collect()
    }

    /// Resolve the chain for `leaf_path`.
    ///
    /// A missing leaf is `ContentError::NotFound`; missing ancestors are skipped.
    pub fn resolve(&self, leaf_path: &str) -> Result<HierarchyChain, ContentError> {
        let leaf = self
            .accessor
            .locate(leaf_path)?
            .ok_or_else(|| ContentError::NotFound(leaf_path.to_string()))?;

        let ancestors = self.resolve_ancestors(&leaf.logical_path())?;
        Ok(HierarchyChain { ancestors, leaf })
    }

    pub fn resolve_ancestors(&self, leaf_path: &str) -> Result<Vec<ViewLocation>, ContentError> {
        let mut ancestors = vec![];
        for candidate in self.candidate_paths(leaf_path) {
            // a layout rendered directly is not its own ancestor
            if candidate == leaf_path {
                continue;
            }
            if let Some(view) = self.accessor.locate(&candidate)? {
                debug!(ancestor = %view.full_name(), "found layout");
                ancestors.push(view);
            }
        }
        Ok(ancestors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{InMemoryLocator, ViewLocationProvider};
    use std::sync::{Arc, Mutex};

    /// Records every lookup the resolver makes.
    struct Recording {
        inner: InMemoryLocator,
        lookups: Mutex<Vec<String>>,
    }

    impl ViewLocationProvider for Recording {
        fn locate(
            &self,
            extensions: &[String],
            location: &str,
            name: &str,
        ) -> Result<Option<ViewLocation>, ContentError> {
            self.lookups.lock().unwrap().push(join_path(location, name));
            self.inner.locate(extensions, location, name)
        }

        fn located_views(&self, extensions: &[String]) -> Result<Vec<ViewLocation>, ContentError> {
            self.inner.located_views(extensions)
        }
    }

    fn accessor(locator: InMemoryLocator) -> ContentAccessor {
        ContentAccessor::new(Arc::new(locator), vec!["html".to_string()])
    }

    #[test]
    fn test_no_ancestors_gives_leaf_only() {
        let acc = accessor(InMemoryLocator::new().with("a/b/c.html", "leaf"));
        let chain = HierarchyResolver::new(&acc, "_ViewStart").resolve("a/b/c").unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.leaf().logical_path(), "a/b/c");
    }

    #[test]
    fn test_lookup_order_is_root_first() {
        let recording = Arc::new(Recording {
            inner: InMemoryLocator::new().with("a/b/c.html", "leaf"),
            lookups: Mutex::new(vec![]),
        });
        let acc = ContentAccessor::new(recording.clone(), vec!["html".to_string()]);
        HierarchyResolver::new(&acc, "_ViewStart").resolve("a/b/c").unwrap();

        let lookups = recording.lookups.lock().unwrap().clone();
        assert_eq!(
            lookups,
            vec!["a/b/c", "_ViewStart", "a/_ViewStart", "a/b/_ViewStart"]
        );
    }

    #[test]
    fn test_only_existing_ancestors_kept() {
        let acc = accessor(
            InMemoryLocator::new()
                .with("_ViewStart.html", "root")
                .with("a/b/_ViewStart.html", "ab")
                .with("a/b/c.html", "leaf"),
        );
        let chain = HierarchyResolver::new(&acc, "_ViewStart").resolve("a/b/c").unwrap();
        let paths: Vec<_> = chain.members().map(|v| v.logical_path()).collect();
        assert_eq!(paths, vec!["_ViewStart", "a/b/_ViewStart", "a/b/c"]);
    }

    #[test]
    fn test_missing_leaf_is_not_found() {
        let acc = accessor(InMemoryLocator::new().with("_ViewStart.html", "root"));
        let err = HierarchyResolver::new(&acc, "_ViewStart")
            .resolve("missing/view")
            .unwrap_err();
        assert!(matches!(err, ContentError::NotFound(_)));
    }
}
