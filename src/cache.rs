//! Compiled-Unit Cache (opt-in)
//!
//! One entry per template, tagged with the source hash it was compiled
//! from. A lookup with any other hash evicts the entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::compiler::ExecutableUnit;

struct CacheEntry {
    hash: String,
    unit: Arc<dyn ExecutableUnit>,
}

#[derive(Default)]
pub struct CompiledUnitCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl CompiledUnitCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, template: &str, hash: &str) -> Option<Arc<dyn ExecutableUnit>> {
        let mut entries = self.lock();
        match entries.get(template) {
            Some(entry) if entry.hash == hash => Some(entry.unit.clone()),
            Some(_) => {
                debug!(template, "source changed, evicting compiled unit");
                entries.remove(template);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, template: &str, hash: &str, unit: Arc<dyn ExecutableUnit>) {
        self.lock().insert(
            template.to_string(),
            CacheEntry {
                hash: hash.to_string(),
                unit,
            },
        );
    }

    pub fn invalidate(&self, template: &str) {
        self.lock().remove(template);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::MarkupUnit;

    fn unit() -> Arc<dyn ExecutableUnit> {
        Arc::new(MarkupUnit::parse("x", "t.html").unwrap())
    }

    #[test]
    fn test_hit_on_same_hash() {
        let cache = CompiledUnitCache::new();
        cache.insert("t.html", "h1", unit());
        assert!(cache.get("t.html", "h1").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_changed_hash_evicts() {
        let cache = CompiledUnitCache::new();
        cache.insert("t.html", "h1", unit());
        assert!(cache.get("t.html", "h2").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate() {
        let cache = CompiledUnitCache::new();
        cache.insert("a.html", "h", unit());
        cache.insert("b.html", "h", unit());
        cache.invalidate("a.html");
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
