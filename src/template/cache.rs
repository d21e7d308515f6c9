//! Compiled template cache.
//!
//! Keyed by [`QueryKey`] only. The template text is not part of the key,
//! so two queries with identical SQL still compile separately and two
//! queries with the same name under different entities never collide.

use super::{CompiledTemplate, compile};
use crate::error::LurryResult;
use crate::model::QueryKey;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe map from query identity to its compiled template.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: DashMap<QueryKey, Arc<CompiledTemplate>>,
    compiles: AtomicU64,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached template for `key`, compiling `text` on a miss.
    ///
    /// Compilation runs outside any shard lock. If two callers race on the
    /// same key, the first insert wins and both receive that entry.
    /// Failed compilations are not cached.
    pub fn get_or_compile(&self, key: &QueryKey, text: &str) -> LurryResult<Arc<CompiledTemplate>> {
        if let Some(entry) = self.entries.get(key) {
            return Ok(Arc::clone(entry.value()));
        }

        let compiled = match compile(text) {
            Ok(t) => Arc::new(t),
            Err(e) => {
                tracing::error!("Failed to compile template {}: {}", key, e);
                return Err(e);
            }
        };
        self.compiles.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Compiled template {}", key);

        let entry = self.entries.entry(key.clone()).or_insert(compiled);
        Ok(Arc::clone(entry.value()))
    }

    pub fn get(&self, key: &QueryKey) -> Option<Arc<CompiledTemplate>> {
        self.entries.get(key).map(|e| Arc::clone(e.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of successful compilations, including ones that lost a race.
    pub fn compile_count(&self) -> u64 {
        self.compiles.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_hit_reuses_entry() {
        let cache = TemplateCache::new();
        let key = QueryKey::new("users", "byId");

        let first = cache.get_or_compile(&key, "SELECT * FROM users WHERE id = $id").unwrap();
        let second = cache.get_or_compile(&key, "ignored on hit").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.compile_count(), 1);
    }

    #[test]
    fn test_same_name_different_entity() {
        let cache = TemplateCache::new();
        let users = cache
            .get_or_compile(&QueryKey::new("users", "all"), "SELECT * FROM users")
            .unwrap();
        let orders = cache
            .get_or_compile(&QueryKey::new("orders", "all"), "SELECT * FROM orders")
            .unwrap();

        assert!(!Arc::ptr_eq(&users, &orders));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_identical_text_is_not_shared() {
        let cache = TemplateCache::new();
        let a = cache.get_or_compile(&QueryKey::new("a", "q"), "SELECT 1").unwrap();
        let b = cache.get_or_compile(&QueryKey::new("b", "q"), "SELECT 1").unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.compile_count(), 2);
    }

    #[test]
    fn test_compile_error_not_cached() {
        let cache = TemplateCache::new();
        let key = QueryKey::new("users", "broken");

        assert!(cache.get_or_compile(&key, "SELECT ${id").is_err());
        assert!(cache.is_empty());
        assert!(cache.get(&key).is_none());
    }
}
