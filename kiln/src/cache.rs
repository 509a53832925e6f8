//! Compiled programs keyed by template text.

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::compiler::CompiledProgram;

/// A bounded map from template source to its compiled program.
///
/// When full, the entry inserted first is evicted. A capacity of zero
/// disables the cache entirely.
#[derive(Debug)]
pub struct ProgramCache {
    capacity: usize,
    entries: Mutex<IndexMap<String, Arc<CompiledProgram>>>,
}

impl ProgramCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(IndexMap::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The cached program for `template`, if any.
    pub fn get(&self, template: &str) -> Option<Arc<CompiledProgram>> {
        if !self.is_enabled() {
            return None;
        }
        // a poisoned lock is treated as a miss
        let entries = self.entries.lock().ok()?;
        entries.get(template).cloned()
    }

    /// Return the cached program for `template`, compiling it with `compile`
    /// on a miss. Compilation runs without the lock held.
    pub fn get_or_try_insert<E>(
        &self,
        template: &str,
        compile: impl FnOnce() -> Result<CompiledProgram, E>,
    ) -> Result<Arc<CompiledProgram>, E> {
        if let Some(program) = self.get(template) {
            tracing::trace!(len = template.len(), "program cache hit");
            return Ok(program);
        }
        let program = Arc::new(compile()?);
        self.insert(template, program.clone());
        Ok(program)
    }

    fn insert(&self, template: &str, program: Arc<CompiledProgram>) {
        if !self.is_enabled() {
            return;
        }
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.contains_key(template) {
            return;
        }
        while entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }
        entries.insert(template.to_string(), program);
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl Default for ProgramCache {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compiler::compile, lexer::tokenize, parser::parse};

    fn build(template: &str) -> Result<CompiledProgram, ()> {
        Ok(compile(parse(tokenize(template)).unwrap()))
    }

    #[test]
    fn repeated_templates_share_one_program() {
        let cache = ProgramCache::new(4);
        let first = cache.get_or_try_insert("a<%= x %>", || build("a<%= x %>")).unwrap();
        let second = cache
            .get_or_try_insert("a<%= x %>", || -> Result<_, ()> { panic!("compiled twice") })
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn oldest_entry_is_evicted_first() {
        let cache = ProgramCache::new(2);
        for template in ["one", "two", "three"] {
            cache.get_or_try_insert(template, || build(template)).unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get("one").is_none());
        assert!(cache.get("two").is_some());
        assert!(cache.get("three").is_some());
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = ProgramCache::new(0);
        cache.get_or_try_insert("x", || build("x")).unwrap();
        assert!(cache.is_empty());
        assert!(cache.get("x").is_none());
    }

    #[test]
    fn failed_compiles_are_not_cached() {
        let cache = ProgramCache::new(2);
        let result = cache.get_or_try_insert("bad", || Err::<CompiledProgram, _>("nope"));
        assert_eq!(result.unwrap_err(), "nope");
        assert!(cache.is_empty());
    }
}
