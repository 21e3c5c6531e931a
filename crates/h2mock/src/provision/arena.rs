//! Arena of rules with a direct-lookup index.
//!
//! ```text
//! key ──HashMap──▶ id ──Vec──▶ Arc<rule>
//! ```
//!
//! Ids are handed out in first-insertion order and never reused, so walking
//! the arena is walking the rules in load order. An update replaces the rule
//! behind an existing id and keeps its position.

use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct RuleArena<T> {
    rules: Vec<Arc<T>>,
    index: HashMap<String, usize>,
}

impl<T> Default for RuleArena<T> {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> RuleArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; `true` when `key` is new.
    pub fn upsert(&mut self, key: String, rule: T) -> bool {
        let rule = Arc::new(rule);
        match self.index.get(&key) {
            Some(&id) => {
                self.rules[id] = rule;
                false
            }
            None => {
                self.index.insert(key, self.rules.len());
                self.rules.push(rule);
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Arc<T>> {
        self.index.get(key).and_then(|&id| self.rules.get(id))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Rules in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rebuild the index with `key_of`, keeping every rule's position.
    ///
    /// A rule without a key stays reachable by iteration only. On a collision
    /// the earlier rule keeps the key. Returns the number of unindexed rules.
    pub fn reindex(&mut self, mut key_of: impl FnMut(&T) -> Option<String>) -> usize {
        let mut index = HashMap::with_capacity(self.rules.len());
        let mut unindexed = 0;
        for (id, rule) in self.rules.iter().enumerate() {
            match key_of(rule) {
                Some(key) => {
                    index.entry(key).or_insert(id);
                }
                None => unindexed += 1,
            }
        }
        self.index = index;
        unindexed
    }

    /// `true` when something was removed.
    pub fn clear(&mut self) -> bool {
        let had_any = !self.rules.is_empty();
        self.rules.clear();
        self.index.clear();
        had_any
    }
}
