//! Provision store: server rules indexed by `inState#method#uri` and kept
//! in load order, so every matching algorithm can run over the same data.

mod arena;
mod rule;

pub use arena::RuleArena;
pub use rule::{ProvisionDocument, ProvisionRule};

use crate::error::{LoadError, LoadResult};
use crate::key::provision_key;
use crate::matching::{Algorithm, MatchingConfig};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Accepts a single document or an array of them.
pub(crate) fn documents(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    }
}

#[derive(Debug, Default)]
pub struct ProvisionStore {
    rules: RwLock<RuleArena<ProvisionRule>>,
}

impl ProvisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one rule or an array of rules.
    ///
    /// Arrays are all-or-nothing: every element is parsed before any is
    /// stored. `Accepted` when at least one key already existed.
    pub fn load(&self, value: &Value, matching: &MatchingConfig) -> Result<LoadResult, LoadError> {
        let items = documents(value);
        if items.is_empty() {
            return Err(LoadError::BadSchema("empty provision array".into()));
        }
        let parsed = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                ProvisionRule::from_json(item, matching).map_err(|e| match e {
                    LoadError::BadSchema(m) => LoadError::BadSchema(format!("provision[{i}]: {m}")),
                    LoadError::BadContent(m) => {
                        LoadError::BadContent(format!("provision[{i}]: {m}"))
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut rules = self.rules.write();
        let mut updated = false;
        for rule in parsed {
            let key = rule.key().to_string();
            debug!(key = %key, "provision stored");
            updated |= !rules.upsert(key, rule);
        }
        Ok(if updated {
            LoadResult::Accepted
        } else {
            LoadResult::Success
        })
    }

    /// Resolve the rule for a request under `matching`.
    ///
    /// `uri` must already be query-normalised.
    pub fn find(
        &self,
        matching: &MatchingConfig,
        state: &str,
        method: &str,
        uri: &str,
    ) -> Option<Arc<ProvisionRule>> {
        let rules = self.rules.read();
        match matching.algorithm() {
            Algorithm::FullMatching => rules.get(&provision_key(state, method, uri)).cloned(),
            Algorithm::FullMatchingRegexReplace => {
                let rewritten = matching.rewrite(uri);
                rules.get(&provision_key(state, method, &rewritten)).cloned()
            }
            Algorithm::PriorityMatchingRegex => rules
                .iter()
                .find(|rule| rule.matches_pattern(state, method, uri))
                .cloned(),
        }
    }

    /// Re-key the direct index for a new matching configuration.
    ///
    /// Load order is untouched. A rule whose URI no longer normalises is left
    /// out of the index and can only be reached by the priority scan.
    pub fn rekey(&self, matching: &MatchingConfig) {
        let mut rules = self.rules.write();
        let unindexed = rules.reindex(|rule| match rule.key_under(matching) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(uri = %rule.uri(), "provision not indexed: {}", e);
                None
            }
        });
        debug!(rules = rules.len(), unindexed, "provision index rebuilt");
    }

    pub fn get(&self, key: &str) -> Option<Arc<ProvisionRule>> {
        self.rules.read().get(key).cloned()
    }

    /// `true` when something was removed.
    pub fn clear(&self) -> bool {
        self.rules.write().clear()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// Loaded documents in load order; `unused_only` keeps rules never matched.
    pub fn dump(&self, unused_only: bool) -> Value {
        let rules = self.rules.read();
        Value::Array(
            rules
                .iter()
                .filter(|rule| !unused_only || !rule.is_employed())
                .map(|rule| rule.to_json())
                .collect(),
        )
    }
}
