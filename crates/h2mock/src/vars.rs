//! Global variable store shared by every transformation.

use crate::error::LoadError;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

/// Flat string → string map.
///
/// Writers are serialised by the lock; the last committed write wins.
#[derive(Debug, Default)]
pub struct GlobalVariables {
    vars: RwLock<IndexMap<String, String>>,
}

impl GlobalVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load a `{ "name": "value", ... }` document.
    ///
    /// Returns `true` when at least one existing variable was overwritten.
    pub fn load(&self, document: &Value) -> Result<bool, LoadError> {
        let object = document
            .as_object()
            .ok_or_else(|| LoadError::BadSchema("global variables must be an object".into()))?;

        let mut parsed = Vec::with_capacity(object.len());
        for (name, value) in object {
            let value = value.as_str().ok_or_else(|| {
                LoadError::BadSchema(format!("global variable '{name}' must be a string"))
            })?;
            parsed.push((name.clone(), value.to_string()));
        }

        let mut vars = self.vars.write();
        let mut overwritten = false;
        for (name, value) in parsed {
            overwritten |= vars.insert(name, value).is_some();
        }
        debug!(count = object.len(), overwritten, "global variables loaded");
        Ok(overwritten)
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.vars.read().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.write().insert(name.into(), value.into());
    }

    pub fn remove(&self, name: &str) -> bool {
        self.vars.write().shift_remove(name).is_some()
    }

    /// Remove everything; `true` when something was removed.
    pub fn clear(&self) -> bool {
        let mut vars = self.vars.write();
        let had_any = !vars.is_empty();
        vars.clear();
        had_any
    }

    pub fn len(&self) -> usize {
        self.vars.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.read().is_empty()
    }

    /// `true` when `name` is defined and not empty.
    pub fn is_truthy(&self, name: &str) -> bool {
        self.vars
            .read()
            .get(name)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    pub fn to_json(&self) -> Value {
        let vars = self.vars.read();
        Value::Object(
            vars.iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}
