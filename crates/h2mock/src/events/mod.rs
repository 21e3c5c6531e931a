//! Event store: per-key request/response history.
//!
//! The store is both the verification surface for test harnesses and the
//! state tracker: the state of a conversation is the state of the last event
//! recorded under its key.

mod event;
mod history;

pub use event::{ClientExchange, MockEvent, VirtualOrigin};
pub use history::EventsHistory;

#[cfg(test)]
pub(crate) use event::sample_event;

use crate::error::SelectorError;
use crate::key::{DataKey, DEFAULT_STATE};
use indexmap::map::Entry;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use serde_json_path::JsonPath;
use std::sync::Arc;
use tracing::{debug, warn};

/// How much history is kept per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetentionPolicy {
    /// Every event is appended.
    #[default]
    Unbounded,
    /// A single slot per key, overwritten by each new event.
    LatestOnly,
}

/// Addresses what [`EventStore::clear`] removes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSelector {
    key: Option<DataKey>,
    index: Option<usize>,
    reverse: bool,
}

impl EventSelector {
    /// Whole store.
    pub fn all() -> Self {
        Self::default()
    }

    /// Every event of one key.
    pub fn key(key: DataKey) -> Self {
        Self {
            key: Some(key),
            ..Self::default()
        }
    }

    /// Build from loose parts, as an administrative query string would give them.
    pub fn new(
        key: Option<DataKey>,
        index: Option<usize>,
        reverse: bool,
    ) -> Result<Self, SelectorError> {
        match (&key, index) {
            (None, Some(i)) => Err(SelectorError::IndexWithoutKey(i)),
            (_, Some(0)) => Err(SelectorError::ZeroIndex),
            _ => Ok(Self {
                key,
                index,
                reverse,
            }),
        }
    }
}

/// Concurrent, insertion-ordered `DataKey → EventsHistory` map.
#[derive(Debug, Default)]
pub struct EventStore {
    histories: RwLock<IndexMap<DataKey, Arc<EventsHistory>>>,
    retention: RwLock<RetentionPolicy>,
}

impl EventStore {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            histories: RwLock::new(IndexMap::new()),
            retention: RwLock::new(retention),
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        *self.retention.read()
    }

    /// Takes effect on the next recorded event; existing histories are kept.
    pub fn set_retention(&self, retention: RetentionPolicy) {
        *self.retention.write() = retention;
        debug!(?retention, "event retention changed");
    }

    /// Record `event` under `key`, creating the key's history on first use.
    pub fn record(&self, key: DataKey, event: MockEvent) {
        let retention = self.retention();
        let event = Arc::new(event);

        {
            let histories = self.histories.read();
            if let Some(history) = histories.get(&key) {
                history.record(event, retention);
                return;
            }
        }

        let maiden = Arc::new(EventsHistory::new(key.clone(), Arc::clone(&event)));
        let mut histories = self.histories.write();
        match histories.entry(key) {
            // Lost the race against another first event for this key.
            Entry::Occupied(entry) => entry.get().record(event, retention),
            Entry::Vacant(entry) => {
                debug!(key = %entry.key(), "new event history");
                entry.insert(maiden);
            }
        }
    }

    pub fn history(&self, key: &DataKey) -> Option<Arc<EventsHistory>> {
        self.histories.read().get(key).cloned()
    }

    pub fn contains(&self, key: &DataKey) -> bool {
        self.histories.read().contains_key(key)
    }

    /// 1-based; `reverse` counts from the most recent. Index 0 yields `None`.
    pub fn get_event(&self, key: &DataKey, index: usize, reverse: bool) -> Option<Arc<MockEvent>> {
        self.history(key)?.get(index, reverse)
    }

    /// Remove one event. A key whose last event goes is removed too.
    pub fn remove_event(&self, key: &DataKey, index: usize, reverse: bool) -> bool {
        let mut histories = self.histories.write();
        let Some(history) = histories.get(key) else {
            return false;
        };
        match history.remove(index, reverse) {
            Some(0) => {
                histories.shift_remove(key);
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Remove a whole key; `true` when it existed.
    pub fn remove_key(&self, key: &DataKey) -> bool {
        self.histories.write().shift_remove(key).is_some()
    }

    /// Clear what `selector` names; `true` when something was removed.
    pub fn clear(&self, selector: &EventSelector) -> bool {
        match (&selector.key, selector.index) {
            (None, _) => {
                let mut histories = self.histories.write();
                let had_any = !histories.is_empty();
                histories.clear();
                had_any
            }
            (Some(key), None) => self.remove_key(key),
            (Some(key), Some(index)) => self.remove_event(key, index, selector.reverse),
        }
    }

    /// State of the last event for `key`, or `"initial"`.
    pub fn find_last_registered_state(&self, key: &DataKey) -> String {
        self.history(key)
            .and_then(|h| h.last_state())
            .filter(|state| !state.is_empty())
            .unwrap_or_else(|| DEFAULT_STATE.to_string())
    }

    pub fn key_count(&self) -> usize {
        self.histories.read().len()
    }

    pub fn event_count(&self) -> usize {
        self.histories.read().values().map(|h| h.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.read().is_empty()
    }

    /// Totals plus per-key counts for at most `max_keys` keys, in insertion order.
    pub fn summary(&self, max_keys: usize) -> Value {
        let histories = self.histories.read();
        let mut total_events = 0;
        let mut list = Vec::with_capacity(histories.len().min(max_keys));
        for (position, history) in histories.values().enumerate() {
            let amount = history.len();
            total_events += amount;
            if position < max_keys {
                let mut entry = history.key().to_json();
                if let Value::Object(map) = &mut entry {
                    map.insert("amount".to_string(), json!(amount));
                }
                list.push(entry);
            }
        }
        json!({
            "totalKeys": histories.len(),
            "totalEvents": total_events,
            "displayedKeys": {
                "amount": list.len(),
                "list": list,
            }
        })
    }

    /// Full dump of every key, or of `key` alone (empty array when unknown).
    pub fn dump(&self, key: Option<&DataKey>) -> Value {
        let histories = self.histories.read();
        let dumped: Vec<Value> = match key {
            Some(key) => histories.get(key).map(|h| h.to_json()).into_iter().collect(),
            None => histories.values().map(|h| h.to_json()).collect(),
        };
        Value::Array(dumped)
    }

    /// One event (or part of it) as JSON.
    ///
    /// `path` is a JSON pointer, or a JSONPath expression when it starts
    /// with `$` (the first match is returned). No path returns the event.
    pub fn query(
        &self,
        key: &DataKey,
        index: usize,
        reverse: bool,
        path: Option<&str>,
    ) -> Option<Value> {
        let event = self.get_event(key, index, reverse)?.to_json();
        match path {
            None | Some("") => Some(event),
            Some(path) if path.starts_with('$') => {
                let compiled = match JsonPath::parse(path) {
                    Ok(compiled) => compiled,
                    Err(e) => {
                        warn!(path, "invalid JSONPath in event query: {}", e);
                        return None;
                    }
                };
                compiled.query(&event).all().into_iter().next().cloned()
            }
            Some(pointer) => event.pointer(pointer).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn store_with(key: &DataKey, states: &[&str]) -> EventStore {
        let store = EventStore::new(RetentionPolicy::Unbounded);
        for state in states {
            store.record(key.clone(), sample_event(state));
        }
        store
    }

    #[test]
    fn test_unknown_key_is_initial() {
        let store = EventStore::default();
        assert_eq!(
            store.find_last_registered_state(&DataKey::new("GET", "/x")),
            "initial"
        );
    }

    #[test]
    fn test_last_state_follows_latest_event() {
        let key = DataKey::new("GET", "/x");
        let store = store_with(&key, &["one", "two"]);
        assert_eq!(store.find_last_registered_state(&key), "two");
    }

    #[test]
    fn test_empty_state_reads_as_initial() {
        let key = DataKey::new("GET", "/x");
        let store = store_with(&key, &["one", ""]);
        assert_eq!(store.find_last_registered_state(&key), "initial");
    }

    #[test]
    fn test_unbounded_keeps_every_event() {
        let key = DataKey::new("GET", "/x");
        let store = store_with(&key, &["a", "b", "c", "d"]);
        assert_eq!(store.history(&key).unwrap().len(), 4);
        assert_eq!(store.event_count(), 4);
    }

    #[test]
    fn test_latest_only_keeps_last_event() {
        let key = DataKey::new("GET", "/x");
        let store = EventStore::new(RetentionPolicy::LatestOnly);
        for state in ["a", "b", "c"] {
            store.record(key.clone(), sample_event(state));
        }
        let history = store.history(&key).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.get(1, false).unwrap().state, "c");
        assert_eq!(store.find_last_registered_state(&key), "c");
    }

    #[test]
    fn test_retention_switch_at_runtime() {
        let key = DataKey::new("GET", "/x");
        let store = store_with(&key, &["a", "b"]);
        store.set_retention(RetentionPolicy::LatestOnly);
        store.record(key.clone(), sample_event("c"));
        assert_eq!(store.history(&key).unwrap().len(), 1);
        store.set_retention(RetentionPolicy::Unbounded);
        store.record(key.clone(), sample_event("d"));
        assert_eq!(store.history(&key).unwrap().len(), 2);
    }

    #[test]
    fn test_remove_last_event_removes_key() {
        let key = DataKey::new("GET", "/x");
        let store = store_with(&key, &["a"]);
        assert!(store.remove_event(&key, 1, false));
        assert!(!store.contains(&key));
        assert!(store.get_event(&key, 1, false).is_none());
        assert!(!store.remove_event(&key, 1, false));
    }

    #[test]
    fn test_remove_event_with_invalid_index() {
        let key = DataKey::new("GET", "/x");
        let store = store_with(&key, &["a", "b"]);
        assert!(!store.remove_event(&key, 0, false));
        assert!(!store.remove_event(&key, 3, true));
        assert!(store.remove_event(&key, 1, true));
        assert_eq!(store.find_last_registered_state(&key), "a");
    }

    #[test]
    fn test_clear_selectors() {
        let a = DataKey::new("GET", "/a");
        let b = DataKey::new("GET", "/b");
        let store = store_with(&a, &["1", "2"]);
        store.record(b.clone(), sample_event("x"));

        let one = EventSelector::new(Some(a.clone()), Some(1), false).unwrap();
        assert!(store.clear(&one));
        assert_eq!(store.history(&a).unwrap().len(), 1);

        assert!(store.clear(&EventSelector::key(b.clone())));
        assert!(!store.contains(&b));

        assert!(store.clear(&EventSelector::all()));
        assert!(store.is_empty());
        assert!(!store.clear(&EventSelector::all()));
    }

    #[test]
    fn test_selector_validation() {
        assert_eq!(
            EventSelector::new(None, Some(2), false).unwrap_err(),
            SelectorError::IndexWithoutKey(2)
        );
        assert_eq!(
            EventSelector::new(Some(DataKey::new("GET", "/")), Some(0), false).unwrap_err(),
            SelectorError::ZeroIndex
        );
    }

    #[test]
    fn test_summary_caps_listing() {
        let store = EventStore::default();
        for i in 0..5 {
            let key = DataKey::new("GET", format!("/k{i}"));
            for _ in 0..=i {
                store.record(key.clone(), sample_event("s"));
            }
        }
        let summary = store.summary(2);
        assert_eq!(summary["totalKeys"], 5);
        assert_eq!(summary["totalEvents"], 15);
        assert_eq!(summary["displayedKeys"]["amount"], 2);
        assert_eq!(summary["displayedKeys"]["list"][0]["uri"], "/k0");
        assert_eq!(summary["displayedKeys"]["list"][1]["amount"], 2);
    }

    #[test]
    fn test_dump_single_and_all() {
        let a = DataKey::new("GET", "/a");
        let store = store_with(&a, &["1"]);
        store.record(DataKey::new("PUT", "/b"), sample_event("2"));
        assert_eq!(store.dump(None).as_array().unwrap().len(), 2);
        let single = store.dump(Some(&a));
        assert_eq!(single[0]["method"], "GET");
        assert_eq!(single[0]["events"][0]["state"], "1");
        assert_eq!(store.dump(Some(&DataKey::new("GET", "/none"))), json!([]));
    }

    #[test]
    fn test_query_pointer_and_jsonpath() {
        let key = DataKey::new("GET", "/q");
        let store = store_with(&key, &["first", "second"]);
        assert_eq!(
            store.query(&key, 1, false, Some("/state")),
            Some(json!("first"))
        );
        assert_eq!(
            store.query(&key, 1, true, Some("$.responseBody.state")),
            Some(json!("second"))
        );
        assert_eq!(store.query(&key, 1, true, Some("/missing")), None);
        assert_eq!(store.query(&key, 1, true, Some("$[")), None);
        assert_eq!(store.query(&key, 1, true, None).unwrap()["state"], "second");
    }

    #[test]
    fn test_concurrent_first_events_do_not_duplicate_keys() {
        let store = Arc::new(EventStore::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..50 {
                        store.record(DataKey::new("GET", format!("/k{}", i % 5)), sample_event("s"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.key_count(), 5);
        assert_eq!(store.event_count(), 400);
    }
}
