//! Per-key event history.

use super::event::MockEvent;
use super::RetentionPolicy;
use crate::key::DataKey;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

/// Ordered events of one [`DataKey`]. Never empty while it sits in a store.
#[derive(Debug)]
pub struct EventsHistory {
    key: DataKey,
    events: RwLock<Vec<Arc<MockEvent>>>,
}

impl EventsHistory {
    /// "Maiden" history holding its first event.
    pub fn new(key: DataKey, first: Arc<MockEvent>) -> Self {
        Self {
            key,
            events: RwLock::new(vec![first]),
        }
    }

    pub fn key(&self) -> &DataKey {
        &self.key
    }

    /// Append, or overwrite the single slot under `LatestOnly`.
    pub fn record(&self, event: Arc<MockEvent>, policy: RetentionPolicy) {
        let mut events = self.events.write();
        match policy {
            RetentionPolicy::Unbounded => events.push(event),
            RetentionPolicy::LatestOnly => {
                if events.len() == 1 {
                    events[0] = event;
                } else {
                    events.clear();
                    events.push(event);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// 1-based access; `reverse` counts from the most recent.
    pub fn get(&self, index: usize, reverse: bool) -> Option<Arc<MockEvent>> {
        let events = self.events.read();
        let position = position(events.len(), index, reverse)?;
        events.get(position).cloned()
    }

    /// Remove one event; `Some(remaining)` on success.
    pub fn remove(&self, index: usize, reverse: bool) -> Option<usize> {
        let mut events = self.events.write();
        let position = position(events.len(), index, reverse)?;
        events.remove(position);
        Some(events.len())
    }

    pub fn last_state(&self) -> Option<String> {
        self.events.read().last().map(|e| e.state.clone())
    }

    pub fn events_json(&self) -> Value {
        Value::Array(self.events.read().iter().map(|e| e.to_json()).collect())
    }

    /// Key fields plus `events`.
    pub fn to_json(&self) -> Value {
        let mut json = self.key.to_json();
        if let Value::Object(map) = &mut json {
            map.insert("events".to_string(), self.events_json());
        }
        json
    }
}

fn position(len: usize, index: usize, reverse: bool) -> Option<usize> {
    if index == 0 || index > len {
        return None;
    }
    Some(if reverse { len - index } else { index - 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::sample_event;

    fn history_with(states: &[&str]) -> EventsHistory {
        let history = EventsHistory::new(DataKey::new("GET", "/h"), Arc::new(sample_event(states[0])));
        for state in &states[1..] {
            history.record(Arc::new(sample_event(state)), RetentionPolicy::Unbounded);
        }
        history
    }

    #[test]
    fn test_position_math() {
        assert_eq!(position(3, 0, false), None);
        assert_eq!(position(3, 1, false), Some(0));
        assert_eq!(position(3, 1, true), Some(2));
        assert_eq!(position(3, 3, true), Some(0));
        assert_eq!(position(3, 4, false), None);
    }

    #[test]
    fn test_get_forward_and_reverse() {
        let history = history_with(&["a", "b", "c"]);
        assert_eq!(history.get(1, false).unwrap().state, "a");
        assert_eq!(history.get(1, true).unwrap().state, "c");
        assert_eq!(history.get(2, true).unwrap().state, "b");
        assert!(history.get(0, false).is_none());
        assert!(history.get(4, false).is_none());
    }

    #[test]
    fn test_latest_only_overwrites() {
        let history = history_with(&["a"]);
        history.record(Arc::new(sample_event("b")), RetentionPolicy::LatestOnly);
        assert_eq!(history.len(), 1);
        assert_eq!(history.last_state(), Some("b".to_string()));
    }

    #[test]
    fn test_latest_only_collapses_existing_history() {
        let history = history_with(&["a", "b", "c"]);
        history.record(Arc::new(sample_event("d")), RetentionPolicy::LatestOnly);
        assert_eq!(history.len(), 1);
        assert_eq!(history.get(1, false).unwrap().state, "d");
    }

    #[test]
    fn test_remove_reports_remaining() {
        let history = history_with(&["a", "b"]);
        assert_eq!(history.remove(1, true), Some(1));
        assert_eq!(history.last_state(), Some("a".to_string()));
        assert_eq!(history.remove(5, false), None);
        assert_eq!(history.remove(1, false), Some(0));
        assert!(history.is_empty());
    }

    #[test]
    fn test_to_json_includes_key() {
        let history = history_with(&["a", "b"]);
        let json = history.to_json();
        assert_eq!(json["method"], "GET");
        assert_eq!(json["uri"], "/h");
        assert_eq!(json["events"].as_array().unwrap().len(), 2);
    }
}
