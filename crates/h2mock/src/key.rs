//! Canonical addressing for conversations and provisioning rules.

use serde::Serialize;
use std::fmt;

/// State every conversation starts in.
pub const DEFAULT_STATE: &str = "initial";
/// Terminal state of client provisions: no further triggers are accepted.
pub const ROAD_CLOSED_STATE: &str = "road-closed";
/// Output state that wipes the key's history once the response is computed.
pub const PURGE_STATE: &str = "purge";

/// Identity of a conversation thread: `[endpoint#]method#uri`.
///
/// The URI is expected to be normalised already (see
/// [`crate::matching::MatchingConfig::normalize`]); two keys are equal when
/// their tuples are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataKey {
    endpoint: Option<String>,
    method: String,
    uri: String,
}

impl DataKey {
    /// Key for a server-side (inbound) conversation.
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            endpoint: None,
            method: method.into(),
            uri: uri.into(),
        }
    }

    /// Key for a client-side (outbound) conversation towards `endpoint`.
    pub fn client(
        endpoint: impl Into<String>,
        method: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            method: method.into(),
            uri: uri.into(),
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Deterministic string form used for hashing and logs.
    pub fn as_key(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}#{}#{}", endpoint, self.method, self.uri),
            None => format!("{}#{}", self.method, self.uri),
        }
    }

    /// JSON object naming this key (`method`, `uri`, optional `clientEndpoint`).
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        if let Some(endpoint) = &self.endpoint {
            object.insert("clientEndpoint".to_string(), endpoint.clone().into());
        }
        object.insert("method".to_string(), self.method.clone().into());
        object.insert("uri".to_string(), self.uri.clone().into());
        serde_json::Value::Object(object)
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

impl Serialize for DataKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Direct-index key of a provisioning rule: `inState#method#uri`.
pub fn provision_key(in_state: &str, method: &str, uri: &str) -> String {
    format!("{in_state}#{method}#{uri}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_key_format() {
        let key = DataKey::new("GET", "/status");
        assert_eq!(key.as_key(), "GET#/status");
        assert_eq!(key.endpoint(), None);
        assert_eq!(key.to_string(), "GET#/status");
    }

    #[test]
    fn test_client_key_format() {
        let key = DataKey::client("backend", "POST", "/orders");
        assert_eq!(key.as_key(), "backend#POST#/orders");
        assert_eq!(key.endpoint(), Some("backend"));
    }

    #[test]
    fn test_keys_compare_by_tuple() {
        assert_eq!(DataKey::new("GET", "/a"), DataKey::new("GET", "/a"));
        assert_ne!(DataKey::new("GET", "/a"), DataKey::new("PUT", "/a"));
        assert_ne!(
            DataKey::new("GET", "/a"),
            DataKey::client("ep", "GET", "/a")
        );
    }

    #[test]
    fn test_key_json() {
        let json = DataKey::client("ep", "GET", "/a").to_json();
        assert_eq!(json["clientEndpoint"], "ep");
        assert_eq!(json["method"], "GET");
        assert_eq!(json["uri"], "/a");
        assert!(DataKey::new("GET", "/a").to_json().get("clientEndpoint").is_none());
    }

    #[test]
    fn test_provision_key() {
        assert_eq!(provision_key("initial", "GET", "/x"), "initial#GET#/x");
    }
}
