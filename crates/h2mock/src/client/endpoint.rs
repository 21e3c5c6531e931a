//! Remote endpoints the client role may send to.

use crate::error::{LoadError, LoadResult};
use crate::provision::documents;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `client_endpoint` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEndpoint {
    pub id: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_permit")]
    pub permit: bool,
}

fn default_permit() -> bool {
    true
}

impl ClientEndpoint {
    /// `http[s]://host:port`
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: RwLock<IndexMap<String, ClientEndpoint>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one endpoint or an array. All-or-nothing.
    pub fn load(&self, value: &Value) -> Result<LoadResult, LoadError> {
        let parsed = documents(value)
            .into_iter()
            .map(|item| {
                let endpoint: ClientEndpoint = serde_json::from_value(item.clone())
                    .map_err(|e| LoadError::BadSchema(e.to_string()))?;
                if endpoint.id.is_empty() || endpoint.host.is_empty() {
                    return Err(LoadError::BadSchema(
                        "endpoint 'id' and 'host' must not be empty".into(),
                    ));
                }
                Ok(endpoint)
            })
            .collect::<Result<Vec<_>, _>>()?;
        if parsed.is_empty() {
            return Err(LoadError::BadSchema("empty endpoint array".into()));
        }

        let mut endpoints = self.endpoints.write();
        let mut updated = false;
        for endpoint in parsed {
            updated |= endpoints.insert(endpoint.id.clone(), endpoint).is_some();
        }
        Ok(if updated {
            LoadResult::Accepted
        } else {
            LoadResult::Success
        })
    }

    pub fn get(&self, id: &str) -> Option<ClientEndpoint> {
        self.endpoints.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> bool {
        self.endpoints.write().shift_remove(id).is_some()
    }

    pub fn clear(&self) -> bool {
        let mut endpoints = self.endpoints.write();
        let had_any = !endpoints.is_empty();
        endpoints.clear();
        had_any
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    pub fn dump(&self) -> Value {
        Value::Array(
            self.endpoints
                .read()
                .values()
                .filter_map(|e| serde_json::to_value(e).ok())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_and_url() {
        let registry = EndpointRegistry::new();
        assert_eq!(
            registry
                .load(&json!({"id": "be", "host": "localhost", "port": 8000}))
                .unwrap(),
            LoadResult::Success
        );
        let endpoint = registry.get("be").unwrap();
        assert!(!endpoint.secure);
        assert!(endpoint.permit);
        assert_eq!(endpoint.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_reload_is_accepted() {
        let registry = EndpointRegistry::new();
        registry
            .load(&json!([{"id": "a", "host": "h", "port": 1}, {"id": "b", "host": "h", "port": 2}]))
            .unwrap();
        assert_eq!(
            registry
                .load(&json!({"id": "a", "host": "h2", "port": 3, "secure": true}))
                .unwrap(),
            LoadResult::Accepted
        );
        assert_eq!(registry.get("a").unwrap().base_url(), "https://h2:3");
        assert_eq!(registry.dump()[0]["id"], "a");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_bad_documents() {
        let registry = EndpointRegistry::new();
        assert!(registry.load(&json!({"id": "a"})).is_err());
        assert!(registry.load(&json!({"id": "", "host": "h", "port": 1})).is_err());
        assert!(registry
            .load(&json!([{"id": "ok", "host": "h", "port": 1}, {"id": "bad"}]))
            .is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let registry = EndpointRegistry::new();
        registry.load(&json!({"id": "a", "host": "h", "port": 1})).unwrap();
        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert!(!registry.clear());
    }
}
