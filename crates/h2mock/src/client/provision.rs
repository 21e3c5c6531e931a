//! Client provisions: outbound request templates keyed by `inState#id`,
//! plus the current state of every provision id.

use crate::error::{LoadError, LoadResult};
use crate::json::Headers;
use crate::key::{DEFAULT_STATE, ROAD_CLOSED_STATE};
use crate::provision::{documents, RuleArena};
use crate::transform::{parse_list, TransformDocument, TransformMode, Transformation};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// `client_provision` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProvisionDocument {
    pub id: String,
    pub endpoint: String,
    pub request_method: String,
    #[serde(default)]
    pub request_uri: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub request_headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    #[serde(default)]
    pub request_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_in_state")]
    pub in_state: String,
    #[serde(default = "default_out_state")]
    pub out_state: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transform: Vec<TransformDocument>,
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_in_state() -> String {
    DEFAULT_STATE.to_string()
}

fn default_out_state() -> String {
    ROAD_CLOSED_STATE.to_string()
}

/// Key of a client provision: `inState#id`.
pub fn client_provision_key(in_state: &str, id: &str) -> String {
    format!("{in_state}#{id}")
}

#[derive(Debug)]
pub struct ClientProvision {
    headers: Headers,
    transformations: Vec<Transformation>,
    document: ClientProvisionDocument,
}

impl ClientProvision {
    pub fn from_json(value: &Value) -> Result<Self, LoadError> {
        let document: ClientProvisionDocument = serde_json::from_value(value.clone())
            .map_err(|e| LoadError::BadSchema(e.to_string()))?;
        if document.id.is_empty() || document.endpoint.is_empty() {
            return Err(LoadError::BadSchema(
                "client provision 'id' and 'endpoint' must not be empty".into(),
            ));
        }
        if document.in_state == ROAD_CLOSED_STATE {
            return Err(LoadError::content(format!(
                "client provision '{}' cannot start from '{ROAD_CLOSED_STATE}'",
                document.id
            )));
        }
        let transformations = parse_list(document.transform.clone(), TransformMode::Client)?;
        Ok(Self {
            headers: document
                .request_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            transformations,
            document,
        })
    }

    pub fn key(&self) -> String {
        client_provision_key(&self.document.in_state, &self.document.id)
    }

    pub fn id(&self) -> &str {
        &self.document.id
    }

    pub fn endpoint(&self) -> &str {
        &self.document.endpoint
    }

    pub fn method(&self) -> &str {
        &self.document.request_method
    }

    pub fn uri(&self) -> &str {
        &self.document.request_uri
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> Option<&Value> {
        self.document.request_body.as_ref()
    }

    pub fn delay_ms(&self) -> u64 {
        self.document.request_delay_ms
    }

    pub fn timeout_ms(&self) -> u64 {
        self.document.timeout_ms
    }

    pub fn in_state(&self) -> &str {
        &self.document.in_state
    }

    pub fn out_state(&self) -> &str {
        &self.document.out_state
    }

    pub fn transformations(&self) -> &[Transformation] {
        &self.transformations
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.document).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct ClientProvisionStore {
    provisions: RwLock<RuleArena<ClientProvision>>,
    states: RwLock<HashMap<String, String>>,
}

impl ClientProvisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load one provision or an array. All-or-nothing.
    pub fn load(&self, value: &Value) -> Result<LoadResult, LoadError> {
        let parsed = documents(value)
            .into_iter()
            .map(ClientProvision::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        if parsed.is_empty() {
            return Err(LoadError::BadSchema("empty client provision array".into()));
        }

        let mut provisions = self.provisions.write();
        let mut updated = false;
        for provision in parsed {
            updated |= !provisions.upsert(provision.key(), provision);
        }
        Ok(if updated {
            LoadResult::Accepted
        } else {
            LoadResult::Success
        })
    }

    pub fn get(&self, in_state: &str, id: &str) -> Option<Arc<ClientProvision>> {
        self.provisions
            .read()
            .get(&client_provision_key(in_state, id))
            .cloned()
    }

    /// Whether any state of `id` is provisioned.
    pub fn has_id(&self, id: &str) -> bool {
        self.provisions.read().iter().any(|p| p.id() == id)
    }

    /// Current state of provision `id` (`initial` until it first fires).
    pub fn state_of(&self, id: &str) -> String {
        self.states
            .read()
            .get(id)
            .cloned()
            .unwrap_or_else(|| DEFAULT_STATE.to_string())
    }

    pub fn set_state(&self, id: &str, state: impl Into<String>) {
        self.states.write().insert(id.to_string(), state.into());
    }

    /// Forget the state of `id` (back to `initial`).
    pub fn reset_state(&self, id: &str) -> bool {
        self.states.write().remove(id).is_some()
    }

    /// Drop every provision and state.
    pub fn clear(&self) -> bool {
        let removed = self.provisions.write().clear();
        self.states.write().clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.provisions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.provisions.read().is_empty()
    }

    pub fn dump(&self) -> Value {
        Value::Array(self.provisions.read().iter().map(|p| p.to_json()).collect())
    }
}
