//! Server provisioning rule.

use crate::error::{LoadError, QueryError};
use crate::json::Headers;
use crate::key::{provision_key, DEFAULT_STATE};
use crate::matching::{Algorithm, MatchingConfig};
use crate::transform::{parse_list, TransformDocument, TransformMode, Transformation};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// `server_provision` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionDocument {
    pub request_method: String,
    #[serde(default)]
    pub request_uri: String,
    pub response_code: u16,
    #[serde(default = "default_state")]
    pub in_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_state: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub response_headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Value>,
    #[serde(default)]
    pub response_delay_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transform: Vec<TransformDocument>,
}

fn default_state() -> String {
    DEFAULT_STATE.to_string()
}

/// A loaded rule. Immutable apart from the `employed` flag.
#[derive(Debug)]
pub struct ProvisionRule {
    key: String,
    in_state: String,
    out_state: String,
    method: String,
    uri: String,
    uri_regex: Option<Regex>,
    response_code: u16,
    response_headers: Headers,
    response_body: Option<Value>,
    response_delay_ms: u64,
    transformations: Vec<Transformation>,
    employed: AtomicBool,
    document: ProvisionDocument,
}

impl ProvisionRule {
    /// Build a rule under the active matching configuration.
    ///
    /// Only the index key depends on `matching`; the rule itself keeps the
    /// URI as written so the store can re-key it when matching changes.
    pub fn from_document(
        document: ProvisionDocument,
        matching: &MatchingConfig,
    ) -> Result<Self, LoadError> {
        if document.request_method.is_empty() {
            return Err(LoadError::BadSchema("'requestMethod' must not be empty".into()));
        }
        if !(100..=599).contains(&document.response_code) {
            return Err(LoadError::BadSchema(format!(
                "'responseCode' {} is not a valid status",
                document.response_code
            )));
        }

        let priority = matching.algorithm() == Algorithm::PriorityMatchingRegex;
        let key = index_key(
            &document.in_state,
            &document.request_method,
            &document.request_uri,
            matching,
        )
        .map_err(|e| LoadError::content(format!("'requestUri': {e}")))?;

        let uri_regex = match Regex::new(&format!("^(?:{})$", document.request_uri)) {
            Ok(regex) => Some(regex),
            Err(e) if priority => {
                return Err(LoadError::content(format!(
                    "'requestUri' is not a valid regex: {e}"
                )))
            }
            Err(e) => {
                debug!(uri = %document.request_uri, "requestUri kept literal only: {}", e);
                None
            }
        };

        let transformations = parse_list(document.transform.clone(), TransformMode::Server)?;
        let out_state = document
            .out_state
            .clone()
            .unwrap_or_else(|| document.in_state.clone());

        Ok(Self {
            key,
            in_state: document.in_state.clone(),
            out_state,
            method: document.request_method.clone(),
            uri: document.request_uri.clone(),
            uri_regex,
            response_code: document.response_code,
            response_headers: document
                .response_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            response_body: document.response_body.clone(),
            response_delay_ms: document.response_delay_ms,
            transformations,
            employed: AtomicBool::new(false),
            document,
        })
    }

    pub fn from_json(value: &Value, matching: &MatchingConfig) -> Result<Self, LoadError> {
        let document: ProvisionDocument = serde_json::from_value(value.clone())
            .map_err(|e| LoadError::BadSchema(e.to_string()))?;
        Self::from_document(document, matching)
    }

    /// `inState#method#uri` under the matching it was loaded with.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn in_state(&self) -> &str {
        &self.in_state
    }

    pub fn out_state(&self) -> &str {
        &self.out_state
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// `requestUri` as written in the document.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Index key for this rule under `matching`.
    pub fn key_under(&self, matching: &MatchingConfig) -> Result<String, QueryError> {
        index_key(&self.in_state, &self.method, &self.uri, matching)
    }

    pub fn response_code(&self) -> u16 {
        self.response_code
    }

    pub fn response_headers(&self) -> &Headers {
        &self.response_headers
    }

    pub fn response_body(&self) -> Option<&Value> {
        self.response_body.as_ref()
    }

    pub fn response_delay_ms(&self) -> u64 {
        self.response_delay_ms
    }

    pub fn transformations(&self) -> &[Transformation] {
        &self.transformations
    }

    /// Priority-scan predicate: same state and method, whole-URI regex match.
    pub fn matches_pattern(&self, state: &str, method: &str, uri: &str) -> bool {
        self.in_state == state
            && self.method == method
            && self
                .uri_regex
                .as_ref()
                .map(|regex| regex.is_match(uri))
                .unwrap_or(false)
    }

    /// Flag the rule as used; returns the previous value.
    pub fn mark_employed(&self) -> bool {
        self.employed.swap(true, Ordering::Relaxed)
    }

    pub fn is_employed(&self) -> bool {
        self.employed.load(Ordering::Relaxed)
    }

    /// The document the rule was loaded from.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.document).unwrap_or_default()
    }
}

/// Direct-index key: the query-normalised URI, or the raw pattern under
/// `PriorityMatchingRegex`.
fn index_key(
    state: &str,
    method: &str,
    uri: &str,
    matching: &MatchingConfig,
) -> Result<String, QueryError> {
    if matching.algorithm() == Algorithm::PriorityMatchingRegex {
        return Ok(provision_key(state, method, uri));
    }
    let uri = matching.normalize(uri)?;
    Ok(provision_key(state, method, &uri))
}
