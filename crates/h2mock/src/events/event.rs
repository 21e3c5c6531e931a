//! A single observed transaction.

use crate::json::{serialize_headers, Headers};
use serde::Serialize;
use serde_json::Value;

/// Marks an event recorded on behalf of another request (`outState.<METHOD>`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualOrigin {
    #[serde(rename = "virtualOriginComingFromMethod")]
    pub method: String,
    #[serde(rename = "virtualOriginComingFromUri")]
    pub uri: String,
}

/// Extra facts carried by outbound (client role) events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientExchange {
    pub client_endpoint: String,
    pub client_provision_id: String,
    pub sending_timestamp_us: u64,
    pub timed_out: bool,
}

/// One recorded request/response pair. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockEvent {
    pub previous_state: String,
    pub state: String,
    pub reception_timestamp_us: u64,
    pub server_sequence: u64,
    #[serde(serialize_with = "serialize_headers")]
    pub request_headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    pub response_status_code: u16,
    #[serde(serialize_with = "serialize_headers")]
    pub response_headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Value>,
    pub response_delay_ms: u64,
    #[serde(flatten)]
    pub virtual_origin: Option<VirtualOrigin>,
    #[serde(flatten)]
    pub client: Option<ClientExchange>,
}

impl MockEvent {
    /// Virtual event: only states and origin are meaningful.
    pub fn virtual_transition(
        previous_state: impl Into<String>,
        state: impl Into<String>,
        origin: VirtualOrigin,
        reception_timestamp_us: u64,
        server_sequence: u64,
    ) -> Self {
        Self {
            previous_state: previous_state.into(),
            state: state.into(),
            reception_timestamp_us,
            server_sequence,
            request_headers: Vec::new(),
            request_body: None,
            response_status_code: 0,
            response_headers: Vec::new(),
            response_body: None,
            response_delay_ms: 0,
            virtual_origin: Some(origin),
            client: None,
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.virtual_origin.is_some()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) fn sample_event(state: &str) -> MockEvent {
    MockEvent {
        previous_state: "initial".to_string(),
        state: state.to_string(),
        reception_timestamp_us: 1_000,
        server_sequence: 1,
        request_headers: vec![("accept".to_string(), "*/*".to_string())],
        request_body: None,
        response_status_code: 200,
        response_headers: Vec::new(),
        response_body: Some(serde_json::json!({"state": state})),
        response_delay_ms: 0,
        virtual_origin: None,
        client: None,
    }
}
