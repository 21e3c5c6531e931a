//! Outbound (client) role.
//!
//! ```text
//! trigger(id) → state of id → provision (inState#id) → endpoint
//!             → transformations → OutboundTransport::send → client event
//! ```
//!
//! The engine never opens sockets: sends go through [`OutboundTransport`].
//! [`LoopbackTransport`] hands them to a local [`crate::MockServer`].

mod endpoint;
mod engine;
mod loopback;
mod provision;

pub use endpoint::{ClientEndpoint, EndpointRegistry};
pub use engine::{ClientEngine, TriggerOutcome};
pub use loopback::LoopbackTransport;
pub use provision::{
    client_provision_key, ClientProvision, ClientProvisionDocument, ClientProvisionStore,
};

use crate::json::{render_body, Headers};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// A request ready to leave, after transformations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    pub method: String,
    pub uri: String,
    #[serde(serialize_with = "crate::json::serialize_headers")]
    pub headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Wait before sending. Left to the transport.
    pub delay_ms: u64,
    /// `0` disables the timeout.
    pub timeout_ms: u64,
}

impl OutboundRequest {
    pub fn body_text(&self) -> String {
        self.body.as_ref().map(render_body).unwrap_or_default()
    }
}

/// Completion of a send.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundResponse {
    /// `0` when no answer arrived.
    pub status_code: u16,
    #[serde(serialize_with = "crate::json::serialize_headers")]
    pub headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    pub timed_out: bool,
}

impl OutboundResponse {
    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Self::default()
        }
    }
}

/// Wire-level sender for the client role.
#[async_trait]
pub trait OutboundTransport: Send + Sync {
    async fn send(&self, endpoint: &ClientEndpoint, request: OutboundRequest) -> OutboundResponse;
}
