//! Inbound (server) role: resolve a parsed request into a canned response.
//!
//! ```text
//! request → normalise URI → last state (events) → rule (provisions)
//!         → transformations → record event (+ virtual events) → response
//! ```

use crate::context::{now_us, SharedContext};
use crate::error::{report, LoadError, LoadResult};
use crate::events::{EventStore, MockEvent, VirtualOrigin};
use crate::json::{parse_body, render_body, Headers};
use crate::key::{DataKey, PURGE_STATE};
use crate::matching::MatchingConfig;
use crate::provision::ProvisionStore;
use crate::schema::SchemaKind;
use crate::transform::{self, Draft, RequestView, TransformContext};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// A request as handed over by the transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundRequest {
    pub method: String,
    pub uri: String,
    pub headers: Headers,
    pub body: Option<Value>,
    /// Reception time; `0` means "now".
    pub timestamp_us: u64,
}

impl InboundRequest {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Raw body text: JSON when it parses, a string otherwise.
    pub fn body_text(mut self, raw: &str) -> Self {
        self.body = parse_body(raw);
        self
    }

    pub fn json_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn at(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }
}

/// What the transport should answer (after waiting `delay_ms`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockResponse {
    pub status_code: u16,
    #[serde(serialize_with = "crate::json::serialize_headers")]
    pub headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    pub delay_ms: u64,
    /// `false` for the unprovisioned outcome.
    pub matched: bool,
}

impl MockResponse {
    pub fn body_text(&self) -> String {
        self.body.as_ref().map(render_body).unwrap_or_default()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Server engine: matching configuration, rule store and shared context.
pub struct MockServer {
    matching: RwLock<Arc<MatchingConfig>>,
    provisions: ProvisionStore,
    ctx: Arc<SharedContext>,
}

impl MockServer {
    pub fn new(ctx: Arc<SharedContext>) -> Self {
        Self {
            matching: RwLock::new(Arc::new(MatchingConfig::default())),
            provisions: ProvisionStore::new(),
            ctx,
        }
    }

    pub fn context(&self) -> &Arc<SharedContext> {
        &self.ctx
    }

    /// Snapshot of the active matching configuration.
    pub fn matching(&self) -> Arc<MatchingConfig> {
        self.matching.read().clone()
    }

    pub fn provisions(&self) -> &ProvisionStore {
        &self.provisions
    }

    pub fn events(&self) -> &EventStore {
        self.ctx.server_events()
    }

    fn validate(&self, kind: SchemaKind, document: &Value) -> Result<(), LoadError> {
        if self.ctx.settings().schema_validation {
            kind.validate(document)?;
        }
        Ok(())
    }

    /// Replace the matching configuration. Takes effect on the next request.
    pub fn load_matching(&self, document: &Value) -> LoadResult {
        let outcome = self
            .validate(SchemaKind::ServerMatching, document)
            .and_then(|()| MatchingConfig::from_json(document))
            .map(|config| {
                let mut active = self.matching.write();
                self.provisions.rekey(&config);
                *active = Arc::new(config);
                LoadResult::Success
            });
        report(SchemaKind::ServerMatching.name(), outcome)
    }

    /// Load one provision or an array of them.
    pub fn load_provisions(&self, document: &Value) -> LoadResult {
        let outcome = self
            .validate(SchemaKind::ServerProvision, document)
            .and_then(|()| self.provisions.load(document, &self.matching.read()));
        report(SchemaKind::ServerProvision.name(), outcome)
    }

    /// Bulk-load global variables. `Accepted` when something was overwritten.
    pub fn load_globals(&self, document: &Value) -> LoadResult {
        let outcome = self
            .validate(SchemaKind::GlobalVariables, document)
            .and_then(|()| self.ctx.vars().load(document))
            .map(|overwritten| {
                if overwritten {
                    LoadResult::Accepted
                } else {
                    LoadResult::Success
                }
            });
        report(SchemaKind::GlobalVariables.name(), outcome)
    }

    /// Event summary capped at `max_keys` (engine default when `None`).
    pub fn event_summary(&self, max_keys: Option<usize>) -> Value {
        let max_keys = max_keys.unwrap_or(self.ctx.settings().summary_max_keys);
        self.events().summary(max_keys)
    }

    /// Resolve `request` into a response and record the transaction.
    pub fn process(&self, request: &InboundRequest) -> MockResponse {
        let sequence = self.ctx.next_sequence();
        let reception_us = if request.timestamp_us == 0 {
            now_us()
        } else {
            request.timestamp_us
        };
        let matching = self.matching();

        let normalized = match matching.normalize(&request.uri) {
            Ok(uri) => uri,
            Err(e) => {
                warn!(method = %request.method, uri = %request.uri, "uri normalisation failed: {}", e);
                let key = DataKey::new(&request.method, &request.uri);
                return self.unprovisioned(key, request, sequence, reception_us);
            }
        };
        let key = DataKey::new(&request.method, &normalized);
        let previous_state = self.events().find_last_registered_state(&key);

        let Some(rule) = self
            .provisions
            .find(&matching, &previous_state, &request.method, &normalized)
        else {
            debug!(key = %key, state = %previous_state, "no provision matched");
            return self.unprovisioned(key, request, sequence, reception_us);
        };
        rule.mark_employed();
        debug!(key = %key, state = %previous_state, provision = %rule.key(), "provision matched");

        let mut draft = Draft {
            status_code: rule.response_code(),
            headers: rule.response_headers().clone(),
            body: rule.response_body().cloned().unwrap_or(Value::Null),
            delay_ms: rule.response_delay_ms(),
            uri: normalized.clone(),
            out_state: rule.out_state().to_string(),
            ..Draft::default()
        };
        let view = RequestView {
            method: &request.method,
            uri: &request.uri,
            headers: &request.headers,
            body: request.body.as_ref(),
        };
        let tctx = TransformContext {
            shared: &self.ctx,
            inbound: Some(&view),
            in_state: &previous_state,
            sequence,
        };
        transform::apply(rule.transformations(), &tctx, &mut draft);

        let response = MockResponse {
            status_code: draft.status_code,
            headers: draft.headers,
            body: Some(draft.body).filter(|b| !b.is_null()),
            delay_ms: draft.delay_ms,
            matched: true,
        };

        if draft.out_state == PURGE_STATE {
            debug!(key = %key, "conversation purged");
            self.events().remove_key(&key);
        } else {
            self.events().record(
                key,
                MockEvent {
                    previous_state,
                    state: draft.out_state,
                    reception_timestamp_us: reception_us,
                    server_sequence: sequence,
                    request_headers: request.headers.clone(),
                    request_body: request.body.clone(),
                    response_status_code: response.status_code,
                    response_headers: response.headers.clone(),
                    response_body: response.body.clone(),
                    response_delay_ms: response.delay_ms,
                    virtual_origin: None,
                    client: None,
                },
            );
        }

        for transition in draft.virtual_states {
            let uri = match transition.uri {
                Some(uri) => matching.normalize(&uri).unwrap_or(uri),
                None => normalized.clone(),
            };
            let virtual_key = DataKey::new(transition.method, uri);
            if transition.state == PURGE_STATE {
                self.events().remove_key(&virtual_key);
                continue;
            }
            let previous = self.events().find_last_registered_state(&virtual_key);
            debug!(key = %virtual_key, state = %transition.state, "virtual transition");
            self.events().record(
                virtual_key,
                MockEvent::virtual_transition(
                    previous,
                    transition.state,
                    VirtualOrigin {
                        method: request.method.clone(),
                        uri: normalized.clone(),
                    },
                    reception_us,
                    sequence,
                ),
            );
        }

        response
    }

    fn unprovisioned(
        &self,
        key: DataKey,
        request: &InboundRequest,
        sequence: u64,
        reception_us: u64,
    ) -> MockResponse {
        let status_code = self.ctx.settings().unprovisioned_status_code;
        self.events().record(
            key,
            MockEvent {
                previous_state: String::new(),
                state: String::new(),
                reception_timestamp_us: reception_us,
                server_sequence: sequence,
                request_headers: request.headers.clone(),
                request_body: request.body.clone(),
                response_status_code: status_code,
                response_headers: Vec::new(),
                response_body: None,
                response_delay_ms: 0,
                virtual_origin: None,
                client: None,
            },
        );
        MockResponse {
            status_code,
            headers: Vec::new(),
            body: None,
            delay_ms: 0,
            matched: false,
        }
    }
}

impl std::fmt::Debug for MockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockServer")
            .field("algorithm", &self.matching().algorithm())
            .field("provisions", &self.provisions.len())
            .field("ctx", &self.ctx)
            .finish()
    }
}
