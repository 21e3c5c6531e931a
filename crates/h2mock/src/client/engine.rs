//! Client engine: fires client provisions and keeps their state machine.

use super::{
    ClientEndpoint, ClientProvisionStore, EndpointRegistry, OutboundRequest, OutboundResponse,
    OutboundTransport,
};
use crate::context::{now_us, SharedContext};
use crate::error::{report, LoadError, LoadResult, TriggerError};
use crate::events::{ClientExchange, EventStore, MockEvent, VirtualOrigin};
use crate::key::{DataKey, DEFAULT_STATE, PURGE_STATE, ROAD_CLOSED_STATE};
use crate::schema::SchemaKind;
use crate::transform::{self, Draft, TransformContext};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOutcome {
    pub request: OutboundRequest,
    pub response: OutboundResponse,
    /// State of the provision id after this send.
    pub state: String,
}

pub struct ClientEngine {
    ctx: Arc<SharedContext>,
    endpoints: EndpointRegistry,
    provisions: ClientProvisionStore,
    transport: Arc<dyn OutboundTransport>,
}

impl ClientEngine {
    pub fn new(ctx: Arc<SharedContext>, transport: Arc<dyn OutboundTransport>) -> Self {
        Self {
            ctx,
            endpoints: EndpointRegistry::new(),
            provisions: ClientProvisionStore::new(),
            transport,
        }
    }

    pub fn context(&self) -> &Arc<SharedContext> {
        &self.ctx
    }

    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.endpoints
    }

    pub fn provisions(&self) -> &ClientProvisionStore {
        &self.provisions
    }

    pub fn events(&self) -> &EventStore {
        self.ctx.client_events()
    }

    fn validate(&self, kind: SchemaKind, document: &Value) -> Result<(), LoadError> {
        if self.ctx.settings().schema_validation {
            kind.validate(document)?;
        }
        Ok(())
    }

    pub fn load_endpoints(&self, document: &Value) -> LoadResult {
        let outcome = self
            .validate(SchemaKind::ClientEndpoint, document)
            .and_then(|()| self.endpoints.load(document));
        report(SchemaKind::ClientEndpoint.name(), outcome)
    }

    pub fn load_provisions(&self, document: &Value) -> LoadResult {
        let outcome = self
            .validate(SchemaKind::ClientProvision, document)
            .and_then(|()| self.provisions.load(document));
        report(SchemaKind::ClientProvision.name(), outcome)
    }

    /// Send the request provisioned for the current state of `id`.
    pub async fn trigger(&self, id: &str) -> Result<TriggerOutcome, TriggerError> {
        if !self.provisions.has_id(id) {
            return Err(TriggerError::UnknownProvision(id.to_string()));
        }
        let state = self.provisions.state_of(id);
        if state == ROAD_CLOSED_STATE {
            return Err(TriggerError::RoadClosed(id.to_string()));
        }
        let provision =
            self.provisions
                .get(&state, id)
                .ok_or_else(|| TriggerError::NoProvisionForState {
                    id: id.to_string(),
                    state: state.clone(),
                })?;
        let endpoint = self
            .endpoints
            .get(provision.endpoint())
            .ok_or_else(|| TriggerError::UnknownEndpoint(provision.endpoint().to_string()))?;
        if !endpoint.permit {
            return Err(TriggerError::EndpointNotPermitted(endpoint.id));
        }

        let sequence = self.ctx.next_sequence();
        let mut draft = Draft {
            headers: provision.headers().clone(),
            body: provision.body().cloned().unwrap_or(Value::Null),
            delay_ms: provision.delay_ms(),
            uri: provision.uri().to_string(),
            timeout_ms: provision.timeout_ms(),
            out_state: provision.out_state().to_string(),
            ..Draft::default()
        };
        let tctx = TransformContext {
            shared: &self.ctx,
            inbound: None,
            in_state: &state,
            sequence,
        };
        transform::apply(provision.transformations(), &tctx, &mut draft);

        let request = OutboundRequest {
            method: provision.method().to_string(),
            uri: draft.uri.clone(),
            headers: draft.headers,
            body: Some(draft.body).filter(|b| !b.is_null()),
            delay_ms: draft.delay_ms,
            timeout_ms: draft.timeout_ms,
        };
        debug!(id, endpoint = %endpoint.id, method = %request.method, uri = %request.uri, "sending");
        let sending_us = now_us();
        let response = self.transport.send(&endpoint, request.clone()).await;
        let completion_us = now_us();
        if response.timed_out {
            warn!(id, endpoint = %endpoint.id, uri = %request.uri, "outbound request timed out");
        }

        let key = DataKey::client(&endpoint.id, &request.method, &request.uri);
        let next_state = if draft.out_state == PURGE_STATE {
            self.events().remove_key(&key);
            self.provisions.reset_state(id);
            DEFAULT_STATE.to_string()
        } else {
            self.events().record(
                key,
                exchange_event(
                    &state,
                    &draft.out_state,
                    &request,
                    &response,
                    ClientExchange {
                        client_endpoint: endpoint.id.clone(),
                        client_provision_id: id.to_string(),
                        sending_timestamp_us: sending_us,
                        timed_out: response.timed_out,
                    },
                    completion_us,
                    sequence,
                ),
            );
            self.provisions.set_state(id, draft.out_state.clone());
            draft.out_state
        };

        for transition in draft.virtual_states {
            let uri = transition.uri.unwrap_or_else(|| request.uri.clone());
            let virtual_key = DataKey::client(&endpoint.id, transition.method, uri);
            if transition.state == PURGE_STATE {
                self.events().remove_key(&virtual_key);
                continue;
            }
            let previous = self.events().find_last_registered_state(&virtual_key);
            self.events().record(
                virtual_key,
                MockEvent::virtual_transition(
                    previous,
                    transition.state,
                    VirtualOrigin {
                        method: request.method.clone(),
                        uri: request.uri.clone(),
                    },
                    completion_us,
                    sequence,
                ),
            );
        }

        info!(id, state = %next_state, status = response.status_code, "client provision fired");
        Ok(TriggerOutcome {
            request,
            response,
            state: next_state,
        })
    }

    /// Endpoint a provision id is bound to in its current state.
    pub fn endpoint_of(&self, id: &str) -> Option<ClientEndpoint> {
        let provision = self.provisions.get(&self.provisions.state_of(id), id)?;
        self.endpoints.get(provision.endpoint())
    }
}

fn exchange_event(
    previous_state: &str,
    state: &str,
    request: &OutboundRequest,
    response: &OutboundResponse,
    exchange: ClientExchange,
    reception_us: u64,
    sequence: u64,
) -> MockEvent {
    MockEvent {
        previous_state: previous_state.to_string(),
        state: state.to_string(),
        reception_timestamp_us: reception_us,
        server_sequence: sequence,
        request_headers: request.headers.clone(),
        request_body: request.body.clone(),
        response_status_code: response.status_code,
        response_headers: response.headers.clone(),
        response_body: response.body.clone(),
        response_delay_ms: request.delay_ms,
        virtual_origin: None,
        client: Some(exchange),
    }
}

impl std::fmt::Debug for ClientEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEngine")
            .field("endpoints", &self.endpoints.len())
            .field("provisions", &self.provisions.len())
            .finish()
    }
}
