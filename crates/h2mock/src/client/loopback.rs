//! Loopback transport: outbound requests are answered by a local server engine.

use super::{ClientEndpoint, OutboundRequest, OutboundResponse, OutboundTransport};
use crate::server::{InboundRequest, MockServer};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Feeds every send into `server`. Delays are compared, never slept: a
/// response whose `delay_ms` exceeds the request timeout is reported as
/// timed out.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    server: Arc<MockServer>,
}

impl LoopbackTransport {
    pub fn new(server: Arc<MockServer>) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &Arc<MockServer> {
        &self.server
    }
}

#[async_trait]
impl OutboundTransport for LoopbackTransport {
    async fn send(&self, endpoint: &ClientEndpoint, request: OutboundRequest) -> OutboundResponse {
        let inbound = InboundRequest {
            method: request.method,
            uri: request.uri,
            headers: request.headers,
            body: request.body,
            timestamp_us: 0,
        };
        let response = self.server.process(&inbound);
        if request.timeout_ms > 0 && response.delay_ms > request.timeout_ms {
            debug!(
                endpoint = %endpoint.id,
                delay_ms = response.delay_ms,
                timeout_ms = request.timeout_ms,
                "loopback answer would arrive after the timeout"
            );
            return OutboundResponse::timed_out();
        }
        OutboundResponse {
            status_code: response.status_code,
            headers: response.headers,
            body: response.body,
            timed_out: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SharedContext;
    use serde_json::json;

    fn endpoint() -> ClientEndpoint {
        ClientEndpoint {
            id: "local".into(),
            host: "127.0.0.1".into(),
            port: 8000,
            secure: false,
            permit: true,
        }
    }

    #[tokio::test]
    async fn test_loopback_reaches_server() {
        let server = Arc::new(MockServer::new(Arc::new(SharedContext::default())));
        server.load_provisions(&json!({
            "requestMethod": "POST",
            "requestUri": "/orders",
            "responseCode": 201,
            "responseBody": {"id": 7}
        }));
        let transport = LoopbackTransport::new(Arc::clone(&server));
        let response = transport
            .send(
                &endpoint(),
                OutboundRequest {
                    method: "POST".into(),
                    uri: "/orders".into(),
                    ..OutboundRequest::default()
                },
            )
            .await;
        assert_eq!(response.status_code, 201);
        assert_eq!(response.body, Some(json!({"id": 7})));
        assert!(!response.timed_out);
        assert_eq!(server.events().key_count(), 1);
    }

    #[tokio::test]
    async fn test_slow_answer_times_out() {
        let server = Arc::new(MockServer::new(Arc::new(SharedContext::default())));
        server.load_provisions(&json!({
            "requestMethod": "GET",
            "requestUri": "/slow",
            "responseCode": 200,
            "responseDelayMs": 500
        }));
        let transport = LoopbackTransport::new(server);
        let request = OutboundRequest {
            method: "GET".into(),
            uri: "/slow".into(),
            timeout_ms: 100,
            ..OutboundRequest::default()
        };
        let response = transport.send(&endpoint(), request.clone()).await;
        assert!(response.timed_out);
        assert_eq!(response.status_code, 0);

        let unlimited = OutboundRequest {
            timeout_ms: 0,
            ..request
        };
        assert_eq!(transport.send(&endpoint(), unlimited).await.status_code, 200);
    }
}
