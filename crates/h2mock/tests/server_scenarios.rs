//! End-to-end scenarios for the inbound role: provisioning, matching,
//! conversation state and the event store, driven through `MockServer`.

use assert_json_diff::{assert_json_eq, assert_json_include};
use h2mock::config::EngineSettings;
use h2mock::events::RetentionPolicy;
use h2mock::{DataKey, InboundRequest, LoadResult, MockServer, SharedContext};
use serde_json::json;
use std::sync::Arc;
use std::thread;

fn server() -> MockServer {
    MockServer::new(Arc::new(SharedContext::default()))
}

fn server_with(settings: EngineSettings) -> MockServer {
    MockServer::new(Arc::new(SharedContext::new(settings)))
}

#[test]
fn full_matching_status_scenario() {
    let server = server();
    assert_eq!(
        server.load_matching(&json!({"algorithm": "FullMatching"})),
        LoadResult::Success
    );
    assert_eq!(
        server.load_provisions(&json!({
            "requestMethod": "GET",
            "requestUri": "/status",
            "responseCode": 200,
            "outState": "done"
        })),
        LoadResult::Success
    );
    let rule = server
        .provisions()
        .find(&server.matching(), "initial", "GET", "/status")
        .expect("rule loaded");
    assert_eq!(rule.response_code(), 200);

    let response = server.process(&InboundRequest::new("GET", "/status"));
    assert_eq!(response.status_code, 200);
    assert_eq!(
        server
            .events()
            .find_last_registered_state(&DataKey::new("GET", "/status")),
        "done"
    );
}

#[test]
fn priority_tie_break_is_insertion_order() {
    let server = server();
    server.load_matching(&json!({"algorithm": "PriorityMatchingRegex"}));
    server.load_provisions(&json!([
        {"requestMethod": "GET", "requestUri": "/users/.*", "responseCode": 200},
        {"requestMethod": "GET", "requestUri": "/users/admin", "responseCode": 403}
    ]));
    let response = server.process(&InboundRequest::new("GET", "/users/admin"));
    assert_eq!(response.status_code, 200);
}

#[test]
fn reload_same_key_does_not_duplicate() {
    let server = server();
    let doc = json!({"requestMethod": "GET", "requestUri": "/a", "responseCode": 200});
    assert_eq!(server.load_provisions(&doc), LoadResult::Success);
    assert_eq!(server.load_provisions(&doc), LoadResult::Accepted);
    assert_eq!(server.provisions().len(), 1);
}

#[test]
fn query_order_and_filters() {
    let server = server();
    server.load_provisions(&json!({"requestMethod": "GET", "requestUri": "/q?a=1&b=2", "responseCode": 200}));
    assert!(server.process(&InboundRequest::new("GET", "/q?b=2&a=1")).matched);
    assert!(!server.process(&InboundRequest::new("GET", "/q?a=1&a=2")).matched);

    let ignoring = server_with(EngineSettings::default());
    ignoring.load_matching(&json!({"algorithm": "FullMatching", "uriPathQueryParametersFilter": "Ignore"}));
    ignoring.load_provisions(&json!({"requestMethod": "GET", "requestUri": "/q", "responseCode": 204}));
    assert_eq!(
        ignoring
            .process(&InboundRequest::new("GET", "/q?anything=1"))
            .status_code,
        204
    );
}

#[test]
fn matching_switch_takes_effect_without_reload() {
    let server = server();
    server.load_provisions(&json!({"requestMethod": "GET", "requestUri": "/q?b=2&a=1", "responseCode": 200}));
    assert!(server.process(&InboundRequest::new("GET", "/q?a=1&b=2")).matched);

    assert_eq!(
        server.load_matching(&json!({"algorithm": "FullMatching", "uriPathQueryParametersFilter": "PassBy"})),
        LoadResult::Success
    );
    assert!(server.process(&InboundRequest::new("GET", "/q?b=2&a=1")).matched);
    assert_eq!(
        server.process(&InboundRequest::new("GET", "/q?a=1&b=2")).status_code,
        501
    );

    let priority_first = self::server();
    priority_first.load_matching(&json!({"algorithm": "PriorityMatchingRegex"}));
    priority_first.load_provisions(&json!({"requestMethod": "GET", "requestUri": "/p?b=2&a=1", "responseCode": 202}));
    priority_first.load_matching(&json!({"algorithm": "FullMatching"}));
    assert_eq!(
        priority_first
            .process(&InboundRequest::new("GET", "/p?b=2&a=1"))
            .status_code,
        202
    );
}

#[test]
fn regex_replace_collapses_ids() {
    let server = server();
    assert_eq!(
        server.load_matching(&json!({
            "algorithm": "FullMatchingRegexReplace",
            "rgx": "^(/orders/)[0-9]+$",
            "fmt": "${1}ID"
        })),
        LoadResult::Success
    );
    server.load_provisions(&json!({"requestMethod": "DELETE", "requestUri": "/orders/ID", "responseCode": 204}));
    assert_eq!(
        server
            .process(&InboundRequest::new("DELETE", "/orders/77"))
            .status_code,
        204
    );
    // Events stay under the real URI.
    assert!(server.events().contains(&DataKey::new("DELETE", "/orders/77")));
}

#[test]
fn conversation_walks_states() {
    let server = server();
    server.load_provisions(&json!([
        {"requestMethod": "GET", "requestUri": "/door", "responseCode": 200, "outState": "open", "responseBody": "opening"},
        {"requestMethod": "GET", "requestUri": "/door", "inState": "open", "outState": "closed", "responseCode": 200, "responseBody": "closing"},
        {"requestMethod": "GET", "requestUri": "/door", "inState": "closed", "responseCode": 423}
    ]));
    let bodies: Vec<_> = (0..3)
        .map(|_| server.process(&InboundRequest::new("GET", "/door")))
        .map(|r| (r.status_code, r.body_text()))
        .collect();
    assert_eq!(
        bodies,
        vec![
            (200, "opening".to_string()),
            (200, "closing".to_string()),
            (423, String::new())
        ]
    );

    let history = server.events().history(&DataKey::new("GET", "/door")).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history.last_state().as_deref(), Some("closed"));
}

#[test]
fn latest_only_keeps_last_event() {
    let server = server_with(EngineSettings {
        retention: RetentionPolicy::LatestOnly,
        ..EngineSettings::default()
    });
    server.load_provisions(&json!({"requestMethod": "POST", "requestUri": "/n", "responseCode": 200}));
    for i in 0..5 {
        server.process(&InboundRequest::new("POST", "/n").json_body(json!({"i": i})));
    }
    let key = DataKey::new("POST", "/n");
    assert_eq!(server.events().history(&key).unwrap().len(), 1);
    let last = server.events().get_event(&key, 1, false).unwrap();
    assert_eq!(last.request_body, Some(json!({"i": 4})));
}

#[test]
fn event_json_and_queries() {
    let server = server();
    server.load_provisions(&json!({
        "requestMethod": "POST",
        "requestUri": "/users",
        "responseCode": 201,
        "responseHeaders": {"content-type": "application/json"},
        "responseBody": {"id": "u-1"},
        "transform": [
            {"source": "request.body./name", "target": "response.body.string./name"}
        ]
    }));
    server.process(
        &InboundRequest::new("POST", "/users")
            .header("content-type", "application/json")
            .body_text(r#"{"name":"ada"}"#)
            .at(1_000),
    );

    let key = DataKey::new("POST", "/users");
    let event = server.events().query(&key, 1, false, None).unwrap();
    assert_json_include!(
        actual: event.clone(),
        expected: json!({
            "previousState": "initial",
            "state": "initial",
            "receptionTimestampUs": 1000,
            "serverSequence": 1,
            "requestHeaders": {"content-type": "application/json"},
            "requestBody": {"name": "ada"},
            "responseStatusCode": 201,
            "responseBody": {"id": "u-1", "name": "ada"},
            "responseDelayMs": 0
        })
    );
    assert!(event.get("virtualOriginComingFromMethod").is_none());
    assert_eq!(
        server.events().query(&key, 1, false, Some("/responseBody/name")),
        Some(json!("ada"))
    );
    assert_eq!(
        server.events().query(&key, 1, true, Some("$.requestBody.name")),
        Some(json!("ada"))
    );
}

#[test]
fn summary_counts_keys_and_events() {
    let server = server();
    server.load_provisions(&json!({"requestMethod": "GET", "requestUri": "/a", "responseCode": 200}));
    server.process(&InboundRequest::new("GET", "/a"));
    server.process(&InboundRequest::new("GET", "/a"));
    server.process(&InboundRequest::new("GET", "/b"));
    assert_json_eq!(
        server.event_summary(Some(1)),
        json!({
            "totalKeys": 2,
            "totalEvents": 3,
            "displayedKeys": {
                "amount": 1,
                "list": [{"method": "GET", "uri": "/a", "amount": 2}]
            }
        })
    );
}

#[test]
fn unused_provisions_dump() {
    let server = server();
    server.load_provisions(&json!([
        {"requestMethod": "GET", "requestUri": "/used", "responseCode": 200},
        {"requestMethod": "GET", "requestUri": "/unused", "responseCode": 200}
    ]));
    server.process(&InboundRequest::new("GET", "/used"));
    assert_json_eq!(
        server.provisions().dump(true),
        json!([{
            "requestMethod": "GET",
            "requestUri": "/unused",
            "responseCode": 200,
            "inState": "initial",
            "responseDelayMs": 0
        }])
    );
}

#[test]
fn concurrent_requests_on_shared_engine() {
    let server = Arc::new(server());
    server.load_provisions(&json!([
        {"requestMethod": "GET", "requestUri": "/shared", "responseCode": 200},
        {"requestMethod": "GET", "requestUri": "/seq", "responseCode": 200,
         "transform": [{"source": "general.recvseq", "target": "response.body.integer./seq"}]}
    ]));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let server = Arc::clone(&server);
            thread::spawn(move || {
                for _ in 0..50 {
                    assert!(server.process(&InboundRequest::new("GET", "/shared")).matched);
                    server.process(&InboundRequest::new("GET", "/seq"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let events = server.events();
    assert_eq!(events.key_count(), 2);
    assert_eq!(events.history(&DataKey::new("GET", "/shared")).unwrap().len(), 400);
    assert_eq!(events.event_count(), 800);

    let mut sequences: Vec<u64> = (1..=400)
        .map(|i| {
            events
                .get_event(&DataKey::new("GET", "/seq"), i, false)
                .unwrap()
                .server_sequence
        })
        .collect();
    sequences.sort_unstable();
    sequences.dedup();
    assert_eq!(sequences.len(), 400);
    assert_eq!(server.context().current_sequence(), 800);
}
