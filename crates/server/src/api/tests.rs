use super::create_router;
use crate::config::{AppState, ServerConfig};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use exa_gateway_core::analytics::{AnalyticsAccumulator, AnalyticsStore};
use exa_gateway_core::backend::SearchBackend;
use exa_gateway_core::error::UpstreamError;
use exa_gateway_core::tools::{ToolId, ToolRequest};
use exa_gateway_core::SessionId;
use exa_gateway_mcp::SESSION_ID_HEADER;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

#[derive(Default)]
struct RecordingBackend {
    calls: Mutex<Vec<(ToolId, Option<String>)>>,
}

#[async_trait]
impl SearchBackend for RecordingBackend {
    async fn call(&self, request: ToolRequest, api_key: Option<&str>) -> Result<Value, UpstreamError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.tool_id(), api_key.map(str::to_string)));
        Ok(json!({
            "results": [{"title": "The Rust Programming Language", "url": "https://www.rust-lang.org"}]
        }))
    }
}

struct Harness {
    router: Router,
    state: Arc<AppState>,
    backend: Arc<RecordingBackend>,
    _dir: TempDir,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl Reply {
    fn session_id(&self) -> Option<String> {
        self.headers
            .get(SESSION_ID_HEADER)
            .map(|value| value.to_str().unwrap().to_string())
    }
}

fn harness(config: ServerConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(RecordingBackend::default());
    let analytics = Arc::new(AnalyticsAccumulator::new(
        AnalyticsStore::new(dir.path().join("analytics.json")),
        config.max_recent_calls,
    ));
    let state = Arc::new(AppState::with_backend(config, backend.clone(), analytics));

    Harness {
        router: create_router(state.clone()),
        state,
        backend,
        _dir: dir,
    }
}

impl Harness {
    async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        Reply {
            status,
            headers,
            body,
        }
    }

    async fn post_mcp(&self, uri: &str, session: Option<&str>, body: Value) -> Reply {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .header("user-agent", "test-client/1.0")
            .header("x-forwarded-for", "198.51.100.4");
        if let Some(session) = session {
            builder = builder.header(SESSION_ID_HEADER, session);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn without_body(&self, method: Method, uri: &str, session: Option<&str>) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(session) = session {
            builder = builder.header(SESSION_ID_HEADER, session);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn initialize(&self) -> String {
        let reply = self.post_mcp("/mcp", None, initialize_request()).await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.session_id().expect("initialize returns a session id")
    }
}

fn initialize_request() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0"}
        }
    })
}

fn tool_call(id: u64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

#[tokio::test]
async fn test_session_lifecycle() {
    let h = harness(ServerConfig::default());

    let reply = h.post_mcp("/mcp", None, initialize_request()).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["result"]["serverInfo"]["name"], "exa-gateway");
    let session = reply.session_id().unwrap();
    assert_eq!(h.state.sessions.len(), 1);

    let reply = h
        .post_mcp(
            "/mcp",
            Some(&session),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);

    let reply = h
        .post_mcp(
            "/mcp?apiKey=client-key",
            Some(&session),
            tool_call(2, "web_search_exa", json!({"query": "rust async runtimes"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["id"], 2);
    assert_ne!(reply.body["result"]["isError"], true);
    assert_eq!(reply.body["result"]["content"][0]["type"], "text");
    assert_eq!(
        h.backend.calls.lock().unwrap().as_slice(),
        &[(ToolId::WebSearch, Some("client-key".to_string()))]
    );

    let reply = h.without_body(Method::DELETE, "/mcp", Some(&session)).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(h.state.sessions.is_empty());

    let reply = h.without_body(Method::GET, "/mcp", Some(&session)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "Session not found");
}

#[tokio::test]
async fn test_tool_calls_are_counted() {
    let h = harness(ServerConfig::default());
    let session = h.initialize().await;

    for id in 0..3 {
        h.post_mcp(
            "/mcp",
            Some(&session),
            tool_call(id, "get_code_context_exa", json!({"query": "tokio select"})),
        )
        .await;
    }

    let snapshot = h.state.analytics.snapshot();
    assert_eq!(snapshot.total_tool_calls, 3);
    assert_eq!(snapshot.tool_calls["get_code_context_exa"], 3);
    assert_eq!(snapshot.requests_by_ip["198.51.100.4"], 4);
    assert_eq!(snapshot.requests_by_endpoint["/mcp"], 4);
    assert_eq!(snapshot.recent_tool_calls[0].user_agent, "test-client/1.0");

    let reply = h.without_body(Method::GET, "/analytics/tools", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["totalToolCalls"], 3);
    assert_eq!(reply.body["tools"][0]["tool"], "get_code_context_exa");
    assert_eq!(reply.body["recentCalls"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_undispatched_tool_calls_are_not_counted() {
    let h = harness(ServerConfig::default());
    let session = h.initialize().await;

    // Notification form: no id, so nothing runs
    let reply = h
        .post_mcp(
            "/mcp",
            Some(&session),
            json!({
                "jsonrpc": "2.0",
                "method": "tools/call",
                "params": {"name": "web_search_exa", "arguments": {"query": "rust"}}
            }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);

    let reply = h
        .post_mcp(
            "/mcp",
            Some(&session),
            tool_call(2, "web_search_exa", json!({"numResults": 3})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["error"]["code"], -32602);

    assert!(h.backend.calls.lock().unwrap().is_empty());
    let snapshot = h.state.analytics.snapshot();
    assert_eq!(snapshot.total_tool_calls, 0);
    assert!(snapshot.recent_tool_calls.is_empty());
}

#[tokio::test]
async fn test_batch_counts_only_calls_made_before_violation() {
    let h = harness(ServerConfig::default());
    let session = h.initialize().await;

    let reply = h
        .post_mcp(
            "/mcp",
            Some(&session),
            json!([
                tool_call(2, "web_search_exa", json!({"query": "first"})),
                {"jsonrpc": "1.0", "id": 3, "method": "ping"},
                tool_call(4, "web_search_exa", json!({"query": "never runs"}))
            ]),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(h.state.sessions.is_empty());

    assert_eq!(h.backend.calls.lock().unwrap().len(), 1);
    let snapshot = h.state.analytics.snapshot();
    assert_eq!(snapshot.total_tool_calls, 1);
    assert_eq!(snapshot.tool_calls["web_search_exa"], 1);
}

#[tokio::test]
async fn test_get_without_valid_session_creates_nothing() {
    let h = harness(ServerConfig::default());

    let reply = h.without_body(Method::GET, "/mcp", None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = h.without_body(Method::GET, "/mcp", Some("no-such-session")).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body["message"].as_str().unwrap().contains("no-such-session"));

    assert!(h.state.sessions.is_empty());
}

#[tokio::test]
async fn test_delete_unknown_session_is_no_content() {
    let h = harness(ServerConfig::default());
    let session = h.initialize().await;

    let reply = h.without_body(Method::DELETE, "/mcp", Some("no-such-session")).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let reply = h.without_body(Method::DELETE, "/mcp", None).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    assert_eq!(h.state.sessions.len(), 1);
    assert!(h.state.sessions.lookup(&SessionId::new(session)).is_some());
}

#[tokio::test]
async fn test_post_without_session_must_initialize() {
    let h = harness(ServerConfig::default());

    let list = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
    let reply = h.post_mcp("/mcp", None, list.clone()).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "Bad Request");

    let reply = h.post_mcp("/mcp", Some("stale-session"), list).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "Session not found");

    assert!(h.state.sessions.is_empty());
}

#[tokio::test]
async fn test_stale_session_id_with_initialize_starts_new_session() {
    let h = harness(ServerConfig::default());

    let reply = h
        .post_mcp("/mcp", Some("from-before-restart"), initialize_request())
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let session = reply.session_id().unwrap();
    assert_ne!(session, "from-before-restart");
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let h = harness(ServerConfig::default());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let reply = h.send(request).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body["message"].as_str().unwrap().starts_with("Invalid JSON body"));
    assert!(h.state.sessions.is_empty());
}

#[tokio::test]
async fn test_failed_initialize_leaves_no_session() {
    let h = harness(ServerConfig::default());

    let reply = h
        .post_mcp(
            "/mcp",
            None,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"bogus": true}}),
        )
        .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["error"]["code"].is_i64());
    assert!(reply.session_id().is_none());
    assert!(h.state.sessions.is_empty());
}

#[tokio::test]
async fn test_allow_list_hides_other_tools() {
    let h = harness(ServerConfig {
        enabled_tools: vec!["web_search_exa".to_string()],
        ..ServerConfig::default()
    });
    let session = h.initialize().await;

    let reply = h
        .post_mcp(
            "/mcp",
            Some(&session),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        )
        .await;
    let tools = reply.body["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "web_search_exa");

    let reply = h
        .post_mcp(
            "/mcp",
            Some(&session),
            tool_call(3, "get_code_context_exa", json!({"query": "serde"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("not found"));
    assert!(h.backend.calls.lock().unwrap().is_empty());
    assert_eq!(h.state.analytics.snapshot().total_tool_calls, 0);
}

#[tokio::test]
async fn test_second_initialize_is_rejected_and_session_survives() {
    let h = harness(ServerConfig::default());
    let session = h.initialize().await;

    let reply = h.post_mcp("/mcp", Some(&session), initialize_request()).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = h
        .post_mcp(
            "/mcp",
            Some(&session),
            json!({"jsonrpc": "2.0", "id": 5, "method": "ping"}),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["result"], json!({}));
}

#[tokio::test]
async fn test_protocol_violation_closes_session() {
    let h = harness(ServerConfig::default());
    let session = h.initialize().await;

    let reply = h
        .post_mcp(
            "/mcp",
            Some(&session),
            json!({"jsonrpc": "1.0", "id": 2, "method": "ping"}),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(h.state.sessions.is_empty());

    let reply = h
        .post_mcp(
            "/mcp",
            Some(&session),
            json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_request() {
    let h = harness(ServerConfig::default());
    let session = h.initialize().await;

    let reply = h
        .post_mcp(
            "/mcp",
            Some(&session),
            json!([
                {"jsonrpc": "2.0", "id": 10, "method": "ping"},
                {"jsonrpc": "2.0", "method": "notifications/progress", "params": {}},
                {"jsonrpc": "2.0", "id": 11, "method": "tools/list"}
            ]),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let responses = reply.body.as_array().unwrap();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], 10);
    assert_eq!(responses[1]["id"], 11);
}

#[tokio::test]
async fn test_unsupported_verb_on_mcp() {
    let h = harness(ServerConfig::default());

    let reply = h.without_body(Method::PUT, "/mcp", None).await;
    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(reply.body["error"], "Method not allowed");
    assert!(reply.headers.get("allow").is_some());
}

#[tokio::test]
async fn test_import_rejects_wrong_key_without_mutation() {
    let h = harness(ServerConfig {
        import_key: Some("s3cret".to_string()),
        ..ServerConfig::default()
    });
    let payload = json!({"totalRequests": 500, "toolCalls": {"web_search_exa": 40}});
    let before = h.state.analytics.snapshot();

    for uri in [
        "/analytics/import?key=wrong",
        "/analytics/import?key=s3cre",
        "/analytics/import?key=",
        "/analytics/import",
    ] {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let reply = h.send(request).await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
    }

    assert_eq!(h.state.analytics.snapshot(), before);
}

#[tokio::test]
async fn test_import_merges_and_saves() {
    let h = harness(ServerConfig {
        import_key: Some("s3cret".to_string()),
        ..ServerConfig::default()
    });

    let payload = json!({
        "totalRequests": 500,
        "totalToolCalls": 40,
        "toolCalls": {"web_search_exa": 40},
        "requestsByMethod": {"POST": 500}
    });
    let request = Request::builder()
        .method(Method::POST)
        .uri("/analytics/import?key=s3cret")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let reply = h.send(request).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], true);
    assert_eq!(reply.body["totalRequests"], 500);
    assert_eq!(reply.body["totalToolCalls"], 40);

    let snapshot = h.state.analytics.snapshot();
    assert_eq!(snapshot.tool_calls["web_search_exa"], 40);
    assert!(snapshot.last_saved.is_some());
    assert!(h.state.analytics.store().path().exists());
}

#[tokio::test]
async fn test_import_malformed_body() {
    let h = harness(ServerConfig::default());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/analytics/import")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"totalRequests": "lots"}"#))
        .unwrap();
    let reply = h.send(request).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(h.state.analytics.snapshot().total_requests, 0);
}

#[tokio::test]
async fn test_read_endpoints() {
    let h = harness(ServerConfig::default());
    h.initialize().await;

    let reply = h.without_body(Method::GET, "/", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["name"], "exa-gateway");
    assert_eq!(
        reply.body["tools"],
        json!(["web_search_exa", "get_code_context_exa"])
    );

    let reply = h.without_body(Method::GET, "/health", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "ok");
    assert_eq!(reply.body["activeSessions"], 1);
    assert_eq!(
        reply.body["startedAt"],
        serde_json::to_value(h.state.started_at).unwrap()
    );

    let reply = h.without_body(Method::GET, "/analytics", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    // initialize, root, health; the analytics surface is not counted
    assert_eq!(reply.body["totalRequests"], 3);
    assert_eq!(reply.body["requestsByMethod"]["GET"], 2);
    assert_eq!(reply.body["hourly"].as_array().unwrap().len(), 1);
    assert_eq!(reply.body["topUserAgents"][0]["count"], 2);
}

#[tokio::test]
async fn test_unrouted_paths_share_one_endpoint_key() {
    let h = harness(ServerConfig::default());

    for uri in ["/analyticsX", "/wp-login.php", "/.env", "/analytics/nope"] {
        let reply = h.without_body(Method::GET, uri, None).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND, "{}", uri);
    }
    h.without_body(Method::GET, "/analytics/tools", None).await;

    let snapshot = h.state.analytics.snapshot();
    assert_eq!(snapshot.total_requests, 4);
    assert_eq!(snapshot.requests_by_endpoint.len(), 1);
    assert_eq!(snapshot.requests_by_endpoint["unmatched"], 4);
}

#[tokio::test]
async fn test_dashboard_is_html() {
    let h = harness(ServerConfig::default());

    let reply = h.without_body(Method::GET, "/analytics/dashboard", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.headers["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert!(reply.body.as_str().unwrap().contains("/analytics"));
}

#[tokio::test]
async fn test_push_stream_delivers_notifications_until_delete() {
    use futures::StreamExt;

    let h = harness(ServerConfig::default());
    let session = h.initialize().await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/mcp")
        .header(SESSION_ID_HEADER, &session)
        .body(Body::empty())
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    let mut frames = response.into_body().into_data_stream();

    h.post_mcp(
        "/mcp",
        Some(&session),
        tool_call(7, "web_search_exa", json!({"query": "sse"})),
    )
    .await;

    let frame = frames.next().await.unwrap().unwrap();
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert!(text.contains("event: message"));
    assert!(text.contains("notifications/message"));
    assert!(text.contains("web_search_exa completed"));

    let reply = h.without_body(Method::DELETE, "/mcp", Some(&session)).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(frames.next().await.is_none());
}

#[tokio::test]
async fn test_dropping_push_stream_closes_session() {
    let h = harness(ServerConfig::default());
    let session = h.initialize().await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/mcp")
        .header(SESSION_ID_HEADER, &session)
        .body(Body::empty())
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.state.sessions.len(), 1);

    drop(response);
    assert!(h.state.sessions.is_empty());
}
