mod common;

use common::{call_tool_request, initialize_request, spawn_http};
use ecuro_mcp::{model::ErrorCode, transport::Family};
use reqwest::StatusCode;
use serde_json::{Value, json};

const SESSION_HEADER: &str = "mcp-session-id";

#[tokio::test]
async fn test_get_without_session_header_is_rejected_softly() -> anyhow::Result<()> {
    let server = spawn_http().await?;
    let response = reqwest::get(format!("{}/mcp", server.base)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["error"]["code"], ErrorCode::SESSION_REQUIRED.0);
    assert_eq!(server.sessions.len(Family::StreamableHttp).await, 0);
    server.server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_session_is_reused_across_posts() -> anyhow::Result<()> {
    let server = spawn_http().await?;
    let client = reqwest::Client::new();
    let url = format!("{}/mcp", server.base);

    let response = client.post(&url).json(&initialize_request(1)).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response
        .headers()
        .get(SESSION_HEADER)
        .expect("session header")
        .to_str()?
        .to_string();
    let body: Value = response.json().await?;
    assert_eq!(body["id"], 1);
    assert_eq!(body["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(body["result"]["serverInfo"]["name"], "ecuro-mcp-server");

    let response = client
        .post(&url)
        .header(SESSION_HEADER, &session_id)
        .json(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = client
        .post(&url)
        .header(SESSION_HEADER, &session_id)
        .json(&json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }))
        .send()
        .await?;
    assert_eq!(
        response.headers().get(SESSION_HEADER).map(|v| v.as_bytes()),
        Some(session_id.as_bytes())
    );
    let body: Value = response.json().await?;
    assert_eq!(body["result"]["tools"].as_array().map(Vec::len), Some(31));

    assert_eq!(server.sessions.len(Family::StreamableHttp).await, 1);
    let session = server
        .sessions
        .get(Family::StreamableHttp, &session_id)
        .await
        .expect("live session");
    let client_info = session.engine().client_info().expect("recorded client");
    assert_eq!(client_info.name, "test-client");

    server.server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_concurrent_first_posts_get_distinct_sessions() -> anyhow::Result<()> {
    let server = spawn_http().await?;
    let client = reqwest::Client::new();
    let url = format!("{}/mcp", server.base);

    let (first, second) = tokio::join!(
        client.post(&url).json(&initialize_request(1)).send(),
        client.post(&url).json(&initialize_request(2)).send(),
    );
    let session_of = |response: &reqwest::Response| {
        response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    let (first, second) = (first?, second?);
    let first_id = session_of(&first).expect("first session header");
    let second_id = session_of(&second).expect("second session header");
    assert_ne!(first_id, second_id);
    assert_eq!(server.sessions.len(Family::StreamableHttp).await, 2);

    let first: Value = first.json().await?;
    let second: Value = second.json().await?;
    assert_eq!(first["id"], 1);
    assert_eq!(second["id"], 2);

    server.server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_unknown_session_is_not_found() -> anyhow::Result<()> {
    let server = spawn_http().await?;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/mcp", server.base))
        .header(SESSION_HEADER, "no-such-session")
        .json(&call_tool_request(7, "ecuro_list_specialties", json!({})))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await?;
    assert_eq!(body["id"], 7);
    assert_eq!(body["error"]["code"], ErrorCode::SESSION_NOT_FOUND.0);
    assert!(server.upstream.calls().is_empty());
    assert_eq!(server.sessions.len(Family::StreamableHttp).await, 0);
    server.server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_malformed_body_is_a_bad_request() -> anyhow::Result<()> {
    let server = spawn_http().await?;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/mcp", server.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], ErrorCode::PARSE_ERROR.0);
    assert_eq!(server.sessions.len(Family::StreamableHttp).await, 0);
    server.server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_delete_closes_session_once() -> anyhow::Result<()> {
    let server = spawn_http().await?;
    let client = reqwest::Client::new();
    let url = format!("{}/mcp", server.base);

    let response = client.post(&url).json(&initialize_request(1)).send().await?;
    let session_id = response
        .headers()
        .get(SESSION_HEADER)
        .expect("session header")
        .to_str()?
        .to_string();
    assert_eq!(server.sessions.len(Family::StreamableHttp).await, 1);

    let response = client
        .delete(&url)
        .header(SESSION_HEADER, &session_id)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.sessions.len(Family::StreamableHttp).await, 0);

    let response = client
        .delete(&url)
        .header(SESSION_HEADER, &session_id)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(server.sessions.len(Family::StreamableHttp).await, 0);

    let response = client
        .post(&url)
        .header(SESSION_HEADER, &session_id)
        .json(&json!({ "jsonrpc": "2.0", "id": 2, "method": "ping" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    server.server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_event_stream_ends_when_session_closes() -> anyhow::Result<()> {
    let server = spawn_http().await?;
    let client = reqwest::Client::new();
    let url = format!("{}/mcp", server.base);

    let response = client.post(&url).json(&initialize_request(1)).send().await?;
    let session_id = response
        .headers()
        .get(SESSION_HEADER)
        .expect("session header")
        .to_str()?
        .to_string();

    let stream = client
        .get(&url)
        .header(SESSION_HEADER, &session_id)
        .header("accept", "text/event-stream")
        .send()
        .await?;
    assert_eq!(stream.status(), StatusCode::OK);
    assert!(
        stream
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"))
    );

    client
        .delete(&url)
        .header(SESSION_HEADER, &session_id)
        .send()
        .await?;
    let rest = tokio::time::timeout(std::time::Duration::from_secs(5), stream.bytes()).await??;
    assert!(!String::from_utf8_lossy(&rest).contains("event: message"));

    server.server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_cors_preflight() -> anyhow::Result<()> {
    let server = spawn_http().await?;
    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{}/mcp", server.base))
        .header("origin", "https://inspector.example")
        .header("access-control-request-method", "POST")
        .header(
            "access-control-request-headers",
            "content-type,mcp-session-id",
        )
        .send()
        .await?;
    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(
        headers.get("access-control-allow-origin").map(|v| v.as_bytes()),
        Some(&b"*"[..])
    );
    let methods = headers
        .get("access-control-allow-methods")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_uppercase();
    for method in ["GET", "POST", "DELETE", "OPTIONS"] {
        assert!(methods.contains(method), "{method} missing from {methods}");
    }
    let allowed = headers
        .get("access-control-allow-headers")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    assert!(allowed.contains("mcp-session-id"));
    server.server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_health_reports_sessions() -> anyhow::Result<()> {
    let server = spawn_http().await?;
    let client = reqwest::Client::new();
    client
        .post(format!("{}/mcp", server.base))
        .json(&initialize_request(1))
        .send()
        .await?;

    for path in ["/", "/health"] {
        let response = client
            .get(format!("{}{path}", server.base))
            .header("origin", "https://inspector.example")
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("access-control-expose-headers"));
        let body: Value = response.json().await?;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["server"], "ecuro-mcp-server");
        assert_eq!(body["tools"], 31);
        assert_eq!(body["transport"], "http");
        assert_eq!(body["sessions"]["streamableHttp"], 1);
        assert_eq!(body["sessions"]["sse"], 0);
    }
    server.server.shutdown().await?;
    Ok(())
}
