mod common;

use std::time::Duration;

use common::{call_tool_request, initialize_request, spawn_http, spawn_http_with};
use ecuro_mcp::{
    model::ErrorCode,
    transport::{Family, http::HttpServerConfig},
};
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde_json::Value;

/// Minimal reader for `event:`/`data:` frames; comments are skipped.
struct EventReader<S> {
    bytes: S,
    buffer: String,
}

impl<S> EventReader<S>
where
    S: Stream<Item = reqwest::Result<axum::body::Bytes>> + Unpin,
{
    fn new(bytes: S) -> Self {
        Self {
            bytes,
            buffer: String::new(),
        }
    }

    async fn next_event(&mut self) -> anyhow::Result<(String, String)> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let frame: String = self.buffer.drain(..end + 2).collect();
                let mut event = String::from("message");
                let mut data = Vec::new();
                for line in frame.lines() {
                    if let Some(name) = line.strip_prefix("event:") {
                        event = name.trim().to_string();
                    } else if let Some(chunk) = line.strip_prefix("data:") {
                        data.push(chunk.trim_start().to_string());
                    }
                }
                if data.is_empty() {
                    continue;
                }
                return Ok((event, data.join("\n")));
            }
            let chunk = tokio::time::timeout(Duration::from_secs(5), self.bytes.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("event stream ended"))??;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }
}

#[tokio::test]
async fn test_sse_round_trip() -> anyhow::Result<()> {
    let server = spawn_http().await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/sse", server.base))
        .header("accept", "text/event-stream")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let mut events = EventReader::new(response.bytes_stream());

    let (event, endpoint) = events.next_event().await?;
    assert_eq!(event, "endpoint");
    let session_id = endpoint
        .strip_prefix("/messages?sessionId=")
        .expect("endpoint carries the session id")
        .to_string();
    assert!(server.sessions.get(Family::Sse, &session_id).await.is_some());

    let post_url = format!("{}{endpoint}", server.base);
    let accepted = client.post(&post_url).json(&initialize_request(1)).send().await?;
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);

    let (event, data) = events.next_event().await?;
    assert_eq!(event, "message");
    let reply: Value = serde_json::from_str(&data)?;
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["serverInfo"]["name"], "ecuro-mcp-server");

    let accepted = client
        .post(&post_url)
        .json(&call_tool_request(2, "ecuro_list_specialties", serde_json::json!({})))
        .send()
        .await?;
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);
    let (_, data) = events.next_event().await?;
    let reply: Value = serde_json::from_str(&data)?;
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["result"]["isError"], false);
    assert_eq!(server.upstream.calls().len(), 1);

    let sessions = server.sessions.clone();
    server.server.shutdown().await?;
    assert!(sessions.get(Family::Sse, &session_id).await.is_none());
    let ended = tokio::time::timeout(Duration::from_secs(5), events.next_event()).await?;
    assert!(ended.is_err());
    Ok(())
}

#[tokio::test]
async fn test_post_for_unknown_sse_session() -> anyhow::Result<()> {
    let server = spawn_http().await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/messages?sessionId=missing", server.base))
        .json(&initialize_request(1))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], ErrorCode::SESSION_NOT_FOUND.0);

    let response = client
        .post(format!("{}/messages", server.base))
        .json(&initialize_request(1))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], ErrorCode::SESSION_REQUIRED.0);

    server.server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_sse_sessions_are_separate_from_streamable_ones() -> anyhow::Result<()> {
    let server = spawn_http().await?;
    let client = reqwest::Client::new();

    let response = client.get(format!("{}/sse", server.base)).send().await?;
    let mut events = EventReader::new(response.bytes_stream());
    let (_, endpoint) = events.next_event().await?;
    let session_id = endpoint.rsplit('=').next().unwrap_or_default().to_string();

    let response = client
        .post(format!("{}/mcp", server.base))
        .header("mcp-session-id", &session_id)
        .json(&initialize_request(1))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(server.sessions.counts().await.sse, 1);

    drop(events);
    server.server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_client_disconnect_closes_sse_session() -> anyhow::Result<()> {
    let config = HttpServerConfig {
        sse_keep_alive: Duration::from_millis(50),
        ..HttpServerConfig::new("127.0.0.1:0".parse()?)
    };
    let server = spawn_http_with(config).await?;
    let client = reqwest::Client::new();

    let response = client.get(format!("{}/sse", server.base)).send().await?;
    let mut events = EventReader::new(response.bytes_stream());
    let (_, endpoint) = events.next_event().await?;
    let session_id = endpoint.rsplit('=').next().unwrap_or_default().to_string();
    let session = server
        .sessions
        .get(Family::Sse, &session_id)
        .await
        .expect("live sse session");

    drop(events);
    tokio::time::timeout(Duration::from_secs(5), session.ct().cancelled()).await?;
    assert_eq!(server.sessions.len(Family::Sse).await, 0);

    let response = client
        .post(format!("{}{endpoint}", server.base))
        .json(&initialize_request(1))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    server.server.shutdown().await?;
    Ok(())
}
