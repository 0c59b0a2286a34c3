#![allow(dead_code)]
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{OriginalUri, State},
    http::{HeaderMap, Method, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use ecuro_mcp::{
    Shared, UpstreamClient, UpstreamConfig,
    directory::{DentistDirectory, DirectoryConfig},
    tools,
    transport::{
        SessionManager,
        http::{HttpServer, HttpServerConfig, ServerSummary},
    },
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub const LOGO_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 1, 2, 255];
pub const CLINIC_ID: &str = "0b6a9f4e-3c1d-4f2a-9e8b-7d6c5b4a3f21";
pub const MISSING_CLINIC_ID: &str = "11111111-2222-4333-8444-555555555555";
pub const TOKEN: &str = "test-token";
pub const DIRECTORY_KEY: &str = "directory-key";
pub const DENTIST_NAME: &str = "Ana";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub token: Option<String>,
    pub api_key: Option<String>,
    pub body: Option<Value>,
}

/// A stand-in for the Ecuro Light API that records every request.
#[derive(Clone, Default)]
pub struct MockUpstream {
    calls: Arc<Mutex<Vec<Recorded>>>,
}

impl MockUpstream {
    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub async fn spawn(&self) -> anyhow::Result<SocketAddr> {
        let app = Router::new()
            .fallback(respond)
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(addr)
    }
}

async fn respond(
    State(mock): State<MockUpstream>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    mock.calls.lock().unwrap().push(Recorded {
        method,
        path: path.clone(),
        query: uri.query().map(str::to_owned),
        token: header(&headers, "app-access-token"),
        api_key: header(&headers, "apikey"),
        body: serde_json::from_slice(&body).ok(),
    });

    if path.starts_with("/rest/v1/") {
        let query = uri.query().unwrap_or_default();
        if query.contains(&format!("firstName=eq.{DENTIST_NAME}")) {
            return Json(json!([{
                "id": "d1",
                "firstName": DENTIST_NAME,
                "speciality_name": "Ortodontia",
                "clinic_id": CLINIC_ID
            }]))
            .into_response();
        }
        return Json(json!([])).into_response();
    }
    if path.ends_with(&format!("/logo/{CLINIC_ID}")) {
        return ([(CONTENT_TYPE, "image/png")], LOGO_BYTES).into_response();
    }
    if path.ends_with("/csv") {
        return (
            [(CONTENT_TYPE, "text/csv")],
            "date,patient\n2025-01-10,Maria Silva\n",
        )
            .into_response();
    }
    if uri.query().is_some_and(|query| query.contains(MISSING_CLINIC_ID)) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "clinic not found" })),
        )
            .into_response();
    }
    Json(json!({ "ok": true, "path": path })).into_response()
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Shared state whose Ecuro API and dentist directory both point at the mock.
pub fn shared(upstream: SocketAddr) -> anyhow::Result<Shared> {
    let directory = DentistDirectory::new(DirectoryConfig {
        url: format!("http://{upstream}"),
        key: DIRECTORY_KEY.to_string(),
        timeout: Duration::from_secs(5),
    })?;
    let client = UpstreamClient::new(UpstreamConfig {
        base_url: format!("http://{upstream}/api/v1/ecuro-light"),
        access_token: TOKEN.to_string(),
        timeout: Duration::from_secs(5),
    })?
    .with_directory(directory);
    Ok(Shared::new(tools::registry()?, client))
}

pub struct TestServer {
    pub base: String,
    pub sessions: Arc<SessionManager<ecuro_mcp::EcuroServer>>,
    pub upstream: MockUpstream,
    pub server: HttpServer,
}

pub async fn spawn_http() -> anyhow::Result<TestServer> {
    spawn_http_with(HttpServerConfig::new("127.0.0.1:0".parse()?)).await
}

pub async fn spawn_http_with(config: HttpServerConfig) -> anyhow::Result<TestServer> {
    let upstream = MockUpstream::default();
    let shared = shared(upstream.spawn().await?)?;
    let summary = ServerSummary {
        server: "ecuro-mcp-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tools: shared.tool_router.len(),
    };
    let sessions = Arc::new(SessionManager::with_ct(
        move || shared.engine(),
        CancellationToken::new(),
    ));
    let server = HttpServer::serve(sessions.clone(), summary, config).await?;
    Ok(TestServer {
        base: format!("http://{}", server.local_addr),
        sessions,
        upstream,
        server,
    })
}

pub fn initialize_request(id: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "0.1.0" }
        }
    })
}

pub fn call_tool_request(id: u64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
}
