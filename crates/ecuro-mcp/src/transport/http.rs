use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    http::{
        HeaderName, Method,
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;

use super::{
    HEADER_LAST_EVENT_ID, HEADER_PROTOCOL_VERSION, HEADER_SESSION_ID, SessionCounts,
    SessionManager, TransportError,
    sse_server::{self, SseServerConfig},
    streamable_http_server::{self, DEFAULT_SSE_KEEP_ALIVE, StreamableHttpServerConfig},
};
use crate::handler::server::ServerHandler;

pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub bind: SocketAddr,
    pub sse_keep_alive: Duration,
    /// `None` disables the idle reaper.
    pub session_idle_timeout: Option<Duration>,
    pub ct: CancellationToken,
}

impl HttpServerConfig {
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            sse_keep_alive: DEFAULT_SSE_KEEP_ALIVE,
            session_idle_timeout: Some(DEFAULT_SESSION_IDLE_TIMEOUT),
            ct: CancellationToken::new(),
        }
    }
}

/// Static facts reported by the health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSummary {
    pub server: String,
    pub version: String,
    pub tools: usize,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    #[serde(flatten)]
    summary: ServerSummary,
    transport: &'static str,
    sessions: SessionCounts,
}

/// The single CORS stage in front of every route, preflight included.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            AUTHORIZATION,
            HeaderName::from_static(HEADER_SESSION_ID),
            HeaderName::from_static(HEADER_PROTOCOL_VERSION),
            HeaderName::from_static(HEADER_LAST_EVENT_ID),
        ])
        .expose_headers([HeaderName::from_static(HEADER_SESSION_ID)])
}

pub fn router<S: ServerHandler>(
    sessions: Arc<SessionManager<S>>,
    summary: ServerSummary,
    sse_keep_alive: Duration,
) -> Router {
    let health = {
        let sessions = sessions.clone();
        get(move || {
            let sessions = sessions.clone();
            let summary = summary.clone();
            async move {
                Json(Health {
                    status: "ok",
                    summary,
                    transport: "http",
                    sessions: sessions.counts().await,
                })
            }
        })
    };
    Router::new()
        .route("/", health.clone())
        .route("/health", health)
        .merge(streamable_http_server::router(
            sessions.clone(),
            StreamableHttpServerConfig {
                sse_keep_alive,
                ..Default::default()
            },
        ))
        .merge(sse_server::router(
            sessions,
            SseServerConfig {
                sse_keep_alive,
                ..Default::default()
            },
        ))
        .layer(cors_layer())
}

#[derive(Debug)]
pub struct HttpServer {
    /// Actual bound address, useful when binding port 0.
    pub local_addr: SocketAddr,
    ct: CancellationToken,
    task: JoinHandle<()>,
}

impl HttpServer {
    pub async fn serve<S: ServerHandler>(
        sessions: Arc<SessionManager<S>>,
        summary: ServerSummary,
        config: HttpServerConfig,
    ) -> Result<Self, TransportError> {
        let listener = tokio::net::TcpListener::bind(config.bind)
            .await
            .map_err(|source| TransportError::Bind {
                addr: config.bind,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let ct = config.ct.clone();

        if let Some(max_idle) = config.session_idle_timeout {
            spawn_reaper(sessions.clone(), max_idle, ct.child_token());
        }

        let app = router(sessions.clone(), summary, config.sse_keep_alive);
        let shutdown = {
            let ct = ct.clone();
            async move {
                ct.cancelled().await;
                tracing::info!("http server cancelled");
                // open event streams end with their sessions
                sessions.close_all().await;
            }
        };
        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown);
        let task = tokio::spawn(
            async move {
                if let Err(e) = server.await {
                    tracing::error!(error = %e, "http server shutdown with error");
                }
            }
            .instrument(tracing::info_span!("http-server", bind_address = %local_addr)),
        );
        tracing::info!(%local_addr, "listening");
        Ok(Self {
            local_addr,
            ct,
            task,
        })
    }

    pub fn cancel(&self) {
        self.ct.cancel();
    }

    /// Wait until the server stops.
    pub async fn waiting(self) -> Result<(), TransportError> {
        self.task.await.map_err(std::io::Error::other)?;
        Ok(())
    }

    pub async fn shutdown(self) -> Result<(), TransportError> {
        self.cancel();
        self.waiting().await
    }
}

fn spawn_reaper<S: Send + Sync + 'static>(
    sessions: Arc<SessionManager<S>>,
    max_idle: Duration,
    ct: CancellationToken,
) {
    let period = (max_idle / 2).clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ct.cancelled() => break,
                    _ = ticker.tick() => {
                        let reaped = sessions.reap_idle(max_idle).await;
                        if reaped > 0 {
                            tracing::info!(reaped, "closed idle sessions");
                        }
                    }
                }
            }
        }
        .instrument(tracing::info_span!("session-reaper")),
    );
}
