use std::{io, sync::Arc, time::Duration};

use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;

use super::{
    Family, SessionManager,
    streamable_http_server::{DEFAULT_SSE_KEEP_ALIVE, rejected, rpc_error},
};
use crate::{
    ErrorData,
    handler::server::{ServerHandler, handle_message},
    model::JsonRpcMessage,
};

#[derive(Debug, Clone)]
pub struct SseServerConfig {
    pub sse_path: String,
    pub post_path: String,
    pub sse_keep_alive: Duration,
}

impl Default for SseServerConfig {
    fn default() -> Self {
        Self {
            sse_path: "/sse".to_string(),
            post_path: "/messages".to_string(),
            sse_keep_alive: DEFAULT_SSE_KEEP_ALIVE,
        }
    }
}

struct App<S> {
    sessions: Arc<SessionManager<S>>,
    post_path: Arc<str>,
    sse_keep_alive: Duration,
}

impl<S> Clone for App<S> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            post_path: self.post_path.clone(),
            sse_keep_alive: self.sse_keep_alive,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostEventQuery {
    pub session_id: Option<String>,
}

async fn post_event_handler<S: ServerHandler>(
    State(app): State<App<S>>,
    Query(PostEventQuery { session_id }): Query<PostEventQuery>,
    body: Bytes,
) -> Response {
    let Some(session_id) = session_id.filter(|id| !id.is_empty()) else {
        return rpc_error(StatusCode::BAD_REQUEST, None, ErrorData::session_required());
    };
    let Some(session) = app.sessions.get(Family::Sse, &session_id).await else {
        tracing::debug!(session_id, "message for unknown session");
        return rpc_error(
            StatusCode::NOT_FOUND,
            None,
            ErrorData::session_not_found(&session_id),
        );
    };
    let message = match JsonRpcMessage::from_slice(&body) {
        Ok(message) => message,
        Err(error) => return rejected(*error),
    };
    let Some(outbound) = session.outbound().cloned() else {
        tracing::error!(session_id, "sse session without an event stream");
        return StatusCode::GONE.into_response();
    };
    let engine = session.engine().clone();
    tokio::spawn(async move {
        if let Some(reply) = handle_message(engine.as_ref(), message).await {
            if outbound.send(reply).await.is_err() {
                tracing::debug!(session_id, "event stream gone, reply discarded");
            }
        }
    });
    StatusCode::ACCEPTED.into_response()
}

async fn sse_handler<S: ServerHandler>(
    State(app): State<App<S>>,
) -> Sse<impl Stream<Item = Result<Event, io::Error>>> {
    let (to_client_tx, to_client_rx) = tokio::sync::mpsc::channel(64);
    let session = app
        .sessions
        .create(Family::Sse, Some(to_client_tx.clone()))
        .await;
    let session_id = session.id().clone();
    tracing::info!(%session_id, "sse connection");

    let ct = session.ct().clone();
    let post_path = app.post_path.as_ref();
    let stream = futures::stream::once(futures::future::ok(
        Event::default()
            .event("endpoint")
            .data(format!("{post_path}?sessionId={session_id}")),
    ))
    .chain(ReceiverStream::new(to_client_rx).map(|message| {
        match serde_json::to_string(&message) {
            Ok(bytes) => Ok(Event::default().event("message").data(&bytes)),
            Err(e) => Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        }
    }))
    .take_until(ct.clone().cancelled_owned());

    let sessions = app.sessions.clone();
    tokio::spawn(async move {
        tokio::select! {
            // the client hung up
            _ = to_client_tx.closed() => {
                sessions.close(Family::Sse, &session_id).await;
            }
            // closed from elsewhere (shutdown)
            _ = ct.cancelled() => {}
        }
        tracing::debug!(%session_id, "sse stream finished");
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(app.sse_keep_alive))
}

pub fn router<S: ServerHandler>(
    sessions: Arc<SessionManager<S>>,
    config: SseServerConfig,
) -> Router {
    let app = App {
        sessions,
        post_path: config.post_path.clone().into(),
        sse_keep_alive: config.sse_keep_alive,
    };
    Router::new()
        .route(&config.sse_path, get(sse_handler::<S>))
        .route(&config.post_path, post(post_event_handler::<S>))
        .with_state(app)
}
