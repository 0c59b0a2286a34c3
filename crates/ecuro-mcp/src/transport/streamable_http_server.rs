//! Streamable HTTP binding on a single path.
//!
//! * `POST` carries one JSON-RPC message. Without `mcp-session-id` a new
//!   session is created and its id returned in the response header; with it,
//!   the message goes to that session's engine.
//! * `GET` opens an event stream for an existing session. It only carries
//!   keep-alives and ends when the session closes.
//! * `DELETE` closes the session.
//!
//! A missing header where one is required answers HTTP 200 with a `-32000`
//! error; an unknown id answers HTTP 404 with `-32001`. Neither touches the
//! session table.
use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::post,
};
use futures::StreamExt;

use super::{Family, HEADER_SESSION_ID, SessionManager};
use crate::{
    ErrorData,
    handler::server::{ServerHandler, handle_message},
    model::{JsonRpcMessage, RequestId},
};

pub const DEFAULT_SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct StreamableHttpServerConfig {
    pub path: String,
    pub sse_keep_alive: Duration,
}

impl Default for StreamableHttpServerConfig {
    fn default() -> Self {
        Self {
            path: "/mcp".to_string(),
            sse_keep_alive: DEFAULT_SSE_KEEP_ALIVE,
        }
    }
}

struct App<S> {
    sessions: Arc<SessionManager<S>>,
    sse_keep_alive: Duration,
}

impl<S> Clone for App<S> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            sse_keep_alive: self.sse_keep_alive,
        }
    }
}

pub(crate) fn rpc_error(status: StatusCode, id: Option<RequestId>, error: ErrorData) -> Response {
    (status, Json(JsonRpcMessage::error(id, error))).into_response()
}

/// Status for a message that failed to parse: both parse errors and
/// malformed envelopes are client errors.
pub(crate) fn rejected(error: JsonRpcMessage) -> Response {
    tracing::debug!(?error, "rejected inbound message");
    (StatusCode::BAD_REQUEST, Json(error)).into_response()
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(HEADER_SESSION_ID)
        .map(|value| value.to_str().unwrap_or_default())
        .filter(|value| !value.is_empty())
}

async fn post_handler<S: ServerHandler>(
    State(app): State<App<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let message = match JsonRpcMessage::from_slice(&body) {
        Ok(message) => message,
        Err(error) => return rejected(*error),
    };
    let session = match session_header(&headers) {
        Some(id) => match app.sessions.get(Family::StreamableHttp, id).await {
            Some(session) => session,
            None => {
                tracing::debug!(session_id = id, "post for unknown session");
                return rpc_error(
                    StatusCode::NOT_FOUND,
                    request_id(&message),
                    ErrorData::session_not_found(id),
                );
            }
        },
        None => app.sessions.create(Family::StreamableHttp, None).await,
    };
    let session_id = session.id().to_string();
    let id = request_id(&message);

    // runs detached: neither a dropped connection nor a DELETE cancels it
    let engine = session.engine().clone();
    let reply = tokio::spawn(async move { handle_message(engine.as_ref(), message).await }).await;

    let headers = [(HEADER_SESSION_ID, session_id)];
    match reply {
        Ok(Some(reply)) => (headers, Json(reply)).into_response(),
        Ok(None) => (StatusCode::ACCEPTED, headers).into_response(),
        Err(error) => {
            tracing::error!(%error, "message handler aborted");
            let body = JsonRpcMessage::error(id, ErrorData::internal_error("internal error", None));
            (StatusCode::INTERNAL_SERVER_ERROR, headers, Json(body)).into_response()
        }
    }
}

fn request_id(message: &JsonRpcMessage) -> Option<RequestId> {
    match message {
        JsonRpcMessage::Request(request) => Some(request.id.clone()),
        _ => None,
    }
}

async fn get_handler<S: ServerHandler>(
    State(app): State<App<S>>,
    headers: HeaderMap,
) -> Response {
    let Some(id) = session_header(&headers) else {
        return rpc_error(StatusCode::OK, None, ErrorData::session_required());
    };
    let Some(session) = app.sessions.get(Family::StreamableHttp, id).await else {
        return rpc_error(StatusCode::NOT_FOUND, None, ErrorData::session_not_found(id));
    };
    tracing::debug!(session_id = %session.id(), "event stream opened");
    let stream = futures::stream::pending::<Result<Event, Infallible>>()
        .take_until(session.ct().clone().cancelled_owned());
    let sse = Sse::new(stream).keep_alive(KeepAlive::new().interval(app.sse_keep_alive));
    ([(HEADER_SESSION_ID, session.id().to_string())], sse).into_response()
}

async fn delete_handler<S: ServerHandler>(
    State(app): State<App<S>>,
    headers: HeaderMap,
) -> Response {
    let Some(id) = session_header(&headers) else {
        return rpc_error(StatusCode::OK, None, ErrorData::session_required());
    };
    if app.sessions.close(Family::StreamableHttp, id).await {
        StatusCode::OK.into_response()
    } else {
        rpc_error(StatusCode::NOT_FOUND, None, ErrorData::session_not_found(id))
    }
}

pub fn router<S: ServerHandler>(
    sessions: Arc<SessionManager<S>>,
    config: StreamableHttpServerConfig,
) -> Router {
    let app = App {
        sessions,
        sse_keep_alive: config.sse_keep_alive,
    };
    Router::new()
        .route(
            &config.path,
            post(post_handler::<S>)
                .get(get_handler::<S>)
                .delete(delete_handler::<S>),
        )
        .with_state(app)
}
