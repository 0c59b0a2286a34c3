//! Transport bindings.
//!
//! * [`stdio`]: one implicit session over newline-delimited stdin/stdout.
//! * [`streamable_http_server`]: `POST|GET|DELETE /mcp`, sessions addressed
//!   by the `mcp-session-id` header.
//! * [`sse_server`]: legacy `GET /sse` stream with `POST /messages?sessionId=`.
//! * [`http`]: mounts both HTTP bindings on one axum router with CORS and
//!   health endpoints.
use std::{io, net::SocketAddr};

pub mod http;
pub mod session;
pub mod sse_server;
pub mod stdio;
pub mod streamable_http_server;

pub use session::{Family, Session, SessionCounts, SessionId, SessionManager, session_id};

pub const HEADER_SESSION_ID: &str = "mcp-session-id";
pub const HEADER_PROTOCOL_VERSION: &str = "mcp-protocol-version";
pub const HEADER_LAST_EVENT_ID: &str = "last-event-id";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("line codec error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
