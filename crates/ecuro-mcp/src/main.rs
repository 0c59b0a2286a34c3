use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ecuro_mcp::{
    Shared,
    config::{Config, TransportKind},
    model::Implementation,
    transport::{
        SessionManager,
        http::{HttpServer, ServerSummary},
        stdio::serve_stdio,
    },
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is the protocol channel in stdio mode
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = Config::parse();
    tracing::debug!(?config, "configuration loaded");
    if config.access_token.is_empty() {
        tracing::warn!("ECURO_ACCESS_TOKEN is not set, upstream calls will be rejected");
    }

    let shared = Shared::from_config(&config)?;
    let info = Implementation::from_build_env();
    tracing::info!(
        server = %info.name,
        version = %info.version,
        tools = shared.tool_router.len(),
        base_url = shared.upstream.base_url(),
        "starting"
    );

    match config.transport {
        TransportKind::Stdio => {
            let ct = CancellationToken::new();
            tokio::spawn({
                let ct = ct.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        ct.cancel();
                    }
                }
            });
            serve_stdio(Arc::new(shared.engine()), ct).await?;
        }
        TransportKind::Http => {
            let bind = config.bind_addr().await?;
            let http = config.http(bind);
            let summary = ServerSummary {
                server: info.name,
                version: info.version,
                tools: shared.tool_router.len(),
            };
            let sessions = Arc::new(SessionManager::with_ct(
                move || shared.engine(),
                http.ct.child_token(),
            ));
            let server = HttpServer::serve(sessions, summary, http).await?;
            tokio::signal::ctrl_c().await?;
            tracing::info!("shutting down");
            server.shutdown().await?;
        }
    }
    Ok(())
}
