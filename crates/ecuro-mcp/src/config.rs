use std::{io, net::SocketAddr, time::Duration};

use clap::{Parser, ValueEnum};

use crate::{
    directory::DirectoryConfig,
    transport::http::HttpServerConfig,
    upstream::{DEFAULT_BASE_URL, UpstreamConfig},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Newline-delimited JSON-RPC on stdin/stdout
    Stdio,
    /// Streamable HTTP on /mcp plus legacy SSE on /sse
    Http,
}

/// MCP server for the Ecuro Light scheduling API.
#[derive(Clone, Parser)]
#[command(author, version, about)]
pub struct Config {
    /// Transport binding to serve
    #[arg(long, env = "TRANSPORT", value_enum, default_value = "stdio")]
    pub transport: TransportKind,

    /// Address to bind in http mode
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind in http mode
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Base URL of the Ecuro Light API
    #[arg(long, env = "ECURO_API_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub api_base_url: String,

    /// Value sent in the app-access-token header
    #[arg(long, env = "ECURO_ACCESS_TOKEN", default_value = "", hide_env_values = true)]
    pub access_token: String,

    /// Supabase project URL holding the dentist directory
    #[arg(long, env = "SUPABASE_URL", default_value = "")]
    pub supabase_url: String,

    /// Supabase key used for dentist lookups
    #[arg(long, env = "SUPABASE_KEY", default_value = "", hide_env_values = true)]
    pub supabase_key: String,

    /// Upstream request timeout in seconds
    #[arg(long, env = "ECURO_API_TIMEOUT_SECS", default_value_t = 30)]
    pub upstream_timeout_secs: u64,

    /// Keep-alive interval of event streams in seconds
    #[arg(long, env = "SSE_KEEP_ALIVE_SECS", default_value_t = 15)]
    pub sse_keep_alive_secs: u64,

    /// Close HTTP sessions idle for this many seconds (0 disables)
    #[arg(long, env = "SESSION_IDLE_TIMEOUT_SECS", default_value_t = 1800)]
    pub session_idle_timeout_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("transport", &self.transport)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_base_url", &self.api_base_url)
            .field("access_token", &"<redacted>")
            .field("supabase_url", &self.supabase_url)
            .field("supabase_key", &"<redacted>")
            .field("upstream_timeout_secs", &self.upstream_timeout_secs)
            .field("sse_keep_alive_secs", &self.sse_keep_alive_secs)
            .field("session_idle_timeout_secs", &self.session_idle_timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn upstream(&self) -> UpstreamConfig {
        UpstreamConfig {
            base_url: self.api_base_url.clone(),
            access_token: self.access_token.clone(),
            timeout: Duration::from_secs(self.upstream_timeout_secs),
        }
    }

    /// `None` unless both Supabase settings are present.
    pub fn directory(&self) -> Option<DirectoryConfig> {
        if self.supabase_url.is_empty() || self.supabase_key.is_empty() {
            return None;
        }
        Some(DirectoryConfig {
            url: self.supabase_url.clone(),
            key: self.supabase_key.clone(),
            timeout: Duration::from_secs(self.upstream_timeout_secs),
        })
    }

    /// Resolve `host:port`; the host may be a name or an IP literal.
    pub async fn bind_addr(&self) -> io::Result<SocketAddr> {
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{} did not resolve to an address", self.host),
                )
            })
    }

    pub fn http(&self, bind: SocketAddr) -> HttpServerConfig {
        HttpServerConfig {
            sse_keep_alive: Duration::from_secs(self.sse_keep_alive_secs.max(1)),
            session_idle_timeout: match self.session_idle_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            ..HttpServerConfig::new(bind)
        }
    }
}
