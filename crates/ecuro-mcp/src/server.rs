use std::sync::{Arc, OnceLock};

use crate::{
    EcuroMcpError, ErrorData,
    config::Config,
    directory::DentistDirectory,
    handler::server::{
        ServerHandler,
        tool::{ToolCallContext, ToolRouter},
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, InitializeRequestParam,
        InitializeResult, ListToolsResult, ProtocolVersion, ServerCapabilities, ServerInfo,
        ToolsCapability,
    },
    tools,
    upstream::UpstreamClient,
};

const INSTRUCTIONS: &str = "Tools for the Ecuro Light dental clinic API. \
Look up clinics and specialties first (ecuro_list_clinics, ecuro_list_specialties), \
check free slots with the availability tools, then book with ecuro_create_appointment. \
Find dentists by name or specialty with the ecuro_get_dentist_* tools. \
Dates use yyyy-MM-dd, times use HH:MM:SS and identifiers are UUIDs.";

/// Registry and upstream client shared by every session.
#[derive(Debug, Clone)]
pub struct Shared {
    pub tool_router: Arc<ToolRouter<UpstreamClient>>,
    pub upstream: Arc<UpstreamClient>,
}

impl Shared {
    /// Build the registry and clients from the process configuration.
    pub fn from_config(config: &Config) -> Result<Self, EcuroMcpError> {
        let mut upstream = UpstreamClient::new(config.upstream())?;
        match config.directory() {
            Some(directory) => {
                upstream = upstream.with_directory(DentistDirectory::new(directory)?);
            }
            None => {
                tracing::warn!("SUPABASE_URL or SUPABASE_KEY is not set, dentist lookups will fail")
            }
        }
        Ok(Self::new(tools::registry()?, upstream))
    }

    pub fn new(tool_router: ToolRouter<UpstreamClient>, upstream: UpstreamClient) -> Self {
        Self {
            tool_router: Arc::new(tool_router),
            upstream: Arc::new(upstream),
        }
    }

    /// A fresh engine for a new session.
    pub fn engine(&self) -> EcuroServer {
        EcuroServer {
            shared: self.clone(),
            client_info: OnceLock::new(),
        }
    }
}

/// Protocol engine for one session. Records who connected at `initialize`.
#[derive(Debug)]
pub struct EcuroServer {
    shared: Shared,
    client_info: OnceLock<Implementation>,
}

impl EcuroServer {
    pub fn client_info(&self) -> Option<&Implementation> {
        self.client_info.get()
    }
}

impl ServerHandler for EcuroServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
            },
            server_info: Implementation::from_build_env(),
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    async fn initialize(
        &self,
        request: InitializeRequestParam,
    ) -> Result<InitializeResult, ErrorData> {
        let mut info = self.get_info();
        info.protocol_version = ProtocolVersion::negotiate(&request.protocol_version);
        tracing::info!(
            client = %request.client_info.name,
            client_version = %request.client_info.version,
            protocol_version = info.protocol_version.as_str(),
            "client initialized"
        );
        if self.client_info.set(request.client_info).is_err() {
            tracing::debug!("repeated initialize, keeping the first client info");
        }
        Ok(info)
    }

    async fn list_tools(&self) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.shared.tool_router.list_all(),
            next_cursor: None,
        })
    }

    async fn call_tool(&self, request: CallToolRequestParam) -> Result<CallToolResult, ErrorData> {
        tracing::info!(tool = %request.name, "tool call");
        let context = ToolCallContext::new(
            self.shared.upstream.clone(),
            request.name,
            request.arguments,
        );
        self.shared.tool_router.call(context).await
    }
}
