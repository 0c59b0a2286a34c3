use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    ErrorData,
    model::{
        CallToolRequestParam, CallToolResult, ClientJsonRpcMessage, EmptyResult,
        InitializeRequestParam, InitializeResult, JsonRpcMessage, JsonRpcRequest, ListToolsResult,
        ProtocolVersion, ServerInfo, ServerJsonRpcMessage,
    },
};

pub mod tool;
pub mod validation;

/// The protocol engine behind one session.
///
/// Every method has a default so an implementation only overrides what it
/// serves. Transports never call these directly; they go through
/// [`handle_message`].
pub trait ServerHandler: Send + Sync + 'static {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: Default::default(),
            server_info: crate::model::Implementation::from_build_env(),
            instructions: None,
        }
    }

    fn initialize(
        &self,
        request: InitializeRequestParam,
    ) -> impl Future<Output = Result<InitializeResult, ErrorData>> + Send + '_ {
        let mut info = self.get_info();
        info.protocol_version = ProtocolVersion::negotiate(&request.protocol_version);
        std::future::ready(Ok(info))
    }

    fn ping(&self) -> impl Future<Output = Result<EmptyResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(EmptyResult {}))
    }

    fn list_tools(&self) -> impl Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: Vec::new(),
            next_cursor: None,
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> impl Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        std::future::ready(Err(ErrorData::tool_not_found(&request.name)))
    }

    fn on_notification(&self, method: &str) -> impl Future<Output = ()> + Send + '_ {
        tracing::debug!(%method, "notification received");
        std::future::ready(())
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, ErrorData> {
    let params = params.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(params).map_err(|e| {
        ErrorData::invalid_params(
            "invalid params",
            Some(serde_json::json!({ "reason": e.to_string() })),
        )
    })
}

fn into_value<T: Serialize>(result: Result<T, ErrorData>) -> Result<Value, ErrorData> {
    serde_json::to_value(result?).map_err(|e| {
        tracing::error!(error = %e, "failed to serialize result");
        ErrorData::internal_error("internal error", None)
    })
}

async fn handle_request<H: ServerHandler>(
    handler: &H,
    request: JsonRpcRequest,
) -> Result<Value, ErrorData> {
    match request.method.as_str() {
        "initialize" => {
            let params = parse_params::<InitializeRequestParam>(request.params)?;
            into_value(handler.initialize(params).await)
        }
        "ping" => into_value(handler.ping().await),
        "tools/list" => into_value(handler.list_tools().await),
        "tools/call" => {
            let params = parse_params::<CallToolRequestParam>(request.params)?;
            into_value(handler.call_tool(params).await)
        }
        other => Err(ErrorData::method_not_found(other)),
    }
}

/// Run one inbound message through the engine.
///
/// Requests always produce exactly one response or error; notifications and
/// stray client responses produce nothing.
pub async fn handle_message<H: ServerHandler>(
    handler: &H,
    message: ClientJsonRpcMessage,
) -> Option<ServerJsonRpcMessage> {
    match message {
        JsonRpcMessage::Request(request) => {
            let id = request.id.clone();
            let method = request.method.clone();
            tracing::debug!(%id, %method, "dispatching request");
            Some(match handle_request(handler, request).await {
                Ok(result) => JsonRpcMessage::response(id, result),
                Err(error) => {
                    tracing::debug!(%id, %method, %error, "request failed");
                    JsonRpcMessage::error(Some(id), error)
                }
            })
        }
        JsonRpcMessage::Notification(notification) => {
            handler.on_notification(&notification.method).await;
            None
        }
        JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_) => {
            tracing::debug!("ignoring response sent by client");
            None
        }
    }
}
