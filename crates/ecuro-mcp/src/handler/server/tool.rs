//! Tool registry and dispatch.
//!
//! A [`ToolRouter`] maps tool names to [`ToolRoute`]s. Each route pairs the
//! tool descriptor advertised in `tools/list` with a handler of the shape
//! `(Arc<S>, Parameters<P>) -> ToolOutcome`, where `S` is the shared state
//! handed to every call and `P` the typed, validated argument object.
//!
//! Dispatch keeps two failure surfaces apart:
//!
//! * malformed calls (unknown tool, arguments violating the input contract)
//!   are protocol errors and never reach the handler;
//! * failures inside a handler that reached the upstream API or the dentist
//!   directory are reported as tool content with `isError: true`.
use std::{borrow::Cow, collections::HashMap, panic::AssertUnwindSafe, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use schemars::{JsonSchema, generate::SchemaSettings};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::validation::{Validate, Violations};
use crate::{
    ErrorData,
    directory::DirectoryError,
    model::{CallToolResult, Content, JsonObject, Tool},
    upstream::UpstreamError,
};

/// A shortcut for generating a JSON schema for a type.
pub fn schema_for_type<T: JsonSchema>() -> JsonObject {
    let settings = SchemaSettings::draft2020_12();
    let generator = settings.into_generator();
    let schema = generator.into_root_schema_for::<T>();
    match serde_json::to_value(schema) {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            tracing::error!(schema = %other, "schema serialization produced a non-object value");
            JsonObject::new()
        }
        Err(error) => {
            tracing::error!(%error, "failed to serialize schema");
            JsonObject::new()
        }
    }
}

/// Validated tool arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters<P>(pub P);

impl<P> Parameters<P>
where
    P: DeserializeOwned + Validate,
{
    /// Deserialize and validate a raw argument object. Missing arguments are
    /// treated as an empty object.
    pub fn from_arguments(arguments: Option<JsonObject>) -> Result<Self, ErrorData> {
        let value = Value::Object(arguments.unwrap_or_default());
        let params: P = serde_json::from_value(value).map_err(|e| {
            ErrorData::invalid_params("invalid arguments", Some(json!({ "reason": e.to_string() })))
        })?;
        let mut violations = Violations::default();
        params.validate(&mut violations);
        violations.into_result().map_err(|violations| {
            ErrorData::invalid_params(
                "invalid arguments",
                Some(json!({ "violations": violations })),
            )
        })?;
        Ok(Parameters(params))
    }
}

/// What a successful handler produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Rendered as pretty-printed JSON text.
    Json(Value),
    /// Passed through verbatim (CSV exports, data URIs, plain messages).
    Text(String),
}

impl ToolOutput {
    fn into_content(self) -> Result<Content, ErrorData> {
        match self {
            ToolOutput::Json(value) => Content::json(&value),
            ToolOutput::Text(text) => Ok(Content::text(text)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolFailure {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    /// Unexpected handler fault; the message is logged, never sent to the client.
    #[error("internal fault: {0}")]
    Internal(String),
}

pub type ToolOutcome = Result<ToolOutput, ToolFailure>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate tool name: {0}")]
    DuplicateTool(Cow<'static, str>),
}

/// Everything a route needs to run one call.
pub struct ToolCallContext<S> {
    pub service: Arc<S>,
    pub name: Cow<'static, str>,
    pub arguments: Option<JsonObject>,
}

impl<S> ToolCallContext<S> {
    pub fn new(service: Arc<S>, name: Cow<'static, str>, arguments: Option<JsonObject>) -> Self {
        Self {
            service,
            name,
            arguments,
        }
    }
}

/// Validates the arguments, then hands back the future that performs the call.
type DynCallToolHandler<S> =
    dyn Fn(ToolCallContext<S>) -> Result<BoxFuture<'static, ToolOutcome>, ErrorData> + Send + Sync;

pub struct ToolRoute<S> {
    pub attr: Tool,
    call: Arc<DynCallToolHandler<S>>,
}

impl<S> std::fmt::Debug for ToolRoute<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRoute")
            .field("name", &self.attr.name)
            .field("description", &self.attr.description)
            .field("input_schema", &self.attr.input_schema)
            .finish()
    }
}

impl<S> Clone for ToolRoute<S> {
    fn clone(&self) -> Self {
        Self {
            call: self.call.clone(),
            attr: self.attr.clone(),
        }
    }
}

impl<S: Send + Sync + 'static> ToolRoute<S> {
    pub fn new<P, F, Fut>(attr: Tool, handler: F) -> Self
    where
        P: DeserializeOwned + Validate + Send + 'static,
        F: Fn(Arc<S>, Parameters<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolOutcome> + Send + 'static,
    {
        Self {
            call: Arc::new(move |context: ToolCallContext<S>| {
                let params = Parameters::<P>::from_arguments(context.arguments)?;
                Ok(handler(context.service, params).boxed())
            }),
            attr,
        }
    }

    pub fn name(&self) -> &str {
        &self.attr.name
    }
}

/// Name-indexed collection of routes, kept in registration order.
#[derive(Debug)]
pub struct ToolRouter<S> {
    routes: Vec<ToolRoute<S>>,
    index: HashMap<Cow<'static, str>, usize>,
}

impl<S> Default for ToolRouter<S> {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<S> Clone for ToolRouter<S> {
    fn clone(&self) -> Self {
        Self {
            routes: self.routes.clone(),
            index: self.index.clone(),
        }
    }
}

impl<S> ToolRouter<S>
where
    S: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_routes(
        routes: impl IntoIterator<Item = ToolRoute<S>>,
    ) -> Result<Self, RegistryError> {
        let mut router = Self::new();
        for route in routes {
            router.add_route(route)?;
        }
        Ok(router)
    }

    /// Register a route. A second route with an existing name is rejected.
    pub fn add_route(&mut self, route: ToolRoute<S>) -> Result<(), RegistryError> {
        let name = route.attr.name.clone();
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }
        self.index.insert(name, self.routes.len());
        self.routes.push(route);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn list_all(&self) -> Vec<Tool> {
        self.routes.iter().map(|route| route.attr.clone()).collect()
    }

    pub async fn call(&self, context: ToolCallContext<S>) -> Result<CallToolResult, ErrorData> {
        let route = self
            .index
            .get(context.name.as_ref())
            .map(|&i| &self.routes[i])
            .ok_or_else(|| ErrorData::tool_not_found(&context.name))?;
        let name = context.name.clone();
        let future = (route.call)(context)?;
        let outcome = match AssertUnwindSafe(future).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(tool = %name, "tool handler panicked");
                return Err(ErrorData::internal_error("internal error", None));
            }
        };
        match outcome {
            Ok(output) => Ok(CallToolResult::success(vec![output.into_content()?])),
            Err(failure @ (ToolFailure::Upstream(_) | ToolFailure::Directory(_))) => {
                tracing::info!(tool = %name, error = %failure, "tool call failed upstream");
                Ok(CallToolResult::error(vec![Content::text(failure.to_string())]))
            }
            Err(ToolFailure::Internal(reason)) => {
                tracing::error!(tool = %name, %reason, "tool handler fault");
                Err(ErrorData::internal_error("internal error", None))
            }
        }
    }
}
