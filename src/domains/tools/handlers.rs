//! Tool handler contracts.
//!
//! [`ToolHandler`] is the object-safe interface the protocol engine calls.
//! Concrete tools implement [`ToolDefinition`], a typed description of name,
//! parameters and behaviour, and are turned into handlers by
//! [`ToolEntry::of`].

use async_trait::async_trait;
use rmcp::handler::server::tool::cached_schema_for_type;
use rmcp::model::{CallToolResult, Content, Tool};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use super::context::ToolContext;
use super::error::ToolError;

/// Callable tool, as seen by the protocol engine.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with raw JSON arguments.
    ///
    /// `Err` is reserved for argument problems the client must fix; every
    /// other failure is returned as a result with `isError` set.
    async fn call(&self, arguments: Map<String, Value>) -> Result<CallToolResult, ToolError>;
}

/// Semantic checks the JSON schema cannot express on its own.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// A statically described tool.
pub trait ToolDefinition: Send + Sync + 'static {
    /// Tool name as registered in MCP.
    const NAME: &'static str;

    /// Tool description shown to clients.
    const DESCRIPTION: &'static str;

    /// Grouping used by the tool manifest.
    const CATEGORY: &'static str;

    /// Free-form labels used by the tool manifest.
    const TAGS: &'static [&'static str];

    /// Input parameters; their JSON schema is the tool's input schema.
    type Params: DeserializeOwned + JsonSchema + Validate + Send + 'static;

    /// Produce the textual report.
    fn run(
        ctx: &ToolContext,
        params: Self::Params,
    ) -> impl Future<Output = Result<String, ToolError>> + Send;

    /// Create a Tool model for this tool (metadata).
    fn to_tool() -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<Self::Params>(),
            annotations: None,
            output_schema: None,
            icons: None,
            meta: None,
            title: None,
        }
    }
}

/// Deserialize and validate tool arguments.
pub fn parse_arguments<P>(arguments: Map<String, Value>) -> Result<P, ToolError>
where
    P: DeserializeOwned + Validate,
{
    let params: P = serde_json::from_value(Value::Object(arguments))
        .map_err(|e| ToolError::invalid_arguments(e.to_string()))?;
    params.validate().map_err(ToolError::InvalidArguments)?;
    Ok(params)
}

/// Adapts a [`ToolDefinition`] to [`ToolHandler`].
struct DefinitionHandler<T> {
    ctx: ToolContext,
    _tool: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: ToolDefinition> ToolHandler for DefinitionHandler<T> {
    async fn call(&self, arguments: Map<String, Value>) -> Result<CallToolResult, ToolError> {
        let params = parse_arguments::<T::Params>(arguments)?;
        match T::run(&self.ctx, params).await {
            Ok(report) => Ok(CallToolResult::success(vec![Content::text(report)])),
            Err(e @ ToolError::InvalidArguments(_)) => Err(e),
            Err(e) => Ok(e.into_result()),
        }
    }
}

/// A registered tool: metadata plus handler.
#[derive(Clone)]
pub struct ToolEntry {
    pub tool: Tool,
    pub category: &'static str,
    pub tags: &'static [&'static str],
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolEntry {
    pub fn new(
        tool: Tool,
        category: &'static str,
        tags: &'static [&'static str],
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            tool,
            category,
            tags,
            handler,
        }
    }

    /// Entry for a statically described tool.
    pub fn of<T: ToolDefinition>(ctx: ToolContext) -> Self {
        Self::new(
            T::to_tool(),
            T::CATEGORY,
            T::TAGS,
            Arc::new(DefinitionHandler::<T> {
                ctx,
                _tool: PhantomData,
            }),
        )
    }

    /// Tool name.
    pub fn name(&self) -> &str {
        &self.tool.name
    }

    /// Tool description.
    pub fn description(&self) -> &str {
        self.tool.description.as_deref().unwrap_or_default()
    }
}
