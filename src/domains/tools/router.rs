//! Tool Router - builds the rmcp ToolRouter from the registry.
//!
//! Used by the STDIO transport. Every route delegates to the same handler
//! the HTTP gateway uses, so both transports behave identically.

use futures::FutureExt;
use rmcp::ErrorData as McpError;
use rmcp::handler::server::tool::{ToolCallContext, ToolRoute, ToolRouter};

use super::error::ToolError;
use super::handlers::ToolEntry;
use super::registry::ToolRegistry;

/// Build the tool router with all registered tools.
pub fn build_tool_router<S>(registry: &ToolRegistry) -> ToolRouter<S>
where
    S: Send + Sync + 'static,
{
    registry
        .entries()
        .iter()
        .fold(ToolRouter::new(), |router, entry| {
            router.with_route(create_route(entry))
        })
}

fn create_route<S>(entry: &ToolEntry) -> ToolRoute<S>
where
    S: Send + Sync + 'static,
{
    let handler = entry.handler.clone();
    ToolRoute::new_dyn(entry.tool.clone(), move |ctx: ToolCallContext<'_, S>| {
        let args = ctx.arguments.clone().unwrap_or_default();
        let handler = handler.clone();
        async move {
            match handler.call(args).await {
                Ok(result) => Ok(result),
                Err(ToolError::InvalidArguments(msg)) => {
                    Err(McpError::invalid_params(msg, None))
                }
                Err(other) => Ok(other.into_result()),
            }
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::UpstreamConfig;
    use crate::domains::tools::registry::tests::test_context;

    struct TestServer {}

    #[test]
    fn test_registry_matches_router() {
        let registry = ToolRegistry::new(test_context(UpstreamConfig::default()));
        let router: ToolRouter<TestServer> = build_tool_router(&registry);

        let router_tools = router.list_all();
        let router_names: Vec<_> = router_tools.iter().map(|t| t.name.as_ref()).collect();

        assert_eq!(router_names.len(), registry.tool_names().len());
        for name in registry.tool_names() {
            assert!(router_names.contains(&name));
        }
    }
}
