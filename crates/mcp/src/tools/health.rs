// Health check tool

use crate::execution::CallContext;
use crate::protocol::CallToolResult;
use crate::schema::{json_schema_object, TypedSchema};
use crate::tools::{ToolDefinition, ToolHandler};
use anyhow::Result;
use serde::Deserialize;

pub const HEALTH_CHECK_TOOL: &str = "health_check";

/// The health check takes no arguments
#[derive(Debug, Default, Deserialize)]
pub struct HealthCheckInput {}

pub struct HealthCheckTool;

#[async_trait::async_trait]
impl ToolHandler<HealthCheckInput> for HealthCheckTool {
    async fn call(&self, _input: HealthCheckInput, _ctx: CallContext) -> Result<CallToolResult> {
        Ok(CallToolResult::text("OK"))
    }
}

pub fn definition() -> ToolDefinition<TypedSchema<HealthCheckInput>> {
    ToolDefinition::new(
        HEALTH_CHECK_TOOL,
        "Basic health check to verify server is operational",
        TypedSchema::new(json_schema_object(serde_json::json!({}), vec![])),
        HealthCheckTool,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ToolContent;
    use crate::tools::ToolRegistry;
    use serde_json::json;

    #[tokio::test]
    async fn test_health_check_returns_ok() {
        let mut registry = ToolRegistry::new();
        registry.register(definition()).unwrap();

        let result = registry.call(HEALTH_CHECK_TOOL, json!({})).await.unwrap();

        assert_eq!(result.content, vec![ToolContent::text("OK")]);
        assert!(!result.is_error());
        assert!(result.is_error.is_none());
    }

    #[test]
    fn test_health_check_schema() {
        let mut registry = ToolRegistry::new();
        registry.register(definition()).unwrap();

        let schema = registry.get(HEALTH_CHECK_TOOL).unwrap().schema();
        assert_eq!(schema.input_schema["type"], "object");
        assert_eq!(schema.input_schema["required"], json!([]));
    }
}
