pub mod firewall;
pub mod health;
mod registry;

pub use firewall::{FirewallRuleSchema, FirewallRuleTool, FIREWALL_TOOL};
pub use health::{HealthCheckTool, HEALTH_CHECK_TOOL};
pub use registry::{RegisteredTool, ToolDefinition, ToolHandler, ToolRegistry};

use crate::error::RegistryError;

/// Register the tools this server ships with
pub fn register_builtin_tools(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(health::definition())?;
    registry.register(firewall::definition())?;
    Ok(())
}
