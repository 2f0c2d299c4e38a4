pub mod firewall_schema;
mod registry;
mod template;

pub use firewall_schema::{FirewallSchemaResource, FIREWALL_SCHEMA_RESOURCE, FIREWALL_SCHEMA_URI};
pub use registry::{RegisteredResource, ResourceDefinition, ResourceHandler, ResourceRegistry};
pub use template::UriTemplate;

use crate::error::RegistryError;

/// Register the resources this server ships with
pub fn register_builtin_resources(registry: &mut ResourceRegistry) -> Result<(), RegistryError> {
    registry.register(firewall_schema::definition())?;
    Ok(())
}
