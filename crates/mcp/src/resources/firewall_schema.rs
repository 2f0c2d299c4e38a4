// JSON Schema for the firewall rules file, served as a resource

use crate::execution::CallContext;
use crate::protocol::{ReadResourceResult, ResourceContents};
use crate::resources::{ResourceDefinition, ResourceHandler};
use anyhow::Result;
use infra_mcp_core::firewall::schema_document;
use url::Url;

pub const FIREWALL_SCHEMA_RESOURCE: &str = "azure-firewall-schema";
pub const FIREWALL_SCHEMA_URI: &str = "mcp://azure-firewall/schema";
pub const SCHEMA_MIME_TYPE: &str = "application/schema+json";

pub struct FirewallSchemaResource;

#[async_trait::async_trait]
impl ResourceHandler for FirewallSchemaResource {
    async fn read(&self, uri: &Url, _ctx: CallContext) -> Result<ReadResourceResult> {
        let text = serde_json::to_string_pretty(&schema_document())?;
        Ok(ReadResourceResult::new(vec![ResourceContents::text(
            uri.as_str(),
            Some(SCHEMA_MIME_TYPE.to_string()),
            text,
        )]))
    }
}

pub fn definition() -> ResourceDefinition {
    ResourceDefinition::new(
        FIREWALL_SCHEMA_RESOURCE,
        FIREWALL_SCHEMA_URI,
        SCHEMA_MIME_TYPE,
        FirewallSchemaResource,
    )
    .with_description("JSON Schema for Azure Firewall Rules")
}
