// Resource registry: same tracking discipline as tools, but failures are
// propagated instead of softened

use crate::error::{RegistryError, ResourceError};
use crate::execution::{CallContext, ExecutionId};
use crate::protocol::{ReadResourceResult, Resource, ResourceTemplate, EXECUTION_ID_META_KEY};
use crate::resources::template::UriTemplate;
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Resource handler invoked with the requested URI
#[async_trait::async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(&self, uri: &Url, ctx: CallContext) -> Result<ReadResourceResult>;
}

/// Everything needed to register a resource
pub struct ResourceDefinition {
    pub name: String,
    /// Exact URI or URI template
    pub uri: String,
    pub mime_type: String,
    pub description: Option<String>,
    pub handler: Arc<dyn ResourceHandler>,
}

impl ResourceDefinition {
    pub fn new(
        name: impl Into<String>,
        uri: impl Into<String>,
        mime_type: impl Into<String>,
        handler: impl ResourceHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            mime_type: mime_type.into(),
            description: None,
            handler: Arc::new(handler),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A registered resource with its wrapped read entry point
#[derive(Clone)]
pub struct RegisteredResource {
    name: String,
    template: UriTemplate,
    mime_type: String,
    description: Option<String>,
    handler: Arc<dyn ResourceHandler>,
    deadline: Option<Duration>,
}

impl RegisteredResource {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &UriTemplate {
        &self.template
    }

    pub fn descriptor(&self) -> Resource {
        Resource {
            uri: self.template.as_str().to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: Some(self.mime_type.clone()),
        }
    }

    pub fn template_descriptor(&self) -> ResourceTemplate {
        ResourceTemplate {
            uri_template: self.template.as_str().to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: Some(self.mime_type.clone()),
        }
    }

    /// Read the resource at `uri`. The caller has already matched `uri`
    /// against this resource's template.
    pub async fn read(&self, uri: &Url) -> Result<ReadResourceResult, ResourceError> {
        let execution_id = ExecutionId::new();
        tracing::info!(resource = %self.name, execution_id = %execution_id, uri = %uri, "Reading resource");

        let ctx = CallContext::new(execution_id);
        let outcome = match self.deadline {
            Some(limit) => match tokio::time::timeout(limit, self.handler.read(uri, ctx)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::error!(
                        resource = %self.name,
                        execution_id = %execution_id,
                        "Read timed out after {}ms",
                        limit.as_millis()
                    );
                    return Err(ResourceError::TimedOut {
                        resource: self.name.clone(),
                        execution_id,
                        after: limit,
                    });
                }
            },
            None => self.handler.read(uri, ctx).await,
        };

        match outcome {
            Ok(result) => {
                tracing::info!(resource = %self.name, execution_id = %execution_id, "Read completed");
                Ok(result.with_meta(EXECUTION_ID_META_KEY, Value::String(execution_id.to_string())))
            }
            Err(e) => {
                tracing::error!(
                    resource = %self.name,
                    execution_id = %execution_id,
                    error = %e,
                    "Read failed"
                );
                Err(ResourceError::Failed {
                    resource: self.name.clone(),
                    execution_id,
                    source: e.into(),
                })
            }
        }
    }
}

impl std::fmt::Debug for RegisteredResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredResource")
            .field("name", &self.name)
            .field("uri", &self.template.as_str())
            .finish()
    }
}

/// Resource registry, in registration order
pub struct ResourceRegistry {
    resources: Vec<RegisteredResource>,
    deadline: Option<Duration>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            resources: Vec::new(),
            deadline: None,
        }
    }

    pub fn with_deadline(deadline: Option<Duration>) -> Self {
        Self {
            resources: Vec::new(),
            deadline,
        }
    }

    /// Register a resource; names and URIs must both be unique
    pub fn register(&mut self, definition: ResourceDefinition) -> Result<(), RegistryError> {
        let ResourceDefinition {
            name,
            uri,
            mime_type,
            description,
            handler,
        } = definition;

        if self
            .resources
            .iter()
            .any(|r| r.name == name || r.template.as_str() == uri)
        {
            return Err(RegistryError::DuplicateResource(name));
        }

        tracing::debug!("Registered resource {} at {}", name, uri);
        self.resources.push(RegisteredResource {
            name,
            template: UriTemplate::parse(&uri),
            mime_type,
            description,
            handler,
            deadline: self.deadline,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredResource> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredResource> {
        self.resources.iter()
    }

    /// Resources addressed by an exact URI
    pub fn list_resources(&self) -> Vec<Resource> {
        self.resources
            .iter()
            .filter(|r| !r.template.is_template())
            .map(RegisteredResource::descriptor)
            .collect()
    }

    /// Resources addressed by a URI template
    pub fn list_templates(&self) -> Vec<ResourceTemplate> {
        self.resources
            .iter()
            .filter(|r| r.template.is_template())
            .map(RegisteredResource::template_descriptor)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
