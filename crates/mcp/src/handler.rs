// JSON-RPC dispatcher shared by the stdio and HTTP transports

use crate::error::{RegistryError, ResourceError};
use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
    ReadResourceParams, ResourcesCapability, ServerCapabilities, ServerInfo, ToolsCapability,
    JSONRPC_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::resources::{register_builtin_resources, RegisteredResource, ResourceRegistry};
use crate::tools::{register_builtin_tools, ToolRegistry};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const SERVER_NAME: &str = "infra-mcp-server";

/// Routes decoded requests to the tool and resource registries
#[derive(Clone)]
pub struct McpHandler {
    tools: Arc<ToolRegistry>,
    resources: Arc<ResourceRegistry>,
}

impl McpHandler {
    pub fn new(tools: ToolRegistry, resources: ResourceRegistry) -> Self {
        Self {
            tools: Arc::new(tools),
            resources: Arc::new(resources),
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Handle one request. Notifications never produce a response.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id.clone() else {
            self.handle_notification(&request);
            return None;
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request(format!(
                    "Unsupported jsonrpc version: {}",
                    request.jsonrpc
                )),
            ));
        }

        tracing::debug!(method = %request.method, "Handling request");

        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(request.params),
            "ping" => Ok(Value::Object(Default::default())),
            "tools/list" => to_result(&ListToolsResult {
                tools: self.tools.list_schemas(),
            }),
            "tools/call" => self.call_tool(request.params).await,
            "resources/list" => to_result(&ListResourcesResult {
                resources: self.resources.list_resources(),
            }),
            "resources/templates/list" => to_result(&ListResourceTemplatesResult {
                resource_templates: self.resources.list_templates(),
            }),
            "resources/read" => self.read_resource(request.params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => tracing::info!("Client initialized"),
            "notifications/cancelled" => {
                tracing::debug!(params = ?request.params, "Client cancelled a request")
            }
            other => tracing::debug!("Ignoring notification {}", other),
        }
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let requested = params
            .map(parse_params::<InitializeParams>)
            .transpose()?
            .map(|p| {
                tracing::info!(
                    client = %p.client_info.name,
                    client_version = %p.client_info.version,
                    "Client connected"
                );
                p.protocol_version
            });

        let protocol_version = requested
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(&v.as_str()))
            .unwrap_or_else(|| SUPPORTED_PROTOCOL_VERSIONS[0].to_string());

        to_result(&InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
                resources: Some(ResourcesCapability {
                    subscribe: false,
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = parse_params(params.unwrap_or(Value::Null))?;
        let arguments = params
            .arguments
            .unwrap_or_else(|| Value::Object(Default::default()));

        match self.tools.call(&params.name, arguments).await {
            Ok(result) => to_result(&result),
            Err(e @ RegistryError::UnknownTool(_)) => Err(JsonRpcError::invalid_params(e.to_string())),
            Err(e) => Err(JsonRpcError::internal_error(e.to_string())),
        }
    }

    async fn read_resource(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: ReadResourceParams = parse_params(params.unwrap_or(Value::Null))?;

        let resource = self
            .resolve_resource(&params.uri)
            .ok_or_else(|| JsonRpcError::resource_not_found(&params.uri))?;
        let uri = Url::parse(&params.uri)
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid URI {}: {}", params.uri, e)))?;

        match resource.read(&uri).await {
            Ok(result) => to_result(&result),
            Err(e) => Err(resource_error(&e)),
        }
    }

    /// Exact URIs win over templates
    fn resolve_resource(&self, uri: &str) -> Option<&RegisteredResource> {
        self.resources
            .iter()
            .find(|r| !r.template().is_template() && r.template().as_str() == uri)
            .or_else(|| {
                self.resources
                    .iter()
                    .find(|r| r.template().is_template() && r.template().matches(uri).is_some())
            })
    }
}

/// Decode one raw envelope. On failure the returned response is the error
/// to send back to the caller.
pub fn decode_request(raw: &[u8]) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error(e)))?;

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    if !value.get("method").is_some_and(Value::is_string) {
        return Err(JsonRpcResponse::error(
            id,
            JsonRpcError::invalid_request("Invalid Request: missing method"),
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| JsonRpcResponse::error(id, JsonRpcError::invalid_request(format!("Invalid Request: {}", e))))
}

/// Dispatcher with the built-in tools and resources registered
pub fn builtin_handler(deadline: Option<Duration>) -> Result<McpHandler, RegistryError> {
    let mut tools = ToolRegistry::with_deadline(deadline);
    register_builtin_tools(&mut tools)?;

    let mut resources = ResourceRegistry::with_deadline(deadline);
    register_builtin_resources(&mut resources)?;

    tracing::info!(
        tools = tools.len(),
        resources = resources.len(),
        "Registries ready"
    );
    Ok(McpHandler::new(tools, resources))
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

fn resource_error(e: &ResourceError) -> JsonRpcError {
    JsonRpcError::internal_error(e.to_string()).with_data(serde_json::json!({
        "execution_id": e.execution_id().to_string(),
    }))
}
