// MCP (Model Context Protocol) adapter: tool and resource registries behind
// a JSON-RPC dispatcher, served over stdio or embedded in an HTTP server

pub mod error;
pub mod execution;
pub mod handler;
#[cfg(test)]
mod log_capture;
pub mod protocol;
pub mod resources;
pub mod schema;
pub mod server;
pub mod tools;

pub use error::{RegistryError, ResourceError, TransportError};
pub use execution::{CallContext, ExecutionId};
pub use handler::{builtin_handler, decode_request, McpHandler};
pub use resources::{ResourceDefinition, ResourceHandler, ResourceRegistry};
pub use server::McpServer;
pub use tools::{ToolDefinition, ToolHandler, ToolRegistry};
