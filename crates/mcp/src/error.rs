// Error types for the registries and the stdio transport

use crate::execution::ExecutionId;
use std::time::Duration;

/// Registration and lookup failures
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("tool already registered: {0}")]
    DuplicateTool(String),

    #[error("resource already registered: {0}")]
    DuplicateResource(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// Failure while reading a resource. Unlike tool failures these are
/// propagated to the transport rather than turned into soft results.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("failed to read resource {resource}: {source}")]
    Failed {
        resource: String,
        execution_id: ExecutionId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("reading resource {resource} timed out after {}ms", .after.as_millis())]
    TimedOut {
        resource: String,
        execution_id: ExecutionId,
        after: Duration,
    },
}

impl ResourceError {
    pub fn execution_id(&self) -> &ExecutionId {
        match self {
            ResourceError::Failed { execution_id, .. } => execution_id,
            ResourceError::TimedOut { execution_id, .. } => execution_id,
        }
    }
}

/// Stdio transport failures
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}
