// Per-invocation execution tracking

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier minted for every tool call and resource read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Context handed to a handler for exactly one invocation
#[derive(Debug, Clone)]
pub struct CallContext {
    pub execution_id: ExecutionId,
}

impl CallContext {
    pub fn new(execution_id: ExecutionId) -> Self {
        Self { execution_id }
    }
}
