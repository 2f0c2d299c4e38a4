// Tool registry: wraps handlers with validation, execution tracking and
// error containment

use crate::error::RegistryError;
use crate::execution::{CallContext, ExecutionId};
use crate::protocol::{CallToolResult, ToolContent, ToolSchema, EXECUTION_ID_META_KEY};
use crate::schema::{empty_shape, InputSchema};
use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Tool handler invoked with already-validated input
#[async_trait::async_trait]
pub trait ToolHandler<I: Send + 'static>: Send + Sync {
    async fn call(&self, input: I, ctx: CallContext) -> Result<CallToolResult>;
}

/// Everything needed to register a tool
pub struct ToolDefinition<S: InputSchema> {
    pub name: String,
    pub description: String,
    pub input_schema: S,
    pub handler: Arc<dyn ToolHandler<S::Input>>,
}

impl<S: InputSchema> ToolDefinition<S> {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: S,
        handler: impl ToolHandler<S::Input> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: Arc::new(handler),
        }
    }
}

type InvokeFn = Arc<dyn Fn(Value) -> BoxFuture<'static, CallToolResult> + Send + Sync>;

/// A registered tool: its listing plus the wrapped entry point
#[derive(Clone)]
pub struct RegisteredTool {
    schema: ToolSchema,
    invoke: InvokeFn,
}

impl RegisteredTool {
    pub fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    /// Invoke the wrapped tool. Never fails: every failure becomes a soft
    /// error result.
    pub async fn invoke(&self, arguments: Value) -> CallToolResult {
        (self.invoke)(arguments).await
    }
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.schema.name)
            .finish()
    }
}

/// Tool registry for managing available tools
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
    deadline: Option<Duration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            deadline: None,
        }
    }

    /// Registry whose handlers are cut off after `deadline`
    pub fn with_deadline(deadline: Option<Duration>) -> Self {
        Self {
            tools: BTreeMap::new(),
            deadline,
        }
    }

    /// Register a tool; names must be unique
    pub fn register<S: InputSchema>(
        &mut self,
        definition: ToolDefinition<S>,
    ) -> Result<(), RegistryError> {
        if self.tools.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateTool(definition.name));
        }

        let name = definition.name.clone();
        let tool = wrap_tool(definition, self.deadline);
        tracing::debug!("Registered tool {}", name);
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Call a tool by name
    pub async fn call(&self, name: &str, arguments: Value) -> Result<CallToolResult, RegistryError> {
        let tool = self
            .get(name)
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))?;
        Ok(tool.invoke(arguments).await)
    }

    /// List all tool schemas
    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Compose validation, tracking and containment around a handler.
fn wrap_tool<S: InputSchema>(definition: ToolDefinition<S>, deadline: Option<Duration>) -> RegisteredTool {
    let ToolDefinition {
        name,
        description,
        input_schema,
        handler,
    } = definition;

    let schema = ToolSchema {
        name: name.clone(),
        description,
        input_schema: input_schema.describe_shape().unwrap_or_else(empty_shape),
    };

    let name: Arc<str> = Arc::from(name);
    let input_schema = Arc::new(input_schema);

    let invoke: InvokeFn = Arc::new(move |arguments| {
        let name = name.clone();
        let input_schema = input_schema.clone();
        let handler = handler.clone();
        async move {
            run_tool(&name, input_schema.as_ref(), handler.as_ref(), arguments, deadline).await
        }
        .boxed()
    });

    RegisteredTool { schema, invoke }
}

async fn run_tool<S: InputSchema>(
    name: &str,
    input_schema: &S,
    handler: &dyn ToolHandler<S::Input>,
    arguments: Value,
    deadline: Option<Duration>,
) -> CallToolResult {
    let execution_id = ExecutionId::new();
    tracing::info!(tool = %name, execution_id = %execution_id, "Starting execution");

    let result = match input_schema.validate(&arguments) {
        Ok(input) => {
            let ctx = CallContext::new(execution_id);
            match execute(handler, input, ctx, deadline).await {
                Ok(result) => {
                    tracing::info!(tool = %name, execution_id = %execution_id, "Execution completed");
                    result
                }
                Err(message) => {
                    tracing::error!(
                        tool = %name,
                        execution_id = %execution_id,
                        error = %message,
                        "Execution failed"
                    );
                    CallToolResult {
                        content: vec![ToolContent::error(message)],
                        is_error: Some(true),
                        meta: None,
                    }
                }
            }
        }
        Err(detail) => {
            tracing::warn!(
                tool = %name,
                execution_id = %execution_id,
                error = %detail,
                "Validation failed"
            );
            CallToolResult::error_text(format!("Validation error: {}", detail))
        }
    };

    result.with_meta(EXECUTION_ID_META_KEY, Value::String(execution_id.to_string()))
}

/// Run the handler to completion, turning errors, panics and deadline
/// overruns into a failure message.
async fn execute<I: Send + 'static>(
    handler: &dyn ToolHandler<I>,
    input: I,
    ctx: CallContext,
    deadline: Option<Duration>,
) -> Result<CallToolResult, String> {
    let call = AssertUnwindSafe(handler.call(input, ctx)).catch_unwind();

    let outcome = match deadline {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(format!("execution timed out after {}ms", limit.as_millis())),
        },
        None => call.await,
    };

    match outcome {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_capture::LogCapture;
    use crate::schema::{json_schema_object, json_schema_string, TypedSchema};
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Deserialize, Clone, PartialEq)]
    struct NameInput {
        name: String,
    }

    fn name_schema() -> TypedSchema<NameInput> {
        TypedSchema::new(json_schema_object(
            json!({ "name": json_schema_string("Who to greet") }),
            vec!["name"],
        ))
    }

    /// Greets and records every input it sees
    #[derive(Default)]
    struct Greeter {
        seen: Arc<Mutex<Vec<NameInput>>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ToolHandler<NameInput> for Greeter {
        async fn call(&self, input: NameInput, _ctx: CallContext) -> Result<CallToolResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(input.clone());
            Ok(CallToolResult::text(format!("Hello {}", input.name)))
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl ToolHandler<serde_json::Map<String, Value>> for Failing {
        async fn call(
            &self,
            _input: serde_json::Map<String, Value>,
            _ctx: CallContext,
        ) -> Result<CallToolResult> {
            Err(anyhow::anyhow!("Planned failure"))
        }
    }

    struct Panicking;

    #[async_trait::async_trait]
    impl ToolHandler<serde_json::Map<String, Value>> for Panicking {
        async fn call(
            &self,
            _input: serde_json::Map<String, Value>,
            _ctx: CallContext,
        ) -> Result<CallToolResult> {
            panic!("handler blew up");
        }
    }

    struct Slow;

    #[async_trait::async_trait]
    impl ToolHandler<serde_json::Map<String, Value>> for Slow {
        async fn call(
            &self,
            _input: serde_json::Map<String, Value>,
            _ctx: CallContext,
        ) -> Result<CallToolResult> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(CallToolResult::text("too late"))
        }
    }

    /// Echoes the execution id it was given and sets its own metadata
    struct ContextEcho;

    #[async_trait::async_trait]
    impl ToolHandler<serde_json::Map<String, Value>> for ContextEcho {
        async fn call(
            &self,
            _input: serde_json::Map<String, Value>,
            ctx: CallContext,
        ) -> Result<CallToolResult> {
            Ok(CallToolResult::text(ctx.execution_id.to_string()).with_meta("origin", json!("handler")))
        }
    }

    fn any_object() -> TypedSchema<serde_json::Map<String, Value>> {
        TypedSchema::new(json_schema_object(json!({}), vec![]))
    }

    #[tokio::test]
    async fn test_handler_receives_validated_input() {
        let greeter = Greeter::default();
        let seen = greeter.seen.clone();

        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::new("greet", "Say hello", name_schema(), greeter))
            .unwrap();

        let result = registry.call("greet", json!({ "name": "World" })).await.unwrap();

        assert!(!result.is_error());
        assert_eq!(result.first_text(), Some("Hello World"));
        assert!(result.execution_id().is_some());
        assert_eq!(seen.lock().unwrap().as_slice(), &[NameInput { name: "World".into() }]);
    }

    #[tokio::test]
    async fn test_execution_ids_are_fresh() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::new("greet", "Say hello", name_schema(), Greeter::default()))
            .unwrap();

        let mut ids = HashSet::new();
        for _ in 0..20 {
            let result = registry.call("greet", json!({ "name": "x" })).await.unwrap();
            ids.insert(result.execution_id().unwrap().to_string());
        }
        assert_eq!(ids.len(), 20);
    }

    #[tokio::test]
    async fn test_context_id_matches_result_meta() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::new("echo", "Echo id", any_object(), ContextEcho))
            .unwrap();

        let result = registry.call("echo", json!({})).await.unwrap();

        assert_eq!(result.first_text(), result.execution_id());
        assert_eq!(result.meta.as_ref().unwrap()["origin"], "handler");
    }

    #[tokio::test]
    async fn test_validation_failure_skips_handler() {
        let greeter = Greeter::default();
        let calls = greeter.calls.clone();

        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::new("greet", "Say hello", name_schema(), greeter))
            .unwrap();

        let result = registry.call("greet", json!({ "name": 7 })).await.unwrap();

        assert!(result.is_error());
        assert!(result.first_text().unwrap().starts_with("Validation error: "));
        assert!(result.execution_id().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_error_becomes_soft_error() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::new("fail_tool", "A tool that fails", any_object(), Failing))
            .unwrap();

        let result = registry.call("fail_tool", json!({})).await.unwrap();

        assert!(result.is_error());
        assert_eq!(result.content.len(), 1);
        assert_eq!(result.first_text(), Some("Error: Planned failure"));
    }

    fn assert_tagged(line: &str, tool: &str, execution_id: &str) {
        assert!(line.contains(&format!("tool={}", tool)), "{}", line);
        assert!(line.contains(&format!("execution_id={}", execution_id)), "{}", line);
    }

    #[tokio::test]
    async fn test_success_logs_start_and_finish() {
        let logs = LogCapture::start();
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::new("greet", "Say hello", name_schema(), Greeter::default()))
            .unwrap();

        let result = registry.call("greet", json!({ "name": "World" })).await.unwrap();
        let id = result.execution_id().unwrap();

        assert_tagged(&logs.line("Starting execution"), "greet", id);
        assert_tagged(&logs.line("Execution completed"), "greet", id);
    }

    #[tokio::test]
    async fn test_validation_failure_logs_start_and_finish() {
        let logs = LogCapture::start();
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::new("greet", "Say hello", name_schema(), Greeter::default()))
            .unwrap();

        let result = registry.call("greet", json!({ "name": 7 })).await.unwrap();
        let id = result.execution_id().unwrap();

        assert_tagged(&logs.line("Starting execution"), "greet", id);
        let failed = logs.line("Validation failed");
        assert_tagged(&failed, "greet", id);
        assert!(failed.contains("WARN"));
        assert!(!logs.lines().iter().any(|l| l.contains("Execution completed")));
    }

    #[tokio::test]
    async fn test_handler_failure_logs_start_and_finish() {
        let logs = LogCapture::start();
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::new("fail_tool", "A tool that fails", any_object(), Failing))
            .unwrap();

        let result = registry.call("fail_tool", json!({})).await.unwrap();
        let id = result.execution_id().unwrap();

        assert_tagged(&logs.line("Starting execution"), "fail_tool", id);
        let failed = logs.line("Execution failed");
        assert_tagged(&failed, "fail_tool", id);
        assert!(failed.contains("ERROR"));
        assert!(failed.contains("Planned failure"));
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::new("panic_tool", "Panics", any_object(), Panicking))
            .unwrap();

        let result = registry.call("panic_tool", json!({})).await.unwrap();

        assert!(result.is_error());
        assert_eq!(result.first_text(), Some("Error: handler blew up"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cuts_off_slow_handler() {
        let mut registry = ToolRegistry::with_deadline(Some(Duration::from_secs(1)));
        registry
            .register(ToolDefinition::new("slow", "Sleeps", any_object(), Slow))
            .unwrap();

        let result = registry.call("slow", json!({})).await.unwrap();

        assert!(result.is_error());
        assert_eq!(result.first_text(), Some("Error: execution timed out after 1000ms"));
    }

    #[tokio::test]
    async fn test_duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::new("greet", "first", name_schema(), Greeter::default()))
            .unwrap();

        let err = registry
            .register(ToolDefinition::new("greet", "second", name_schema(), Greeter::default()))
            .unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateTool(name) if name == "greet"));
        assert_eq!(registry.get("greet").unwrap().schema().description, "first");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.call("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, RegistryError::UnknownTool(_)));
    }

    #[test]
    fn test_opaque_schema_lists_empty_parameters() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::new(
                "opaque",
                "No shape",
                TypedSchema::<serde_json::Map<String, Value>>::opaque(),
                ContextEcho,
            ))
            .unwrap();

        let schemas = registry.list_schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].input_schema["type"], "object");
        assert!(schemas[0].input_schema["properties"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_result_shape_is_handler_agnostic() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::new("greet", "Say hello", name_schema(), Greeter::default()))
            .unwrap();
        registry
            .register(ToolDefinition::new("echo", "Echo id", any_object(), ContextEcho))
            .unwrap();

        for (name, args) in [("greet", json!({ "name": "a" })), ("echo", json!({}))] {
            let value = serde_json::to_value(registry.call(name, args).await.unwrap()).unwrap();
            assert_eq!(value["content"][0]["type"], "text");
            assert!(value["_meta"]["execution_id"].is_string());
            assert!(value.get("isError").is_none());
        }
    }
}
