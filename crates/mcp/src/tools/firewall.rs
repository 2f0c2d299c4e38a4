// Azure firewall whitelist tool.
//
// Content-return pattern: the tool never touches the filesystem. The agent
// passes the current rules file in, and writes the returned YAML back.

use crate::execution::CallContext;
use crate::protocol::CallToolResult;
use crate::schema::{json_schema_integer, json_schema_object, json_schema_string, InputSchema};
use crate::tools::{ToolDefinition, ToolHandler};
use anyhow::Result;
use infra_mcp_core::firewall::{
    self, matches_ip_cidr_pattern, FirewallRule, RuleAction, DEFAULT_PORT, IP_CIDR_PATTERN,
    RULES_FILENAME,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const FIREWALL_TOOL: &str = "new_azure_firewall_rules";

const DESCRIPTION: &str = "Adds a new Azure firewall whitelist rule and returns updated YAML content.

IMPORTANT - Content-Return Pattern:
This tool does NOT write files directly. You (the agent) MUST:
1. FIRST, determine the repository root. If working in a multi-repo workspace, ASK the user which repository to use.
2. Read the existing 'azure-firewall-rules.yaml' file from the repository root (if it exists).
3. Pass the file content as the 'existing_yaml' parameter (or empty string if file doesn't exist).
4. After receiving the response, write the 'yaml_content' from the response to 'azure-firewall-rules.yaml' at the repository root.

NEVER guess or infer data from the project structure. If the user's request is missing required parameters (team, source, destination), you MUST ASK the user for clarification.

Use the 'Azure Firewall Rule Schema' resource (mcp://azure-firewall/schema) for the expected YAML format.";

/// Validated arguments
#[derive(Debug, Clone, PartialEq)]
pub struct FirewallRuleInput {
    pub team: String,
    pub source: String,
    pub destination: String,
    pub port: u16,
    pub existing_yaml: String,
}

#[derive(Debug, Deserialize)]
struct RawArgs {
    team: String,
    source: String,
    destination: String,
    #[serde(default)]
    port: Option<u64>,
    #[serde(default)]
    existing_yaml: Option<String>,
}

/// Schema for the firewall tool: field types via serde, then the
/// per-field constraints, all reported together.
pub struct FirewallRuleSchema;

impl InputSchema for FirewallRuleSchema {
    type Input = FirewallRuleInput;

    fn validate(&self, raw: &Value) -> Result<FirewallRuleInput, String> {
        let args = RawArgs::deserialize(raw).map_err(|e| e.to_string())?;

        let mut problems = Vec::new();
        if args.team.is_empty() {
            problems.push("team: must not be empty".to_string());
        }
        if !matches_ip_cidr_pattern(&args.source) {
            problems.push("source: Must be a valid IPv4 address or CIDR block".to_string());
        }
        if !matches_ip_cidr_pattern(&args.destination) {
            problems.push("destination: Must be a valid IPv4 address or CIDR block".to_string());
        }
        let port = match args.port {
            None => Some(DEFAULT_PORT),
            Some(p) => u16::try_from(p).ok().filter(|p| *p >= 1),
        };
        if port.is_none() {
            problems.push("port: must be between 1 and 65535".to_string());
        }

        match port {
            Some(port) if problems.is_empty() => Ok(FirewallRuleInput {
                team: args.team,
                source: args.source,
                destination: args.destination,
                port,
                existing_yaml: args.existing_yaml.unwrap_or_default(),
            }),
            _ => Err(problems.join("; ")),
        }
    }

    fn describe_shape(&self) -> Option<Value> {
        let mut source = json_schema_string("The source IP address or CIDR block.");
        source["pattern"] = Value::from(IP_CIDR_PATTERN);
        let mut destination = json_schema_string("The destination IP address or CIDR block.");
        destination["pattern"] = Value::from(IP_CIDR_PATTERN);
        let mut team = json_schema_string("The name of the team requesting the rule.");
        team["minLength"] = Value::from(1);
        let mut port = json_schema_integer("The destination port (defaults to 443).", 1, 65535);
        port["default"] = Value::from(DEFAULT_PORT);
        let mut existing_yaml = json_schema_string(
            "Current content of azure-firewall-rules.yaml. Pass empty string if file does not exist. The agent MUST read this file from the repository root before calling this tool.",
        );
        existing_yaml["default"] = Value::from("");

        Some(json_schema_object(
            serde_json::json!({
                "team": team,
                "source": source,
                "destination": destination,
                "port": port,
                "existing_yaml": existing_yaml,
            }),
            vec!["team", "source", "destination"],
        ))
    }
}

/// Structured payload returned as the tool's text content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallToolResponse {
    pub yaml_content: String,
    pub filename: String,
    pub action: RuleAction,
    pub message: String,
}

pub struct FirewallRuleTool;

#[async_trait::async_trait]
impl ToolHandler<FirewallRuleInput> for FirewallRuleTool {
    async fn call(&self, input: FirewallRuleInput, ctx: CallContext) -> Result<CallToolResult> {
        let rule = FirewallRule::new(input.team, input.source, input.destination, input.port);

        let outcome = match firewall::add_rule(&input.existing_yaml, rule.clone()) {
            Ok(outcome) => outcome,
            Err(e) => return Ok(CallToolResult::error_text(e.to_string())),
        };

        let message = match outcome.action {
            RuleAction::DuplicateDetected => format!(
                "Rule already exists for team \"{}\" (source: {}, destination: {}, port: {}). No changes made.",
                rule.team, rule.source, rule.destination, rule.port
            ),
            RuleAction::Created | RuleAction::Updated => format!(
                "Successfully {} firewall rule for team \"{}\". Write the yaml_content to {} at your repository root.",
                if outcome.action == RuleAction::Created { "created" } else { "added" },
                rule.team,
                RULES_FILENAME
            ),
        };

        tracing::debug!(
            execution_id = %ctx.execution_id,
            "Firewall rule for team {}: {}",
            rule.team,
            outcome.action
        );

        let response = FirewallToolResponse {
            yaml_content: outcome.yaml,
            filename: RULES_FILENAME.to_string(),
            action: outcome.action,
            message,
        };

        Ok(CallToolResult::text(serde_json::to_string_pretty(&response)?))
    }
}

pub fn definition() -> ToolDefinition<FirewallRuleSchema> {
    ToolDefinition::new(FIREWALL_TOOL, DESCRIPTION, FirewallRuleSchema, FirewallRuleTool)
}
