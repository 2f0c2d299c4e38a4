// Firewall whitelist rules file model (azure-firewall-rules.yaml)

use crate::validation::is_valid_ip_or_cidr;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use std::sync::OnceLock;

/// File the rules live in, relative to the repository root
pub const RULES_FILENAME: &str = "azure-firewall-rules.yaml";

/// Port used when a rule does not name one
pub const DEFAULT_PORT: u16 = 443;

/// IPv4 address with an optional /0-/32 prefix
pub const IP_CIDR_PATTERN: &str = r"^(([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])\.){3}([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])(/([0-9]|[1-2][0-9]|3[0-2]))?$";

fn ip_cidr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(IP_CIDR_PATTERN).expect("IP_CIDR_PATTERN compiles"))
}

/// Check a string against [`IP_CIDR_PATTERN`]
pub fn matches_ip_cidr_pattern(s: &str) -> bool {
    ip_cidr_regex().is_match(s)
}

/// Errors raised while editing a rules file
#[derive(Debug, thiserror::Error)]
pub enum FirewallError {
    #[error("Invalid source IP or CIDR: {0}")]
    InvalidSource(String),

    #[error("Invalid destination IP or CIDR: {0}")]
    InvalidDestination(String),

    #[error("Failed to parse existing_yaml: {0}. Please ensure the content is valid YAML.")]
    Parse(#[source] serde_yaml::Error),

    #[error("Failed to encode YAML: {0}")]
    Encode(#[source] serde_yaml::Error),
}

/// A single whitelist entry. Keys other than the four known ones are kept
/// in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub team: String,
    pub source: String,
    pub destination: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(flatten)]
    pub extra: Mapping,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl FirewallRule {
    pub fn new(
        team: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            team: team.into(),
            source: source.into(),
            destination: destination.into(),
            port,
            extra: Mapping::new(),
        }
    }

    /// Same team, source, destination and port; extra keys are ignored
    pub fn same_target(&self, other: &FirewallRule) -> bool {
        self.team == other.team
            && self.source == other.source
            && self.destination == other.destination
            && self.port == other.port
    }
}

/// Top-level document of the rules file. Top-level keys besides `rules`
/// survive a rewrite through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirewallConfig {
    #[serde(flatten)]
    pub extra: Mapping,
    #[serde(default, deserialize_with = "rules_or_empty")]
    pub rules: Vec<FirewallRule>,
}

/// A `rules` value that is not a list starts a fresh rule set
fn rules_or_empty<'de, D>(deserializer: D) -> Result<Vec<FirewallRule>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Sequence(items) => items
            .into_iter()
            .map(|item| serde_yaml::from_value(item).map_err(serde::de::Error::custom))
            .collect(),
        Value::Null => Ok(Vec::new()),
        _ => {
            tracing::warn!("Ignoring non-list rules value in firewall rules file");
            Ok(Vec::new())
        }
    }
}

impl FirewallConfig {
    /// Parse the rules file. Blank content, or a document that is not a
    /// mapping, yields an empty rule set.
    pub fn parse(yaml: &str) -> Result<Self, FirewallError> {
        let trimmed = yaml.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let document: Value = serde_yaml::from_str(trimmed).map_err(FirewallError::Parse)?;
        if !document.is_mapping() {
            tracing::warn!("Firewall rules file is not a mapping, starting fresh");
            return Ok(Self::default());
        }
        serde_yaml::from_value(document).map_err(FirewallError::Parse)
    }

    pub fn to_yaml(&self) -> Result<String, FirewallError> {
        serde_yaml::to_string(self).map_err(FirewallError::Encode)
    }

    pub fn contains(&self, rule: &FirewallRule) -> bool {
        self.rules.iter().any(|existing| existing.same_target(rule))
    }
}

/// What happened to the rules file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Created,
    Updated,
    DuplicateDetected,
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuleAction::Created => "created",
            RuleAction::Updated => "updated",
            RuleAction::DuplicateDetected => "duplicate_detected",
        };
        write!(f, "{}", s)
    }
}

/// Result of adding a rule: the action taken and the rendered file
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub action: RuleAction,
    pub config: FirewallConfig,
    pub yaml: String,
}

/// Add `rule` to the rules file content in `existing_yaml`.
///
/// Nothing is written to disk. A rule matching an existing entry on team,
/// source, destination and port leaves the file unchanged and reports
/// [`RuleAction::DuplicateDetected`].
pub fn add_rule(existing_yaml: &str, rule: FirewallRule) -> Result<RuleOutcome, FirewallError> {
    if !is_valid_ip_or_cidr(&rule.source) {
        return Err(FirewallError::InvalidSource(rule.source));
    }
    if !is_valid_ip_or_cidr(&rule.destination) {
        return Err(FirewallError::InvalidDestination(rule.destination));
    }

    let mut config = FirewallConfig::parse(existing_yaml)?;

    if config.contains(&rule) {
        let yaml = config.to_yaml()?;
        return Ok(RuleOutcome {
            action: RuleAction::DuplicateDetected,
            config,
            yaml,
        });
    }

    let action = if config.rules.is_empty() {
        RuleAction::Created
    } else {
        RuleAction::Updated
    };

    tracing::debug!(
        "Adding firewall rule for team {} ({} existing rules)",
        rule.team,
        config.rules.len()
    );
    config.rules.push(rule);
    let yaml = config.to_yaml()?;

    Ok(RuleOutcome {
        action,
        config,
        yaml,
    })
}

/// JSON Schema describing the rules file
pub fn schema_document() -> serde_json::Value {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "Azure Firewall Rules Configuration",
        "description": "Schema for azure-firewall-rules.yaml file",
        "type": "object",
        "properties": {
            "rules": {
                "type": "array",
                "description": "Array of firewall whitelist rules",
                "items": {
                    "type": "object",
                    "properties": {
                        "team": {
                            "type": "string",
                            "description": "Name of the team requesting the rule"
                        },
                        "source": {
                            "type": "string",
                            "description": "Source IP address or CIDR block",
                            "pattern": IP_CIDR_PATTERN
                        },
                        "destination": {
                            "type": "string",
                            "description": "Destination IP address or CIDR block",
                            "pattern": IP_CIDR_PATTERN
                        },
                        "port": {
                            "type": "integer",
                            "description": "Destination port number",
                            "minimum": 1,
                            "maximum": 65535,
                            "default": DEFAULT_PORT
                        }
                    },
                    "required": ["team", "source", "destination"]
                }
            }
        },
        "required": ["rules"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(team: &str, source: &str, destination: &str, port: u16) -> FirewallRule {
        FirewallRule::new(team, source, destination, port)
    }

    #[test]
    fn test_pattern() {
        assert!(matches_ip_cidr_pattern("10.0.0.1"));
        assert!(matches_ip_cidr_pattern("10.0.0.0/8"));
        assert!(matches_ip_cidr_pattern("192.168.1.1/32"));

        assert!(!matches_ip_cidr_pattern("10.0.0.0/33"));
        assert!(!matches_ip_cidr_pattern("256.0.0.1"));
        assert!(!matches_ip_cidr_pattern("::1"));
        assert!(!matches_ip_cidr_pattern("not-an-ip"));
    }

    #[test]
    fn test_add_rule_to_empty_file() {
        let outcome = add_rule("", rule("platform", "10.0.0.1", "192.168.1.1", 443)).unwrap();

        assert_eq!(outcome.action, RuleAction::Created);
        assert_eq!(outcome.config.rules.len(), 1);
        assert!(outcome.yaml.contains("team: platform"));
        assert!(outcome.yaml.contains("source: 10.0.0.1"));
        assert!(outcome.yaml.contains("port: 443"));
    }

    #[test]
    fn test_add_rule_to_existing_file() {
        let existing = "rules:\n- team: existing-team\n  source: 1.1.1.1\n  destination: 2.2.2.2\n  port: 80\n";

        let outcome = add_rule(existing, rule("new-team", "10.0.0.1", "192.168.1.1", 443)).unwrap();

        assert_eq!(outcome.action, RuleAction::Updated);
        assert_eq!(outcome.config.rules.len(), 2);
        assert_eq!(outcome.config.rules[0].team, "existing-team");
        assert_eq!(outcome.config.rules[1].team, "new-team");
        assert!(outcome.yaml.contains("existing-team"));
        assert!(outcome.yaml.contains("new-team"));
    }

    #[test]
    fn test_duplicate_rule_leaves_file_unchanged() {
        let existing = "rules:\n- team: platform\n  source: 10.0.0.1\n  destination: 192.168.1.1\n  port: 443\n";

        let outcome = add_rule(existing, rule("platform", "10.0.0.1", "192.168.1.1", 443)).unwrap();

        assert_eq!(outcome.action, RuleAction::DuplicateDetected);
        assert_eq!(outcome.config.rules.len(), 1);
    }

    #[test]
    fn test_same_rule_on_other_port_is_not_duplicate() {
        let existing = "rules:\n- team: platform\n  source: 10.0.0.1\n  destination: 192.168.1.1\n  port: 443\n";

        let outcome = add_rule(existing, rule("platform", "10.0.0.1", "192.168.1.1", 8443)).unwrap();

        assert_eq!(outcome.action, RuleAction::Updated);
        assert_eq!(outcome.config.rules.len(), 2);
    }

    #[test]
    fn test_missing_port_defaults() {
        let existing = "rules:\n- team: platform\n  source: 10.0.0.1\n  destination: 192.168.1.1\n";
        let config = FirewallConfig::parse(existing).unwrap();
        assert_eq!(config.rules[0].port, DEFAULT_PORT);
    }

    #[test]
    fn test_document_without_rules_key() {
        let config = FirewallConfig::parse("other: value\n").unwrap();
        assert!(config.rules.is_empty());

        let config = FirewallConfig::parse("rules:\n").unwrap();
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_unknown_keys_survive_rewrite() {
        let existing = "version: 2\nrules:\n- team: a\n  source: 1.1.1.1\n  destination: 2.2.2.2\n  port: 80\n  ticket: NET-42\n";

        let outcome = add_rule(existing, rule("b", "10.0.0.1", "192.168.1.1", 443)).unwrap();

        assert_eq!(outcome.action, RuleAction::Updated);
        assert!(outcome.yaml.contains("version: 2"));
        assert!(outcome.yaml.contains("ticket: NET-42"));
        assert_eq!(outcome.config.rules[0].extra.get("ticket"), Some(&Value::from("NET-42")));

        let reparsed = FirewallConfig::parse(&outcome.yaml).unwrap();
        assert_eq!(reparsed, outcome.config);
    }

    #[test]
    fn test_extra_keys_do_not_defeat_duplicate_check() {
        let existing = "rules:\n- team: platform\n  source: 10.0.0.1\n  destination: 192.168.1.1\n  port: 443\n  ticket: NET-42\n";

        let outcome = add_rule(existing, rule("platform", "10.0.0.1", "192.168.1.1", 443)).unwrap();

        assert_eq!(outcome.action, RuleAction::DuplicateDetected);
        assert!(outcome.yaml.contains("ticket: NET-42"));
    }

    #[test]
    fn test_non_list_rules_start_fresh() {
        let outcome = add_rule("rules: {}\n", rule("b", "10.0.0.1", "192.168.1.1", 443)).unwrap();
        assert_eq!(outcome.action, RuleAction::Created);
        assert_eq!(outcome.config.rules.len(), 1);

        let outcome = add_rule("owner: netops\nrules: nope\n", rule("b", "10.0.0.1", "192.168.1.1", 443)).unwrap();
        assert_eq!(outcome.action, RuleAction::Created);
        assert!(outcome.yaml.contains("owner: netops"));
    }

    #[test]
    fn test_non_mapping_document_starts_fresh() {
        let outcome = add_rule("- just\n- a list\n", rule("b", "10.0.0.1", "192.168.1.1", 443)).unwrap();
        assert_eq!(outcome.action, RuleAction::Created);
        assert_eq!(outcome.config.rules.len(), 1);

        let outcome = add_rule("plain text", rule("b", "10.0.0.1", "192.168.1.1", 443)).unwrap();
        assert_eq!(outcome.action, RuleAction::Created);
    }

    #[test]
    fn test_invalid_yaml() {
        let err = add_rule("rules: [unclosed", rule("platform", "10.0.0.1", "192.168.1.1", 443))
            .unwrap_err();

        assert!(matches!(err, FirewallError::Parse(_)));
        assert!(err.to_string().starts_with("Failed to parse existing_yaml"));
    }

    #[test]
    fn test_invalid_addresses() {
        let err = add_rule("", rule("platform", "999.0.0.1", "192.168.1.1", 443)).unwrap_err();
        assert_eq!(err.to_string(), "Invalid source IP or CIDR: 999.0.0.1");

        let err = add_rule("", rule("platform", "10.0.0.1", "nope", 443)).unwrap_err();
        assert_eq!(err.to_string(), "Invalid destination IP or CIDR: nope");
    }

    #[test]
    fn test_schema_document() {
        let schema = schema_document();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"][0], "rules");
        assert_eq!(
            schema["properties"]["rules"]["items"]["properties"]["port"]["default"],
            443
        );
    }
}
