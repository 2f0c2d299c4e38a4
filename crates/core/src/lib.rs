// Core domain logic for the infra MCP server

pub mod firewall;
pub mod validation;

pub use validation::is_valid_ip_or_cidr;
