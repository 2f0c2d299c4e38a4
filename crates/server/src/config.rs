use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const TRANSPORT_ENV: &str = "MCP_TRANSPORT";
pub const ADDR_ENV: &str = "MCP_ADDR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid transport mode '{0}', expected 'stdio' or 'http'")]
    InvalidTransport(String),

    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Which transport the process serves on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Stdio,
    Http,
}

impl FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdio" => Ok(TransportMode::Stdio),
            "http" => Ok(TransportMode::Http),
            other => Err(ConfigError::InvalidTransport(other.to_string())),
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Stdio => write!(f, "stdio"),
            TransportMode::Http => write!(f, "http"),
        }
    }
}

/// Optional on-disk settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub sessions: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Handler deadline; 0 disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle sessions older than this are evicted; 0 disables eviction
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_idle_timeout_secs() -> u64 {
    1800
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl FileConfig {
    /// Load the file if it exists, otherwise use defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved process configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub transport: TransportMode,
    pub addr: String,
    pub file: FileConfig,
}

impl ServerConfig {
    /// Resolve flags, environment and config file. Non-empty environment
    /// values take precedence over flags.
    pub fn resolve(
        transport_flag: &str,
        addr_flag: &str,
        config_path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let from_env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let transport = from_env(TRANSPORT_ENV)
            .unwrap_or_else(|| transport_flag.to_string())
            .parse()?;
        let addr = from_env(ADDR_ENV).unwrap_or_else(|| addr_flag.to_string());
        let file = FileConfig::load(config_path)?;

        Ok(Self {
            transport,
            addr,
            file,
        })
    }

    /// Socket address to bind; `:PORT` binds all interfaces
    pub fn bind_addr(&self) -> String {
        match self.addr.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{}", port),
            None => self.addr.clone(),
        }
    }

    pub fn handler_deadline(&self) -> Option<Duration> {
        non_zero_secs(self.file.execution.timeout_secs)
    }

    pub fn session_idle_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.file.sessions.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.file.sessions.sweep_interval_secs.max(1))
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
