//! Process configuration
//!
//! Read from a JSON file (`SLACKBOT_CONFIG`, default `config.json`). Secrets
//! and the port may be overridden from the environment.

use crate::llm::Provider;
use crate::ratelimit::RateLimitConfig;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "SLACKBOT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid setting `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// `command` value selecting a remote server reached over HTTP
pub const REMOTE_SERVER_COMMAND: &str = "sse_server";

/// How to reach one MCP server.
///
/// A local server is spawned from `command` with `env` set. For a remote
/// server `command` is `sse_server`, `args[0]` is its URL and `env` holds
/// the HTTP headers sent with every request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, deserialize_with = "scalar_strings")]
    pub env: HashMap<String, String>,
}

impl McpServerConfig {
    pub fn is_remote(&self) -> bool {
        self.command == REMOTE_SERVER_COMMAND
    }

    /// Endpoint of a remote server
    pub fn remote_url(&self) -> Option<&str> {
        if self.is_remote() {
            self.args.first().map(String::as_str)
        } else {
            None
        }
    }
}

/// Accept any JSON value per key: strings as-is, `null` as empty and
/// anything else in its JSON text form (`3000`, `true`).
fn scalar_strings<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    /// Bound on each tool and chat call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Bound on each model attempt
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    #[serde(default)]
    pub llm_provider_name: Provider,
    #[serde(default)]
    pub llm_api_key: String,
    #[serde(default)]
    pub llm_base_url: Option<String>,
    #[serde(default)]
    pub llm_model_name: Option<String>,
    #[serde(default)]
    pub slack_bot_token: String,
    #[serde(default)]
    pub slack_signing_secret: String,
    #[serde(default)]
    pub allowed_users: Vec<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// 0 disables the bound
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_port() -> u16 {
    8080
}

fn default_max_turns() -> u32 {
    25
}

impl Config {
    /// Load from the path in `SLACKBOT_CONFIG` and apply process env overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut config = Self::load(Path::new(&path))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(key) = non_empty("LLM_API_KEY") {
            self.llm_api_key = key;
        }
        if let Some(token) = non_empty("SLACK_BOT_TOKEN") {
            self.slack_bot_token = token;
        }
        if let Some(secret) = non_empty("SLACK_SIGNING_SECRET") {
            self.slack_signing_secret = secret;
        }
        if let Some(port) = non_empty("PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm_api_key.is_empty() {
            return Err(ConfigError::Missing("llmApiKey"));
        }
        if self.slack_bot_token.is_empty() {
            return Err(ConfigError::Missing("slackBotToken"));
        }
        if self.slack_signing_secret.is_empty() {
            return Err(ConfigError::Missing("slackSigningSecret"));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "timeoutSecs",
                reason: "must be positive".to_string(),
            });
        }
        if self.llm_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "llmTimeoutSecs",
                reason: "must be positive".to_string(),
            });
        }
        if let Some((name, _)) = self
            .mcp_servers
            .iter()
            .find(|(_, server)| server.is_remote() && server.remote_url().is_none())
        {
            return Err(ConfigError::Invalid {
                name: "mcpServers",
                reason: format!("`{name}` uses {REMOTE_SERVER_COMMAND} without a URL argument"),
            });
        }
        if self.rate_limit.enable && self.rate_limit.burst == 0 {
            return Err(ConfigError::Invalid {
                name: "rateLimit.burst",
                reason: "must be at least 1 when rate limiting is enabled".to_string(),
            });
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}
