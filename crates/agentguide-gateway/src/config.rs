use serde::Deserialize;
use std::env;
use std::time::Duration;

use agentguide_x402::ChainNetwork;

const DEFAULT_CONFIG_PATH: &str = "config.json";
const ENV_PREFIX: &str = "AGENTGUIDE_";

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "fatal", "panic"];

/// Gateway listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
    #[serde(default = "default_write_timeout")]
    pub write_timeout: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

impl ServerConfig {
    pub fn addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }
}

/// Admin authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAuthType {
    Bearer,
    Basic,
    ApiKey,
}

/// Admin listener configuration, including logging knobs for the whole
/// process.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
    #[serde(default = "default_write_timeout")]
    pub write_timeout: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub auth_enabled: bool,
    #[serde(default)]
    pub auth_type: Option<AdminAuthType>,
    #[serde(default)]
    pub auth_tokens: Vec<String>,
}

impl AdminServerConfig {
    pub fn addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }
}

/// Facilitator connection and payment construction configuration.
#[derive(Clone, Deserialize)]
pub struct FacilitatorConfig {
    /// Base URL of the facilitator service exposing /verify and /settle.
    pub url: String,
    /// Buyer-side signing key. Absent disables automatic payment.
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default)]
    pub gas_price: String,
    #[serde(default = "default_x402_version", rename = "x402Version")]
    pub x402_version: u32,
    #[serde(default = "default_schemes")]
    pub supported_schemes: Vec<String>,
    #[serde(default)]
    pub supported_networks: Vec<String>,
    pub chain_networks: Vec<ChainNetwork>,
}

impl std::fmt::Debug for FacilitatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilitatorConfig")
            .field("url", &self.url)
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("gas_limit", &self.gas_limit)
            .field("gas_price", &self.gas_price)
            .field("x402_version", &self.x402_version)
            .field("supported_schemes", &self.supported_schemes)
            .field("supported_networks", &self.supported_networks)
            .field("chain_networks", &self.chain_networks)
            .finish()
    }
}

/// Per-endpoint auth policy.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointAuthConfig {
    /// Only "bearer" is supported.
    pub scheme: String,
    pub token: String,
}

/// Seller-side payment policy for an endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct X402SellerConfig {
    pub network: String,
    #[serde(rename = "payTo")]
    pub pay_to: alloy::primitives::Address,
    #[serde(rename = "maxAmountRequired")]
    pub max_amount_required: String,
}

/// Buyer-side payment intent for an endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct X402BuyerConfig {
    pub network: String,
    #[serde(rename = "payTo")]
    pub pay_to: alloy::primitives::Address,
    #[serde(rename = "maxAmountRequired")]
    pub max_amount_required: String,
}

/// One configured endpoint, before materialization into a resource policy.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub endpoint: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default = "default_endpoint_type")]
    pub endpoint_type: String,
    #[serde(default)]
    pub middlewares: Vec<String>,
    #[serde(default)]
    pub auth: Option<EndpointAuthConfig>,
    #[serde(rename = "x402-buyer", default)]
    pub x402_buyer: Option<X402BuyerConfig>,
    #[serde(rename = "x402-seller", default)]
    pub x402_seller: Option<X402SellerConfig>,
    #[serde(rename = "targetUrl", default)]
    pub target_url: String,
}

/// Whole-process configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub gateway_server: ServerConfig,
    pub admin_server: AdminServerConfig,
    pub facilitator: FacilitatorConfig,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    /// Optional resources JSON file; when set the registry hot-reloads from
    /// it instead of serving the static `endpoints` list.
    #[serde(default)]
    pub resources_file: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_read_timeout() -> u64 {
    30
}
fn default_write_timeout() -> u64 {
    30
}
fn default_idle_timeout() -> u64 {
    120
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_gas_limit() -> u64 {
    100_000
}
fn default_x402_version() -> u32 {
    1
}
fn default_schemes() -> Vec<String> {
    vec!["exact".to_string()]
}
fn default_endpoint_type() -> String {
    "http".to_string()
}

impl GatewayConfig {
    /// Load configuration from a JSON file, apply `AGENTGUIDE_` environment
    /// overrides, and validate. The path defaults to `AGENTGUIDE_CONFIG`,
    /// then `config.json`.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_string(),
            None => env::var(format!("{ENV_PREFIX}CONFIG"))
                .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
        };

        let data = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Io(path.clone(), e.to_string()))?;
        let mut config: GatewayConfig =
            serde_json::from_str(&data).map_err(|e| ConfigError::Parse(path, e.to_string()))?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment overrides: `AGENTGUIDE_` prefix, config key dots replaced
    /// by underscores (e.g. `AGENTGUIDE_GATEWAY_SERVER_PORT`).
    fn apply_env_overrides(&mut self) {
        fn var(key: &str) -> Option<String> {
            env::var(format!("{ENV_PREFIX}{key}")).ok().filter(|s| !s.is_empty())
        }

        if let Some(host) = var("GATEWAY_SERVER_HOST") {
            self.gateway_server.host = host;
        }
        if let Some(port) = var("GATEWAY_SERVER_PORT").and_then(|s| s.parse().ok()) {
            self.gateway_server.port = port;
        }
        if let Some(host) = var("ADMIN_SERVER_HOST") {
            self.admin_server.host = host;
        }
        if let Some(port) = var("ADMIN_SERVER_PORT").and_then(|s| s.parse().ok()) {
            self.admin_server.port = port;
        }
        if let Some(level) = var("ADMIN_SERVER_LOG_LEVEL") {
            self.admin_server.log_level = level;
        }
        if let Some(format) = var("ADMIN_SERVER_LOG_FORMAT") {
            self.admin_server.log_format = format;
        }
        if let Some(url) = var("FACILITATOR_URL") {
            self.facilitator.url = url;
        }
        if let Some(key) = var("FACILITATOR_PRIVATE_KEY") {
            self.facilitator.private_key = Some(key);
        }
        if let Some(file) = var("RESOURCES_FILE") {
            self.resources_file = Some(file);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway_server.port == 0 {
            return Err(ConfigError::Invalid("gateway server port must be non-zero".into()));
        }
        if self.admin_server.port == 0 {
            return Err(ConfigError::Invalid("admin server port must be non-zero".into()));
        }

        if !VALID_LOG_LEVELS.contains(&self.admin_server.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "invalid admin server log level: {}",
                self.admin_server.log_level
            )));
        }
        if !["json", "console"].contains(&self.admin_server.log_format.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "invalid admin server log format: {}",
                self.admin_server.log_format
            )));
        }

        if self.admin_server.auth_enabled {
            if self.admin_server.auth_type.is_none() {
                return Err(ConfigError::MissingRequired("admin_server.auth_type"));
            }
            if self.admin_server.auth_tokens.is_empty() {
                return Err(ConfigError::MissingRequired("admin_server.auth_tokens"));
            }
        }

        if self.facilitator.url.is_empty() {
            return Err(ConfigError::MissingRequired("facilitator.url"));
        }
        if self.facilitator.chain_networks.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one chain network must be configured".into(),
            ));
        }

        let mut names = std::collections::HashSet::new();
        for network in &self.facilitator.chain_networks {
            if network.name.is_empty() {
                return Err(ConfigError::Invalid("chain network name is required".into()));
            }
            if !names.insert(network.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate chain network name: {}",
                    network.name
                )));
            }
            if network.rpc_url.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "chain network {}: rpc_url is required",
                    network.name
                )));
            }
            if network.chain_id == 0 {
                return Err(ConfigError::Invalid(format!(
                    "chain network {}: chain_id must be greater than 0",
                    network.name
                )));
            }
            if network.token_name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "chain network {}: token_name is required",
                    network.name
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(String, String),

    #[error("failed to parse config file {0}: {1}")]
    Parse(String, String),

    #[error("missing required configuration: {0}")]
    MissingRequired(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
