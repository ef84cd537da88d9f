//! Resource registry: the mapping from normalized path prefixes to resource
//! policies, with longest-prefix lookup and atomic hot reload.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use alloy::primitives::Address;

use agentguide_x402::network::find_network;
use agentguide_x402::{ChainNetwork, PaymentRequirements};

use crate::config::{EndpointConfig, FacilitatorConfig};

/// Middleware tags a resource policy may carry. Order is logical: auth
/// always runs before payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Middleware {
    Auth,
    X402Seller,
    X402Buyer,
}

impl Middleware {
    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "auth" => Some(Middleware::Auth),
            "x402-seller" => Some(Middleware::X402Seller),
            "x402-buyer" => Some(Middleware::X402Buyer),
            _ => None,
        }
    }
}

/// Bearer-token auth policy for a resource.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub scheme: String,
    pub token: String,
}

/// Buyer-side payment intent: which network to pay on and how much at most.
#[derive(Debug, Clone)]
pub struct BuyerIntent {
    pub network: String,
    pub pay_to: Address,
    pub max_amount_required: String,
}

/// Immutable per-endpoint policy. Created at reload time and replaced,
/// never mutated, on subsequent reloads.
#[derive(Debug, Clone)]
pub struct ResourcePolicy {
    /// Normalized path prefix: leading `/`, no trailing `/` except root.
    pub path: String,
    pub resource_type: String,
    /// Absolute backend URL.
    pub target: String,
    pub description: String,
    pub middlewares: Vec<Middleware>,
    pub auth: Option<AuthPolicy>,
    /// Materialized 402 challenge; present iff `x402-seller` is configured.
    pub payment_requirements: Option<PaymentRequirements>,
    /// Present iff `x402-buyer` is configured.
    pub buyer_intent: Option<BuyerIntent>,
}

impl ResourcePolicy {
    pub fn requires(&self, middleware: Middleware) -> bool {
        self.middlewares.contains(&middleware)
    }
}

/// Normalize a resource path: ensure a leading slash, trim the trailing
/// slash unless the whole path is `/`. Idempotent.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read resources file {0}: {1}")]
    Io(String, String),

    #[error("failed to parse resources file {0}: {1}")]
    Parse(String, String),

    #[error("invalid resource entry {path}: {reason}")]
    InvalidEntry { path: String, reason: String },
}

/// Where endpoint definitions come from and when they are stale.
pub trait ReloadSource: Send + Sync {
    /// Whether the source has changed since `last_loaded_at`. Must be cheap;
    /// called on every request.
    fn is_stale(&self, last_loaded_at: Option<SystemTime>) -> bool;

    fn load(&self) -> Result<Vec<EndpointConfig>, RegistryError>;
}

/// Endpoints defined in a JSON file, reloaded when its mtime moves past the
/// last load.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(serde::Deserialize)]
struct ResourcesFile {
    resources: Vec<EndpointConfig>,
}

impl ReloadSource for FileSource {
    fn is_stale(&self, last_loaded_at: Option<SystemTime>) -> bool {
        let Ok(metadata) = std::fs::metadata(&self.path) else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        match last_loaded_at {
            Some(last) => modified > last,
            None => true,
        }
    }

    fn load(&self) -> Result<Vec<EndpointConfig>, RegistryError> {
        let path = self.path.display().to_string();
        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| RegistryError::Io(path.clone(), e.to_string()))?;
        let file: ResourcesFile =
            serde_json::from_str(&data).map_err(|e| RegistryError::Parse(path, e.to_string()))?;
        Ok(file.resources)
    }
}

/// Endpoints fixed in the process configuration; loaded once.
pub struct StaticSource {
    endpoints: Vec<EndpointConfig>,
}

impl StaticSource {
    pub fn new(endpoints: Vec<EndpointConfig>) -> Self {
        Self { endpoints }
    }
}

impl ReloadSource for StaticSource {
    fn is_stale(&self, last_loaded_at: Option<SystemTime>) -> bool {
        last_loaded_at.is_none()
    }

    fn load(&self) -> Result<Vec<EndpointConfig>, RegistryError> {
        Ok(self.endpoints.clone())
    }
}

/// Context needed to materialize endpoint configs into policies.
#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub chain_networks: Vec<ChainNetwork>,
    pub supported_schemes: Vec<String>,
    pub x402_version: u32,
}

impl PolicyContext {
    pub fn from_facilitator(config: &FacilitatorConfig) -> Self {
        Self {
            chain_networks: config.chain_networks.clone(),
            supported_schemes: config.supported_schemes.clone(),
            x402_version: config.x402_version,
        }
    }

    fn scheme(&self) -> &str {
        self.supported_schemes.first().map(String::as_str).unwrap_or("exact")
    }
}

fn materialize(endpoint: &EndpointConfig, context: &PolicyContext) -> Result<ResourcePolicy, RegistryError> {
    let path = normalize_path(&endpoint.endpoint);
    let invalid = |reason: String| RegistryError::InvalidEntry {
        path: path.clone(),
        reason,
    };

    if endpoint.target_url.is_empty() {
        return Err(invalid("targetUrl is required".into()));
    }
    url::Url::parse(&endpoint.target_url)
        .map_err(|e| invalid(format!("invalid targetUrl: {e}")))?;

    let mut middlewares = Vec::with_capacity(endpoint.middlewares.len());
    for tag in &endpoint.middlewares {
        let middleware =
            Middleware::parse(tag).ok_or_else(|| invalid(format!("unknown middleware: {tag}")))?;
        if !middlewares.contains(&middleware) {
            middlewares.push(middleware);
        }
    }

    let auth = match &endpoint.auth {
        Some(auth) if middlewares.contains(&Middleware::Auth) => {
            if auth.scheme != "bearer" {
                return Err(invalid(format!("unsupported auth scheme: {}", auth.scheme)));
            }
            if auth.token.is_empty() {
                return Err(invalid("auth token must be non-empty".into()));
            }
            Some(AuthPolicy {
                scheme: auth.scheme.clone(),
                token: auth.token.clone(),
            })
        }
        _ => None,
    };

    let payment_requirements = if middlewares.contains(&Middleware::X402Seller) {
        let seller = endpoint
            .x402_seller
            .as_ref()
            .ok_or_else(|| invalid("x402-seller middleware requires x402-seller config".into()))?;
        let network = find_network(&context.chain_networks, &seller.network)
            .ok_or_else(|| invalid(format!("unknown chain network: {}", seller.network)))?;
        Some(PaymentRequirements {
            scheme: context.scheme().to_string(),
            network: seller.network.clone(),
            resource: path.clone(),
            description: endpoint.description.clone(),
            max_amount_required: seller.max_amount_required.clone(),
            pay_to: seller.pay_to,
            asset_type: network.token_type.clone(),
            asset: network.token_address,
            token_name: network.token_name.clone(),
            token_version: network.token_version.clone(),
        })
    } else {
        None
    };

    let buyer_intent = if middlewares.contains(&Middleware::X402Buyer) {
        let buyer = endpoint
            .x402_buyer
            .as_ref()
            .ok_or_else(|| invalid("x402-buyer middleware requires x402-buyer config".into()))?;
        if find_network(&context.chain_networks, &buyer.network).is_none() {
            return Err(invalid(format!("unknown chain network: {}", buyer.network)));
        }
        Some(BuyerIntent {
            network: buyer.network.clone(),
            pay_to: buyer.pay_to,
            max_amount_required: buyer.max_amount_required.clone(),
        })
    } else {
        None
    };

    Ok(ResourcePolicy {
        path,
        resource_type: endpoint.endpoint_type.clone(),
        target: endpoint.target_url.clone(),
        description: endpoint.description.clone(),
        middlewares,
        auth,
        payment_requirements,
        buyer_intent,
    })
}

struct RegistryState {
    entries: HashMap<String, Arc<ResourcePolicy>>,
    last_loaded_at: Option<SystemTime>,
}

/// Holds the current policy snapshot. Lookups take shared access; reloads
/// swap the whole map under exclusive access. The lock is never held across
/// I/O: sources are loaded and materialized before the write lock is taken.
pub struct ResourceRegistry {
    state: RwLock<RegistryState>,
    source: Box<dyn ReloadSource>,
    context: PolicyContext,
}

impl ResourceRegistry {
    pub fn new(source: Box<dyn ReloadSource>, context: PolicyContext) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                entries: HashMap::new(),
                last_loaded_at: None,
            }),
            source,
            context,
        }
    }

    /// Atomically replace the entry map from the source. Any invalid entry
    /// fails the whole reload; the previous snapshot stays active.
    pub fn reload(&self) -> Result<usize, RegistryError> {
        let endpoints = self.source.load()?;

        let mut entries = HashMap::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            let policy = materialize(endpoint, &self.context)?;
            entries.insert(policy.path.clone(), Arc::new(policy));
        }
        let count = entries.len();

        let mut state = self.state.write().expect("registry lock poisoned");
        state.entries = entries;
        state.last_loaded_at = Some(SystemTime::now());
        drop(state);

        tracing::info!(count, "resources loaded");
        Ok(count)
    }

    /// Reload when the source reports staleness. Errors are logged and
    /// swallowed; the old snapshot continues to serve.
    pub fn reload_if_stale(&self) {
        let last_loaded_at = self.state.read().expect("registry lock poisoned").last_loaded_at;
        if !self.source.is_stale(last_loaded_at) {
            return;
        }
        if let Err(e) = self.reload() {
            tracing::warn!(error = %e, "failed to reload resources");
        }
    }

    /// Find the policy governing `raw_path` (path only, no query string).
    /// Exact match on the raw then normalized path, otherwise the longest
    /// configured prefix of either, on path-segment boundaries.
    pub fn lookup(&self, raw_path: &str) -> Option<Arc<ResourcePolicy>> {
        let state = self.state.read().expect("registry lock poisoned");

        if let Some(policy) = state.entries.get(raw_path) {
            return Some(policy.clone());
        }
        let normalized = normalize_path(raw_path);
        if normalized != raw_path {
            if let Some(policy) = state.entries.get(&normalized) {
                return Some(policy.clone());
            }
        }

        let mut best: Option<&Arc<ResourcePolicy>> = None;
        let mut best_len = 0;
        for (path, policy) in &state.entries {
            if path.len() <= best_len {
                continue;
            }
            if prefix_matches(path, raw_path)
                || (normalized != raw_path && prefix_matches(path, &normalized))
            {
                best = Some(policy);
                best_len = path.len();
            }
        }
        best.cloned()
    }

    /// All policies in the current snapshot.
    pub fn snapshot(&self) -> Vec<Arc<ResourcePolicy>> {
        let state = self.state.read().expect("registry lock poisoned");
        state.entries.values().cloned().collect()
    }

    pub fn last_loaded_at(&self) -> Option<SystemTime> {
        self.state.read().expect("registry lock poisoned").last_loaded_at
    }
}

/// Prefix match on path-segment boundaries: `/api/x` covers `/api/x` and
/// `/api/x/y` but not `/api/xy`. Root covers everything.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    if !path.starts_with(prefix) {
        return false;
    }
    prefix == "/" || path.len() == prefix.len() || path.as_bytes()[prefix.len()] == b'/'
}
