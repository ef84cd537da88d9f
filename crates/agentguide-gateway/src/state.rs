use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;

use agentguide_x402::Facilitator;

use crate::config::{ConfigError, GatewayConfig};
use crate::registry::ResourceRegistry;

/// Shared application state for the gateway listener.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub registry: Arc<ResourceRegistry>,
    pub facilitator: Arc<dyn Facilitator>,
    pub http_client: reqwest::Client,
    /// Buyer-side signing key; absent disables automatic payment.
    pub signer: Option<PrivateKeySigner>,
}

impl AppState {
    pub fn new(
        config: Arc<GatewayConfig>,
        registry: Arc<ResourceRegistry>,
        facilitator: Arc<dyn Facilitator>,
    ) -> Result<Self, ConfigError> {
        let signer = match config.facilitator.private_key.as_deref() {
            Some(key) => Some(key.parse::<PrivateKeySigner>().map_err(|e| {
                ConfigError::Invalid(format!("invalid facilitator private key: {e}"))
            })?),
            None => None,
        };

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            registry,
            facilitator,
            http_client,
            signer,
        })
    }
}
