//! Buyer-side 402 handling: the interceptor that turns an upstream payment
//! challenge into a signed payment and a single retry.

use actix_web::http::StatusCode;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;

use agentguide_x402::{ChainNetwork, PaymentBuilder, PaymentRequiredEnvelope};

use crate::error::GatewayError;
use crate::metrics;
use crate::proxy::{forward, CapturedResponse, InterceptOutcome, ProxyContext, ProxyInterceptor};

/// Intercepts a 402 from the origin, synthesizes a payment and retries the
/// request once with an `X-Payment` header. Any second 402 is returned to
/// the caller verbatim.
pub struct BuyerInterceptor {
    networks: Vec<ChainNetwork>,
    signer: Option<PrivateKeySigner>,
    x402_version: u32,
}

impl BuyerInterceptor {
    pub fn new(
        networks: Vec<ChainNetwork>,
        signer: Option<PrivateKeySigner>,
        x402_version: u32,
    ) -> Self {
        Self {
            networks,
            signer,
            x402_version,
        }
    }

    fn build_payment(&self, envelope: &PaymentRequiredEnvelope, now: u64) -> Result<String, GatewayError> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            GatewayError::PaymentCreationFailed(
                "private key not configured for automatic payment".to_string(),
            )
        })?;

        let builder = PaymentBuilder::new(&self.networks, signer, self.x402_version);
        let payload = builder
            .build(&envelope.payment_requirements, now)
            .map_err(|e| GatewayError::PaymentCreationFailed(e.to_string()))?;

        serde_json::to_string(&payload)
            .map_err(|e| GatewayError::PaymentSerializationFailed(e.to_string()))
    }
}

#[async_trait(?Send)]
impl ProxyInterceptor for BuyerInterceptor {
    async fn intercept(&self, captured: CapturedResponse, cx: &ProxyContext) -> InterceptOutcome {
        if captured.status() != StatusCode::PAYMENT_REQUIRED {
            return InterceptOutcome::Passthrough(captured);
        }

        tracing::info!("received 402 Payment Required, attempting automatic payment");

        let envelope: PaymentRequiredEnvelope = match serde_json::from_slice(captured.body()) {
            Ok(envelope) => envelope,
            Err(e) => {
                // Not a payment challenge we understand; hand the origin's
                // 402 to the caller unchanged.
                tracing::error!(error = %e, "failed to parse 402 response");
                return InterceptOutcome::Handled(captured.into_response());
            }
        };

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let payment_json = match self.build_payment(&envelope, now) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to create payment payload");
                metrics::BUYER_PAYMENT_FAILURES.inc();
                return InterceptOutcome::Handled(
                    actix_web::ResponseError::error_response(&e),
                );
            }
        };

        tracing::info!("payment payload created, retrying request with payment");
        metrics::BUYER_RETRIES.inc();

        // Fresh proxy pass with no interceptors; whatever comes back goes to
        // the caller, including a second 402.
        let retried = forward(cx, Some(&payment_json)).await;
        InterceptOutcome::Handled(retried.into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use agentguide_x402::{PaymentPayload, PaymentRequirements};

    fn networks() -> Vec<ChainNetwork> {
        vec![ChainNetwork {
            name: "localhost".to_string(),
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 1337,
            token_address: "0x00000000000000000000000000000000000000bb".parse().unwrap(),
            token_name: "MyToken".to_string(),
            token_version: "1".to_string(),
            token_decimals: 18,
            token_type: "ERC20".to_string(),
        }]
    }

    fn envelope() -> PaymentRequiredEnvelope {
        PaymentRequiredEnvelope {
            error: "payment_required".to_string(),
            message: "Payment is required to access this resource".to_string(),
            code: 402,
            payment_requirements: PaymentRequirements {
                scheme: "exact".to_string(),
                network: "localhost".to_string(),
                resource: "/api/outbound".to_string(),
                description: String::new(),
                max_amount_required: "1000".to_string(),
                pay_to: "0x00000000000000000000000000000000000000cc".parse().unwrap(),
                asset_type: "ERC20".to_string(),
                asset: "0x00000000000000000000000000000000000000bb".parse().unwrap(),
                token_name: "MyToken".to_string(),
                token_version: "1".to_string(),
            },
        }
    }

    #[test]
    fn test_build_payment_without_key_fails() {
        let interceptor = BuyerInterceptor::new(networks(), None, 1);
        let err = interceptor.build_payment(&envelope(), 1_700_000_000).unwrap_err();
        assert!(matches!(err, GatewayError::PaymentCreationFailed(_)));
    }

    #[test]
    fn test_build_payment_matches_challenge() {
        let signer = PrivateKeySigner::random();
        let interceptor = BuyerInterceptor::new(networks(), Some(signer), 1);

        let json = interceptor.build_payment(&envelope(), 1_700_000_000).unwrap();
        let payload: PaymentPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload.scheme, "exact");
        assert_eq!(payload.network, "localhost");
        assert_eq!(payload.payload.authorization.value, "1000");
        assert_eq!(
            payload.payload.authorization.to,
            "0x00000000000000000000000000000000000000cc".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn test_build_payment_unknown_network_fails() {
        let signer = PrivateKeySigner::random();
        let interceptor = BuyerInterceptor::new(networks(), Some(signer), 1);

        let mut challenge = envelope();
        challenge.payment_requirements.network = "mainnet".to_string();
        let err = interceptor.build_payment(&challenge, 1_700_000_000).unwrap_err();
        assert!(matches!(err, GatewayError::PaymentCreationFailed(_)));
    }
}
