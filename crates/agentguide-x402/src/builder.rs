//! Construction of signed payment payloads on the buyer side.

use alloy::primitives::U256;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use crate::eip712::{derive_nonce, encode_signature_hex, payment_domain, signing_hash};
use crate::network::{find_network, ChainNetwork};
use crate::payment::{ExactEvmPayload, PaymentAuthorization, PaymentPayload, PaymentRequirements};
use crate::{TransferWithAuthorization, X402Error};

/// Seconds the authorization is backdated by.
const VALID_AFTER_BACKDATE: u64 = 600_000;

/// Seconds the authorization remains valid for.
const VALID_DURATION: u64 = 300;

/// Builds signed payment payloads for a set of configured chain networks.
///
/// Pure modulo the signer key material and the `now` timestamp passed to
/// [`PaymentBuilder::build`]; performs no network I/O.
pub struct PaymentBuilder<'a> {
    networks: &'a [ChainNetwork],
    signer: &'a PrivateKeySigner,
    x402_version: u32,
}

impl<'a> PaymentBuilder<'a> {
    pub fn new(
        networks: &'a [ChainNetwork],
        signer: &'a PrivateKeySigner,
        x402_version: u32,
    ) -> Self {
        Self {
            networks,
            signer,
            x402_version,
        }
    }

    /// Build and sign a payment payload satisfying `requirements`.
    ///
    /// `now` is the current Unix time in seconds. The scheme is "exact":
    /// the payload transfers exactly `max_amount_required`.
    pub fn build(
        &self,
        requirements: &PaymentRequirements,
        now: u64,
    ) -> Result<PaymentPayload, X402Error> {
        let network = find_network(self.networks, &requirements.network)
            .ok_or_else(|| X402Error::UnknownNetwork(requirements.network.clone()))?;

        let value = U256::from_str_radix(&requirements.max_amount_required, 10).map_err(|e| {
            X402Error::InvalidPayment(format!(
                "invalid maxAmountRequired {:?}: {e}",
                requirements.max_amount_required
            ))
        })?;

        let from = self.signer.address();
        let valid_after = now.saturating_sub(VALID_AFTER_BACKDATE);
        let valid_before = now + VALID_DURATION;
        let nonce = derive_nonce(now, from, requirements.pay_to);

        let auth = TransferWithAuthorization {
            from,
            to: requirements.pay_to,
            value,
            validAfter: U256::from(valid_after),
            validBefore: U256::from(valid_before),
            nonce,
        };

        let domain = payment_domain(
            &requirements.token_name,
            &requirements.token_version,
            network.chain_id,
            requirements.asset,
        );
        let hash = signing_hash(&auth, &domain);
        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .map_err(|e| X402Error::SignatureError(format!("signing failed: {e}")))?;

        Ok(PaymentPayload {
            x402_version: self.x402_version,
            scheme: requirements.scheme.clone(),
            network: requirements.network.clone(),
            payload: ExactEvmPayload {
                authorization: PaymentAuthorization {
                    from,
                    to: requirements.pay_to,
                    value: requirements.max_amount_required.clone(),
                    valid_after,
                    valid_before,
                    nonce,
                },
                signature: encode_signature_hex(&signature),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    fn sepolia() -> ChainNetwork {
        ChainNetwork {
            name: "sepolia".to_string(),
            rpc_url: "https://rpc.sepolia.org".to_string(),
            chain_id: 11155111,
            token_address: "0x00000000000000000000000000000000000000bb".parse().unwrap(),
            token_name: "USDC".to_string(),
            token_version: "2".to_string(),
            token_decimals: 6,
            token_type: "ERC20".to_string(),
        }
    }

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".to_string(),
            network: "sepolia".to_string(),
            resource: "/api/data".to_string(),
            description: "premium data".to_string(),
            max_amount_required: "100000".to_string(),
            pay_to: "0x00000000000000000000000000000000000000aa".parse().unwrap(),
            asset_type: "ERC20".to_string(),
            asset: "0x00000000000000000000000000000000000000bb".parse().unwrap(),
            token_name: "USDC".to_string(),
            token_version: "2".to_string(),
        }
    }

    #[test]
    fn test_build_validity_window() {
        let signer = PrivateKeySigner::random();
        let networks = vec![sepolia()];
        let builder = PaymentBuilder::new(&networks, &signer, 1);

        let now = 1_700_000_000u64;
        let payload = builder.build(&requirements(), now).unwrap();

        let auth = &payload.payload.authorization;
        assert_eq!(auth.valid_after, now - 600_000);
        assert_eq!(auth.valid_before, now + 300);
        assert_eq!(auth.value, "100000");
        assert_eq!(payload.scheme, "exact");
        assert_eq!(payload.network, "sepolia");
    }

    #[test]
    fn test_build_signature_recovers_signer() {
        let signer = PrivateKeySigner::random();
        let networks = vec![sepolia()];
        let builder = PaymentBuilder::new(&networks, &signer, 1);

        let payload = builder.build(&requirements(), 1_700_000_000).unwrap();
        let auth = &payload.payload.authorization;

        let typed = TransferWithAuthorization {
            from: auth.from,
            to: auth.to,
            value: U256::from_str_radix(&auth.value, 10).unwrap(),
            validAfter: U256::from(auth.valid_after),
            validBefore: U256::from(auth.valid_before),
            nonce: auth.nonce,
        };
        let domain = payment_domain("USDC", "2", 11155111, requirements().asset);
        let hash = signing_hash(&typed, &domain);

        let sig_bytes =
            alloy::hex::decode(payload.payload.signature.strip_prefix("0x").unwrap()).unwrap();
        let sig = alloy::primitives::Signature::from_raw(&sig_bytes).unwrap();
        assert_eq!(
            sig.recover_address_from_prehash(&hash).unwrap(),
            signer.address()
        );
    }

    #[test]
    fn test_build_unknown_network() {
        let signer = PrivateKeySigner::random();
        let networks = vec![sepolia()];
        let builder = PaymentBuilder::new(&networks, &signer, 1);

        let mut reqs = requirements();
        reqs.network = "mainnet".to_string();
        let err = builder.build(&reqs, 1_700_000_000).unwrap_err();
        assert!(matches!(err, X402Error::UnknownNetwork(_)));
    }

    #[test]
    fn test_build_small_now_saturates() {
        let signer = PrivateKeySigner::random();
        let networks = vec![sepolia()];
        let builder = PaymentBuilder::new(&networks, &signer, 1);

        let payload = builder.build(&requirements(), 100).unwrap();
        assert_eq!(payload.payload.authorization.valid_after, 0);
    }
}
