use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// The wire shape of a 402 challenge and the seller-side payment policy.
///
/// Published verbatim in challenge bodies and in discovery `accepts` arrays;
/// also the target of buyer-mode 402 parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    /// Resource path this requirement covers.
    pub resource: String,
    pub description: String,
    /// Required amount in token base units, decimal string.
    pub max_amount_required: String,
    pub pay_to: Address,
    /// Token standard, e.g. "ERC20".
    pub asset_type: String,
    /// Token contract address.
    pub asset: Address,
    pub token_name: String,
    pub token_version: String,
}

/// The signed authorization inside a payment payload. Mirrors the EIP-712
/// `TransferWithAuthorization` struct that gets hashed and signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorization {
    pub from: Address,
    pub to: Address,
    /// Transfer amount in token base units, decimal string.
    pub value: String,
    /// Unix seconds after which the authorization is valid.
    pub valid_after: u64,
    /// Unix seconds before which the authorization is valid.
    pub valid_before: u64,
    pub nonce: B256,
}

/// Authorization plus its 65-byte secp256k1 signature, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    pub authorization: PaymentAuthorization,
    pub signature: String,
}

/// What clients send in the `X-Payment` header (JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    pub payload: ExactEvmPayload,
}

/// The 402 body a seller emits and a buyer parses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequiredEnvelope {
    pub error: String,
    pub message: String,
    pub code: u16,
    #[serde(rename = "paymentRequirements")]
    pub payment_requirements: PaymentRequirements,
}

/// One entry in the discovery listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryItem {
    pub resource: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub x402_version: u32,
    pub accepts: Vec<PaymentRequirements>,
}

/// Response body of `GET /discover/resources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResponse {
    pub x402_version: u32,
    pub items: Vec<DiscoveryItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> PaymentPayload {
        PaymentPayload {
            x402_version: 1,
            scheme: "exact".to_string(),
            network: "sepolia".to_string(),
            payload: ExactEvmPayload {
                authorization: PaymentAuthorization {
                    from: Address::ZERO,
                    to: Address::ZERO,
                    value: "100000".to_string(),
                    valid_after: 0,
                    valid_before: u64::MAX,
                    nonce: B256::ZERO,
                },
                signature: "0xdead".to_string(),
            },
        }
    }

    #[test]
    fn test_payload_json_roundtrip() {
        let payload = sample_payload();
        let json = serde_json::to_string(&payload).unwrap();
        let decoded: PaymentPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_payload_wire_names_are_camel_case() {
        let json = serde_json::to_value(sample_payload()).unwrap();
        assert!(json.get("x402Version").is_some());
        let auth = &json["payload"]["authorization"];
        assert!(auth.get("validAfter").is_some());
        assert!(auth.get("validBefore").is_some());
    }

    #[test]
    fn test_envelope_parses_seller_challenge() {
        let body = serde_json::json!({
            "error": "payment_required",
            "message": "Payment is required to access this resource",
            "code": 402,
            "paymentRequirements": {
                "scheme": "exact",
                "network": "sepolia",
                "resource": "/api/data",
                "description": "premium data",
                "maxAmountRequired": "100000",
                "payTo": "0x00000000000000000000000000000000000000aa",
                "assetType": "ERC20",
                "asset": "0x00000000000000000000000000000000000000bb",
                "tokenName": "USDC",
                "tokenVersion": "2"
            }
        });
        let envelope: PaymentRequiredEnvelope = serde_json::from_value(body).unwrap();
        assert_eq!(envelope.code, 402);
        assert_eq!(envelope.payment_requirements.network, "sepolia");
        assert_eq!(envelope.payment_requirements.max_amount_required, "100000");
    }
}
