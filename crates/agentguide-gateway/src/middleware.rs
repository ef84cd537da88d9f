//! Per-resource request pipeline: resolution is done by the registry, this
//! module enforces auth and seller-side payment before anything reaches the
//! origin.

use actix_web::{HttpRequest, HttpResponse, ResponseError};
use std::sync::Arc;

use agentguide_x402::{
    Facilitator, FacilitatorRequest, PaymentPayload, PaymentRequirements, SettleResponse,
};

use crate::error::GatewayError;
use crate::metrics;
use crate::registry::ResourcePolicy;

/// Per-request state accumulated by the pipeline and carried to the proxy
/// stage.
pub struct RequestContext {
    pub policy: Arc<ResourcePolicy>,
    pub auth_token: Option<String>,
    pub payment_payer: Option<String>,
    pub payment_transaction: Option<String>,
}

impl RequestContext {
    pub fn new(policy: Arc<ResourcePolicy>) -> Self {
        Self {
            policy,
            auth_token: None,
            payment_payer: None,
            payment_transaction: None,
        }
    }
}

/// Enforce the resource's bearer-token auth. Returns the presented token on
/// success; `None` when the policy has no auth configured.
pub fn authorize(
    req: &HttpRequest,
    policy: &ResourcePolicy,
) -> Result<Option<String>, GatewayError> {
    let Some(auth) = policy.auth.as_ref() else {
        return Ok(None);
    };

    let header = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .ok_or(GatewayError::MissingAuthorization)?;
    let header = header
        .to_str()
        .map_err(|_| GatewayError::InvalidAuthorizationFormat)?;

    let parts: Vec<&str> = header.split(' ').collect();
    if parts.len() != 2 || parts[0] != "Bearer" {
        return Err(GatewayError::InvalidAuthorizationFormat);
    }

    let token = parts[1];
    if token != auth.token {
        return Err(GatewayError::InvalidToken);
    }

    Ok(Some(token.to_string()))
}

/// Build the 402 challenge emitted when a seller resource is hit without
/// payment.
pub fn payment_required_response(requirements: &PaymentRequirements) -> HttpResponse {
    metrics::SELLER_CHALLENGES.inc();
    HttpResponse::PaymentRequired()
        .insert_header(("X-Payment-Required", "true"))
        .json(serde_json::json!({
            "error": "payment_required",
            "message": "Payment is required to access this resource",
            "code": 402,
            "paymentRequirements": requirements,
        }))
}

/// Seller-side payment enforcement: challenge when no payment is presented,
/// otherwise parse, verify and settle. `Err` carries the response to return
/// to the caller (challenge or failure); `Ok` means the payment settled and
/// the request may proceed to the origin.
pub async fn require_payment(
    req: &HttpRequest,
    policy: &ResourcePolicy,
    facilitator: &dyn Facilitator,
) -> Result<SettleResponse, HttpResponse> {
    let Some(requirements) = policy.payment_requirements.as_ref() else {
        return Err(GatewayError::Internal(
            "Resource has no payment requirements configured".to_string(),
        )
        .error_response());
    };

    let Some(header) = req.headers().get("X-Payment") else {
        return Err(payment_required_response(requirements));
    };

    let payload = header
        .to_str()
        .map_err(|e| payment_failed(format!("failed to parse X-Payment header: {e}")))
        .and_then(|raw| {
            serde_json::from_str::<PaymentPayload>(raw)
                .map_err(|e| payment_failed(format!("failed to parse X-Payment header: {e}")))
        })?;

    if payload.scheme != requirements.scheme || payload.network != requirements.network {
        return Err(payment_failed(format!(
            "payment scheme/network mismatch: expected scheme={} network={}, got scheme={} network={}",
            requirements.scheme, requirements.network, payload.scheme, payload.network
        )));
    }

    let request = FacilitatorRequest {
        payment_payload: payload,
        payment_requirements: requirements.clone(),
    };

    let verify = match facilitator.verify(&request).await {
        Ok(verify) => verify,
        Err(e) => {
            tracing::error!(error = %e, "facilitator verify transport failure");
            return Err(payment_failed(format!("payment verification failed: {e}")));
        }
    };
    if !verify.is_valid {
        tracing::warn!(
            reason = verify.invalid_reason.as_deref().unwrap_or(""),
            "payment rejected by facilitator"
        );
        return Err(payment_failed(format!(
            "payment is invalid: {}",
            verify.invalid_reason.unwrap_or_default()
        )));
    }

    let settle = match facilitator.settle(&request).await {
        Ok(settle) => settle,
        Err(e) => {
            tracing::error!(error = %e, "facilitator settle transport failure");
            return Err(payment_failed(format!("payment settlement failed: {e}")));
        }
    };
    if !settle.success {
        tracing::warn!(
            reason = settle.error_reason.as_deref().unwrap_or(""),
            "payment settlement refused"
        );
        return Err(payment_failed(format!(
            "payment settlement failed: {}",
            settle.error_reason.clone().unwrap_or_default()
        )));
    }

    tracing::info!(
        resource = %policy.path,
        payer = %settle.payer,
        transaction = %settle.transaction,
        "payment processed successfully"
    );
    metrics::PAYMENTS_SETTLED.inc();
    Ok(settle)
}

fn payment_failed(message: String) -> HttpResponse {
    metrics::PAYMENTS_FAILED.inc();
    GatewayError::PaymentFailed(message).error_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AuthPolicy, Middleware};
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;
    use actix_web::test::TestRequest;
    use agentguide_x402::{VerifyResponse, X402Error};
    use async_trait::async_trait;

    fn policy_with_auth() -> ResourcePolicy {
        ResourcePolicy {
            path: "/api/weather".to_string(),
            resource_type: "http".to_string(),
            target: "http://backend:3000/weather".to_string(),
            description: String::new(),
            middlewares: vec![Middleware::Auth],
            auth: Some(AuthPolicy {
                scheme: "bearer".to_string(),
                token: "T".to_string(),
            }),
            payment_requirements: None,
            buyer_intent: None,
        }
    }

    fn seller_policy() -> ResourcePolicy {
        ResourcePolicy {
            path: "/api/data".to_string(),
            resource_type: "http".to_string(),
            target: "http://backend:3000/data".to_string(),
            description: String::new(),
            middlewares: vec![Middleware::X402Seller],
            auth: None,
            payment_requirements: Some(PaymentRequirements {
                scheme: "exact".to_string(),
                network: "sepolia".to_string(),
                resource: "/api/data".to_string(),
                description: String::new(),
                max_amount_required: "100000".to_string(),
                pay_to: "0x00000000000000000000000000000000000000aa".parse().unwrap(),
                asset_type: "ERC20".to_string(),
                asset: "0x00000000000000000000000000000000000000bb".parse().unwrap(),
                token_name: "USDC".to_string(),
                token_version: "2".to_string(),
            }),
            buyer_intent: None,
        }
    }

    struct StubFacilitator {
        valid: bool,
        settle_success: bool,
    }

    #[async_trait]
    impl Facilitator for StubFacilitator {
        async fn verify(&self, _: &FacilitatorRequest) -> Result<VerifyResponse, X402Error> {
            Ok(VerifyResponse {
                is_valid: self.valid,
                invalid_reason: (!self.valid).then(|| "bad signature".to_string()),
            })
        }

        async fn settle(&self, _: &FacilitatorRequest) -> Result<SettleResponse, X402Error> {
            Ok(SettleResponse {
                success: self.settle_success,
                payer: "0xBBB".to_string(),
                transaction: "0xTX".to_string(),
                error_reason: (!self.settle_success).then(|| "insufficient funds".to_string()),
            })
        }
    }

    fn payment_header() -> String {
        serde_json::json!({
            "x402Version": 1,
            "scheme": "exact",
            "network": "sepolia",
            "payload": {
                "authorization": {
                    "from": "0x00000000000000000000000000000000000000aa",
                    "to": "0x00000000000000000000000000000000000000bb",
                    "value": "100000",
                    "validAfter": 0,
                    "validBefore": 99999999999u64,
                    "nonce": "0x0000000000000000000000000000000000000000000000000000000000000000"
                },
                "signature": "0xdead"
            }
        })
        .to_string()
    }

    #[test]
    fn test_authorize_missing_header() {
        let req = TestRequest::get().uri("/api/weather").to_http_request();
        let err = authorize(&req, &policy_with_auth()).unwrap_err();
        assert!(matches!(err, GatewayError::MissingAuthorization));
    }

    #[test]
    fn test_authorize_malformed_header() {
        for value in ["T", "Basic T", "Bearer T extra"] {
            let req = TestRequest::get()
                .insert_header(("Authorization", value))
                .to_http_request();
            let err = authorize(&req, &policy_with_auth()).unwrap_err();
            assert!(matches!(err, GatewayError::InvalidAuthorizationFormat));
        }
    }

    #[test]
    fn test_authorize_wrong_token() {
        let req = TestRequest::get()
            .insert_header(("Authorization", "Bearer WRONG"))
            .to_http_request();
        let err = authorize(&req, &policy_with_auth()).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidToken));
    }

    #[test]
    fn test_authorize_accepts_valid_token() {
        let req = TestRequest::get()
            .insert_header(("Authorization", "Bearer T"))
            .to_http_request();
        assert_eq!(authorize(&req, &policy_with_auth()).unwrap(), Some("T".to_string()));
    }

    #[test]
    fn test_authorize_skips_without_auth_policy() {
        let req = TestRequest::get().to_http_request();
        assert_eq!(authorize(&req, &seller_policy()).unwrap(), None);
    }

    #[actix_web::test]
    async fn test_challenge_shape() {
        let policy = seller_policy();
        let response = payment_required_response(policy.payment_requirements.as_ref().unwrap());
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(response.headers().get("X-Payment-Required").unwrap(), "true");

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "payment_required");
        assert_eq!(json["message"], "Payment is required to access this resource");
        assert_eq!(json["code"], 402);
        assert_eq!(json["paymentRequirements"]["network"], "sepolia");
        assert_eq!(json["paymentRequirements"]["maxAmountRequired"], "100000");
    }

    #[actix_web::test]
    async fn test_require_payment_challenges_without_header() {
        let req = TestRequest::get().to_http_request();
        let facilitator = StubFacilitator { valid: true, settle_success: true };
        let response = require_payment(&req, &seller_policy(), &facilitator)
            .await
            .unwrap_err();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(response.headers().get("X-Payment-Required").is_some());
    }

    #[actix_web::test]
    async fn test_require_payment_rejects_malformed_payload() {
        let req = TestRequest::get()
            .insert_header(("X-Payment", "not json"))
            .to_http_request();
        let facilitator = StubFacilitator { valid: true, settle_success: true };
        let response = require_payment(&req, &seller_policy(), &facilitator)
            .await
            .unwrap_err();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "payment_failed");
    }

    #[actix_web::test]
    async fn test_require_payment_rejects_network_mismatch() {
        let header = payment_header().replace("sepolia", "mainnet");
        let req = TestRequest::get()
            .insert_header(("X-Payment", header))
            .to_http_request();
        let facilitator = StubFacilitator { valid: true, settle_success: true };
        let response = require_payment(&req, &seller_policy(), &facilitator)
            .await
            .unwrap_err();

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "payment_failed");
        assert!(json["message"].as_str().unwrap().contains("mismatch"));
    }

    #[actix_web::test]
    async fn test_require_payment_rejects_invalid_payment() {
        let req = TestRequest::get()
            .insert_header(("X-Payment", payment_header()))
            .to_http_request();
        let facilitator = StubFacilitator { valid: false, settle_success: true };
        let response = require_payment(&req, &seller_policy(), &facilitator)
            .await
            .unwrap_err();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[actix_web::test]
    async fn test_require_payment_settles() {
        let req = TestRequest::get()
            .insert_header(("X-Payment", payment_header()))
            .to_http_request();
        let facilitator = StubFacilitator { valid: true, settle_success: true };
        let settle = require_payment(&req, &seller_policy(), &facilitator)
            .await
            .unwrap();
        assert_eq!(settle.payer, "0xBBB");
        assert_eq!(settle.transaction, "0xTX");
    }
}
