//! The facilitator port: the gateway's only view of payment verification
//! and settlement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::payment::{PaymentPayload, PaymentRequirements};
use crate::response::{SettleResponse, VerifyResponse};
use crate::X402Error;

/// Request body for both verify and settle calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorRequest {
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

/// Verifies and settles presented payments.
///
/// Both operations are request-scoped and may block on network I/O; they
/// inherit the caller's deadline and abort cleanly when the calling future
/// is dropped.
#[async_trait]
pub trait Facilitator: Send + Sync {
    /// Check a payment payload against its requirements without settling.
    async fn verify(&self, request: &FacilitatorRequest) -> Result<VerifyResponse, X402Error>;

    /// Settle a verified payment on-chain.
    async fn settle(&self, request: &FacilitatorRequest) -> Result<SettleResponse, X402Error>;
}

/// HTTP client for a remote facilitator service exposing `/verify` and
/// `/settle`.
pub struct HttpFacilitator {
    http: reqwest::Client,
    base_url: String,
}

impl HttpFacilitator {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        request: &FacilitatorRequest,
    ) -> Result<T, X402Error> {
        let url = format!("{}/{path}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| X402Error::HttpError(format!("facilitator request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "facilitator returned non-success response");
            return Err(X402Error::HttpError(format!(
                "facilitator returned {status}"
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| X402Error::HttpError(format!("facilitator response parse failed: {e}")))
    }
}

#[async_trait]
impl Facilitator for HttpFacilitator {
    async fn verify(&self, request: &FacilitatorRequest) -> Result<VerifyResponse, X402Error> {
        self.post("verify", request).await
    }

    async fn settle(&self, request: &FacilitatorRequest) -> Result<SettleResponse, X402Error> {
        self.post("settle", request).await
    }
}
