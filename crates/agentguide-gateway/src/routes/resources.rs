//! The resource catch-all: resolve the policy, run the middleware pipeline,
//! then proxy.

use actix_web::{web, HttpRequest, HttpResponse, ResponseError};

use crate::buyer::BuyerInterceptor;
use crate::error::GatewayError;
use crate::metrics;
use crate::middleware::{authorize, require_payment, RequestContext};
use crate::proxy::{ProxyContext, ResourceProxy};
use crate::registry::Middleware;
use crate::state::AppState;

/// `ANY /*` — every non-discovery path lands here.
pub async fn resource_request(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let method = req.method().as_str().to_string();
    let response = dispatch(req, body, state).await;
    metrics::REQUESTS_TOTAL
        .with_label_values(&[&method, response.status().as_str()])
        .inc();
    response
}

async fn dispatch(req: HttpRequest, body: web::Bytes, state: web::Data<AppState>) -> HttpResponse {
    state.registry.reload_if_stale();

    let Some(policy) = state.registry.lookup(req.path()) else {
        return GatewayError::ResourceNotFound(req.path().to_string()).error_response();
    };
    let mut context = RequestContext::new(policy.clone());

    if policy.requires(Middleware::Auth) {
        match authorize(&req, &policy) {
            Ok(token) => context.auth_token = token,
            Err(e) => return e.error_response(),
        }
    }

    if policy.requires(Middleware::X402Seller) {
        match require_payment(&req, &policy, state.facilitator.as_ref()).await {
            Ok(settle) => {
                context.payment_payer = Some(settle.payer);
                context.payment_transaction = Some(settle.transaction);
            }
            Err(response) => return response,
        }
    }

    if policy.target.is_empty() {
        return GatewayError::Internal("Resource target URL not configured".to_string())
            .error_response();
    }
    let target = match url::Url::parse(&policy.target) {
        Ok(target) => target,
        Err(e) => {
            return GatewayError::Internal(format!("Invalid target URL: {e}")).error_response()
        }
    };

    let cx = ProxyContext::from_request(&req, body, target, state.http_client.clone());

    let mut proxy = ResourceProxy::new();
    if policy.requires(Middleware::X402Buyer) {
        proxy.add_interceptor(Box::new(BuyerInterceptor::new(
            state.config.facilitator.chain_networks.clone(),
            state.signer.clone(),
            state.config.facilitator.x402_version,
        )));
    }

    let timer = metrics::PROXY_LATENCY.start_timer();
    let response = proxy.serve(&cx).await;
    timer.observe_duration();

    if let Some(payer) = context.payment_payer.as_deref() {
        tracing::debug!(
            resource = %context.policy.path,
            payer,
            transaction = context.payment_transaction.as_deref().unwrap_or(""),
            status = %response.status(),
            "proxied paid request"
        );
    }
    response
}
