//! Admin listener: health, readiness and metrics, behind optional
//! bearer/basic/api-key authentication.

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use base64::Engine;
use std::sync::Arc;

use agentguide_x402::Facilitator;

use crate::config::{AdminAuthType, AdminServerConfig, GatewayConfig};
use crate::error::error_body;
use crate::metrics::REGISTRY;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub config: Arc<GatewayConfig>,
    pub facilitator: Option<Arc<dyn Facilitator>>,
}

/// GET /health — liveness, unauthenticated.
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
    }))
}

/// GET /ready — readiness, unauthenticated.
pub async fn ready(state: web::Data<AdminState>) -> HttpResponse {
    if state.facilitator.is_none() {
        return HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "not_ready",
            "reason": "facilitator_not_initialized",
        }));
    }
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ready",
    }))
}

/// GET /metrics — Prometheus exposition, auth per configuration.
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AdminState>) -> HttpResponse {
    let admin = &state.config.admin_server;
    if admin.auth_enabled {
        if let Err(response) = validate_admin_auth(&req, admin) {
            return response;
        }
    }

    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("failed to encode metrics: {e}");
        return HttpResponse::InternalServerError().body("failed to encode metrics");
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(String::from_utf8(buffer).unwrap_or_default())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/ready", web::get().to(ready))
        .route("/metrics", web::get().to(metrics_endpoint));
}

/// Validate a request against the configured admin auth type.
pub fn validate_admin_auth(
    req: &HttpRequest,
    config: &AdminServerConfig,
) -> Result<(), HttpResponse> {
    match config.auth_type {
        Some(AdminAuthType::Bearer) => validate_bearer(req, &config.auth_tokens),
        Some(AdminAuthType::Basic) => validate_basic(req, &config.auth_tokens),
        Some(AdminAuthType::ApiKey) => validate_api_key(req, &config.auth_tokens),
        None => Err(unauthorized_json(
            StatusCode::INTERNAL_SERVER_ERROR,
            "invalid_auth_config",
            "Invalid authentication type configured",
        )),
    }
}

fn validate_bearer(req: &HttpRequest, valid_tokens: &[String]) -> Result<(), HttpResponse> {
    let header = authorization_header(req)?;
    let parts: Vec<&str> = header.split(' ').collect();
    if parts.len() != 2 || parts[0] != "Bearer" {
        return Err(unauthorized_json(
            StatusCode::UNAUTHORIZED,
            "invalid_authorization_format",
            "Authorization header must be in format 'Bearer <token>'",
        ));
    }
    if !is_valid_token(parts[1], valid_tokens) {
        return Err(unauthorized_json(
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            "Invalid or expired token",
        ));
    }
    Ok(())
}

/// Basic credentials are matched against allow-list entries of the form
/// `username:password`.
fn validate_basic(req: &HttpRequest, valid_tokens: &[String]) -> Result<(), HttpResponse> {
    let header = authorization_header(req)?;
    let parts: Vec<&str> = header.split(' ').collect();
    if parts.len() != 2 || parts[0] != "Basic" {
        return Err(unauthorized_json(
            StatusCode::UNAUTHORIZED,
            "invalid_authorization_format",
            "Authorization header must be in format 'Basic <credentials>'",
        ));
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(parts[1])
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| {
            unauthorized_json(
                StatusCode::UNAUTHORIZED,
                "invalid_authorization_format",
                "Invalid base64 encoding in Authorization header",
            )
        })?;

    if !is_valid_token(&decoded, valid_tokens) {
        return Err(unauthorized_json(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "Invalid username or password",
        ));
    }
    Ok(())
}

/// API key from the `X-API-Key` header or the `api_key` query parameter.
fn validate_api_key(req: &HttpRequest, valid_tokens: &[String]) -> Result<(), HttpResponse> {
    let from_header = req
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let api_key = from_header.or_else(|| {
        let query = req.query_string();
        query.split('&').find_map(|pair| {
            pair.strip_prefix("api_key=").map(str::to_string)
        })
    });

    let Some(api_key) = api_key else {
        return Err(unauthorized_json(
            StatusCode::UNAUTHORIZED,
            "missing_api_key",
            "API key is required in X-API-Key header or api_key query parameter",
        ));
    };

    if !is_valid_token(&api_key, valid_tokens) {
        return Err(unauthorized_json(
            StatusCode::UNAUTHORIZED,
            "invalid_api_key",
            "Invalid or expired API key",
        ));
    }
    Ok(())
}

fn authorization_header(req: &HttpRequest) -> Result<String, HttpResponse> {
    req.headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            unauthorized_json(
                StatusCode::UNAUTHORIZED,
                "missing_authorization",
                "Authorization header is required",
            )
        })
}

fn is_valid_token(token: &str, valid_tokens: &[String]) -> bool {
    valid_tokens.iter().any(|valid| valid == token)
}

fn unauthorized_json(code: StatusCode, kind: &str, message: &str) -> HttpResponse {
    HttpResponse::build(code).json(error_body(code, kind, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn tokens() -> Vec<String> {
        vec!["secret".to_string(), "admin:hunter2".to_string()]
    }

    #[test]
    fn test_bearer_accepts_listed_token() {
        let req = TestRequest::get()
            .insert_header(("Authorization", "Bearer secret"))
            .to_http_request();
        assert!(validate_bearer(&req, &tokens()).is_ok());
    }

    #[test]
    fn test_bearer_rejects_unknown_token() {
        let req = TestRequest::get()
            .insert_header(("Authorization", "Bearer nope"))
            .to_http_request();
        assert!(validate_bearer(&req, &tokens()).is_err());
    }

    #[test]
    fn test_bearer_rejects_missing_header() {
        let req = TestRequest::get().to_http_request();
        assert!(validate_bearer(&req, &tokens()).is_err());
    }

    #[test]
    fn test_basic_accepts_encoded_credentials() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("admin:hunter2");
        let req = TestRequest::get()
            .insert_header(("Authorization", format!("Basic {encoded}")))
            .to_http_request();
        assert!(validate_basic(&req, &tokens()).is_ok());
    }

    #[test]
    fn test_basic_rejects_bad_base64() {
        let req = TestRequest::get()
            .insert_header(("Authorization", "Basic !!!"))
            .to_http_request();
        assert!(validate_basic(&req, &tokens()).is_err());
    }

    #[test]
    fn test_api_key_header_and_query() {
        let req = TestRequest::get()
            .insert_header(("X-API-Key", "secret"))
            .to_http_request();
        assert!(validate_api_key(&req, &tokens()).is_ok());

        let req = TestRequest::get()
            .uri("/metrics?api_key=secret")
            .to_http_request();
        assert!(validate_api_key(&req, &tokens()).is_ok());

        let req = TestRequest::get().uri("/metrics").to_http_request();
        assert!(validate_api_key(&req, &tokens()).is_err());
    }
}
