use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::fmt;

/// Error kinds the gateway itself produces. Each renders as the canonical
/// `{error, message, code}` JSON body.
#[derive(Debug)]
pub enum GatewayError {
    /// No resource policy matches the request path
    ResourceNotFound(String),
    /// Authorization header absent
    MissingAuthorization,
    /// Authorization header not in `Bearer <token>` form
    InvalidAuthorizationFormat,
    /// Bearer token does not match the resource policy
    InvalidToken,
    /// Payment presented but rejected (parse, mismatch, verify or settle)
    PaymentFailed(String),
    /// Buyer mode could not construct a payment
    PaymentCreationFailed(String),
    /// Buyer mode could not serialize the constructed payment
    PaymentSerializationFailed(String),
    /// Buyer mode could not build the retry request
    RetryRequestFailed(String),
    /// Misconfiguration surfaced at request time
    Internal(String),
    /// Transport failure talking to the origin
    BadGateway(String),
}

impl GatewayError {
    fn kind(&self) -> &'static str {
        match self {
            GatewayError::ResourceNotFound(_) => "resource_not_found",
            GatewayError::MissingAuthorization => "missing_authorization",
            GatewayError::InvalidAuthorizationFormat => "invalid_authorization_format",
            GatewayError::InvalidToken => "invalid_token",
            GatewayError::PaymentFailed(_) => "payment_failed",
            GatewayError::PaymentCreationFailed(_) => "payment_creation_failed",
            GatewayError::PaymentSerializationFailed(_) => "payment_serialization_failed",
            GatewayError::RetryRequestFailed(_) => "retry_request_failed",
            GatewayError::Internal(_) => "internal_error",
            GatewayError::BadGateway(_) => "bad_gateway",
        }
    }

    fn message(&self) -> String {
        match self {
            GatewayError::ResourceNotFound(path) => format!("Resource not found: {path}"),
            GatewayError::MissingAuthorization => "Authorization header is required".to_string(),
            GatewayError::InvalidAuthorizationFormat => {
                "Authorization header must be in format 'Bearer <token>'".to_string()
            }
            GatewayError::InvalidToken => "Invalid or expired token".to_string(),
            GatewayError::PaymentFailed(msg) => msg.clone(),
            GatewayError::PaymentCreationFailed(msg) => {
                format!("Failed to create payment: {msg}")
            }
            GatewayError::PaymentSerializationFailed(msg) => {
                format!("Failed to serialize payment: {msg}")
            }
            GatewayError::RetryRequestFailed(msg) => {
                format!("Failed to create retry request: {msg}")
            }
            GatewayError::Internal(msg) => msg.clone(),
            GatewayError::BadGateway(msg) => format!("Failed to proxy request: {msg}"),
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl std::error::Error for GatewayError {}

/// Build the canonical error body for a status + kind + message.
pub fn error_body(code: StatusCode, kind: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": kind,
        "message": message,
        "code": code.as_u16(),
    })
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::MissingAuthorization
            | GatewayError::InvalidAuthorizationFormat
            | GatewayError::InvalidToken => StatusCode::UNAUTHORIZED,
            GatewayError::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
            GatewayError::PaymentCreationFailed(_)
            | GatewayError::PaymentSerializationFailed(_)
            | GatewayError::RetryRequestFailed(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            GatewayError::Internal(msg) => tracing::error!("internal error: {msg}"),
            GatewayError::BadGateway(msg) => tracing::error!("proxy error: {msg}"),
            _ => {}
        }
        let code = self.status_code();
        HttpResponse::build(code).json(error_body(code, self.kind(), &self.message()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GatewayError::ResourceNotFound("/x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::MissingAuthorization.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::PaymentFailed("no".into()).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            GatewayError::BadGateway("down".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_body_shape() {
        let body = error_body(
            StatusCode::UNAUTHORIZED,
            "missing_authorization",
            "Authorization header is required",
        );
        assert_eq!(body["error"], "missing_authorization");
        assert_eq!(body["message"], "Authorization header is required");
        assert_eq!(body["code"], 401);
    }
}
