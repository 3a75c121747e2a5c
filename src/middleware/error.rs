//! Error response formatting
//!
//! Provides standardized error responses with consistent JSON structure,
//! HTTP status codes, error codes, and user-friendly messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;

use crate::error::PaymentError;

/// Standardized error response structure
///
/// This is returned to clients for all error cases, ensuring
/// consistent error handling across the API.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,

    /// Machine-readable error code
    pub error: &'static str,

    /// Human-readable error message
    pub message: String,

    /// Request ID for debugging and support
    pub request_id: Option<String>,

    /// ISO 8601 timestamp of the error
    pub timestamp: String,

    /// Whether the client should retry the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn from_payment_error(error: &PaymentError, request_id: Option<String>) -> Self {
        Self {
            success: false,
            error: error.error_code(),
            message: error.user_message(),
            request_id,
            timestamp: Utc::now().to_rfc3339(),
            retryable: Some(error.is_retryable()),
        }
    }

}

/// Convert a domain error into the standard JSON error response,
/// tagged with the request id from the incoming headers so the client
/// can quote it to support.
pub fn payment_error_response(error: &PaymentError, request_id: Option<String>) -> Response {
    let status_code = StatusCode::from_u16(error.http_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status_code.is_server_error() {
        tracing::error!(
            error = ?error,
            status = %status_code.as_u16(),
            request_id = ?request_id,
            "Server error occurred"
        );
    } else {
        tracing::warn!(
            error = ?error,
            status = %status_code.as_u16(),
            request_id = ?request_id,
            "Client error occurred"
        );
    }

    let error_response = ErrorResponse::from_payment_error(error, request_id);
    (status_code, Json(error_response)).into_response()
}

/// Helper to extract request ID from request headers
pub fn get_request_id_from_headers(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_from_payment_error() {
        let error = PaymentError::validation("Amount must be positive", Some("amount"));
        let response = ErrorResponse::from_payment_error(&error, Some("req_123".to_string()));

        assert!(!response.success);
        assert_eq!(response.error, "VALIDATION_ERROR");
        assert_eq!(response.request_id, Some("req_123".to_string()));
        assert_eq!(response.retryable, Some(false));
    }

    #[test]
    fn test_payment_error_response_status() {
        let error = PaymentError::validation("bad input", None);
        let response = payment_error_response(&error, None);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let error = PaymentError::NotFound {
            entity: "payment",
            id: "ws_CO_x".to_string(),
        };
        let response = payment_error_response(&error, Some("req_456".to_string()));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_provider_error_maps_to_bad_gateway() {
        let error = PaymentError::Provider {
            message: "upstream down".to_string(),
            response_code: None,
            retryable: true,
        };
        let response = payment_error_response(&error, None);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_request_id_extracted_from_headers() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-request-id", "req_abc".parse().unwrap());
        assert_eq!(
            get_request_id_from_headers(&headers),
            Some("req_abc".to_string())
        );

        let empty = axum::http::HeaderMap::new();
        assert_eq!(get_request_id_from_headers(&empty), None);
    }
}
