use thiserror::Error;

use crate::database::error::DatabaseError;

pub type PaymentResult<T> = Result<T, PaymentError>;

/// Unified error type for the payment subsystem.
///
/// Orphan and duplicate callbacks are deliberately *not* errors: the provider
/// must never be asked to retry them, so they surface as
/// [`crate::services::reconciler::ReconcileOutcome`] variants instead.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("provider authentication failed: {message}")]
    Auth { message: String },

    #[error("provider error: {message}")]
    Provider {
        message: String,
        response_code: Option<String>,
        retryable: bool,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("order notification failed: {message}")]
    DownstreamNotify { message: String },
}

impl PaymentError {
    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        PaymentError::Validation {
            message: message.into(),
            field: field.map(|f| f.to_string()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::Validation { .. } => false,
            PaymentError::Auth { .. } => true,
            PaymentError::Provider { retryable, .. } => *retryable,
            PaymentError::NotFound { .. } => false,
            PaymentError::Database(_) => true,
            PaymentError::DownstreamNotify { .. } => true,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::Validation { .. } => 400,
            PaymentError::Auth { .. } => 502,
            PaymentError::Provider { .. } => 502,
            PaymentError::NotFound { .. } => 404,
            PaymentError::Database(_) => 500,
            PaymentError::DownstreamNotify { .. } => 502,
        }
    }

    /// Machine-readable code for client handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            PaymentError::Validation { .. } => "VALIDATION_ERROR",
            PaymentError::Auth { .. } => "AUTH_ERROR",
            PaymentError::Provider { .. } => "PROVIDER_ERROR",
            PaymentError::NotFound { .. } => "NOT_FOUND",
            PaymentError::Database(_) => "DATABASE_ERROR",
            PaymentError::DownstreamNotify { .. } => "DOWNSTREAM_NOTIFY_ERROR",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::Validation { message, .. } => message.clone(),
            PaymentError::Auth { .. } => {
                "Could not authenticate with the payment provider. Please try again".to_string()
            }
            PaymentError::Provider { message, .. } => {
                format!("Payment provider error: {}", message)
            }
            PaymentError::NotFound { entity, id } => format!("{} '{}' not found", entity, id),
            PaymentError::Database(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            PaymentError::DownstreamNotify { .. } => {
                "Order service could not be notified".to_string()
            }
        }
    }
}
