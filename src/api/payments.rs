//! Payment HTTP handlers

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, warn};
use uuid::Uuid;

use super::ApiState;
use crate::database::payment_repository::Payment;
use crate::error::PaymentError;
use crate::middleware::error::{get_request_id_from_headers, payment_error_response};
use crate::payments::types::StkCallbackEnvelope;
use crate::services::refund::RefundReceipt;
use crate::services::status_verifier::VerifyOutcome;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/payments/initiate", post(initiate_payment))
        .route("/payments/mpesa/callback", post(mpesa_callback))
        .route("/payments/verify", post(verify_payment))
        .route("/payments/refund", post(request_refund))
        .route("/payments/{id}", get(get_payment))
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ready", get(health))
        .route("/health/live", get(liveness))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub phone_number: String,
    pub amount: Decimal,
    pub order_id: i64,
    pub account_reference: String,
}

#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub success: bool,
    pub payment_id: Uuid,
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
}

async fn initiate_payment(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(payload): Json<InitiateRequest>,
) -> Result<(StatusCode, Json<InitiateResponse>), Response> {
    let request_id = get_request_id_from_headers(&headers);
    let payment = state
        .initiator
        .initiate(
            &payload.phone_number,
            payload.amount,
            payload.order_id,
            &payload.account_reference,
        )
        .await
        .map_err(|e| payment_error_response(&e, request_id))?;

    Ok((
        StatusCode::CREATED,
        Json(InitiateResponse {
            success: true,
            payment_id: payment.id,
            checkout_request_id: payment.transaction_id,
            merchant_request_id: payment.merchant_request_id,
        }),
    ))
}

/// Provider callback receiver.
///
/// Always acknowledges with 200 so the provider does not retry; a
/// retry cannot fix a malformed payload or an unknown correlation id.
/// The `success` flag reflects internal bookkeeping only, and internal
/// failures are logged for independent observability.
async fn mpesa_callback(State(state): State<ApiState>, body: String) -> Json<Value> {
    let raw: Value = match serde_json::from_str(&body) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Callback body is not valid JSON");
            return Json(json!({ "success": false }));
        }
    };

    let envelope: StkCallbackEnvelope = match serde_json::from_value(raw.clone()) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Callback payload has unexpected shape");
            return Json(json!({ "success": false }));
        }
    };

    match state
        .reconciler
        .handle_callback(&envelope.body.stk_callback, &raw)
        .await
    {
        Ok(_) => Json(json!({ "success": true })),
        Err(e) => {
            error!(error = %e, "Callback reconciliation failed");
            Json(json!({ "success": false }))
        }
    }
}

/// Fetch a payment by internal id or provider correlation id.
async fn get_payment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Payment>, Response> {
    let request_id = get_request_id_from_headers(&headers);
    let lookup = async {
        let payment = match Uuid::parse_str(&id) {
            Ok(uuid) => state.store.find_by_id(uuid).await?,
            Err(_) => state.store.find_by_transaction_id(&id).await?,
        };

        payment.ok_or_else(|| PaymentError::NotFound {
            entity: "payment",
            id: id.clone(),
        })
    };

    lookup
        .await
        .map(Json)
        .map_err(|e| payment_error_response(&e, request_id))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub checkout_request_id: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub status: String,
    pub payment: Payment,
    /// Raw provider query result, absent when the payment was already
    /// terminal and no provider call was made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_response: Option<Value>,
}

async fn verify_payment(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, Response> {
    let request_id = get_request_id_from_headers(&headers);
    let outcome = state
        .verifier
        .verify(&payload.checkout_request_id)
        .await
        .map_err(|e| payment_error_response(&e, request_id))?;

    let (payment, provider_response) = match outcome {
        VerifyOutcome::Resolved {
            payment,
            provider_response,
        } => (payment, provider_response),
        VerifyOutcome::StillPending {
            payment,
            provider_response,
        } => (payment, Some(provider_response)),
    };

    Ok(Json(VerifyResponse {
        success: true,
        status: payment.status.clone(),
        payment,
        provider_response,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub remarks: Option<String>,
}

async fn request_refund(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(payload): Json<RefundRequest>,
) -> Result<(StatusCode, Json<RefundReceipt>), Response> {
    let request_id = get_request_id_from_headers(&headers);
    let receipt = state
        .refunds
        .request_refund(payload.payment_id, payload.amount, payload.remarks)
        .await
        .map_err(|e| payment_error_response(&e, request_id))?;

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let status = state.health_checker.check_health().await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

async fn liveness(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.health_checker.liveness())
}
