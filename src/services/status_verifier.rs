//! Synchronous status verification fallback
//!
//! Recovers payments whose callback was lost or delayed. The provider
//! query result is applied through the reconciler, never through a
//! separate write path.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::database::payment_repository::Payment;
use crate::database::store::PaymentStore;
use crate::error::PaymentError;
use crate::payments::daraja::MpesaGateway;
use crate::services::reconciler::{PaymentResolution, ReconcileOutcome, Reconciler};

/// Result of a verification pass
///
/// Carries the raw provider query result alongside the payment so
/// callers can pass it through to the client. A terminal payment is
/// reported without querying the provider, so there is no raw result
/// in that case.
#[derive(Debug)]
pub enum VerifyOutcome {
    /// The provider reports the push as still in flight.
    StillPending {
        payment: Payment,
        provider_response: Value,
    },
    /// The payment reached (or already had) a terminal state.
    Resolved {
        payment: Payment,
        provider_response: Option<Value>,
    },
}

pub struct StatusVerifier {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn MpesaGateway>,
    reconciler: Arc<Reconciler>,
}

impl StatusVerifier {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn MpesaGateway>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            store,
            gateway,
            reconciler,
        }
    }

    pub async fn verify(&self, transaction_id: &str) -> Result<VerifyOutcome, PaymentError> {
        let payment = self
            .store
            .find_by_transaction_id(transaction_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound {
                entity: "payment",
                id: transaction_id.to_string(),
            })?;

        // Terminal payments are a read-only report, no provider call
        if payment.is_terminal() {
            return Ok(VerifyOutcome::Resolved {
                payment,
                provider_response: None,
            });
        }

        let query = self.gateway.stk_query(transaction_id).await?;
        let raw = json!({
            "ResponseCode": query.response_code.clone(),
            "ResponseDescription": query.response_description.clone(),
            "ResultCode": query.result_code.clone(),
            "ResultDesc": query.result_desc.clone(),
        });

        let resolution = match query.result_code.as_deref() {
            // No result yet means the push is still awaiting the user
            None => {
                info!(transaction_id, "Verification found payment still in flight");
                return Ok(VerifyOutcome::StillPending {
                    payment,
                    provider_response: raw,
                });
            }
            Some("0") => PaymentResolution::Success {
                receipt_number: None,
                amount: None,
            },
            Some(code) => PaymentResolution::Failure {
                result_code: code.to_string(),
                description: query
                    .result_desc
                    .clone()
                    .unwrap_or_else(|| "Unknown provider result".to_string()),
            },
        };

        match self.reconciler.apply(transaction_id, resolution, &raw).await? {
            ReconcileOutcome::Completed(updated) | ReconcileOutcome::Failed(updated) => {
                Ok(VerifyOutcome::Resolved {
                    payment: updated,
                    provider_response: Some(raw),
                })
            }
            // A concurrent callback won the guarded transition between
            // our read and the update. The snapshot the reconciler
            // carries predates that race, so report the stored row.
            ReconcileOutcome::Duplicate(_) => {
                let current = self
                    .store
                    .find_by_transaction_id(transaction_id)
                    .await?
                    .ok_or_else(|| PaymentError::NotFound {
                        entity: "payment",
                        id: transaction_id.to_string(),
                    })?;
                Ok(VerifyOutcome::Resolved {
                    payment: current,
                    provider_response: Some(raw),
                })
            }
            ReconcileOutcome::Orphan => Err(PaymentError::NotFound {
                entity: "payment",
                id: transaction_id.to_string(),
            }),
        }
    }
}
