//! Callback reconciliation and the payment state machine
//!
//! Every terminal transition in the system funnels through
//! [`Reconciler::apply`], whether it originates from a provider
//! callback or a status-verification query.

use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error as log_error, info, warn};

use crate::database::payment_repository::{Payment, PaymentStatus};
use crate::database::store::PaymentStore;
use crate::error::PaymentError;
use crate::payments::types::StkCallback;
use crate::services::order_notifier::OrderNotifier;

/// Terminal resolution reported by the provider
#[derive(Debug, Clone)]
pub enum PaymentResolution {
    Success {
        receipt_number: Option<String>,
        amount: Option<Decimal>,
    },
    Failure {
        result_code: String,
        description: String,
    },
}

/// What a reconciliation attempt actually did
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// The payment transitioned to completed in this call.
    Completed(Payment),
    /// The payment transitioned to failed in this call.
    Failed(Payment),
    /// The payment was already terminal, nothing changed.
    Duplicate(Payment),
    /// No payment matches the correlation id.
    Orphan,
}

pub struct Reconciler {
    store: Arc<dyn PaymentStore>,
    notifier: Arc<dyn OrderNotifier>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn PaymentStore>, notifier: Arc<dyn OrderNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Apply a provider resolution to the payment identified by
    /// `transaction_id`.
    ///
    /// The terminal write is conditional on the row still being
    /// pending, so concurrent deliveries of the same result collapse
    /// to one transition. Only the call that actually applied the
    /// transition notifies the order service.
    pub async fn apply(
        &self,
        transaction_id: &str,
        resolution: PaymentResolution,
        raw_payload: &Value,
    ) -> Result<ReconcileOutcome, PaymentError> {
        let payment = match self.store.find_by_transaction_id(transaction_id).await? {
            Some(payment) => payment,
            None => {
                warn!(transaction_id, "Orphan callback for unknown payment");
                return Ok(ReconcileOutcome::Orphan);
            }
        };

        if payment.is_terminal() {
            info!(
                transaction_id,
                status = %payment.status,
                "Duplicate delivery for terminal payment"
            );
            return Ok(ReconcileOutcome::Duplicate(payment));
        }

        let updated = match &resolution {
            PaymentResolution::Success {
                receipt_number,
                amount,
            } => {
                if let Some(reported) = amount {
                    if *reported != payment.amount {
                        warn!(
                            transaction_id,
                            recorded = %payment.amount,
                            reported = %reported,
                            "Provider-reported amount differs from recorded amount"
                        );
                    }
                }

                self.store
                    .complete_if_pending(transaction_id, receipt_number.as_deref(), raw_payload)
                    .await?
            }
            PaymentResolution::Failure {
                result_code,
                description,
            } => {
                info!(
                    transaction_id,
                    result_code, description, "Payment failed at provider"
                );
                self.store.fail_if_pending(transaction_id, raw_payload).await?
            }
        };

        let updated = match updated {
            Some(updated) => updated,
            None => {
                // Lost the race against a concurrent reconciliation
                info!(transaction_id, "Concurrent transition already applied");
                return Ok(ReconcileOutcome::Duplicate(payment));
            }
        };

        self.notify_order_service(&updated).await;

        match updated.status() {
            Some(PaymentStatus::Completed) => Ok(ReconcileOutcome::Completed(updated)),
            _ => Ok(ReconcileOutcome::Failed(updated)),
        }
    }

    /// Reconcile a parsed provider callback.
    pub async fn handle_callback(
        &self,
        callback: &StkCallback,
        raw_payload: &Value,
    ) -> Result<ReconcileOutcome, PaymentError> {
        let resolution = if callback.is_success() {
            PaymentResolution::Success {
                receipt_number: callback.receipt_number(),
                amount: callback.metadata_amount(),
            }
        } else {
            PaymentResolution::Failure {
                result_code: callback.result_code.to_string(),
                description: callback.result_desc.clone(),
            }
        };

        self.apply(&callback.checkout_request_id, resolution, raw_payload)
            .await
    }

    async fn notify_order_service(&self, payment: &Payment) {
        let order_status = payment.status().and_then(|s| s.order_status());
        let order_status = match order_status {
            Some(status) => status,
            None => return,
        };

        if let Err(e) = self
            .notifier
            .notify(payment.id, payment.order_id, order_status)
            .await
        {
            log_error!(
                payment_id = %payment.id,
                order_id = payment.order_id,
                error = %e,
                "Order notification failed, queued for retry"
            );
        }
    }
}
