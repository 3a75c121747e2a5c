//! Refund precondition checks
//!
//! The provider-side payout call is not wired up yet. This service
//! enforces the checks any payout path must pass and records the
//! accepted request for manual processing.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::database::payment_repository::PaymentStatus;
use crate::database::store::PaymentStore;
use crate::error::PaymentError;

#[derive(Debug, Serialize)]
pub struct RefundReceipt {
    pub payment_id: Uuid,
    pub order_id: i64,
    pub amount: Decimal,
    pub remarks: Option<String>,
    pub status: &'static str,
    pub accepted_at: DateTime<Utc>,
}

pub struct RefundService {
    store: Arc<dyn PaymentStore>,
}

impl RefundService {
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self { store }
    }

    pub async fn request_refund(
        &self,
        payment_id: Uuid,
        amount: Decimal,
        remarks: Option<String>,
    ) -> Result<RefundReceipt, PaymentError> {
        if amount <= Decimal::ZERO {
            return Err(PaymentError::validation(
                "Refund amount must be positive",
                Some("amount"),
            ));
        }

        let payment = self
            .store
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound {
                entity: "payment",
                id: payment_id.to_string(),
            })?;

        if payment.status() != Some(PaymentStatus::Completed) {
            return Err(PaymentError::validation(
                format!(
                    "Only completed payments can be refunded, payment is {}",
                    payment.status
                ),
                Some("payment_id"),
            ));
        }

        if amount > payment.amount {
            return Err(PaymentError::validation(
                "Refund amount exceeds the original payment amount",
                Some("amount"),
            ));
        }

        info!(
            payment_id = %payment.id,
            order_id = payment.order_id,
            %amount,
            "Refund request accepted for manual processing"
        );

        Ok(RefundReceipt {
            payment_id: payment.id,
            order_id: payment.order_id,
            amount,
            remarks,
            status: "accepted",
            accepted_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::store::testing::InMemoryStore;

    async fn completed_payment(store: &InMemoryStore) -> Uuid {
        let mut payment = InMemoryStore::pending_payment("ws_CO_20", 60);
        payment.status = "completed".to_string();
        let id = payment.id;
        store.insert(payment);
        id
    }

    #[tokio::test]
    async fn test_refund_accepted_for_completed_payment() {
        let store = Arc::new(InMemoryStore::new());
        let id = completed_payment(&store).await;

        let service = RefundService::new(store);
        let receipt = service
            .request_refund(id, Decimal::new(20000, 2), Some("damaged item".to_string()))
            .await
            .unwrap();

        assert_eq!(receipt.status, "accepted");
        assert_eq!(receipt.amount, Decimal::new(20000, 2));
        assert_eq!(receipt.order_id, 60);
    }

    #[tokio::test]
    async fn test_refund_rejected_for_pending_payment() {
        let store = Arc::new(InMemoryStore::new());
        let payment = InMemoryStore::pending_payment("ws_CO_21", 61);
        let id = payment.id;
        store.insert(payment);

        let service = RefundService::new(store);
        let err = service
            .request_refund(id, Decimal::new(100, 0), None)
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_refund_rejected_when_exceeding_original_amount() {
        let store = Arc::new(InMemoryStore::new());
        let id = completed_payment(&store).await;

        let service = RefundService::new(store);
        let err = service
            .request_refund(id, Decimal::new(100000, 2), None)
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_refund_unknown_payment_not_found() {
        let store = Arc::new(InMemoryStore::new());

        let service = RefundService::new(store);
        let err = service
            .request_refund(Uuid::new_v4(), Decimal::new(100, 0), None)
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::NotFound { .. }));
    }
}
