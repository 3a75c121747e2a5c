use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::error::DatabaseError;
use super::store::{NewPayment, PaymentStore};

/// Payment record as stored in the database
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: i64,
    pub transaction_id: String,
    pub merchant_request_id: Option<String>,
    pub amount: Decimal,
    pub phone_number: String,
    pub status: String,
    pub mpesa_receipt_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle states for a payment. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Status string reported to the order service.
    pub fn order_status(&self) -> Option<&'static str> {
        match self {
            PaymentStatus::Completed => Some("paid"),
            PaymentStatus::Failed => Some("failed"),
            PaymentStatus::Pending => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

impl Payment {
    pub fn status(&self) -> Option<PaymentStatus> {
        PaymentStatus::parse(&self.status)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().map(|s| s.is_terminal()).unwrap_or(false)
    }
}

/// Postgres-backed payment store
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn create_pending(&self, new: NewPayment) -> Result<Payment, DatabaseError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                order_id, transaction_id, merchant_request_id,
                amount, phone_number, status, request_data
            )
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            RETURNING *
            "#,
        )
        .bind(new.order_id)
        .bind(&new.transaction_id)
        .bind(&new.merchant_request_id)
        .bind(new.amount)
        .bind(&new.phone_number)
        .bind(&new.request_data)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(payment)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(payment)
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        let payment =
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE transaction_id = $1")
                .bind(transaction_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;

        Ok(payment)
    }

    async fn complete_if_pending(
        &self,
        transaction_id: &str,
        receipt_number: Option<&str>,
        callback_data: &Value,
    ) -> Result<Option<Payment>, DatabaseError> {
        // Conditional update keeps the transition atomic under
        // concurrent deliveries. A row that already left pending
        // matches nothing and the update is a no-op.
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'completed',
                mpesa_receipt_number = $2,
                callback_data = $3,
                updated_at = NOW()
            WHERE transaction_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(transaction_id)
        .bind(receipt_number)
        .bind(callback_data)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(payment)
    }

    async fn fail_if_pending(
        &self,
        transaction_id: &str,
        callback_data: &Value,
    ) -> Result<Option<Payment>, DatabaseError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'failed',
                callback_data = $2,
                updated_at = NOW()
            WHERE transaction_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(transaction_id)
        .bind(callback_data)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(payment)
    }

    async fn find_stale_pending(
        &self,
        older_than_secs: i64,
        max_age_secs: i64,
        limit: i64,
    ) -> Result<Vec<Payment>, DatabaseError> {
        // The upper bound keeps permanently stuck payments from being
        // re-queried on every cycle
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE status = 'pending'
              AND created_at < NOW() - ($1 || ' seconds')::INTERVAL
              AND created_at > NOW() - ($2 || ' seconds')::INTERVAL
            ORDER BY created_at ASC
            LIMIT $3
            "#,
        )
        .bind(older_than_secs.to_string())
        .bind(max_age_secs.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PaymentStatus::parse("cancelled"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn test_order_status_mapping() {
        assert_eq!(PaymentStatus::Completed.order_status(), Some("paid"));
        assert_eq!(PaymentStatus::Failed.order_status(), Some("failed"));
        assert_eq!(PaymentStatus::Pending.order_status(), None);
    }
}
