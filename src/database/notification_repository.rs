use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::error::DatabaseError;

/// Order notification awaiting delivery or retried after failure
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderNotification {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub order_id: i64,
    pub payment_status: String,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Dead-letter store for order notifications that failed their
/// in-band delivery attempts
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(
        &self,
        payment_id: Uuid,
        order_id: i64,
        payment_status: &str,
        last_error: Option<&str>,
    ) -> Result<OrderNotification, DatabaseError> {
        let notification = sqlx::query_as::<_, OrderNotification>(
            r#"
            INSERT INTO order_notifications (payment_id, order_id, payment_status, status, last_error)
            VALUES ($1, $2, $3, 'pending', $4)
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(order_id)
        .bind(payment_status)
        .bind(last_error)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(notification)
    }

    pub async fn get_pending(&self, limit: i64) -> Result<Vec<OrderNotification>, DatabaseError> {
        let notifications = sqlx::query_as::<_, OrderNotification>(
            r#"
            SELECT * FROM order_notifications
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(notifications)
    }

    pub async fn mark_delivered(&self, id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE order_notifications
            SET status = 'delivered', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    pub async fn record_failure(&self, id: Uuid, error: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE order_notifications
            SET attempts = attempts + 1, last_error = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    pub async fn mark_abandoned(&self, id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            UPDATE order_notifications
            SET status = 'abandoned', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }
}
