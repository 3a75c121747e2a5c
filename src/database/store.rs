use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use super::error::DatabaseError;
use super::payment_repository::Payment;

/// Parameters for recording a freshly initiated payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: i64,
    pub transaction_id: String,
    pub merchant_request_id: Option<String>,
    pub amount: Decimal,
    pub phone_number: String,
    pub request_data: Option<Value>,
}

/// Persistence seam for payment records.
///
/// The two conditional transitions are the only way a payment leaves
/// the pending state. Both return `None` when the row was not pending
/// at update time, which callers treat as a duplicate delivery.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create_pending(&self, new: NewPayment) -> Result<Payment, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError>;

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>, DatabaseError>;

    /// Mark a pending payment completed. Returns the updated row, or
    /// `None` if the payment was not pending (or does not exist).
    async fn complete_if_pending(
        &self,
        transaction_id: &str,
        receipt_number: Option<&str>,
        callback_data: &Value,
    ) -> Result<Option<Payment>, DatabaseError>;

    /// Mark a pending payment failed. Same contract as
    /// `complete_if_pending`.
    async fn fail_if_pending(
        &self,
        transaction_id: &str,
        callback_data: &Value,
    ) -> Result<Option<Payment>, DatabaseError>;

    /// Pending payments older than `older_than_secs` but younger than
    /// `max_age_secs`, oldest first. Payments past the upper bound are
    /// considered unrecoverable by polling and left alone.
    async fn find_stale_pending(
        &self,
        older_than_secs: i64,
        max_age_secs: i64,
        limit: i64,
    ) -> Result<Vec<Payment>, DatabaseError>;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store with the same conditional-update semantics as
    /// the Postgres repository.
    pub struct InMemoryStore {
        payments: Mutex<HashMap<String, Payment>>,
    }

    impl InMemoryStore {
        pub fn new() -> Self {
            Self {
                payments: Mutex::new(HashMap::new()),
            }
        }

        pub fn insert(&self, payment: Payment) {
            self.payments
                .lock()
                .unwrap()
                .insert(payment.transaction_id.clone(), payment);
        }

        pub fn pending_payment(transaction_id: &str, order_id: i64) -> Payment {
            Payment {
                id: Uuid::new_v4(),
                order_id,
                transaction_id: transaction_id.to_string(),
                merchant_request_id: Some("29115-34620561-1".to_string()),
                amount: Decimal::new(50000, 2),
                phone_number: "254712345678".to_string(),
                status: "pending".to_string(),
                mpesa_receipt_number: None,
                request_data: None,
                callback_data: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl PaymentStore for InMemoryStore {
        async fn create_pending(&self, new: NewPayment) -> Result<Payment, DatabaseError> {
            let mut payments = self.payments.lock().unwrap();
            if payments.contains_key(&new.transaction_id) {
                return Err(DatabaseError::new(
                    super::super::error::DatabaseErrorKind::UniqueViolation {
                        constraint: Some("payments_transaction_id_key".to_string()),
                    },
                ));
            }

            let payment = Payment {
                id: Uuid::new_v4(),
                order_id: new.order_id,
                transaction_id: new.transaction_id.clone(),
                merchant_request_id: new.merchant_request_id,
                amount: new.amount,
                phone_number: new.phone_number,
                status: "pending".to_string(),
                mpesa_receipt_number: None,
                request_data: new.request_data,
                callback_data: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            payments.insert(new.transaction_id, payment.clone());
            Ok(payment)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError> {
            let payments = self.payments.lock().unwrap();
            Ok(payments.values().find(|p| p.id == id).cloned())
        }

        async fn find_by_transaction_id(
            &self,
            transaction_id: &str,
        ) -> Result<Option<Payment>, DatabaseError> {
            let payments = self.payments.lock().unwrap();
            Ok(payments.get(transaction_id).cloned())
        }

        async fn complete_if_pending(
            &self,
            transaction_id: &str,
            receipt_number: Option<&str>,
            callback_data: &Value,
        ) -> Result<Option<Payment>, DatabaseError> {
            let mut payments = self.payments.lock().unwrap();
            match payments.get_mut(transaction_id) {
                Some(payment) if payment.status == "pending" => {
                    payment.status = "completed".to_string();
                    payment.mpesa_receipt_number = receipt_number.map(|s| s.to_string());
                    payment.callback_data = Some(callback_data.clone());
                    payment.updated_at = Utc::now();
                    Ok(Some(payment.clone()))
                }
                _ => Ok(None),
            }
        }

        async fn fail_if_pending(
            &self,
            transaction_id: &str,
            callback_data: &Value,
        ) -> Result<Option<Payment>, DatabaseError> {
            let mut payments = self.payments.lock().unwrap();
            match payments.get_mut(transaction_id) {
                Some(payment) if payment.status == "pending" => {
                    payment.status = "failed".to_string();
                    payment.callback_data = Some(callback_data.clone());
                    payment.updated_at = Utc::now();
                    Ok(Some(payment.clone()))
                }
                _ => Ok(None),
            }
        }

        async fn find_stale_pending(
            &self,
            older_than_secs: i64,
            max_age_secs: i64,
            limit: i64,
        ) -> Result<Vec<Payment>, DatabaseError> {
            let now = Utc::now();
            let newest = now - ChronoDuration::seconds(older_than_secs);
            let oldest = now - ChronoDuration::seconds(max_age_secs);
            let payments = self.payments.lock().unwrap();
            let mut stale: Vec<Payment> = payments
                .values()
                .filter(|p| {
                    p.status == "pending" && p.created_at < newest && p.created_at > oldest
                })
                .cloned()
                .collect();
            stale.sort_by_key(|p| p.created_at);
            stale.truncate(limit as usize);
            Ok(stale)
        }
    }
}
