//! Outbound push-payment initiation

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::database::payment_repository::Payment;
use crate::database::store::{NewPayment, PaymentStore};
use crate::error::PaymentError;
use crate::payments::daraja::{MpesaGateway, PushParams};
use crate::payments::phone::normalize_phone;

pub struct PushInitiator {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn MpesaGateway>,
    country_code: String,
}

impl PushInitiator {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn MpesaGateway>,
        country_code: String,
    ) -> Self {
        Self {
            store,
            gateway,
            country_code,
        }
    }

    /// Initiate an STK push and record the accepted payment.
    ///
    /// The payment row is only created after the provider accepts the
    /// push request. A rejected or failed initiation leaves no trace,
    /// so no pending row can exist that a callback will never resolve.
    pub async fn initiate(
        &self,
        phone_number: &str,
        amount: Decimal,
        order_id: i64,
        account_reference: &str,
    ) -> Result<Payment, PaymentError> {
        if amount <= Decimal::ZERO {
            return Err(PaymentError::validation(
                "Amount must be positive",
                Some("amount"),
            ));
        }

        if order_id <= 0 {
            return Err(PaymentError::validation(
                "Order id must be positive",
                Some("order_id"),
            ));
        }

        if account_reference.trim().is_empty() {
            return Err(PaymentError::validation(
                "Account reference is required",
                Some("account_reference"),
            ));
        }

        let phone = normalize_phone(phone_number, &self.country_code)?;

        // The provider only takes whole currency units. Rejecting
        // fractional amounts keeps the recorded amount identical to
        // what the customer is actually charged.
        if !amount.fract().is_zero() {
            return Err(PaymentError::validation(
                "Amount must be a whole number of currency units",
                Some("amount"),
            ));
        }

        let push_amount = amount
            .to_u64()
            .ok_or_else(|| PaymentError::validation("Amount is out of range", Some("amount")))?;

        let response = self
            .gateway
            .stk_push(PushParams {
                amount: push_amount,
                phone_number: phone.clone(),
                account_reference: account_reference.to_string(),
                description: format!("Payment for order {}", order_id),
            })
            .await?;

        let request_data = json!({
            "MerchantRequestID": response.merchant_request_id,
            "CheckoutRequestID": response.checkout_request_id,
            "ResponseCode": response.response_code,
            "ResponseDescription": response.response_description,
            "CustomerMessage": response.customer_message,
        });

        let payment = self
            .store
            .create_pending(NewPayment {
                order_id,
                transaction_id: response.checkout_request_id.clone(),
                merchant_request_id: Some(response.merchant_request_id.clone()),
                amount,
                phone_number: phone,
                request_data: Some(request_data),
            })
            .await?;

        info!(
            payment_id = %payment.id,
            order_id,
            transaction_id = %payment.transaction_id,
            "Payment initiated"
        );

        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::store::testing::InMemoryStore;
    use crate::payments::types::{StkPushResponse, StkQueryResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubGateway {
        accept: bool,
        pushes: AtomicUsize,
    }

    impl StubGateway {
        fn accepting() -> Self {
            Self {
                accept: true,
                pushes: AtomicUsize::new(0),
            }
        }

        fn rejecting() -> Self {
            Self {
                accept: false,
                pushes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MpesaGateway for StubGateway {
        async fn stk_push(&self, _params: PushParams) -> Result<StkPushResponse, PaymentError> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            if self.accept {
                Ok(StkPushResponse {
                    merchant_request_id: "29115-34620561-1".to_string(),
                    checkout_request_id: "ws_CO_191220191020363925".to_string(),
                    response_code: "0".to_string(),
                    response_description: "Success. Request accepted for processing".to_string(),
                    customer_message: Some("Success. Request accepted for processing".to_string()),
                })
            } else {
                Err(PaymentError::Provider {
                    message: "Invalid PhoneNumber".to_string(),
                    response_code: Some("400.002.02".to_string()),
                    retryable: false,
                })
            }
        }

        async fn stk_query(
            &self,
            _checkout_request_id: &str,
        ) -> Result<StkQueryResponse, PaymentError> {
            unreachable!("initiation never queries status")
        }
    }

    #[tokio::test]
    async fn test_initiate_creates_pending_payment() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(StubGateway::accepting());
        let initiator = PushInitiator::new(store.clone(), gateway, "254".to_string());

        let payment = initiator
            .initiate("0712345678", Decimal::new(500, 0), 42, "ORD42")
            .await
            .unwrap();

        assert_eq!(payment.status, "pending");
        assert_eq!(payment.transaction_id, "ws_CO_191220191020363925");
        assert_eq!(payment.phone_number, "254712345678");
        assert_eq!(payment.amount, Decimal::new(500, 0));

        let stored = store
            .find_by_transaction_id("ws_CO_191220191020363925")
            .await
            .unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn test_rejected_push_leaves_no_payment() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(StubGateway::rejecting());
        let initiator = PushInitiator::new(store.clone(), gateway, "254".to_string());

        let err = initiator
            .initiate("0712345678", Decimal::new(500, 0), 42, "ORD42")
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Provider { .. }));
        let stored = store
            .find_by_transaction_id("ws_CO_191220191020363925")
            .await
            .unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn test_invalid_amount_rejected_before_provider_call() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(StubGateway::accepting());
        let initiator = PushInitiator::new(store, gateway.clone(), "254".to_string());

        let err = initiator
            .initiate("0712345678", Decimal::ZERO, 42, "ORD42")
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Validation { .. }));
        assert_eq!(gateway.pushes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fractional_amount_rejected_before_provider_call() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(StubGateway::accepting());
        let initiator = PushInitiator::new(store.clone(), gateway.clone(), "254".to_string());

        let err = initiator
            .initiate("0712345678", Decimal::new(50075, 2), 42, "ORD42")
            .await
            .unwrap_err();

        // The recorded amount must always equal the pushed amount, so
        // 500.75 is rejected rather than rounded to 501
        assert!(matches!(err, PaymentError::Validation { .. }));
        assert_eq!(gateway.pushes.load(Ordering::SeqCst), 0);
        let stored = store
            .find_by_transaction_id("ws_CO_191220191020363925")
            .await
            .unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn test_whole_amount_with_trailing_decimals_accepted() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(StubGateway::accepting());
        let initiator = PushInitiator::new(store, gateway, "254".to_string());

        // 500.00 is integral even though its scale is 2
        let payment = initiator
            .initiate("0712345678", Decimal::new(50000, 2), 42, "ORD42")
            .await
            .unwrap();

        assert_eq!(payment.amount, Decimal::new(50000, 2));
    }

    #[tokio::test]
    async fn test_missing_account_reference_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(StubGateway::accepting());
        let initiator = PushInitiator::new(store, gateway, "254".to_string());

        let err = initiator
            .initiate("0712345678", Decimal::new(500, 0), 42, "   ")
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Validation { .. }));
    }
}
