//! Best-effort propagation of payment outcomes to the order service

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error as log_error, info, warn};
use uuid::Uuid;

use crate::config::OrderServiceConfig;
use crate::database::notification_repository::NotificationRepository;
use crate::error::PaymentError;

/// Downstream notification seam.
///
/// Implementations absorb their own retry policy. Callers log a
/// returned error but never let it affect payment state.
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn notify(
        &self,
        payment_id: Uuid,
        order_id: i64,
        payment_status: &str,
    ) -> Result<(), PaymentError>;
}

/// HTTP notifier with bounded retries and a dead-letter queue.
///
/// Delivery failures are retried with exponential backoff; when the
/// attempts are exhausted the notification is persisted for the retry
/// worker to replay later.
pub struct HttpOrderNotifier {
    config: OrderServiceConfig,
    http: Client,
    notifications: Arc<NotificationRepository>,
}

impl HttpOrderNotifier {
    pub fn new(
        config: OrderServiceConfig,
        notifications: Arc<NotificationRepository>,
    ) -> Result<Self, PaymentError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .map_err(|e| PaymentError::DownstreamNotify {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            config,
            http,
            notifications,
        })
    }

    /// Single delivery attempt against the order service.
    ///
    /// The collaborator takes the new status as a query parameter:
    /// `PUT /api/orders/{order_id}/payment-status?payment_status=paid`.
    pub async fn deliver_once(
        &self,
        order_id: i64,
        payment_status: &str,
    ) -> Result<(), PaymentError> {
        let url = format!(
            "{}/api/orders/{}/payment-status",
            self.config.base_url, order_id
        );

        let response = self
            .http
            .put(&url)
            .query(&[("payment_status", payment_status)])
            .send()
            .await
            .map_err(|e| PaymentError::DownstreamNotify {
                message: format!("Order service request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaymentError::DownstreamNotify {
                message: format!("Order service responded with status {}", status),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl OrderNotifier for HttpOrderNotifier {
    async fn notify(
        &self,
        payment_id: Uuid,
        order_id: i64,
        payment_status: &str,
    ) -> Result<(), PaymentError> {
        let mut last_error = String::new();

        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_secs(1 << attempt);
                tokio::time::sleep(backoff).await;
            }

            match self.deliver_once(order_id, payment_status).await {
                Ok(()) => {
                    info!(order_id, payment_status, "Order service notified");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        order_id,
                        attempt = attempt + 1,
                        error = %e,
                        "Order notification attempt failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        // Park the notification for the retry worker
        if let Err(e) = self
            .notifications
            .enqueue(payment_id, order_id, payment_status, Some(&last_error))
            .await
        {
            log_error!(order_id, error = %e, "Failed to enqueue order notification");
        }

        Err(PaymentError::DownstreamNotify {
            message: format!(
                "Order service unreachable after {} attempts: {}",
                self.config.max_retries, last_error
            ),
        })
    }
}
