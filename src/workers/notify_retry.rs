//! Replays order notifications that exhausted their in-band retries

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::database::notification_repository::NotificationRepository;
use crate::services::order_notifier::HttpOrderNotifier;

pub struct NotifyRetryWorker {
    notifications: Arc<NotificationRepository>,
    notifier: Arc<HttpOrderNotifier>,
    interval_secs: u64,
    max_attempts: i32,
    batch_size: i64,
}

impl NotifyRetryWorker {
    pub fn new(
        notifications: Arc<NotificationRepository>,
        notifier: Arc<HttpOrderNotifier>,
        interval_secs: u64,
        max_attempts: i32,
    ) -> Self {
        Self {
            notifications,
            notifier,
            interval_secs,
            max_attempts,
            batch_size: 50,
        }
    }

    pub async fn run(&self) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs));
        info!(
            interval_secs = self.interval_secs,
            max_attempts = self.max_attempts,
            "Order notification retry worker started"
        );

        loop {
            ticker.tick().await;

            match self.retry_pending().await {
                Ok(count) => {
                    if count > 0 {
                        info!(delivered = count, "Replayed order notifications");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to replay order notifications");
                }
            }
        }
    }

    async fn retry_pending(&self) -> anyhow::Result<usize> {
        let pending = self.notifications.get_pending(self.batch_size).await?;
        let mut delivered = 0;

        for notification in pending {
            if notification.attempts >= self.max_attempts {
                warn!(
                    notification_id = %notification.id,
                    order_id = notification.order_id,
                    attempts = notification.attempts,
                    "Abandoning order notification after exhausted attempts"
                );
                self.notifications.mark_abandoned(notification.id).await?;
                continue;
            }

            match self
                .notifier
                .deliver_once(notification.order_id, &notification.payment_status)
                .await
            {
                Ok(()) => {
                    self.notifications.mark_delivered(notification.id).await?;
                    delivered += 1;
                }
                Err(e) => {
                    warn!(
                        notification_id = %notification.id,
                        order_id = notification.order_id,
                        error = %e,
                        "Order notification replay failed"
                    );
                    self.notifications
                        .record_failure(notification.id, &e.to_string())
                        .await?;
                }
            }
        }

        Ok(delivered)
    }
}
