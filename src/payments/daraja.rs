//! Daraja API client with cached OAuth tokens

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::types::{
    AuthResponse, StkPushRequest, StkPushResponse, StkQueryRequest, StkQueryResponse,
};
use crate::config::MpesaConfig;
use crate::error::PaymentError;

/// Parameters for an STK push initiation
#[derive(Debug, Clone)]
pub struct PushParams {
    pub amount: u64,
    pub phone_number: String,
    pub account_reference: String,
    pub description: String,
}

/// Provider seam used by the initiation and verification services
#[async_trait]
pub trait MpesaGateway: Send + Sync {
    async fn stk_push(&self, params: PushParams) -> Result<StkPushResponse, PaymentError>;

    async fn stk_query(&self, checkout_request_id: &str)
        -> Result<StkQueryResponse, PaymentError>;
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// HTTP client for the Daraja API
pub struct DarajaClient {
    config: MpesaConfig,
    http: Client,
    token: Mutex<Option<CachedToken>>,
}

impl DarajaClient {
    pub fn new(config: MpesaConfig) -> Result<Self, PaymentError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .map_err(|e| PaymentError::Provider {
                message: format!("Failed to build HTTP client: {}", e),
                response_code: None,
                retryable: false,
            })?;

        Ok(Self {
            config,
            http,
            token: Mutex::new(None),
        })
    }

    fn timestamp() -> String {
        Utc::now().format("%Y%m%d%H%M%S").to_string()
    }

    fn password(&self, timestamp: &str) -> String {
        BASE64.encode(format!(
            "{}{}{}",
            self.config.short_code, self.config.passkey, timestamp
        ))
    }

    /// Fetch or reuse the OAuth access token.
    ///
    /// The lock is held across the refresh so concurrent callers share
    /// one upstream request instead of racing.
    async fn get_token(&self) -> Result<String, PaymentError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.token.clone());
            }
        }

        debug!("Refreshing Daraja access token");

        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url
        );

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await
            .map_err(|e| PaymentError::Auth {
                message: format!("Token request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(PaymentError::Auth {
                message: format!("Token request rejected with status {}", response.status()),
            });
        }

        let auth: AuthResponse = response.json().await.map_err(|e| PaymentError::Auth {
            message: format!("Invalid token response: {}", e),
        })?;

        let expires_in: u64 = auth.expires_in.parse().unwrap_or(3600);
        let lifetime = expires_in.saturating_sub(self.config.token_refresh_margin);

        let token = auth.access_token.clone();
        *cached = Some(CachedToken {
            token: auth.access_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });

        info!(expires_in, "Daraja access token refreshed");
        Ok(token)
    }

    fn request_error(action: &str, e: reqwest::Error) -> PaymentError {
        PaymentError::Provider {
            message: format!("{} request failed: {}", action, e),
            response_code: None,
            retryable: e.is_timeout() || e.is_connect(),
        }
    }
}

#[async_trait]
impl MpesaGateway for DarajaClient {
    async fn stk_push(&self, params: PushParams) -> Result<StkPushResponse, PaymentError> {
        let token = self.get_token().await?;
        let timestamp = Self::timestamp();

        let request = StkPushRequest {
            business_short_code: self.config.short_code.clone(),
            password: self.password(&timestamp),
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount: params.amount,
            party_a: params.phone_number.clone(),
            party_b: self.config.short_code.clone(),
            phone_number: params.phone_number,
            callback_url: self.config.callback_url.clone(),
            account_reference: params.account_reference,
            transaction_desc: params.description,
        };

        let url = format!("{}/mpesa/stkpush/v1/processrequest", self.config.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::request_error("STK push", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body, "STK push rejected");
            return Err(PaymentError::Provider {
                message: format!("STK push rejected with status {}", status),
                response_code: None,
                retryable: status.is_server_error(),
            });
        }

        let push: StkPushResponse =
            response.json().await.map_err(|e| PaymentError::Provider {
                message: format!("Invalid STK push response: {}", e),
                response_code: None,
                retryable: false,
            })?;

        if push.response_code != "0" {
            return Err(PaymentError::Provider {
                message: push.response_description.clone(),
                response_code: Some(push.response_code.clone()),
                retryable: false,
            });
        }

        Ok(push)
    }

    async fn stk_query(
        &self,
        checkout_request_id: &str,
    ) -> Result<StkQueryResponse, PaymentError> {
        let token = self.get_token().await?;
        let timestamp = Self::timestamp();

        let request = StkQueryRequest {
            business_short_code: self.config.short_code.clone(),
            password: self.password(&timestamp),
            timestamp,
            checkout_request_id: checkout_request_id.to_string(),
        };

        let url = format!("{}/mpesa/stkpushquery/v1/query", self.config.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::request_error("STK query", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body, "STK query rejected");
            return Err(PaymentError::Provider {
                message: format!("STK query rejected with status {}", status),
                response_code: None,
                retryable: status.is_server_error(),
            });
        }

        response.json().await.map_err(|e| PaymentError::Provider {
            message: format!("Invalid STK query response: {}", e),
            response_code: None,
            retryable: false,
        })
    }
}
