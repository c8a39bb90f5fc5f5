//! ZenoPay gateway client.
//!
//! Two calls: mobile-money initiation and order-status lookup, both
//! authenticated with the `x-api-key` header. Non-success responses
//! surface as `ApiError::Upstream` carrying the gateway's status.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::PaymentConfig;
use crate::error::ApiError;
use crate::models::payment::{GatewayInitiateRequest, OrderStatusResponse, PaymentAck};

#[derive(Clone)]
pub struct ZenoClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    #[serde(default)]
    message: Option<String>,
}

impl ZenoClient {
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build gateway http client"),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str, ApiError> {
        self.api_key.as_deref().ok_or_else(|| {
            ApiError::ServiceUnavailable(
                "Payment service is not configured. Please contact administrator.".to_string(),
            )
        })
    }

    pub async fn initiate(&self, request: &GatewayInitiateRequest) -> Result<PaymentAck, ApiError> {
        let api_key = self.api_key()?;
        let url = format!("{}/payments/mobile_money_tanzania", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .json::<GatewayError>()
                .await
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| "Payment initiation failed".to_string());
            tracing::error!(order_id = %request.order_id, status, %message, "gateway rejected initiation");
            return Err(ApiError::upstream(status, message));
        }

        Ok(response.json::<PaymentAck>().await?)
    }

    pub async fn order_status(&self, order_id: &str) -> Result<OrderStatusResponse, ApiError> {
        let api_key = self.api_key()?;
        let url = format!("{}/payments/order-status", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("x-api-key", api_key)
            .query(&[("order_id", order_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .json::<GatewayError>()
                .await
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| "Failed to fetch order status".to_string());
            tracing::error!(order_id, status, %message, "gateway status query failed");
            return Err(ApiError::upstream(status, message));
        }

        Ok(response.json::<OrderStatusResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: Option<&str>) -> PaymentConfig {
        PaymentConfig {
            api_key: api_key.map(str::to_string),
            base_url: "https://zenoapi.com/".to_string(),
            webhook_url: None,
            sync_interval_minutes: 5,
        }
    }

    #[test]
    fn configured_only_with_api_key() {
        assert!(!ZenoClient::new(&config(None)).is_configured());
        assert!(ZenoClient::new(&config(Some("k"))).is_configured());
    }

    #[tokio::test]
    async fn unconfigured_client_fails_closed() {
        let client = ZenoClient::new(&config(None));
        let err = client.order_status("o-1").await.unwrap_err();
        assert_eq!(err.code(), "service_unavailable");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ZenoClient::new(&config(Some("k")));
        assert_eq!(client.base_url, "https://zenoapi.com");
    }
}
