//! Notification dispatch (SMS/email).
//!
//! Ordinary delivery failures are reported through `DispatchOutcome`,
//! never as errors — callers decide whether a failed send matters.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::NotificationConfig;

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn sent(provider_message_id: Option<String>) -> Self {
        Self {
            success: true,
            provider_message_id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver `body` to `recipient` (email address or phone number).
    /// `subject` applies to email only.
    async fn send(&self, recipient: &str, subject: Option<&str>, body: &str) -> DispatchOutcome;
}

/// HTTP dispatcher: email addresses go to the email API, everything
/// else to the SMS gateway.
#[derive(Clone)]
pub struct HttpNotifier {
    client: Client,
    config: NotificationConfig,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    id: Option<String>,
}

impl HttpNotifier {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("failed to build notification http client"),
            config,
        }
    }

    async fn send_email(&self, to: &str, subject: Option<&str>, body: &str) -> DispatchOutcome {
        let Some(base_url) = &self.config.email_api_url else {
            return DispatchOutcome::failed("email API is not configured");
        };

        let mut request = self.client.post(format!("{base_url}/emails")).json(&json!({
            "from": self.config.email_from,
            "to": [to],
            "subject": subject.unwrap_or("Notification"),
            "text": body,
        }));
        if let Some(key) = &self.config.email_api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                let id = response
                    .json::<ProviderResponse>()
                    .await
                    .ok()
                    .and_then(|r| r.id);
                DispatchOutcome::sent(id)
            }
            Ok(response) => {
                DispatchOutcome::failed(format!("email provider returned {}", response.status()))
            }
            Err(err) => DispatchOutcome::failed(format!("email send failed: {err}")),
        }
    }

    async fn send_sms(&self, to: &str, body: &str) -> DispatchOutcome {
        let Some(api_url) = &self.config.sms_api_url else {
            return DispatchOutcome::failed("SMS gateway is not configured");
        };

        let mut request = self.client.post(api_url).json(&json!({
            "from": self.config.sms_sender_id,
            "to": to,
            "text": body,
        }));
        if let Some(key) = &self.config.sms_api_key {
            request = request.header("x-api-key", key);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                let id = response
                    .json::<ProviderResponse>()
                    .await
                    .ok()
                    .and_then(|r| r.id);
                DispatchOutcome::sent(id)
            }
            Ok(response) => {
                DispatchOutcome::failed(format!("SMS gateway returned {}", response.status()))
            }
            Err(err) => DispatchOutcome::failed(format!("SMS send failed: {err}")),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for HttpNotifier {
    async fn send(&self, recipient: &str, subject: Option<&str>, body: &str) -> DispatchOutcome {
        let outcome = if recipient.contains('@') {
            self.send_email(recipient, subject, body).await
        } else {
            self.send_sms(recipient, body).await
        };

        if !outcome.success {
            tracing::warn!(
                recipient,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "notification delivery failed"
            );
        }
        outcome
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every send instead of delivering; always succeeds.
    #[derive(Default)]
    pub struct RecordingDispatcher {
        pub sent: Mutex<Vec<(String, Option<String>, String)>>,
    }

    impl RecordingDispatcher {
        pub fn messages(&self) -> Vec<(String, Option<String>, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationDispatcher for RecordingDispatcher {
        async fn send(
            &self,
            recipient: &str,
            subject: Option<&str>,
            body: &str,
        ) -> DispatchOutcome {
            self.sent.lock().unwrap().push((
                recipient.to_string(),
                subject.map(str::to_string),
                body.to_string(),
            ));
            DispatchOutcome::sent(Some("recorded".to_string()))
        }
    }
}
