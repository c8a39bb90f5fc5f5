//! Object storage client.
//!
//! Contract: `put` stores a blob and returns its durable URL, `delete`
//! removes it by key. Consumed through a trait object so registration
//! step 4 can be tested without a storage backend.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::config::StorageConfig;
use crate::error::ApiError;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, bytes: &[u8], content_type: &str, key: &str) -> Result<String, ApiError>;
    async fn delete(&self, key: &str) -> Result<(), ApiError>;
}

/// S3-compatible HTTP storage: PUT/DELETE against
/// `{endpoint}/{bucket}/{key}` with API-key auth.
#[derive(Clone)]
pub struct HttpObjectStorage {
    client: Client,
    config: StorageConfig,
}

impl HttpObjectStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build storage http client"),
            config,
        }
    }

    fn endpoint(&self) -> Result<&str, ApiError> {
        self.config.endpoint.as_deref().ok_or_else(|| {
            ApiError::ServiceUnavailable(
                "Object storage is not configured. Please contact administrator.".to_string(),
            )
        })
    }

    fn object_url(&self, base: &str, key: &str) -> String {
        format!("{}/{}/{}", base.trim_end_matches('/'), self.config.bucket, key)
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn put(&self, bytes: &[u8], content_type: &str, key: &str) -> Result<String, ApiError> {
        let endpoint = self.endpoint()?.to_string();
        let url = self.object_url(&endpoint, key);

        let mut request = self
            .client
            .put(&url)
            .header("content-type", content_type)
            .body(bytes.to_vec());
        if let Some(api_key) = &self.config.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ApiError::upstream(
                response.status().as_u16(),
                format!("storage upload failed for {key}"),
            ));
        }

        // Serve from the public URL when one is configured
        let public_base = self.config.public_url.clone().unwrap_or(endpoint);
        Ok(self.object_url(&public_base, key))
    }

    async fn delete(&self, key: &str) -> Result<(), ApiError> {
        let endpoint = self.endpoint()?.to_string();
        let url = self.object_url(&endpoint, key);

        let mut request = self.client.delete(&url);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ApiError::upstream(
                response.status().as_u16(),
                format!("storage delete failed for {key}"),
            ));
        }
        Ok(())
    }
}

/// Sanitize a filename into a storage key component.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store for tests.
    #[derive(Default)]
    pub struct MemoryStorage {
        pub objects: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl ObjectStorage for MemoryStorage {
        async fn put(
            &self,
            bytes: &[u8],
            _content_type: &str,
            key: &str,
        ) -> Result<String, ApiError> {
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), bytes.to_vec());
            Ok(format!("memory://{key}"))
        }

        async fn delete(&self, key: &str) -> Result<(), ApiError> {
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_safe_chars() {
        assert_eq!(sanitize_filename("license-2024.pdf"), "license-2024.pdf");
        assert_eq!(sanitize_filename("my photo (1).png"), "my_photo__1_.png");
    }
}
