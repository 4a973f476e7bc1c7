use crate::payments::error::{ProviderError, ProviderResult};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::warn;

/// JSON client shared by the settlement backend and the wallet REST API.
///
/// 2xx bodies are decoded as `T`. Client errors (4xx other than 429) are
/// decoded as `T` too when the body has the expected shape, since backends
/// report declines with a 402 and a regular envelope. Rate limits, 5xx and
/// transport failures are retried with exponential backoff and end as
/// `ProviderError::Unavailable`.
#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    provider: &'static str,
    timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
}

impl PaymentHttpClient {
    pub fn new(provider: &'static str, timeout: Duration, max_retries: u32) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::ClientNotReady {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            provider,
            timeout,
            max_retries,
            backoff_base: Duration::from_millis(500),
        })
    }

    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * (1_u32 << attempt.min(6))
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
        additional_headers: &[(&str, &str)],
    ) -> ProviderResult<T> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let mut request = self.client.request(method.clone(), url).timeout(self.timeout);
            if let Some(token) = bearer_token {
                request = request.bearer_auth(token);
            }
            for (k, v) in additional_headers {
                request = request.header(*k, *v);
            }
            if let Some(payload) = body {
                request = request.json(payload);
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();

                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            ProviderError::unrecognized(
                                self.provider,
                                format!("invalid JSON response: {}: {}", e, text),
                            )
                        });
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        if attempt < self.max_retries {
                            warn!(
                                provider = self.provider,
                                status = %status,
                                attempt = attempt + 1,
                                "provider unavailable, retrying"
                            );
                            tokio::time::sleep(self.backoff(attempt)).await;
                            continue;
                        }
                        return Err(ProviderError::Unavailable {
                            message: format!("HTTP {}: {}", status, text),
                            status: Some(status.as_u16()),
                        });
                    }

                    // Declines arrive as 4xx with the regular envelope.
                    return serde_json::from_str::<T>(&text).map_err(|_| {
                        ProviderError::unrecognized(
                            self.provider,
                            format!("HTTP {}: {}", status, text),
                        )
                    });
                }
                Err(e) => {
                    last_error = Some(ProviderError::Unavailable {
                        message: format!("provider request failed: {}", e),
                        status: None,
                    });
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.backoff(attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(ProviderError::Unavailable {
            message: "provider request failed".to_string(),
            status: None,
        }))
    }

    /// Fetches `url` once and checks for a 2xx. Used to load vendor scripts.
    pub async fn check_reachable(&self, url: &str) -> ProviderResult<()> {
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable {
                message: format!("request to {} failed: {}", url, e),
                status: None,
            })?;
        if !resp.status().is_success() {
            return Err(ProviderError::Unavailable {
                message: format!("HTTP {} from {}", resp.status(), url),
                status: Some(resp.status().as_u16()),
            });
        }
        Ok(())
    }

    /// OAuth2 client-credentials exchange with basic auth.
    pub async fn client_credentials<T: DeserializeOwned>(
        &self,
        url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> ProviderResult<T> {
        let resp = self
            .client
            .post(url)
            .timeout(self.timeout)
            .basic_auth(client_id, Some(client_secret))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable {
                message: format!("token request failed: {}", e),
                status: None,
            })?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ProviderError::Unavailable {
                message: format!("token request returned HTTP {}: {}", status, text),
                status: Some(status.as_u16()),
            });
        }
        serde_json::from_str::<T>(&text).map_err(|e| {
            ProviderError::unrecognized(self.provider, format!("invalid token response: {}", e))
        })
    }
}

/// Stable key for one submission, sent as `Idempotency-Key`.
pub fn idempotency_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join(":").as_bytes());
    hex::encode(hasher.finalize())
}
