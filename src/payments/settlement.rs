use crate::config::SettlementConfig;
use crate::payments::error::{ProviderError, ProviderResult};
use crate::payments::types::{IntervalUnit, Metadata, PaymentKind, PaymentRequest};
use crate::payments::utils::{idempotency_key, PaymentHttpClient};
use crate::payments::validation::to_minor_units;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

const PROVIDER: &str = "settlement";

/// Body sent to the settlement backend: `{token | order_id, request}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettlementRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub kind: PaymentKind,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_unit: Option<IntervalUnit>,
    pub metadata: Metadata,
}

impl SettlementRequest {
    fn from_request(request: &PaymentRequest) -> ProviderResult<Self> {
        let amount_minor = to_minor_units(request.amount(), request.currency()).ok_or_else(|| {
            ProviderError::validation(
                format!("amount {} is out of range", request.amount()),
                Some("amount"),
            )
        })?;
        Ok(Self {
            token: None,
            order_id: None,
            amount_minor,
            currency: request.currency().to_string(),
            kind: request.kind(),
            description: request.description().to_string(),
            interval_unit: request.interval_unit(),
            metadata: request.metadata().clone(),
        })
    }

    pub fn with_token(token: &str, request: &PaymentRequest) -> ProviderResult<Self> {
        Ok(Self {
            token: Some(token.to_string()),
            ..Self::from_request(request)?
        })
    }

    pub fn with_order(order_id: &str, request: &PaymentRequest) -> ProviderResult<Self> {
        Ok(Self {
            order_id: Some(order_id.to_string()),
            ..Self::from_request(request)?
        })
    }
}

/// `{success, id}` or `{success: false, reason}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettlementResponse {
    pub success: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl SettlementResponse {
    pub fn approved(id: impl Into<String>) -> Self {
        Self {
            success: true,
            id: Some(id.into()),
            reason: None,
            code: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            reason: Some(reason.into()),
            code: None,
        }
    }

    /// Interprets the envelope: the settled id, or the classified rejection.
    pub fn into_settled_id(self) -> ProviderResult<String> {
        if !self.success {
            let reason = self.reason.unwrap_or_else(|| "unspecified".to_string());
            return Err(classify_rejection(reason, self.code));
        }
        self.id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ProviderError::unrecognized(PROVIDER, "success response without id"))
    }
}

/// Splits backend rejections into transient outages and real declines.
pub fn classify_rejection(reason: String, code: Option<String>) -> ProviderError {
    let lowered = reason.to_lowercase();
    if lowered.contains("unavailable")
        || lowered.contains("timeout")
        || lowered.contains("rate_limit")
        || lowered.contains("try_again")
        || lowered.contains("processing_error")
    {
        return ProviderError::Unavailable {
            message: reason,
            status: None,
        };
    }
    ProviderError::Declined {
        reason,
        provider_code: code,
    }
}

/// The external settlement service. Only the request/response contract
/// is modelled here.
#[async_trait]
pub trait SettlementBackend: Send + Sync {
    async fn charge(&self, request: &SettlementRequest) -> ProviderResult<SettlementResponse>;

    /// Creates a recurring plan in the same call; there is no activate step.
    async fn subscribe(&self, request: &SettlementRequest) -> ProviderResult<SettlementResponse>;

    async fn capture(&self, request: &SettlementRequest) -> ProviderResult<SettlementResponse>;
}

pub struct HttpSettlementBackend {
    config: SettlementConfig,
    http: PaymentHttpClient,
}

impl HttpSettlementBackend {
    pub fn new(config: SettlementConfig) -> ProviderResult<Self> {
        let http = PaymentHttpClient::new(
            PROVIDER,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post(
        &self,
        operation: &str,
        path: &str,
        request: &SettlementRequest,
    ) -> ProviderResult<SettlementResponse> {
        let payload = serde_json::to_value(request).map_err(|e| {
            ProviderError::validation(format!("unserializable request: {}", e), None)
        })?;
        let reference = request
            .token
            .as_deref()
            .or(request.order_id.as_deref())
            .unwrap_or_default();
        let key = idempotency_key(&[
            operation,
            reference,
            &request.amount_minor.to_string(),
            &request.currency,
        ]);

        let response: SettlementResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint(path),
                self.config.api_key.as_deref(),
                Some(&payload),
                &[("Idempotency-Key", key.as_str())],
            )
            .await?;
        info!(
            operation,
            success = response.success,
            currency = %request.currency,
            amount_minor = request.amount_minor,
            "settlement backend responded"
        );
        Ok(response)
    }
}

#[async_trait]
impl SettlementBackend for HttpSettlementBackend {
    async fn charge(&self, request: &SettlementRequest) -> ProviderResult<SettlementResponse> {
        self.post("charge", "/charges", request).await
    }

    async fn subscribe(&self, request: &SettlementRequest) -> ProviderResult<SettlementResponse> {
        self.post("subscribe", "/subscriptions", request).await
    }

    async fn capture(&self, request: &SettlementRequest) -> ProviderResult<SettlementResponse> {
        let order_id = request.order_id.as_deref().ok_or_else(|| {
            ProviderError::validation("capture requires an order id", Some("order_id"))
        })?;
        self.post("capture", &format!("/orders/{}/capture", order_id), request)
            .await
    }
}
