//! Redirect-provider SDK boundary.
//!
//! The wallet processor's SDK is loaded once per process and cached. The
//! approval step is driven by callbacks the SDK fires from its embedded
//! widget; [`ApprovalCallbacks`] turns those into a single event the adapter
//! awaits, and every callback after the first is a no-op.

use crate::config::WalletSdkConfig;
use crate::payments::error::{ProviderError, ProviderResult};
use crate::payments::types::PaymentRequest;
use crate::payments::utils::PaymentHttpClient;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, info, warn};
use uuid::Uuid;

const PROVIDER: &str = "wallet";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalEvent {
    Approved { provider_id: String },
    Cancelled,
    Failed { message: String },
}

/// Callback hooks handed to the SDK's button renderer.
#[derive(Clone)]
pub struct ApprovalCallbacks {
    provider_id: String,
    tx: mpsc::UnboundedSender<ApprovalEvent>,
}

/// Adapter side of [`ApprovalCallbacks`]; yields the first decision only.
pub struct ApprovalListener {
    rx: mpsc::UnboundedReceiver<ApprovalEvent>,
}

impl ApprovalCallbacks {
    pub fn pair(provider_id: &str) -> (Self, ApprovalListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                provider_id: provider_id.to_string(),
                tx,
            },
            ApprovalListener { rx },
        )
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn deliver(&self, event: ApprovalEvent) -> bool {
        let accepted = self.tx.send(event).is_ok();
        if !accepted {
            debug!(provider_id = %self.provider_id, "ignoring late approval callback");
        }
        accepted
    }

    pub fn on_approve(&self, provider_id: &str) -> bool {
        self.deliver(ApprovalEvent::Approved {
            provider_id: provider_id.to_string(),
        })
    }

    pub fn on_cancel(&self) -> bool {
        self.deliver(ApprovalEvent::Cancelled)
    }

    pub fn on_error(&self, message: &str) -> bool {
        self.deliver(ApprovalEvent::Failed {
            message: message.to_string(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl ApprovalListener {
    /// Waits, without a deadline, for the first callback. Consuming `self`
    /// closes the channel so any later callback is refused. A widget that
    /// drops every callback without deciding counts as abandoned.
    pub async fn wait(mut self) -> ApprovalEvent {
        let event = self.rx.recv().await.unwrap_or(ApprovalEvent::Cancelled);
        self.rx.close();
        event
    }
}

/// Order payload for the create step.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub amount: String,
    pub currency: String,
    pub description: String,
}

impl From<&PaymentRequest> for OrderDraft {
    fn from(request: &PaymentRequest) -> Self {
        Self {
            amount: request.amount().to_string(),
            currency: request.currency().to_string(),
            description: request.description().to_string(),
        }
    }
}

/// A loaded wallet SDK instance.
#[async_trait]
pub trait WalletSdk: Send + Sync {
    async fn create_order(&self, order: &OrderDraft) -> ProviderResult<String>;

    async fn create_subscription(&self, plan_id: &str) -> ProviderResult<String>;

    /// Shows the approval buttons for `provider_id` and keeps `callbacks`
    /// until the user decides. The adapter does not control this step.
    fn render_buttons(&self, provider_id: &str, callbacks: ApprovalCallbacks);
}

#[async_trait]
pub trait SdkLoader: Send + Sync {
    async fn load(&self) -> ProviderResult<Arc<dyn WalletSdk>>;
}

/// Init-once holder for the SDK. A failed load is not cached, so the next
/// submission retries it.
pub struct WalletSdkCache {
    loader: Arc<dyn SdkLoader>,
    cell: OnceCell<Arc<dyn WalletSdk>>,
}

impl WalletSdkCache {
    pub fn new(loader: Arc<dyn SdkLoader>) -> Self {
        Self {
            loader,
            cell: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get(&self) -> ProviderResult<Arc<dyn WalletSdk>> {
        self.cell
            .get_or_try_init(|| async {
                let sdk = self.loader.load().await.map_err(|e| match e {
                    ProviderError::SdkLoad { .. } => e,
                    other => ProviderError::SdkLoad {
                        message: other.to_string(),
                    },
                })?;
                info!("wallet SDK loaded");
                Ok::<_, ProviderError>(sdk)
            })
            .await
            .cloned()
    }
}

static SHARED_SDK: OnceLock<Arc<WalletSdkCache>> = OnceLock::new();

/// Process-wide cache. The loader of the first caller wins.
pub fn shared_sdk_cache(loader: Arc<dyn SdkLoader>) -> Arc<WalletSdkCache> {
    SHARED_SDK
        .get_or_init(|| Arc::new(WalletSdkCache::new(loader)))
        .clone()
}

/// Widget callbacks relayed from the browser, keyed by provider id.
#[derive(Clone, Default)]
pub struct ApprovalRegistry {
    pending: Arc<Mutex<HashMap<String, ApprovalCallbacks>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetCallback {
    Approve,
    Cancel,
    Error(String),
}

impl ApprovalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callbacks: ApprovalCallbacks) {
        let mut pending = self.pending.lock();
        pending.retain(|_, cb| !cb.is_closed());
        pending.insert(callbacks.provider_id().to_string(), callbacks);
    }

    pub fn is_pending(&self, provider_id: &str) -> bool {
        self.pending
            .lock()
            .get(provider_id)
            .is_some_and(|cb| !cb.is_closed())
    }

    /// Returns `false` when nobody is waiting on `provider_id` any more.
    pub fn deliver(&self, provider_id: &str, callback: WidgetCallback) -> bool {
        let Some(callbacks) = self.pending.lock().remove(provider_id) else {
            debug!(provider_id, "no pending approval for provider id");
            return false;
        };
        match callback {
            WidgetCallback::Approve => callbacks.on_approve(provider_id),
            WidgetCallback::Cancel => callbacks.on_cancel(),
            WidgetCallback::Error(message) => callbacks.on_error(&message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CreatedResource {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

/// REST-backed SDK. The approval widget runs in the browser, which relays
/// its callbacks to the [`ApprovalRegistry`].
pub struct HttpWalletSdk {
    config: WalletSdkConfig,
    http: PaymentHttpClient,
    access_token: String,
    registry: ApprovalRegistry,
}

/// Header the wallet REST API deduplicates creation calls on.
pub const REQUEST_ID_HEADER: &str = "PayPal-Request-Id";

impl HttpWalletSdk {
    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    /// POSTs a creation call. One request id per call, reused by every
    /// retry, so a retried timeout cannot open a second order.
    async fn create(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> ProviderResult<CreatedResource> {
        let request_id = Uuid::new_v4().to_string();
        self.http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint(path),
                Some(&self.access_token),
                Some(payload),
                &[(REQUEST_ID_HEADER, request_id.as_str())],
            )
            .await
    }
}

#[async_trait]
impl WalletSdk for HttpWalletSdk {
    async fn create_order(&self, order: &OrderDraft) -> ProviderResult<String> {
        let payload = serde_json::json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "description": order.description,
                "amount": {
                    "currency_code": order.currency,
                    "value": order.amount,
                }
            }]
        });
        let created = self.create("/v2/checkout/orders", &payload).await?;
        info!(order_id = %created.id, status = ?created.status, "wallet order created");
        Ok(created.id)
    }

    async fn create_subscription(&self, plan_id: &str) -> ProviderResult<String> {
        let payload = serde_json::json!({ "plan_id": plan_id });
        let created = self.create("/v1/billing/subscriptions", &payload).await?;
        info!(subscription_id = %created.id, status = ?created.status, "wallet subscription created");
        Ok(created.id)
    }

    fn render_buttons(&self, provider_id: &str, callbacks: ApprovalCallbacks) {
        debug!(provider_id, "awaiting approval from embedded widget");
        self.registry.register(callbacks);
    }
}

pub struct HttpSdkLoader {
    config: WalletSdkConfig,
    registry: ApprovalRegistry,
}

impl HttpSdkLoader {
    pub fn new(config: WalletSdkConfig, registry: ApprovalRegistry) -> Self {
        Self { config, registry }
    }
}

#[async_trait]
impl SdkLoader for HttpSdkLoader {
    async fn load(&self) -> ProviderResult<Arc<dyn WalletSdk>> {
        let http = PaymentHttpClient::new(
            PROVIDER,
            Duration::from_secs(self.config.timeout_secs),
            1,
        )?;

        let script_url = self.config.script_url();
        http.check_reachable(&script_url).await.map_err(|e| {
            warn!(error = %e, "wallet SDK script unreachable");
            ProviderError::SdkLoad {
                message: e.to_string(),
            }
        })?;

        let token: AccessToken = http
            .client_credentials(
                &format!(
                    "{}/v1/oauth2/token",
                    self.config.api_base_url.trim_end_matches('/')
                ),
                &self.config.client_id,
                &self.config.client_secret,
            )
            .await
            .map_err(|e| ProviderError::SdkLoad {
                message: e.to_string(),
            })?;

        Ok(Arc::new(HttpWalletSdk {
            config: self.config.clone(),
            http,
            access_token: token.access_token,
            registry: self.registry.clone(),
        }))
    }
}
