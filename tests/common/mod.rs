#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use quill_payments::payments::error::{ProviderError, ProviderResult};
use quill_payments::payments::providers::{CardChargeAdapter, RedirectApprovalAdapter};
use quill_payments::payments::sdk::{
    ApprovalCallbacks, ApprovalRegistry, OrderDraft, SdkLoader, WalletSdk, WalletSdkCache,
};
use quill_payments::payments::settlement::{
    SettlementBackend, SettlementRequest, SettlementResponse,
};
use quill_payments::payments::tokenizer::{CardToken, CardTokenizer, CardWidget, WidgetError};
use quill_payments::services::PaymentOrchestrator;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct MockWidget {
    pub mounted: bool,
    pub token: String,
    pub tokens_created: AtomicUsize,
}

impl MockWidget {
    pub fn mounted(token: &str) -> Self {
        Self {
            mounted: true,
            token: token.to_string(),
            tokens_created: AtomicUsize::new(0),
        }
    }

    pub fn unmounted() -> Self {
        Self {
            mounted: false,
            ..Self::mounted("")
        }
    }
}

#[async_trait]
impl CardWidget for MockWidget {
    fn is_mounted(&self) -> bool {
        self.mounted
    }

    async fn create_token(&self) -> Result<CardToken, WidgetError> {
        self.tokens_created.fetch_add(1, Ordering::SeqCst);
        Ok(CardToken::new(self.token.clone()))
    }
}

/// Settlement backend with canned responses and call counters.
pub struct MockBackend {
    pub charge_response: ProviderResult<SettlementResponse>,
    pub subscribe_response: ProviderResult<SettlementResponse>,
    pub capture_response: ProviderResult<SettlementResponse>,
    pub charges: AtomicUsize,
    pub subscribes: AtomicUsize,
    pub captures: AtomicUsize,
    pub last_request: Mutex<Option<SettlementRequest>>,
}

impl MockBackend {
    pub fn approving() -> Self {
        Self {
            charge_response: Ok(SettlementResponse::approved("txn_123")),
            subscribe_response: Ok(SettlementResponse::approved("sub_123")),
            capture_response: Ok(SettlementResponse::approved("CAP-1")),
            charges: AtomicUsize::new(0),
            subscribes: AtomicUsize::new(0),
            captures: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn with_charge(mut self, response: ProviderResult<SettlementResponse>) -> Self {
        self.charge_response = response;
        self
    }

    pub fn with_capture(mut self, response: ProviderResult<SettlementResponse>) -> Self {
        self.capture_response = response;
        self
    }

    pub fn last_request(&self) -> Option<SettlementRequest> {
        self.last_request.lock().clone()
    }

    fn record(
        &self,
        counter: &AtomicUsize,
        request: &SettlementRequest,
        response: &ProviderResult<SettlementResponse>,
    ) -> ProviderResult<SettlementResponse> {
        counter.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        response.clone()
    }
}

#[async_trait]
impl SettlementBackend for MockBackend {
    async fn charge(&self, request: &SettlementRequest) -> ProviderResult<SettlementResponse> {
        self.record(&self.charges, request, &self.charge_response)
    }

    async fn subscribe(&self, request: &SettlementRequest) -> ProviderResult<SettlementResponse> {
        self.record(&self.subscribes, request, &self.subscribe_response)
    }

    async fn capture(&self, request: &SettlementRequest) -> ProviderResult<SettlementResponse> {
        self.record(&self.captures, request, &self.capture_response)
    }
}

/// Wallet SDK that hands its rendered callbacks to the test.
pub struct MockSdk {
    pub order_id: String,
    pub subscription_id: String,
    pub orders: AtomicUsize,
    pub subscriptions: AtomicUsize,
    pub plans: Mutex<Vec<String>>,
    callbacks: Mutex<Option<ApprovalCallbacks>>,
    rendered: Notify,
    registry: Option<ApprovalRegistry>,
}

impl MockSdk {
    pub fn new(order_id: &str, subscription_id: &str) -> Self {
        Self {
            order_id: order_id.to_string(),
            subscription_id: subscription_id.to_string(),
            orders: AtomicUsize::new(0),
            subscriptions: AtomicUsize::new(0),
            plans: Mutex::new(Vec::new()),
            callbacks: Mutex::new(None),
            rendered: Notify::new(),
            registry: None,
        }
    }

    /// Also routes rendered callbacks through `registry`, the way the HTTP
    /// SDK does.
    pub fn with_registry(mut self, registry: ApprovalRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Waits until the approval buttons are shown, then returns their hooks.
    pub async fn rendered_callbacks(&self) -> ApprovalCallbacks {
        tokio::time::timeout(WAIT, self.rendered.notified())
            .await
            .expect("approval widget rendered");
        self.callbacks
            .lock()
            .clone()
            .expect("callbacks stored on render")
    }
}

#[async_trait]
impl WalletSdk for MockSdk {
    async fn create_order(&self, _order: &OrderDraft) -> ProviderResult<String> {
        self.orders.fetch_add(1, Ordering::SeqCst);
        Ok(self.order_id.clone())
    }

    async fn create_subscription(&self, plan_id: &str) -> ProviderResult<String> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        self.plans.lock().push(plan_id.to_string());
        Ok(self.subscription_id.clone())
    }

    fn render_buttons(&self, _provider_id: &str, callbacks: ApprovalCallbacks) {
        if let Some(registry) = &self.registry {
            registry.register(callbacks.clone());
        }
        *self.callbacks.lock() = Some(callbacks);
        self.rendered.notify_one();
    }
}

pub struct MockLoader {
    pub sdk: Option<Arc<MockSdk>>,
    pub loads: AtomicUsize,
}

impl MockLoader {
    pub fn serving(sdk: Arc<MockSdk>) -> Self {
        Self {
            sdk: Some(sdk),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            sdk: None,
            loads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SdkLoader for MockLoader {
    async fn load(&self) -> ProviderResult<Arc<dyn WalletSdk>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match &self.sdk {
            Some(sdk) => Ok(sdk.clone()),
            None => Err(ProviderError::SdkLoad {
                message: "script request failed: net::ERR_BLOCKED_BY_CLIENT".to_string(),
            }),
        }
    }
}

pub fn card_orchestrator(
    widget: Arc<MockWidget>,
    backend: Arc<MockBackend>,
) -> PaymentOrchestrator {
    PaymentOrchestrator::new(vec![Arc::new(CardChargeAdapter::new(
        CardTokenizer::new(widget),
        backend,
    ))])
}

pub fn wallet_orchestrator(
    loader: Arc<MockLoader>,
    backend: Arc<MockBackend>,
    plan_id: Option<&str>,
) -> PaymentOrchestrator {
    PaymentOrchestrator::new(vec![Arc::new(RedirectApprovalAdapter::new(
        Arc::new(WalletSdkCache::new(loader)),
        backend,
        plan_id.map(str::to_string),
    ))])
}

/// Polls until the in-flight session reports `step`; progress events are
/// applied asynchronously.
pub async fn wait_for_step(
    orchestrator: &PaymentOrchestrator,
    step: quill_payments::payments::types::ProcessingStep,
) -> quill_payments::payments::types::PaymentSession {
    tokio::time::timeout(WAIT, async {
        loop {
            if let Some(session) = orchestrator.current_session() {
                if session.step == Some(step) {
                    return session;
                }
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("session reached step")
}
