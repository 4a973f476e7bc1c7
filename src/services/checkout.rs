//! Per-caller checkouts
//!
//! Every browser checkout gets its own orchestrator and card-token slot, so
//! a payer left on the wallet approval screen never blocks anyone else and
//! a card token only ever reaches the submission it arrived with.

use crate::payments::error::{ErrorKind, ProviderResult};
use crate::payments::factory::PaymentProviderFactory;
use crate::payments::normalizer::ResultNormalizer;
use crate::payments::provider::PaymentProvider;
use crate::payments::tokenizer::{CardToken, TokenSlot};
use crate::payments::types::{PaymentMethod, PaymentRequest, PaymentResult, PaymentSession};
use crate::services::PaymentOrchestrator;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as TurnLock;
use tracing::{debug, info};

/// Empties the slot when the submission ends, including when the caller
/// drops the future.
struct MountedToken<'a>(&'a TokenSlot);

impl Drop for MountedToken<'_> {
    fn drop(&mut self) {
        self.0.unmount();
    }
}

pub struct Checkout {
    orchestrator: PaymentOrchestrator,
    card_slot: Arc<TokenSlot>,
    turn: TurnLock<()>,
}

impl Checkout {
    pub fn new(providers: Vec<Arc<dyn PaymentProvider>>, card_slot: Arc<TokenSlot>) -> Self {
        Self {
            orchestrator: PaymentOrchestrator::new(providers),
            card_slot,
            turn: TurnLock::new(()),
        }
    }

    /// Mounts `card_token` for this submission only and drives it through
    /// the orchestrator. A concurrent submission on the same checkout is
    /// refused before its token touches the slot.
    pub async fn submit(
        &self,
        request: PaymentRequest,
        method: PaymentMethod,
        card_token: Option<CardToken>,
    ) -> PaymentResult {
        let Ok(_turn) = self.turn.try_lock() else {
            return ResultNormalizer::new().reject(
                ErrorKind::AlreadyInFlight,
                "checkout already has a submission running",
            );
        };

        let _mounted = MountedToken(&self.card_slot);
        if let (PaymentMethod::CardProcessor, Some(token)) = (method, card_token) {
            self.card_slot.mount(token);
        }
        self.orchestrator.submit(request, method).await
    }

    pub fn is_busy(&self) -> bool {
        self.orchestrator.is_busy()
    }

    pub fn current_session(&self) -> Option<PaymentSession> {
        self.orchestrator.current_session()
    }

    pub fn cancel(&self) -> bool {
        self.orchestrator.cancel()
    }

    /// Whether the in-flight session created the provider order or
    /// subscription `provider_id`.
    pub fn owns_provider_id(&self, provider_id: &str) -> bool {
        self.current_session().is_some_and(|session| {
            session.provider_order_id.as_deref() == Some(provider_id)
                || session.provider_subscription_id.as_deref() == Some(provider_id)
        })
    }
}

/// Checkouts keyed by the caller-chosen checkout id.
pub struct CheckoutRegistry {
    factory: PaymentProviderFactory,
    checkouts: Mutex<HashMap<String, Arc<Checkout>>>,
}

impl CheckoutRegistry {
    pub fn new(factory: PaymentProviderFactory) -> Self {
        Self {
            factory,
            checkouts: Mutex::new(HashMap::new()),
        }
    }

    pub fn available_methods(&self) -> Vec<PaymentMethod> {
        let mut methods = self.factory.list_available_methods();
        methods.sort_by_key(|m| m.as_str());
        methods
    }

    pub fn get(&self, checkout_id: &str) -> Option<Arc<Checkout>> {
        self.checkouts.lock().get(checkout_id).cloned()
    }

    /// Returns the checkout for `checkout_id`, creating it on first use.
    pub fn open(&self, checkout_id: &str) -> ProviderResult<Arc<Checkout>> {
        let mut checkouts = self.checkouts.lock();
        if let Some(checkout) = checkouts.get(checkout_id) {
            return Ok(checkout.clone());
        }

        // Only the map holds these, so no submission is running on them.
        let before = checkouts.len();
        checkouts.retain(|_, checkout| Arc::strong_count(checkout) > 1);
        if checkouts.len() < before {
            debug!(released = before - checkouts.len(), "released idle checkouts");
        }

        let card_slot = Arc::new(TokenSlot::new());
        let checkout = Arc::new(Checkout::new(
            self.factory.build_all(card_slot.clone())?,
            card_slot,
        ));
        checkouts.insert(checkout_id.to_string(), checkout.clone());
        info!(checkout_id = %checkout_id, "checkout opened");
        Ok(checkout)
    }

    /// Number of checkouts with a session in flight.
    pub fn in_flight(&self) -> usize {
        self.checkouts
            .lock()
            .values()
            .filter(|checkout| checkout.is_busy())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::provider::{OutcomeReporter, ProviderSuccess};
    use crate::payments::tokenizer::CardWidget;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    /// Records whether a token was mounted when it ran, then waits.
    struct SlotPeek {
        slot: Arc<TokenSlot>,
        saw_token: AtomicBool,
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl PaymentProvider for SlotPeek {
        fn method(&self) -> PaymentMethod {
            PaymentMethod::CardProcessor
        }

        fn name(&self) -> &'static str {
            "slot-peek"
        }

        async fn execute(&self, _request: &PaymentRequest, reporter: OutcomeReporter) {
            self.saw_token
                .store(self.slot.is_mounted(), Ordering::SeqCst);
            self.started.notify_one();
            self.release.notified().await;
            reporter.finish(Ok(ProviderSuccess::Charged {
                transaction_id: "txn_1".to_string(),
            }));
        }
    }

    fn peek_checkout() -> (Arc<Checkout>, Arc<SlotPeek>, Arc<TokenSlot>) {
        let slot = Arc::new(TokenSlot::new());
        let peek = Arc::new(SlotPeek {
            slot: slot.clone(),
            saw_token: AtomicBool::new(false),
            started: Notify::new(),
            release: Notify::new(),
        });
        let checkout = Arc::new(Checkout::new(
            vec![peek.clone() as Arc<dyn PaymentProvider>],
            slot.clone(),
        ));
        (checkout, peek, slot)
    }

    fn request() -> PaymentRequest {
        PaymentRequest::one_time(Decimal::from(8), "USD", "Zine").expect("request")
    }

    #[tokio::test]
    async fn refused_submission_never_mounts_its_token() {
        let (checkout, peek, slot) = peek_checkout();
        let first = tokio::spawn({
            let checkout = checkout.clone();
            async move {
                checkout
                    .submit(request(), PaymentMethod::CardProcessor, Some(CardToken::new("tok_a")))
                    .await
            }
        });
        peek.started.notified().await;
        assert!(peek.saw_token.load(Ordering::SeqCst));

        let second = checkout
            .submit(request(), PaymentMethod::CardProcessor, Some(CardToken::new("tok_b")))
            .await;
        assert_eq!(second.error_kind(), Some(ErrorKind::AlreadyInFlight));
        // tok_a was left in place for the adapter, tok_b never arrived.
        assert_eq!(
            slot.create_token().await.map(|t| t.as_str().to_string()).ok(),
            Some("tok_a".to_string())
        );

        peek.release.notify_one();
        assert!(first.await.expect("task joins").is_success());
    }

    #[tokio::test]
    async fn unused_token_is_cleared_when_the_turn_ends() {
        let (checkout, peek, slot) = peek_checkout();
        let pending = tokio::spawn({
            let checkout = checkout.clone();
            async move {
                checkout
                    .submit(request(), PaymentMethod::CardProcessor, Some(CardToken::new("tok_a")))
                    .await
            }
        });
        peek.started.notified().await;
        assert!(slot.is_mounted());

        peek.release.notify_one();
        assert!(pending.await.expect("task joins").is_success());
        assert!(!slot.is_mounted());
    }

    #[tokio::test]
    async fn wallet_submission_ignores_card_token() {
        let (checkout, _peek, slot) = peek_checkout();
        let result = checkout
            .submit(request(), PaymentMethod::WalletProcessor, Some(CardToken::new("tok_a")))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::ClientNotReady));
        assert!(!slot.is_mounted());
    }
}
