//! Payment Orchestrator Service
//!
//! Owns the submission lifecycle: routes a request to the adapter for the
//! chosen method, tracks the session through `Idle -> Processing ->
//! Succeeded | Failed`, and returns exactly one normalized result per
//! `submit`. At most one session is in flight per orchestrator; a second
//! `submit` is refused immediately instead of being queued. The server
//! keeps one orchestrator per checkout (see `services::checkout`).

use crate::payments::error::{ErrorKind, ProviderError};
use crate::payments::normalizer::ResultNormalizer;
use crate::payments::provider::{OutcomeReporter, PaymentProvider, RawOutcome};
use crate::payments::types::{
    PaymentMethod, PaymentRequest, PaymentResult, PaymentSession, SessionEvent,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct InFlight {
    session: PaymentSession,
    cancel: watch::Sender<bool>,
}

/// Clears the in-flight slot when `submit` ends, including when the caller
/// drops the `submit` future midway.
struct SlotGuard<'a> {
    slot: &'a Mutex<Option<InFlight>>,
    session_id: Uuid,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot
            .as_ref()
            .is_some_and(|current| current.session.id == self.session_id)
        {
            slot.take();
        }
    }
}

/// Resolves once `cancel` flips to true. Never resolves if the sender is gone.
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct PaymentOrchestrator {
    providers: HashMap<PaymentMethod, Arc<dyn PaymentProvider>>,
    normalizer: ResultNormalizer,
    in_flight: Mutex<Option<InFlight>>,
}

impl PaymentOrchestrator {
    pub fn new(providers: Vec<Arc<dyn PaymentProvider>>) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.method(), p)).collect(),
            normalizer: ResultNormalizer::new(),
            in_flight: Mutex::new(None),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Snapshot of the session currently `Processing`, if any.
    pub fn current_session(&self) -> Option<PaymentSession> {
        self.in_flight
            .lock()
            .as_ref()
            .map(|current| current.session.clone())
    }

    /// Resolves the in-flight session as `UserCancelled`. Returns whether
    /// there was one to cancel.
    pub fn cancel(&self) -> bool {
        match self.in_flight.lock().as_ref() {
            Some(current) => {
                info!(session_id = %current.session.id, "cancellation requested");
                let _ = current.cancel.send(true);
                true
            }
            None => false,
        }
    }

    /// Drives `request` through the adapter for `method`. Never panics or
    /// errors: every path ends in a `PaymentResult`.
    pub async fn submit(&self, request: PaymentRequest, method: PaymentMethod) -> PaymentResult {
        let (session_id, cancel_rx, provider) = {
            let mut slot = self.in_flight.lock();
            if let Some(current) = slot.as_ref() {
                return self.normalizer.reject(
                    ErrorKind::AlreadyInFlight,
                    &format!("session {} is still processing", current.session.id),
                );
            }

            if let Err(e) = request.validate() {
                return self.normalizer.reject(ErrorKind::ValidationFailed, &e.to_string());
            }

            let Some(provider) = self.providers.get(&method).cloned() else {
                return self.normalizer.reject(
                    ErrorKind::ClientNotReady,
                    &format!("no adapter registered for {}", method),
                );
            };

            let mut session = PaymentSession::new(request.clone(), method);
            if let Err(e) = session.begin() {
                return self.normalizer.reject(ErrorKind::Unknown, &e.to_string());
            }
            let (cancel_tx, cancel_rx) = watch::channel(false);
            let session_id = session.id;
            info!(
                session_id = %session_id,
                method = %method,
                provider = provider.name(),
                amount = %request.amount(),
                currency = %request.currency(),
                "payment session started"
            );
            *slot = Some(InFlight {
                session,
                cancel: cancel_tx,
            });
            (session_id, cancel_rx, provider)
        };
        let _guard = SlotGuard {
            slot: &self.in_flight,
            session_id,
        };

        let raw = self
            .drive(session_id, provider.as_ref(), &request, cancel_rx)
            .await;
        let result = self.normalizer.normalize(&request, raw);

        if let Some(current) = self.in_flight.lock().as_mut() {
            if current.session.id == session_id {
                if let Err(e) = current.session.resolve(result.clone()) {
                    warn!(session_id = %session_id, error = %e, "session already resolved");
                }
                info!(
                    session_id = %session_id,
                    state = %current.session.state,
                    "payment session finished"
                );
            }
        }
        result
    }

    async fn drive(
        &self,
        session_id: Uuid,
        provider: &dyn PaymentProvider,
        request: &PaymentRequest,
        cancel_rx: watch::Receiver<bool>,
    ) -> RawOutcome {
        let (reporter, mut receivers) = OutcomeReporter::channel();
        let run = provider.execute(request, reporter);
        tokio::pin!(run);
        let cancel = cancelled(cancel_rx);
        tokio::pin!(cancel);

        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => {
                    // Dropping `run` abandons the adapter at its current
                    // step; nothing after this point reaches the provider.
                    info!(session_id = %session_id, "session cancelled by caller");
                    return Err(ProviderError::Cancelled);
                }
                Some(event) = receivers.events.recv() => {
                    self.apply_event(session_id, event);
                }
                _ = &mut run => {
                    while let Ok(event) = receivers.events.try_recv() {
                        self.apply_event(session_id, event);
                    }
                    return receivers.outcome.try_recv().unwrap_or_else(|_| {
                        Err(ProviderError::unrecognized(
                            provider.name(),
                            "adapter finished without reporting an outcome",
                        ))
                    });
                }
            }
        }
    }

    fn apply_event(&self, session_id: Uuid, event: SessionEvent) {
        let mut slot = self.in_flight.lock();
        match slot.as_mut() {
            Some(current) if current.session.id == session_id => {
                debug!(session_id = %session_id, event = ?event, "session progress");
                current.session.apply(event);
            }
            _ => debug!(session_id = %session_id, "dropping progress for finished session"),
        }
    }
}
