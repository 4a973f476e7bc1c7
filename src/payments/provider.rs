use crate::payments::error::ProviderResult;
use crate::payments::types::{PaymentMethod, PaymentRequest, ProcessingStep, SessionEvent};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// Provider-specific success before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderSuccess {
    Charged { transaction_id: String },
    Subscribed { subscription_id: String },
    Captured { order_id: String, capture_id: String },
}

pub type RawOutcome = ProviderResult<ProviderSuccess>;

/// One payment protocol behind a common contract. The orchestrator never
/// knows which provider it is driving beyond `method()`.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn method(&self) -> PaymentMethod;

    fn name(&self) -> &'static str;

    /// Runs the provider protocol for `request` and reports exactly one
    /// outcome through `reporter`. Dropping the returned future abandons
    /// the protocol at its current step.
    async fn execute(&self, request: &PaymentRequest, reporter: OutcomeReporter);
}

/// Narrow handle an adapter uses to report progress and its single outcome.
/// The session itself stays with the orchestrator.
pub struct OutcomeReporter {
    events: mpsc::UnboundedSender<SessionEvent>,
    outcome: oneshot::Sender<RawOutcome>,
}

/// Orchestrator side of an [`OutcomeReporter`].
pub struct ReporterReceivers {
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub outcome: oneshot::Receiver<RawOutcome>,
}

impl OutcomeReporter {
    pub fn channel() -> (Self, ReporterReceivers) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        (
            Self {
                events: events_tx,
                outcome: outcome_tx,
            },
            ReporterReceivers {
                events: events_rx,
                outcome: outcome_rx,
            },
        )
    }

    pub fn step(&self, step: ProcessingStep) {
        let _ = self.events.send(SessionEvent::Step(step));
    }

    pub fn order_created(&self, order_id: &str) {
        let _ = self.events.send(SessionEvent::OrderCreated(order_id.to_string()));
    }

    pub fn subscription_created(&self, subscription_id: &str) {
        let _ = self
            .events
            .send(SessionEvent::SubscriptionCreated(subscription_id.to_string()));
    }

    /// Consumes the handle, so an adapter cannot report twice.
    pub fn finish(self, outcome: RawOutcome) {
        let _ = self.outcome.send(outcome);
    }
}
