use crate::payments::error::ProviderResult;
use crate::payments::provider::{OutcomeReporter, PaymentProvider, ProviderSuccess, RawOutcome};
use crate::payments::settlement::{SettlementBackend, SettlementRequest, SettlementResponse};
use crate::payments::tokenizer::CardTokenizer;
use crate::payments::types::{PaymentKind, PaymentMethod, PaymentRequest, ProcessingStep};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Card processor: tokenize, then one settlement call. Subscriptions carry
/// their interval in that same call.
pub struct CardChargeAdapter {
    tokenizer: CardTokenizer,
    backend: Arc<dyn SettlementBackend>,
}

impl CardChargeAdapter {
    pub fn new(tokenizer: CardTokenizer, backend: Arc<dyn SettlementBackend>) -> Self {
        Self { tokenizer, backend }
    }

    async fn run(&self, request: &PaymentRequest, reporter: &OutcomeReporter) -> RawOutcome {
        reporter.step(ProcessingStep::Tokenizing);
        let token = self.tokenizer.tokenize().await?;

        reporter.step(ProcessingStep::Charging);
        let body = SettlementRequest::with_token(token.as_str(), request)?;
        match request.kind() {
            PaymentKind::OneTime => {
                let transaction_id = self.settle(self.backend.charge(&body).await)?;
                info!(transaction_id = %transaction_id, "card charge settled");
                Ok(ProviderSuccess::Charged { transaction_id })
            }
            PaymentKind::Subscription => {
                let subscription_id = self.settle(self.backend.subscribe(&body).await)?;
                info!(subscription_id = %subscription_id, "card subscription created");
                Ok(ProviderSuccess::Subscribed { subscription_id })
            }
        }
    }

    fn settle(
        &self,
        response: ProviderResult<SettlementResponse>,
    ) -> ProviderResult<String> {
        response?.into_settled_id().inspect_err(|e| {
            warn!(provider = self.name(), error = %e, "card settlement rejected");
        })
    }
}

#[async_trait]
impl PaymentProvider for CardChargeAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::CardProcessor
    }

    fn name(&self) -> &'static str {
        "card-processor"
    }

    async fn execute(&self, request: &PaymentRequest, reporter: OutcomeReporter) {
        let outcome = self.run(request, &reporter).await;
        reporter.finish(outcome);
    }
}
