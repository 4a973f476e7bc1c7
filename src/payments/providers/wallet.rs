use crate::payments::error::ProviderError;
use crate::payments::provider::{OutcomeReporter, PaymentProvider, ProviderSuccess, RawOutcome};
use crate::payments::sdk::{ApprovalCallbacks, ApprovalEvent, OrderDraft, WalletSdkCache};
use crate::payments::settlement::{SettlementBackend, SettlementRequest};
use crate::payments::types::{PaymentKind, PaymentMethod, PaymentRequest, ProcessingStep};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Wallet processor: Create, then Approve inside the provider's widget,
/// then Capture (one-time orders only). Steps never overlap or reorder.
pub struct RedirectApprovalAdapter {
    sdk: Arc<WalletSdkCache>,
    backend: Arc<dyn SettlementBackend>,
    plan_id: Option<String>,
}

impl RedirectApprovalAdapter {
    pub fn new(
        sdk: Arc<WalletSdkCache>,
        backend: Arc<dyn SettlementBackend>,
        plan_id: Option<String>,
    ) -> Self {
        Self {
            sdk,
            backend,
            plan_id,
        }
    }

    async fn run(&self, request: &PaymentRequest, reporter: &OutcomeReporter) -> RawOutcome {
        reporter.step(ProcessingStep::LoadingSdk);
        let sdk = self.sdk.get().await?;

        reporter.step(ProcessingStep::Creating);
        let provider_id = match request.kind() {
            PaymentKind::OneTime => {
                let order_id = sdk.create_order(&OrderDraft::from(request)).await?;
                reporter.order_created(&order_id);
                order_id
            }
            PaymentKind::Subscription => {
                let plan_id = self.plan_id.as_deref().ok_or_else(|| {
                    ProviderError::validation(
                        "no wallet plan is registered for subscriptions",
                        Some("plan_id"),
                    )
                })?;
                let subscription_id = sdk.create_subscription(plan_id).await?;
                reporter.subscription_created(&subscription_id);
                subscription_id
            }
        };

        reporter.step(ProcessingStep::AwaitingApproval);
        let (callbacks, listener) = ApprovalCallbacks::pair(&provider_id);
        sdk.render_buttons(&provider_id, callbacks);
        match listener.wait().await {
            ApprovalEvent::Approved {
                provider_id: approved,
            } if approved == provider_id => {
                info!(provider_id = %provider_id, "wallet payment approved");
            }
            ApprovalEvent::Approved {
                provider_id: approved,
            } => {
                return Err(ProviderError::unrecognized(
                    self.name(),
                    format!("approval for {} while waiting on {}", approved, provider_id),
                ));
            }
            ApprovalEvent::Cancelled => {
                info!(provider_id = %provider_id, "wallet approval cancelled by user");
                return Err(ProviderError::Cancelled);
            }
            ApprovalEvent::Failed { message } => {
                warn!(provider_id = %provider_id, error = %message, "wallet widget reported an error");
                return Err(ProviderError::Widget { message });
            }
        }

        match request.kind() {
            PaymentKind::Subscription => Ok(ProviderSuccess::Subscribed {
                subscription_id: provider_id,
            }),
            PaymentKind::OneTime => {
                reporter.step(ProcessingStep::Capturing);
                let capture_id = self.capture(&provider_id, request).await?;
                Ok(ProviderSuccess::Captured {
                    order_id: provider_id,
                    capture_id,
                })
            }
        }
    }

    /// Any failure here happens after the payer approved, so it is always
    /// reported as a capture failure.
    async fn capture(&self, order_id: &str, request: &PaymentRequest) -> Result<String, ProviderError> {
        let to_capture_error = |e: ProviderError| ProviderError::Capture {
            order_id: order_id.to_string(),
            message: e.to_string(),
        };
        let body = SettlementRequest::with_order(order_id, request).map_err(to_capture_error)?;
        let capture_id = self
            .backend
            .capture(&body)
            .await
            .and_then(|response| response.into_settled_id())
            .map_err(to_capture_error)
            .inspect_err(|e| {
                error!(order_id, error = %e, "capture failed after approval, needs reconciliation");
            })?;
        info!(order_id, capture_id = %capture_id, "wallet order captured");
        Ok(capture_id)
    }
}

#[async_trait]
impl PaymentProvider for RedirectApprovalAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::WalletProcessor
    }

    fn name(&self) -> &'static str {
        "wallet-processor"
    }

    async fn execute(&self, request: &PaymentRequest, reporter: OutcomeReporter) {
        let outcome = self.run(request, &reporter).await;
        reporter.finish(outcome);
    }
}
