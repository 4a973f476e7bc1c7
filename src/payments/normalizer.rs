//! Converts adapter outcomes into the closed [`PaymentResult`] shape.
//!
//! Messages shown to the payer are derived from the raw provider error but
//! never copied verbatim, except for decline reason codes (which the UI
//! needs) and unrecognized shapes (kept for diagnostics).

use crate::payments::error::{ErrorKind, ProviderError};
use crate::payments::provider::{ProviderSuccess, RawOutcome};
use crate::payments::types::{PaymentRequest, PaymentResult, SettledReference};
use tracing::{error, warn};

pub const CAPTURE_ID_KEY: &str = "capture_id";

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultNormalizer;

impl ResultNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, request: &PaymentRequest, raw: RawOutcome) -> PaymentResult {
        match raw {
            Ok(success) => self.succeeded(request, success),
            Err(err) => self.failed(&err),
        }
    }

    fn succeeded(&self, request: &PaymentRequest, success: ProviderSuccess) -> PaymentResult {
        let mut provider_echo = request.metadata().clone();
        let reference = match success {
            ProviderSuccess::Charged { transaction_id } => {
                SettledReference::Transaction(transaction_id)
            }
            ProviderSuccess::Subscribed { subscription_id } => {
                SettledReference::Subscription(subscription_id)
            }
            ProviderSuccess::Captured {
                order_id,
                capture_id,
            } => {
                provider_echo.insert(CAPTURE_ID_KEY.to_string(), capture_id);
                SettledReference::Transaction(order_id)
            }
        };
        PaymentResult::Succeeded {
            reference,
            provider_echo,
        }
    }

    pub fn failed(&self, err: &ProviderError) -> PaymentResult {
        let kind = err.kind();
        match kind {
            ErrorKind::CaptureFailed => {
                error!(error_kind = %kind, error = %err, "payment failed after approval")
            }
            _ => warn!(error_kind = %kind, error = %err, "payment failed"),
        }
        PaymentResult::Failed {
            error_kind: kind,
            message: user_message(err),
        }
    }

    /// Failure raised by the orchestrator itself, before any adapter runs.
    pub fn reject(&self, kind: ErrorKind, detail: &str) -> PaymentResult {
        warn!(error_kind = %kind, detail, "payment rejected");
        let message = match kind {
            ErrorKind::AlreadyInFlight => {
                "A payment is already being processed. Please wait for it to finish".to_string()
            }
            ErrorKind::ValidationFailed => format!("Payment details are invalid: {}", detail),
            ErrorKind::ClientNotReady => {
                "This payment method is not available right now".to_string()
            }
            _ => format!("Payment could not be processed: {}", detail),
        };
        PaymentResult::Failed {
            error_kind: kind,
            message,
        }
    }
}

pub fn user_message(err: &ProviderError) -> String {
    match err {
        ProviderError::ClientNotReady { .. } => {
            "The payment form is not ready yet. Please wait for it to load and try again"
                .to_string()
        }
        ProviderError::SdkLoad { .. } => {
            "The wallet checkout could not be loaded. Please check your connection and try again"
                .to_string()
        }
        ProviderError::Validation { message, .. } => {
            format!("Payment details are invalid: {}", message)
        }
        ProviderError::Declined { reason, .. } => {
            format!("Your payment was declined ({})", reason)
        }
        ProviderError::Widget { .. } => {
            "The wallet provider reported a problem while approving the payment".to_string()
        }
        ProviderError::Unavailable { .. } => {
            "The payment provider is temporarily unavailable. Please try again shortly".to_string()
        }
        ProviderError::Cancelled => "The payment was cancelled".to_string(),
        ProviderError::Capture { order_id, .. } => format!(
            "Your payment was approved but could not be completed (order {}). Please contact support before trying again",
            order_id
        ),
        ProviderError::Unrecognized { message, .. } => {
            format!("Unexpected response from the payment provider: {}", message)
        }
    }
}
