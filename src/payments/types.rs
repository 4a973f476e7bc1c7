use crate::payments::error::{ErrorKind, ProviderError, RequestError};
use crate::payments::validation::{currency_exponent, MAX_AMOUNT};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque key/value pairs passed through to the provider and echoed back.
pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    CardProcessor,
    WalletProcessor,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CardProcessor => "card-processor",
            PaymentMethod::WalletProcessor => "wallet-processor",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "card-processor" | "card" => Ok(PaymentMethod::CardProcessor),
            "wallet-processor" | "wallet" => Ok(PaymentMethod::WalletProcessor),
            _ => Err(ProviderError::validation(
                format!("unsupported payment method: {}", value),
                Some("method"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentKind {
    OneTime,
    Subscription,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Day,
    Week,
    Month,
    Year,
}

impl IntervalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Day => "day",
            IntervalUnit::Week => "week",
            IntervalUnit::Month => "month",
            IntervalUnit::Year => "year",
        }
    }
}

/// Unchecked input for [`PaymentRequest::new`]; also the wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequestDraft {
    pub amount: Decimal,
    pub currency: String,
    pub kind: PaymentKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub interval_unit: Option<IntervalUnit>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A validated, immutable payment request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "PaymentRequestDraft")]
pub struct PaymentRequest {
    amount: Decimal,
    currency: String,
    kind: PaymentKind,
    description: String,
    interval_unit: Option<IntervalUnit>,
    metadata: Metadata,
}

impl PaymentRequest {
    pub fn new(draft: PaymentRequestDraft) -> Result<Self, RequestError> {
        let request = Self {
            amount: draft.amount,
            currency: draft.currency.trim().to_ascii_uppercase(),
            kind: draft.kind,
            description: draft.description,
            interval_unit: draft.interval_unit,
            metadata: draft.metadata,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn one_time(
        amount: Decimal,
        currency: &str,
        description: &str,
    ) -> Result<Self, RequestError> {
        Self::new(PaymentRequestDraft {
            amount,
            currency: currency.to_string(),
            kind: PaymentKind::OneTime,
            description: description.to_string(),
            interval_unit: None,
            metadata: Metadata::new(),
        })
    }

    pub fn subscription(
        amount: Decimal,
        currency: &str,
        description: &str,
        interval_unit: IntervalUnit,
    ) -> Result<Self, RequestError> {
        Self::new(PaymentRequestDraft {
            amount,
            currency: currency.to_string(),
            kind: PaymentKind::Subscription,
            description: description.to_string(),
            interval_unit: Some(interval_unit),
            metadata: Metadata::new(),
        })
    }

    /// Returns a copy carrying `metadata`; the original is untouched.
    pub fn with_metadata(&self, metadata: Metadata) -> Self {
        Self {
            metadata,
            ..self.clone()
        }
    }

    /// Structural checks shared by construction and the orchestrator.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.amount <= Decimal::ZERO {
            return Err(RequestError::NonPositiveAmount);
        }
        if self.amount > Decimal::from(MAX_AMOUNT) {
            return Err(RequestError::AmountTooLarge { max: MAX_AMOUNT });
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(RequestError::InvalidCurrency(self.currency.clone()));
        }
        let allowed = currency_exponent(&self.currency);
        if self.amount.normalize().scale() > allowed {
            return Err(RequestError::TooPrecise {
                currency: self.currency.clone(),
                allowed,
            });
        }
        match (self.kind, self.interval_unit) {
            (PaymentKind::Subscription, None) => Err(RequestError::MissingInterval),
            (PaymentKind::OneTime, Some(_)) => Err(RequestError::UnexpectedInterval),
            _ => Ok(()),
        }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn kind(&self) -> PaymentKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn interval_unit(&self) -> Option<IntervalUnit> {
        self.interval_unit
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

impl TryFrom<PaymentRequestDraft> for PaymentRequest {
    type Error = RequestError;

    fn try_from(draft: PaymentRequestDraft) -> Result<Self, Self::Error> {
        Self::new(draft)
    }
}

/// Identifier of the thing a successful payment produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum SettledReference {
    Transaction(String),
    Subscription(String),
}

/// The only outcome shape callers of the core ever see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentResult {
    Succeeded {
        reference: SettledReference,
        provider_echo: Metadata,
    },
    Failed {
        error_kind: ErrorKind,
        message: String,
    },
}

impl PaymentResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PaymentResult::Succeeded { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            PaymentResult::Failed { error_kind, .. } => Some(*error_kind),
            PaymentResult::Succeeded { .. } => None,
        }
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            PaymentResult::Succeeded {
                reference: SettledReference::Transaction(id),
                ..
            } => Some(id),
            _ => None,
        }
    }

    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            PaymentResult::Succeeded {
                reference: SettledReference::Subscription(id),
                ..
            } => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Processing,
    Succeeded,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Processing => write!(f, "processing"),
            SessionState::Succeeded => write!(f, "succeeded"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

impl SessionState {
    pub fn valid_transitions(&self) -> &'static [SessionState] {
        match self {
            SessionState::Idle => &[SessionState::Processing],
            SessionState::Processing => &[SessionState::Succeeded, SessionState::Failed],
            // Terminal states - no valid transitions
            SessionState::Succeeded | SessionState::Failed => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::Failed)
    }
}

/// Transient sub-states inside `Processing`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStep {
    Tokenizing,
    Charging,
    LoadingSdk,
    Creating,
    AwaitingApproval,
    Capturing,
}

/// Progress reported by an adapter through its write-only handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Step(ProcessingStep),
    OrderCreated(String),
    SubscriptionCreated(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid session transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Mutable per-submission state, owned by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSession {
    pub id: Uuid,
    pub state: SessionState,
    pub step: Option<ProcessingStep>,
    pub method: PaymentMethod,
    pub request: PaymentRequest,
    pub provider_order_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub result: Option<PaymentResult>,
    pub started_at: DateTime<Utc>,
}

impl PaymentSession {
    pub fn new(request: PaymentRequest, method: PaymentMethod) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            step: None,
            method,
            request,
            provider_order_id: None,
            provider_subscription_id: None,
            result: None,
            started_at: Utc::now(),
        }
    }

    fn transition(&mut self, target: SessionState) -> Result<(), InvalidTransition> {
        if !self.state.valid_transitions().contains(&target) {
            return Err(InvalidTransition {
                from: self.state,
                to: target,
            });
        }
        self.state = target;
        Ok(())
    }

    pub fn begin(&mut self) -> Result<(), InvalidTransition> {
        self.transition(SessionState::Processing)
    }

    /// Applies adapter progress. Ignored once the session is terminal.
    pub fn apply(&mut self, event: SessionEvent) -> bool {
        if self.state != SessionState::Processing {
            return false;
        }
        match event {
            SessionEvent::Step(step) => self.step = Some(step),
            SessionEvent::OrderCreated(id) => self.provider_order_id = Some(id),
            SessionEvent::SubscriptionCreated(id) => self.provider_subscription_id = Some(id),
        }
        true
    }

    /// Moves to the terminal state matching `result`. A second call fails.
    pub fn resolve(&mut self, result: PaymentResult) -> Result<(), InvalidTransition> {
        let target = if result.is_success() {
            SessionState::Succeeded
        } else {
            SessionState::Failed
        };
        self.transition(target)?;
        self.step = None;
        self.result = Some(result);
        Ok(())
    }
}
