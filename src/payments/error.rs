use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Closed set of failure kinds a caller can see on a failed payment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AlreadyInFlight,
    ClientNotReady,
    SdkLoadFailed,
    ValidationFailed,
    ProviderDeclined,
    ProviderUnavailable,
    UserCancelled,
    CaptureFailed,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AlreadyInFlight => "already_in_flight",
            ErrorKind::ClientNotReady => "client_not_ready",
            ErrorKind::SdkLoadFailed => "sdk_load_failed",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::ProviderDeclined => "provider_declined",
            ErrorKind::ProviderUnavailable => "provider_unavailable",
            ErrorKind::UserCancelled => "user_cancelled",
            ErrorKind::CaptureFailed => "capture_failed",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Only a transient provider outage is safe to resubmit automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ProviderUnavailable)
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            ErrorKind::AlreadyInFlight => 409,
            ErrorKind::ClientNotReady => 412,
            ErrorKind::SdkLoadFailed => 503,
            ErrorKind::ValidationFailed => 400,
            ErrorKind::ProviderDeclined => 402,
            ErrorKind::ProviderUnavailable => 503,
            ErrorKind::UserCancelled => 499,
            ErrorKind::CaptureFailed => 502,
            ErrorKind::Unknown => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw failure raised inside an adapter. Never leaves the orchestrator:
/// the normalizer turns it into a `PaymentResult::Failed`.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Client not ready: {message}")]
    ClientNotReady { message: String },

    #[error("Provider SDK failed to load: {message}")]
    SdkLoad { message: String },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Payment declined: {reason}")]
    Declined {
        reason: String,
        provider_code: Option<String>,
    },

    #[error("Provider unavailable: {message}")]
    Unavailable {
        message: String,
        status: Option<u16>,
    },

    #[error("Payment cancelled by user")]
    Cancelled,

    #[error("In-widget provider error: {message}")]
    Widget { message: String },

    #[error("Capture failed for order {order_id}: {message}")]
    Capture { order_id: String, message: String },

    #[error("Unrecognized provider response: provider={provider}, message={message}")]
    Unrecognized { provider: String, message: String },
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::ClientNotReady { .. } => ErrorKind::ClientNotReady,
            ProviderError::SdkLoad { .. } => ErrorKind::SdkLoadFailed,
            ProviderError::Validation { .. } => ErrorKind::ValidationFailed,
            ProviderError::Declined { .. } => ErrorKind::ProviderDeclined,
            ProviderError::Widget { .. } => ErrorKind::ProviderDeclined,
            ProviderError::Unavailable { .. } => ErrorKind::ProviderUnavailable,
            ProviderError::Cancelled => ErrorKind::UserCancelled,
            ProviderError::Capture { .. } => ErrorKind::CaptureFailed,
            ProviderError::Unrecognized { .. } => ErrorKind::Unknown,
        }
    }

    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        ProviderError::Validation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    pub fn unrecognized(provider: &str, message: impl Into<String>) -> Self {
        ProviderError::Unrecognized {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// Rejection raised while constructing a `PaymentRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    #[error("amount must not exceed {max}")]
    AmountTooLarge { max: i64 },

    #[error("currency must be a three-letter ISO 4217 code, got '{0}'")]
    InvalidCurrency(String),

    #[error("amount has more decimal places than {currency} allows ({allowed})")]
    TooPrecise { currency: String, allowed: u32 },

    #[error("subscription requires an interval unit")]
    MissingInterval,

    #[error("one-time payment must not carry an interval unit")]
    UnexpectedInterval,
}

impl RequestError {
    pub fn field(&self) -> &'static str {
        match self {
            RequestError::NonPositiveAmount
            | RequestError::AmountTooLarge { .. }
            | RequestError::TooPrecise { .. } => "amount",
            RequestError::InvalidCurrency(_) => "currency",
            RequestError::MissingInterval | RequestError::UnexpectedInterval => "interval_unit",
        }
    }
}

impl From<RequestError> for ProviderError {
    fn from(err: RequestError) -> Self {
        ProviderError::Validation {
            field: Some(err.field().to_string()),
            message: err.to_string(),
        }
    }
}
