use crate::payments::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Opaque single-use card handle. Raw card digits never reach the core.
#[derive(Clone, PartialEq, Eq)]
pub struct CardToken(String);

impl CardToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for CardToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CardToken(****)")
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct WidgetError {
    pub message: String,
    pub code: Option<String>,
}

/// The third-party card entry widget.
#[async_trait]
pub trait CardWidget: Send + Sync {
    fn is_mounted(&self) -> bool;

    async fn create_token(&self) -> Result<CardToken, WidgetError>;
}

pub struct CardTokenizer {
    widget: Arc<dyn CardWidget>,
}

impl CardTokenizer {
    pub fn new(widget: Arc<dyn CardWidget>) -> Self {
        Self { widget }
    }

    pub async fn tokenize(&self) -> ProviderResult<CardToken> {
        if !self.widget.is_mounted() {
            return Err(ProviderError::ClientNotReady {
                message: "card widget is not mounted".to_string(),
            });
        }
        self.widget
            .create_token()
            .await
            .map_err(|e| ProviderError::Validation {
                message: e.message,
                field: Some(e.code.unwrap_or_else(|| "card".to_string())),
            })
    }
}

/// Server-side widget: the browser tokenizes the card and hands the token
/// over with the submission. Mounting stores it, tokenizing consumes it.
#[derive(Default)]
pub struct TokenSlot {
    token: Mutex<Option<CardToken>>,
}

impl TokenSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&self, token: CardToken) {
        debug!("card token mounted");
        *self.token.lock() = Some(token);
    }

    pub fn unmount(&self) {
        self.token.lock().take();
    }
}

#[async_trait]
impl CardWidget for TokenSlot {
    fn is_mounted(&self) -> bool {
        self.token.lock().is_some()
    }

    async fn create_token(&self) -> Result<CardToken, WidgetError> {
        self.token.lock().take().ok_or(WidgetError {
            message: "card token was already used".to_string(),
            code: Some("card_token".to_string()),
        })
    }
}
