//! HTTP surface over the orchestration core.

pub mod cards;
pub mod payments;

use crate::health;
use crate::payments::sdk::{ApprovalRegistry, WalletSdkCache};
use crate::services::CheckoutRegistry;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub checkouts: Arc<CheckoutRegistry>,
    pub approvals: ApprovalRegistry,
    pub sdk: Arc<WalletSdkCache>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/payments", post(payments::submit_payment))
        .route("/api/payments/session", get(payments::get_session))
        .route("/api/payments/cancel", post(payments::cancel_payment))
        .route(
            "/api/payments/wallet/{action}",
            post(payments::wallet_callback),
        )
        .route("/api/payments/fees", get(payments::get_fee_estimate))
        .route("/api/payments/format", get(payments::format_amount))
        .route("/api/cards/validate", post(cards::validate))
        .route("/api/cards/brand", get(cards::brand))
        .with_state(state)
}
