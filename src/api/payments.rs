//! Payment submission, session inspection, cancellation and the wallet
//! widget callback relay.

use crate::api::AppState;
use crate::error::ApiError;
use crate::logging::mask_identifier;
use crate::payments::sdk::WidgetCallback;
use crate::payments::tokenizer::CardToken;
use crate::payments::types::{
    PaymentMethod, PaymentRequest, PaymentRequestDraft, PaymentResult, PaymentSession,
};
use crate::payments::validation::{
    estimate_processing_fee, format_currency, round_to_currency, to_minor_units,
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
pub struct SubmitPaymentBody {
    pub method: PaymentMethod,
    /// Single-use token from the browser card widget.
    #[serde(default)]
    pub card_token: Option<String>,
    #[serde(flatten)]
    pub request: PaymentRequestDraft,
}

/// Header naming the caller's checkout. Sessions, cancellation and wallet
/// callbacks only ever see the checkout it names.
pub const CHECKOUT_ID_HEADER: &str = "x-checkout-id";

const MAX_CHECKOUT_ID_LEN: usize = 128;

fn checkout_id(headers: &HeaderMap) -> Result<String, ApiError> {
    let id = headers
        .get(CHECKOUT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    if id.is_empty() || id.len() > MAX_CHECKOUT_ID_LEN {
        return Err(ApiError::Validation {
            field: CHECKOUT_ID_HEADER.to_string(),
            message: format!("must be 1 to {} characters", MAX_CHECKOUT_ID_LEN),
        });
    }
    Ok(id.to_string())
}

/// `POST /api/payments`. Resolves once the session is terminal; the status
/// code mirrors the error kind but the body is always a `PaymentResult`.
pub async fn submit_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SubmitPaymentBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let checkout_id = checkout_id(&headers)?;
    let Json(body) = payload?;
    let request = PaymentRequest::new(body.request)?;

    let checkout = state.checkouts.open(&checkout_id).map_err(|e| {
        ApiError::Internal(format!("checkout {} could not be opened: {}", checkout_id, e))
    })?;
    let card_token = body.card_token.map(|token| {
        debug!(checkout_id = %checkout_id, token = %mask_identifier(&token), "card token received");
        CardToken::new(token)
    });

    let result = checkout.submit(request, body.method, card_token).await;
    let status = result
        .error_kind()
        .map(|kind| {
            StatusCode::from_u16(kind.http_status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        })
        .unwrap_or(StatusCode::OK);

    Ok((status, Json::<PaymentResult>(result)).into_response())
}

/// `GET /api/payments/session`
pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PaymentSession>, ApiError> {
    let checkout_id = checkout_id(&headers)?;
    state
        .checkouts
        .get(&checkout_id)
        .and_then(|checkout| checkout.current_session())
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no payment is in flight".to_string()))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// `POST /api/payments/cancel`
pub async fn cancel_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CancelResponse>, ApiError> {
    let checkout_id = checkout_id(&headers)?;
    let cancelled = state
        .checkouts
        .get(&checkout_id)
        .is_some_and(|checkout| checkout.cancel());
    Ok(Json(CancelResponse { cancelled }))
}

#[derive(Debug, Deserialize)]
pub struct WalletCallbackBody {
    pub provider_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletCallbackResponse {
    pub accepted: bool,
}

/// `POST /api/payments/wallet/{approve|cancel|error}`, relayed by the
/// browser from the provider's embedded widget. Only reaches the session
/// of the checkout that created `provider_id`.
pub async fn wallet_callback(
    State(state): State<AppState>,
    Path(action): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<WalletCallbackBody>, JsonRejection>,
) -> Result<Json<WalletCallbackResponse>, ApiError> {
    let checkout_id = checkout_id(&headers)?;
    let Json(body) = payload?;
    let callback = match action.as_str() {
        "approve" => WidgetCallback::Approve,
        "cancel" => WidgetCallback::Cancel,
        "error" => WidgetCallback::Error(
            body.message
                .unwrap_or_else(|| "wallet widget error".to_string()),
        ),
        other => return Err(ApiError::NotFound(format!("wallet callback '{}'", other))),
    };

    let owned = state
        .checkouts
        .get(&checkout_id)
        .is_some_and(|checkout| checkout.owns_provider_id(&body.provider_id));
    let accepted = owned && state.approvals.deliver(&body.provider_id, callback);
    info!(
        checkout_id = %checkout_id,
        provider_id = %body.provider_id,
        action = %action,
        owned,
        accepted,
        "wallet callback relayed"
    );
    Ok(Json(WalletCallbackResponse { accepted }))
}

#[derive(Debug, Deserialize)]
pub struct FeeQuery {
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeeEstimateResponse {
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub fee: Decimal,
    pub total: Decimal,
    pub formatted_fee: String,
    pub formatted_total: String,
}

/// `GET /api/payments/fees`. Display estimate only.
pub async fn get_fee_estimate(
    Query(query): Query<FeeQuery>,
) -> Result<Json<FeeEstimateResponse>, ApiError> {
    if query.amount <= Decimal::ZERO {
        return Err(ApiError::Validation {
            field: "amount".to_string(),
            message: "amount must be greater than zero".to_string(),
        });
    }
    let priced = estimate_processing_fee(query.amount, query.method)
        .and_then(|fee| Some((fee, query.amount.checked_add(fee)?)));
    let Some((fee, total)) = priced else {
        return Err(ApiError::Validation {
            field: "amount".to_string(),
            message: "amount is too large to price".to_string(),
        });
    };
    Ok(Json(FeeEstimateResponse {
        amount: query.amount,
        method: query.method,
        fee,
        total,
        formatted_fee: format_currency(fee, &query.currency),
        formatted_total: format_currency(total, &query.currency),
    }))
}

#[derive(Debug, Deserialize)]
pub struct FormatQuery {
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FormatResponse {
    pub formatted: String,
    pub rounded: Decimal,
    pub minor_units: Option<i64>,
}

/// `GET /api/payments/format`
pub async fn format_amount(Query(query): Query<FormatQuery>) -> Json<FormatResponse> {
    Json(FormatResponse {
        formatted: format_currency(query.amount, &query.currency),
        rounded: round_to_currency(query.amount, &query.currency),
        minor_units: to_minor_units(query.amount, &query.currency),
    })
}
