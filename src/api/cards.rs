use crate::error::ApiError;
use crate::logging::mask_card_number;
use crate::payments::validation::{detect_card_brand, format_card_number, validate_card, CardBrand};
use axum::{
    extract::{rejection::JsonRejection, Query},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct ValidateCardBody {
    pub number: String,
    pub expiry_month: String,
    pub expiry_year: String,
    pub cvc: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateCardResponse {
    pub valid: bool,
    pub errors: Vec<String>,
    pub brand: CardBrand,
}

/// `POST /api/cards/validate`. Advisory only; the processor decides.
pub async fn validate(
    payload: Result<Json<ValidateCardBody>, JsonRejection>,
) -> Result<Json<ValidateCardResponse>, ApiError> {
    let Json(body) = payload?;
    let validation = validate_card(&body.number, &body.expiry_month, &body.expiry_year, &body.cvc);
    debug!(
        card = %mask_card_number(&body.number),
        valid = validation.valid,
        "card checked"
    );
    Ok(Json(ValidateCardResponse {
        valid: validation.valid,
        errors: validation.errors,
        brand: detect_card_brand(&body.number),
    }))
}

#[derive(Debug, Deserialize)]
pub struct BrandQuery {
    pub number: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BrandResponse {
    pub brand: CardBrand,
    pub formatted: String,
}

/// `GET /api/cards/brand`
pub async fn brand(Query(query): Query<BrandQuery>) -> Json<BrandResponse> {
    Json(BrandResponse {
        brand: detect_card_brand(&query.number),
        formatted: format_card_number(&query.number),
    })
}
