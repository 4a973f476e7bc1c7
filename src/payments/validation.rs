//! Client-side card checks and display helpers.
//!
//! Everything here is pure: no I/O, no clock access except through
//! [`validate_card`], which reads today's date and delegates to
//! [`validate_card_at`]. Brand detection and fee estimates are UI hints only
//! and are never used to decide or compute a real charge.

use crate::payments::types::PaymentMethod;
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

pub const MIN_CARD_DIGITS: usize = 13;
pub const MIN_CVC_DIGITS: usize = 3;

pub const ERR_CARD_NUMBER: &str = "Card number must be at least 13 digits";
pub const ERR_EXPIRED: &str = "Card has expired";
pub const ERR_EXPIRY_FORMAT: &str = "Expiry date is invalid";
pub const ERR_CVC: &str = "CVC must be at least 3 digits";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
    Discover,
    Unknown,
}

impl CardBrand {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardBrand::Visa => "visa",
            CardBrand::Mastercard => "mastercard",
            CardBrand::Amex => "amex",
            CardBrand::Discover => "discover",
            CardBrand::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CardBrand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn strip_whitespace(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

fn all_digits(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

/// Parses `MM` and `YY`/`YYYY` into `(year, month)`.
fn parse_expiry(month: &str, year: &str) -> Option<(i32, u32)> {
    let month = month.trim();
    let year = year.trim();
    if !all_digits(month) || !all_digits(year) {
        return None;
    }
    let month: u32 = month.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    let year: i32 = match year.len() {
        2 => 2000 + year.parse::<i32>().ok()?,
        4 => year.parse().ok()?,
        _ => return None,
    };
    Some((year, month))
}

/// Checks a card against `today`, returning every violated rule.
pub fn validate_card_at(
    number: &str,
    expiry_month: &str,
    expiry_year: &str,
    cvc: &str,
    today: NaiveDate,
) -> CardValidation {
    let mut errors = Vec::new();

    let digits = strip_whitespace(number);
    if digits.len() < MIN_CARD_DIGITS || !all_digits(&digits) {
        errors.push(ERR_CARD_NUMBER.to_string());
    }

    match parse_expiry(expiry_month, expiry_year) {
        Some(expiry) if expiry < (today.year(), today.month()) => {
            errors.push(ERR_EXPIRED.to_string())
        }
        Some(_) => {}
        None => errors.push(ERR_EXPIRY_FORMAT.to_string()),
    }

    let cvc = cvc.trim();
    if cvc.len() < MIN_CVC_DIGITS || !all_digits(cvc) {
        errors.push(ERR_CVC.to_string());
    }

    CardValidation {
        valid: errors.is_empty(),
        errors,
    }
}

pub fn validate_card(
    number: &str,
    expiry_month: &str,
    expiry_year: &str,
    cvc: &str,
) -> CardValidation {
    validate_card_at(
        number,
        expiry_month,
        expiry_year,
        cvc,
        Utc::now().date_naive(),
    )
}

/// Prefix-only brand hint. No Luhn check, no length rules.
pub fn detect_card_brand(number: &str) -> CardBrand {
    let digits = strip_whitespace(number);
    let prefix2 = digits.get(..2).and_then(|p| p.parse::<u8>().ok());

    if digits.starts_with("34") || digits.starts_with("37") {
        CardBrand::Amex
    } else if matches!(prefix2, Some(51..=55)) {
        CardBrand::Mastercard
    } else if digits.starts_with("6011") || digits.starts_with("65") {
        CardBrand::Discover
    } else if digits.starts_with('4') {
        CardBrand::Visa
    } else {
        CardBrand::Unknown
    }
}

/// Regroups into space-separated blocks of four. Idempotent.
pub fn format_card_number(raw: &str) -> String {
    let compact: Vec<char> = raw.chars().filter(|c| !c.is_whitespace()).collect();
    compact
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Display-only fee estimate, rounded half-up to cents. `None` when the
/// amount is too large to price.
pub fn estimate_processing_fee(amount: Decimal, method: PaymentMethod) -> Option<Decimal> {
    let (percent, flat) = match method {
        // 2.9% + 0.30
        PaymentMethod::CardProcessor => (Decimal::new(29, 3), Decimal::new(30, 2)),
        // 3.49% + 0.49
        PaymentMethod::WalletProcessor => (Decimal::new(349, 4), Decimal::new(49, 2)),
    };
    let fee = amount.checked_mul(percent)?.checked_add(flat)?;
    Some(fee.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Largest accepted amount in major units, for any currency.
pub const MAX_AMOUNT: i64 = 1_000_000_000;

/// ISO 4217 minor-unit exponent.
pub fn currency_exponent(currency: &str) -> u32 {
    match currency.trim().to_ascii_uppercase().as_str() {
        "JPY" | "KRW" | "VND" | "CLP" | "ISK" | "UGX" | "XAF" | "XOF" | "PYG" | "RWF" => 0,
        "BHD" | "KWD" | "JOD" | "OMR" | "TND" | "LYD" | "IQD" => 3,
        _ => 2,
    }
}

pub fn round_to_currency(amount: Decimal, currency: &str) -> Decimal {
    amount.round_dp_with_strategy(
        currency_exponent(currency),
        RoundingStrategy::MidpointAwayFromZero,
    )
}

/// Converts a major-unit amount to integer minor units (cents, fils, ...).
/// `None` when the result does not fit an `i64`.
pub fn to_minor_units(amount: Decimal, currency: &str) -> Option<i64> {
    let exponent = currency_exponent(currency);
    round_to_currency(amount, currency)
        .checked_mul(Decimal::from(10_i64.pow(exponent)))?
        .to_i64()
}

fn currency_symbol(currency: &str) -> Option<&'static str> {
    match currency {
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "JPY" => Some("¥"),
        "INR" => Some("₹"),
        "NGN" => Some("₦"),
        "KRW" => Some("₩"),
        _ => None,
    }
}

fn group_thousands(integer: &str) -> String {
    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, ch) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Formats for display, e.g. `$1,234.50`, `¥1,235`, `CHF 12.00`.
pub fn format_currency(amount: Decimal, currency_code: &str) -> String {
    let code = currency_code.trim().to_ascii_uppercase();
    let exponent = currency_exponent(&code) as usize;
    let rounded = round_to_currency(amount, &code);

    let body = format!("{:.*}", exponent, rounded.abs());
    let (integer, fraction) = match body.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (body.clone(), None),
    };
    let mut number = group_thousands(&integer);
    if let Some(fraction) = fraction {
        number.push('.');
        number.push_str(&fraction);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    match currency_symbol(&code) {
        Some(symbol) => format!("{sign}{symbol}{number}"),
        None => format!("{sign}{code} {number}"),
    }
}
