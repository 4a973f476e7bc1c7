mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{MockBackend, MockLoader, MockSdk, WAIT};
use quill_payments::api::payments::CHECKOUT_ID_HEADER;
use quill_payments::api::{router, AppState};
use quill_payments::payments::factory::{PaymentFactoryConfig, PaymentProviderFactory};
use quill_payments::payments::sdk::{ApprovalRegistry, WalletSdkCache};
use quill_payments::payments::types::PaymentMethod;
use quill_payments::services::CheckoutRegistry;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    backend: Arc<MockBackend>,
}

fn test_app() -> TestApp {
    let backend = Arc::new(MockBackend::approving());
    let approvals = ApprovalRegistry::new();
    let sdk = Arc::new(MockSdk::new("ORD-1", "I-ABC123").with_registry(approvals.clone()));
    let sdk_cache = Arc::new(WalletSdkCache::new(Arc::new(MockLoader::serving(sdk))));
    let factory = PaymentProviderFactory::new(
        PaymentFactoryConfig {
            enabled_methods: vec![PaymentMethod::CardProcessor, PaymentMethod::WalletProcessor],
            plan_id: Some("P-MONTHLY".to_string()),
        },
        backend.clone(),
        sdk_cache.clone(),
    );

    TestApp {
        app: router(AppState {
            checkouts: Arc::new(CheckoutRegistry::new(factory)),
            approvals,
            sdk: sdk_cache,
        }),
        backend,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, checkout: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header(CHECKOUT_ID_HEADER, checkout)
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str, checkout: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(CHECKOUT_ID_HEADER, checkout)
        .body(Body::empty())
        .expect("request")
}

fn card_payment(token: Option<&str>) -> Value {
    let mut body = json!({
        "method": "card-processor",
        "amount": "25.00",
        "currency": "USD",
        "kind": "one-time",
        "description": "Support this writer"
    });
    if let Some(token) = token {
        body["card_token"] = json!(token);
    }
    body
}

fn wallet_payment() -> Value {
    json!({
        "method": "wallet-processor",
        "amount": "15",
        "currency": "USD",
        "kind": "one-time",
        "description": "Essay bundle"
    })
}

/// Submits a wallet payment in the background and waits until its order is
/// shown to the payer.
async fn start_wallet_payment(
    app: &Router,
    checkout: &'static str,
) -> tokio::task::JoinHandle<(StatusCode, Value)> {
    let submit = tokio::spawn({
        let app = app.clone();
        async move {
            send(&app, post_json("/api/payments", checkout, wallet_payment())).await
        }
    });

    // The browser polls the session to learn which order to render.
    let session = tokio::time::timeout(WAIT, async {
        loop {
            let (status, body) = send(app, get("/api/payments/session", checkout)).await;
            if status == StatusCode::OK && body["step"] == "awaiting_approval" {
                return body;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("session awaiting approval");
    assert_eq!(session["state"], "processing");
    assert_eq!(session["provider_order_id"], "ORD-1");
    submit
}

#[tokio::test]
async fn test_health_reports_components() {
    let t = test_app();
    let (status, body) = send(&t.app, get("/health", "c-health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Healthy");
    assert_eq!(body["checks"]["wallet_sdk"]["status"], "Warning");
    assert_eq!(body["checks"]["orchestrator"]["details"], "idle");
}

#[tokio::test]
async fn test_card_payment_with_token_succeeds() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        post_json(
            "/api/payments",
            "c-1",
            json!({
                "method": "card-processor",
                "card_token": "tok_visa",
                "amount": "25.00",
                "currency": "usd",
                "kind": "one-time",
                "description": "Support this writer",
                "metadata": {"post_id": "post-77"}
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "succeeded");
    assert_eq!(body["reference"]["type"], "transaction");
    assert_eq!(body["reference"]["id"], "txn_123");
    assert_eq!(body["provider_echo"]["post_id"], "post-77");

    let sent = t.backend.last_request().expect("charged");
    assert_eq!(sent.token.as_deref(), Some("tok_visa"));
    assert_eq!(sent.currency, "USD");
}

#[tokio::test]
async fn test_card_payment_without_token_is_not_ready() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        post_json(
            "/api/payments",
            "c-1",
            json!({
                "method": "card-processor",
                "amount": "5",
                "currency": "USD",
                "kind": "one-time"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error_kind"], "client_not_ready");
    assert_eq!(t.backend.charges.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_subscription_without_interval_is_rejected() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        post_json(
            "/api/payments",
            "c-1",
            json!({
                "method": "wallet-processor",
                "amount": "9.99",
                "currency": "USD",
                "kind": "subscription"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_failed");
    assert_eq!(body["details"]["field"], "interval_unit");
}

#[tokio::test]
async fn test_wallet_payment_approved_through_callback_route() {
    let t = test_app();
    let submit = start_wallet_payment(&t.app, "c-1").await;

    let (status, body) = send(
        &t.app,
        post_json("/api/payments/wallet/approve", "c-1", json!({"provider_id": "ORD-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], true);

    let (status, body) = tokio::time::timeout(WAIT, submit)
        .await
        .expect("submit resolves")
        .expect("task joins");
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["reference"]["id"], "ORD-1");
    assert_eq!(body["provider_echo"]["capture_id"], "CAP-1");
    assert_eq!(t.backend.captures.load(Ordering::SeqCst), 1);

    let (_, body) = send(
        &t.app,
        post_json("/api/payments/wallet/approve", "c-1", json!({"provider_id": "ORD-1"})),
    )
    .await;
    assert_eq!(body["accepted"], false);
}

#[tokio::test]
async fn test_checkouts_do_not_block_or_see_each_other() {
    let t = test_app();
    let waiting = start_wallet_payment(&t.app, "c-wallet").await;

    // Another payer pays by card while the first one sits on the approval screen.
    let (status, body) = send(
        &t.app,
        post_json("/api/payments", "c-card", card_payment(Some("tok_visa"))),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["reference"]["id"], "txn_123");

    let (status, _) = send(&t.app, get("/api/payments/session", "c-card")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = send(
        &t.app,
        post_json("/api/payments/wallet/approve", "c-card", json!({"provider_id": "ORD-1"})),
    )
    .await;
    assert_eq!(body["accepted"], false);
    let (_, body) = send(&t.app, post_json("/api/payments/cancel", "c-card", json!({}))).await;
    assert_eq!(body["cancelled"], false);

    let (_, body) = send(&t.app, post_json("/api/payments/cancel", "c-wallet", json!({}))).await;
    assert_eq!(body["cancelled"], true);
    let (status, body) = tokio::time::timeout(WAIT, waiting)
        .await
        .expect("submit resolves")
        .expect("task joins");
    assert_eq!(status.as_u16(), 499);
    assert_eq!(body["error_kind"], "user_cancelled");
    assert_eq!(t.backend.captures.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_token_sent_to_busy_checkout_is_never_charged() {
    let t = test_app();
    let waiting = start_wallet_payment(&t.app, "c-1").await;

    let (status, body) = send(
        &t.app,
        post_json("/api/payments", "c-1", card_payment(Some("tok_late"))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_kind"], "already_in_flight");

    let (_, body) = send(&t.app, post_json("/api/payments/cancel", "c-1", json!({}))).await;
    assert_eq!(body["cancelled"], true);
    tokio::time::timeout(WAIT, waiting)
        .await
        .expect("submit resolves")
        .expect("task joins");

    // The refused token was not left behind for the next submission.
    let (status, body) = send(&t.app, post_json("/api/payments", "c-1", card_payment(None))).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["error_kind"], "client_not_ready");
    assert_eq!(t.backend.charges.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_tokens_are_not_reused_across_submissions() {
    let t = test_app();

    let (status, _) = send(
        &t.app,
        post_json("/api/payments", "c-1", card_payment(Some("tok_first"))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    for checkout in ["c-1", "c-2"] {
        let (status, body) =
            send(&t.app, post_json("/api/payments", checkout, card_payment(None))).await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED, "{checkout}");
        assert_eq!(body["error_kind"], "client_not_ready");
    }
    assert_eq!(t.backend.charges.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_card_token_on_wallet_submission_is_dropped() {
    let t = test_app();
    let mut body = wallet_payment();
    body["card_token"] = json!("tok_stray");
    let waiting = tokio::spawn({
        let app = t.app.clone();
        async move { send(&app, post_json("/api/payments", "c-1", body)).await }
    });
    tokio::time::timeout(WAIT, async {
        loop {
            let (status, body) = send(&t.app, get("/api/payments/session", "c-1")).await;
            if status == StatusCode::OK && body["step"] == "awaiting_approval" {
                return;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("session awaiting approval");
    send(&t.app, post_json("/api/payments/cancel", "c-1", json!({}))).await;
    tokio::time::timeout(WAIT, waiting)
        .await
        .expect("submit resolves")
        .expect("task joins");

    let (status, _) = send(&t.app, post_json("/api/payments", "c-1", card_payment(None))).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(t.backend.charges.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_checkout_id_is_rejected() {
    let t = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/payments")
        .header("content-type", "application/json")
        .body(Body::from(card_payment(Some("tok_visa")).to_string()))
        .expect("request");
    let (status, body) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"]["field"], CHECKOUT_ID_HEADER);
    assert_eq!(t.backend.charges.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_oversized_amount_is_rejected_without_charging() {
    let t = test_app();
    let mut body = card_payment(Some("tok_visa"));
    body["amount"] = json!("79228162514264337593543950335");
    let (status, body) = send(&t.app, post_json("/api/payments", "c-1", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"]["field"], "amount");
    assert_eq!(t.backend.charges.load(Ordering::SeqCst), 0);

    let (status, _) = send(
        &t.app,
        get(
            "/api/payments/fees?amount=79228162514264337593543950335&method=card-processor",
            "c-1",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &t.app,
        get("/api/payments/format?amount=79228162514264337593543950335&currency=USD", "c-1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["minor_units"], Value::Null);
}

#[tokio::test]
async fn test_idle_session_and_cancel() {
    let t = test_app();
    let (status, body) = send(&t.app, get("/api/payments/session", "c-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = send(&t.app, post_json("/api/payments/cancel", "c-1", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], false);
}

#[tokio::test]
async fn test_unknown_wallet_action_is_not_found() {
    let t = test_app();
    let (status, _) = send(
        &t.app,
        post_json("/api/payments/wallet/refund", "c-1", json!({"provider_id": "ORD-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_card_validation_route_lists_every_error() {
    let t = test_app();
    let (status, body) = send(
        &t.app,
        post_json(
            "/api/cards/validate",
            "c-1",
            json!({
                "number": "4111 11",
                "expiry_month": "13",
                "expiry_year": "30",
                "cvc": "1"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert_eq!(body["errors"].as_array().map(Vec::len), Some(3));
    assert_eq!(body["brand"], "visa");
}

#[tokio::test]
async fn test_brand_fee_and_format_helpers() {
    let t = test_app();

    let (_, body) = send(&t.app, get("/api/cards/brand?number=5500000000000004", "c-1")).await;
    assert_eq!(body["brand"], "mastercard");
    assert_eq!(body["formatted"], "5500 0000 0000 0004");

    let (status, body) = send(
        &t.app,
        get("/api/payments/fees?amount=100&method=card-processor", "c-1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fee"], "3.20");
    assert_eq!(body["total"], "103.20");
    assert_eq!(body["formatted_fee"], "$3.20");

    let (_, body) = send(&t.app, get("/api/payments/format?amount=1234.5&currency=USD", "c-1")).await;
    assert_eq!(body["formatted"], "$1,234.50");
    assert_eq!(body["minor_units"], 123450);

    let (status, _) = send(
        &t.app,
        get("/api/payments/fees?amount=-1&method=wallet-processor", "c-1"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
