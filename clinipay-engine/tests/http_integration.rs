//! HTTP-level integration tests.
//!
//! Exercise the full stack with a real in-memory SQLite store and the real
//! provider adapters for the network-free paths (webhook authenticity and
//! parsing). Gateway calls that need a live upstream are covered by the
//! service-layer tests with scripted adapters.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use clinipay_engine::{PaymentEngine, inbound::HttpServer};
use clinipay_providers::{
    CardGatewayAdapter, CardGatewayConfig, MobileMoneyAdapter, MobileMoneyConfig,
    signature::sign_card_webhook,
};
use clinipay_store::SqliteStore;
use clinipay_types::{
    NewTransaction, PaymentMethod, Provider, TransactionStatus, TransactionStore,
};
use rust_decimal_macros::dec;

const WEBHOOK_SECRET: &str = "whsec_testing";
const MOBILE_TOKEN: &str = "cb-token-testing";

/// Builds a router plus an independent handle on the same store.
async fn test_app() -> (axum::Router, SqliteStore) {
    let store = SqliteStore::new("sqlite::memory:").await.unwrap();

    let card = CardGatewayAdapter::new(CardGatewayConfig {
        secret_key: "sk_test_xyz".into(),
        webhook_secret: WEBHOOK_SECRET.into(),
        base_url: "http://127.0.0.1:1".into(),
        callback_url: "http://localhost/return".into(),
    });
    let mobile = MobileMoneyAdapter::new(MobileMoneyConfig {
        consumer_key: "ck".into(),
        consumer_secret: "cs".into(),
        shortcode: "174379".into(),
        passkey: "passkey".into(),
        base_url: "http://127.0.0.1:1".into(),
        callback_url: "http://localhost/webhook".into(),
        webhook_token: MOBILE_TOKEN.into(),
    });

    let engine = PaymentEngine::new(store.clone())
        .with_card(Arc::new(card))
        .with_mobile_money(Arc::new(mobile));

    (HttpServer::new(engine).router(), store)
}

/// Seeds a Pending card transaction directly through the store.
async fn seed_pending_card(store: &SqliteStore, reference: &str) {
    store
        .create(NewTransaction {
            reference: Some(reference.to_string()),
            provider: Provider::CardGateway,
            method: PaymentMethod::Card,
            amount: dec!(5000),
            currency: Default::default(),
            clinic_id: "clinic-1".into(),
            invoice_id: Some("inv-1".into()),
            patient_id: None,
            customer_email: "patient@example.com".into(),
            customer_phone: None,
            metadata: serde_json::Value::Null,
        })
        .await
        .unwrap();
}

fn payments_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/payments")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn card_webhook_request(payload: &serde_json::Value, secret: &str) -> Request<Body> {
    let raw = payload.to_string();
    let signature = sign_card_webhook(raw.as_bytes(), secret);
    Request::builder()
        .method(Method::POST)
        .uri("/webhook?provider=card")
        .header("Content-Type", "application/json")
        .header("x-gateway-signature", signature)
        .body(Body::from(raw))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _store) = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_action_is_client_error() {
    let (app, _store) = test_app().await;
    let response = app
        .oneshot(payments_request(serde_json::json!({
            "action": "steal-the-money"
        })))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_record_payment_roundtrip() {
    let (app, store) = test_app().await;

    let response = app
        .clone()
        .oneshot(payments_request(serde_json::json!({
            "action": "record-payment",
            "reference": "INS-CLAIM-77",
            "amount": "15000",
            "method": "INSURANCE",
            "clinic_id": "clinic-1",
            "customer_email": "billing@insurer.example.com",
            "invoice_id": "inv-5"
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    assert_eq!(body["success"], serde_json::json!(true));
    assert_eq!(body["data"]["status"], serde_json::json!("COMPLETED"));

    let stored = store
        .get_by_reference("INS-CLAIM-77")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TransactionStatus::Completed);
    assert_eq!(stored.provider, Provider::Manual);

    // Same claim posted again: idempotent, not a second payment.
    let replay = app
        .oneshot(payments_request(serde_json::json!({
            "action": "record-payment",
            "reference": "INS-CLAIM-77",
            "amount": "15000",
            "method": "INSURANCE",
            "clinic_id": "clinic-1",
            "customer_email": "billing@insurer.example.com"
        })))
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::CREATED);

    let history = store.list_by_clinic("clinic-1", None).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_payment_history_endpoint() {
    let (app, store) = test_app().await;
    seed_pending_card(&store, "CP-HISTORY1").await;

    let response = app
        .oneshot(payments_request(serde_json::json!({
            "action": "get-payment-history",
            "clinic_id": "clinic-1"
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["reference"], serde_json::json!("CP-HISTORY1"));
}

#[tokio::test]
async fn test_signed_card_webhook_completes_transaction() {
    let (app, store) = test_app().await;
    seed_pending_card(&store, "CP-WEBHOOK1").await;

    // Amounts on the wire are minor units; 5000.00 KES = 500000.
    let payload = serde_json::json!({
        "event": "charge.success",
        "data": {
            "reference": "CP-WEBHOOK1",
            "amount": 500000,
            "id": 987654,
            "gateway_response": "Approved"
        }
    });

    let response = app
        .clone()
        .oneshot(card_webhook_request(&payload, WEBHOOK_SECRET))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["disposition"], serde_json::json!("applied"));

    let stored = store.get_by_reference("CP-WEBHOOK1").await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Completed);
    assert_eq!(stored.external_id.as_deref(), Some("987654"));

    // Redelivery of the same signed event: acknowledged as a duplicate.
    let replay = app
        .oneshot(card_webhook_request(&payload, WEBHOOK_SECRET))
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::OK);
    let body = json_body(replay).await;
    assert_eq!(body["disposition"], serde_json::json!("duplicate"));
}

#[tokio::test]
async fn test_tampered_card_webhook_rejected() {
    let (app, store) = test_app().await;
    seed_pending_card(&store, "CP-TAMPER1").await;

    let payload = serde_json::json!({
        "event": "charge.success",
        "data": { "reference": "CP-TAMPER1", "amount": 500000 }
    });

    // Signed with the wrong secret.
    let response = app
        .oneshot(card_webhook_request(&payload, "whsec_wrong"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let stored = store.get_by_reference("CP-TAMPER1").await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn test_signed_non_charge_event_acked_with_200() {
    let (app, store) = test_app().await;
    seed_pending_card(&store, "CP-NONCHARGE1").await;

    // Correctly signed, but an event type the engine does not reconcile.
    // A non-2xx here would make the gateway redeliver it forever.
    let payload = serde_json::json!({
        "event": "refund.processed",
        "data": { "reference": "CP-NONCHARGE1", "amount": 500000 }
    });

    let response = app
        .oneshot(card_webhook_request(&payload, WEBHOOK_SECRET))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["disposition"], serde_json::json!("unhandled"));

    // Stored for the audit trail; the payment itself is untouched.
    let orphans = store.list_orphan_events(10).await.unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].event_key, "unhandled:refund.processed");
    let stored = store.get_by_reference("CP-NONCHARGE1").await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn test_unknown_provider_rejected() {
    let (app, _store) = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/webhook?provider=carrier-pigeon")
                .header("Content-Type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mobile_money_callback_with_token() {
    let (app, store) = test_app().await;

    // No matching transaction yet: verified events are stored, not dropped.
    let payload = serde_json::json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_NOTSEEN",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        { "Name": "Amount", "Value": 300.0 },
                        { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" }
                    ]
                }
            }
        }
    });

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(format!("/webhook?provider=mobilemoney&token={}", MOBILE_TOKEN))
                .header("Content-Type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["disposition"], serde_json::json!("orphaned"));

    let orphans = store.list_orphan_events(10).await.unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].event_key, "ws_CO_NOTSEEN");

    // Missing token: rejected before parsing.
    let rejected = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/webhook?provider=mobilemoney")
                .header("Content-Type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
}
