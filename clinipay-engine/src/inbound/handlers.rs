//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use clinipay_types::{
    AppError, NewTransaction, PaymentAction, PaymentMethod, Provider, TransactionStore,
};

use crate::service::{PaymentEngine, WebhookDisposition};

/// Header carrying the card gateway's HMAC hex digest.
pub const CARD_SIGNATURE_HEADER: &str = "x-gateway-signature";

/// Application state shared across handlers.
pub struct AppState<S: TransactionStore> {
    pub engine: PaymentEngine<S>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::UpstreamFailed(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

fn envelope<T: serde::Serialize>(data: T) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true, "data": data }))
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// Single payments entry point, dispatched on the body's `action` field.
#[tracing::instrument(skip(state, action))]
pub async fn payments<S: TransactionStore>(
    State(state): State<Arc<AppState<S>>>,
    Json(action): Json<PaymentAction>,
) -> Result<Response, ApiError> {
    let engine = &state.engine;

    let response = match action {
        PaymentAction::InitializeCard {
            amount,
            currency,
            clinic_id,
            customer_email,
            invoice_id,
            patient_id,
            metadata,
        } => {
            let out = engine
                .initialize(
                    Provider::CardGateway,
                    NewTransaction {
                        reference: None,
                        provider: Provider::CardGateway,
                        method: PaymentMethod::Card,
                        amount,
                        currency,
                        clinic_id,
                        invoice_id,
                        patient_id,
                        customer_email,
                        customer_phone: None,
                        metadata,
                    },
                )
                .await?;
            (StatusCode::CREATED, envelope(out)).into_response()
        }

        PaymentAction::InitializeMobileMoney {
            amount,
            currency,
            clinic_id,
            customer_email,
            customer_phone,
            invoice_id,
            patient_id,
            metadata,
        } => {
            let out = engine
                .initialize(
                    Provider::MobileMoneyGateway,
                    NewTransaction {
                        reference: None,
                        provider: Provider::MobileMoneyGateway,
                        method: PaymentMethod::MobileMoney,
                        amount,
                        currency,
                        clinic_id,
                        invoice_id,
                        patient_id,
                        customer_email,
                        customer_phone: Some(customer_phone),
                        metadata,
                    },
                )
                .await?;
            (StatusCode::CREATED, envelope(out)).into_response()
        }

        PaymentAction::VerifyCard { reference } => {
            let out = engine.verify(&reference).await?;
            envelope(out).into_response()
        }

        PaymentAction::CheckMobileMoneyStatus {
            checkout_request_id,
        } => {
            let out = engine.check_mobile_money(&checkout_request_id).await?;
            envelope(out).into_response()
        }

        PaymentAction::ProcessRefund {
            reference,
            amount,
            reason,
        } => {
            let out = engine.refund(&reference, amount, &reason).await?;
            envelope(out).into_response()
        }

        PaymentAction::RecordPayment {
            reference,
            amount,
            currency,
            method,
            clinic_id,
            customer_email,
            invoice_id,
            patient_id,
        } => {
            let out = engine
                .record_payment(NewTransaction {
                    reference: Some(reference),
                    provider: Provider::Manual,
                    method,
                    amount,
                    currency,
                    clinic_id,
                    invoice_id,
                    patient_id,
                    customer_email,
                    customer_phone: None,
                    metadata: serde_json::Value::Null,
                })
                .await?;
            (StatusCode::CREATED, envelope(out)).into_response()
        }

        PaymentAction::GetPaymentHistory {
            clinic_id,
            patient_id,
        } => {
            let out = engine.history(&clinic_id, patient_id.as_deref()).await?;
            envelope(out).into_response()
        }
    };

    Ok(response)
}

/// Query parameters for the webhook endpoint.
#[derive(Debug, Deserialize)]
pub struct WebhookParams {
    pub provider: String,
    /// Shared callback secret for the mobile-money rail
    pub token: Option<String>,
}

/// Provider webhook ingestion.
///
/// The body is taken as raw bytes: authenticity is checked over the exact
/// bytes the provider signed, before any JSON parsing.
#[tracing::instrument(skip(state, headers, body), fields(provider = %params.provider))]
pub async fn webhook<S: TransactionStore>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<WebhookParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let (provider, signature) = match params.provider.as_str() {
        "card" => {
            let sig = headers
                .get(CARD_SIGNATURE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            (Provider::CardGateway, sig)
        }
        "mobilemoney" => (Provider::MobileMoneyGateway, params.token.clone()),
        other => {
            return Err(AppError::BadRequest(format!("unknown provider '{}'", other)).into());
        }
    };

    let disposition = state
        .engine
        .ingest_webhook(provider, &body, signature.as_deref())
        .await?;

    // Every accepted event gets a 200, otherwise the provider retries.
    let body = match &disposition {
        WebhookDisposition::Applied(tx)
        | WebhookDisposition::Duplicate(tx)
        | WebhookDisposition::Conflicted(tx) => serde_json::json!({
            "received": true,
            "disposition": disposition.as_str(),
            "reference": tx.reference,
        }),
        WebhookDisposition::Orphaned | WebhookDisposition::Unhandled => serde_json::json!({
            "received": true,
            "disposition": disposition.as_str(),
        }),
    };

    Ok(Json(body).into_response())
}
