//! Card/redirect gateway adapter.
//!
//! Initialize is synchronous and returns a hosted redirect URL; verification
//! is a direct pull query keyed by the engine reference. The gateway's API
//! deals in minor currency units, so conversion happens here and nowhere
//! else.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;

use clinipay_types::{
    Currency, DomainError, EventKey, InitializePayment, PaymentOutcome, PaymentProvider, Provider,
    ProviderEvent, ProviderHandle, ProviderRefund, ProviderVerdict, RefundStatus, WebhookPayload,
    validate_email,
};

use crate::config::CardGatewayConfig;
use crate::signature::verify_card_webhook;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Converts a major-unit amount to the gateway's minor units.
fn to_minor_units(amount: Decimal, currency: Currency) -> Result<i64, DomainError> {
    let _ = currency; // all supported currencies carry two decimal places
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| DomainError::Validation(format!("amount {} out of range", amount)))
}

fn from_minor_units(minor: i64) -> Decimal {
    Decimal::from(minor) / Decimal::from(100)
}

#[derive(Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Deserialize)]
struct VerifyData {
    status: String,
    id: Option<i64>,
    amount: Option<i64>,
    gateway_response: Option<String>,
}

#[derive(Deserialize)]
struct RefundData {
    id: i64,
    status: String,
}

/// Adapter for the card/redirect gateway.
pub struct CardGatewayAdapter {
    cfg: CardGatewayConfig,
    client: reqwest::Client,
}

impl CardGatewayAdapter {
    pub fn new(cfg: CardGatewayConfig) -> Self {
        Self {
            cfg,
            client: reqwest::Client::new(),
        }
    }

    /// Unwraps the gateway's `{status, message, data}` envelope.
    fn unwrap_envelope<T>(envelope: Envelope<T>) -> Result<T, DomainError> {
        if !envelope.status {
            return Err(DomainError::Provider(envelope.message));
        }
        envelope
            .data
            .ok_or_else(|| DomainError::Provider("gateway response missing data".into()))
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, DomainError> {
        self.client
            .post(format!("{}{}", self.cfg.base_url, path))
            .bearer_auth(&self.cfg.secret_key)
            .timeout(REQUEST_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| DomainError::Provider(format!("card gateway request failed: {}", e)))
    }
}

#[async_trait]
impl PaymentProvider for CardGatewayAdapter {
    fn provider(&self) -> Provider {
        Provider::CardGateway
    }

    async fn initialize(&self, req: &InitializePayment) -> Result<ProviderHandle, DomainError> {
        // Fail fast before any network call.
        validate_email(&req.customer_email)?;
        if req.amount <= Decimal::ZERO {
            return Err(DomainError::Validation(
                "amount must be greater than zero".into(),
            ));
        }

        let body = serde_json::json!({
            "email": req.customer_email,
            "amount": to_minor_units(req.amount, req.currency)?,
            "currency": req.currency.to_string(),
            "reference": req.reference,
            "callback_url": self.cfg.callback_url,
            "metadata": req.metadata,
        });

        let response = self.post_json("/transaction/initialize", &body).await?;
        let envelope: Envelope<InitializeData> = response
            .json()
            .await
            .map_err(|e| DomainError::Provider(format!("malformed gateway response: {}", e)))?;
        let data = Self::unwrap_envelope(envelope)?;

        tracing::info!(reference = %data.reference, "card payment initialized");

        Ok(ProviderHandle {
            reference: data.reference,
            redirect_url: Some(data.authorization_url),
            checkout_request_id: None,
        })
    }

    async fn verify(&self, key: &EventKey) -> Result<ProviderVerdict, DomainError> {
        let reference = match key {
            EventKey::Reference(r) => r,
            EventKey::CheckoutRequestId(_) => {
                return Err(DomainError::Validation(
                    "card gateway verification is keyed by reference".into(),
                ));
            }
        };

        let response = self
            .client
            .get(format!(
                "{}/transaction/verify/{}",
                self.cfg.base_url, reference
            ))
            .bearer_auth(&self.cfg.secret_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| DomainError::Provider(format!("card gateway request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DomainError::NotFound(format!(
                "unknown transaction: {}",
                reference
            )));
        }

        let envelope: Envelope<VerifyData> = response
            .json()
            .await
            .map_err(|e| DomainError::Provider(format!("malformed gateway response: {}", e)))?;
        let data = Self::unwrap_envelope(envelope)?;

        let outcome = match data.status.as_str() {
            "success" => Some(PaymentOutcome::Completed),
            "failed" => Some(PaymentOutcome::Failed),
            // abandoned/ongoing/pending: charge not resolved yet
            _ => None,
        };

        Ok(ProviderVerdict {
            outcome,
            external_id: data.id.map(|id| id.to_string()),
            confirmed_amount: data.amount.map(from_minor_units),
            message: data.gateway_response,
        })
    }

    async fn refund(
        &self,
        reference: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<ProviderRefund, DomainError> {
        let body = serde_json::json!({
            "transaction": reference,
            "amount": to_minor_units(amount, Currency::KES)?,
            "merchant_note": reason,
        });

        let response = self.post_json("/refund", &body).await?;
        let envelope: Envelope<RefundData> = response
            .json()
            .await
            .map_err(|e| DomainError::Provider(format!("malformed gateway response: {}", e)))?;
        let data = Self::unwrap_envelope(envelope)?;

        let status = match data.status.as_str() {
            "processed" => RefundStatus::Completed,
            "failed" => RefundStatus::Failed,
            _ => RefundStatus::Pending,
        };

        Ok(ProviderRefund {
            refund_reference: data.id.to_string(),
            status,
        })
    }

    fn authenticate_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<(), DomainError> {
        let signature = signature.ok_or_else(|| {
            DomainError::Authenticity("missing card webhook signature header".into())
        })?;

        if !verify_card_webhook(raw_body, signature, &self.cfg.webhook_secret) {
            return Err(DomainError::Authenticity(
                "card webhook signature mismatch".into(),
            ));
        }

        Ok(())
    }

    fn parse_webhook(&self, raw_body: &[u8]) -> Result<WebhookPayload, DomainError> {
        let payload: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| DomainError::Provider(format!("malformed webhook payload: {}", e)))?;

        let event = payload
            .get("event")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DomainError::Provider("webhook payload missing event".into()))?;

        // The gateway sends refund and transfer events to the same URL;
        // only charge outcomes feed reconciliation.
        let outcome = match event {
            "charge.success" => PaymentOutcome::Completed,
            "charge.failed" => PaymentOutcome::Failed,
            other => {
                return Ok(WebhookPayload::Unhandled {
                    kind: other.to_string(),
                    raw: payload,
                });
            }
        };

        let data = payload
            .get("data")
            .ok_or_else(|| DomainError::Provider("webhook payload missing data".into()))?;

        let reference = data
            .get("reference")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DomainError::Provider("webhook payload missing reference".into()))?
            .to_string();

        let confirmed_amount = data.get("amount").and_then(|v| v.as_i64()).map(from_minor_units);
        let external_id = data.get("id").and_then(|v| v.as_i64()).map(|id| id.to_string());
        let error_message = (outcome == PaymentOutcome::Failed)
            .then(|| {
                data.get("gateway_response")
                    .and_then(|v| v.as_str())
                    .map(String::from)
            })
            .flatten();

        Ok(WebhookPayload::Event(ProviderEvent {
            key: EventKey::Reference(reference),
            outcome,
            confirmed_amount,
            external_id,
            error_message,
            raw: payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn adapter() -> CardGatewayAdapter {
        CardGatewayAdapter::new(CardGatewayConfig {
            secret_key: "sk_test".into(),
            webhook_secret: "whsec_test".into(),
            base_url: "https://gateway.invalid".into(),
            callback_url: "https://clinic.example/payments/return".into(),
        })
    }

    #[test]
    fn test_minor_unit_conversion() {
        assert_eq!(to_minor_units(dec!(5000), Currency::KES).unwrap(), 500_000);
        assert_eq!(to_minor_units(dec!(12.50), Currency::KES).unwrap(), 1250);
        assert_eq!(from_minor_units(1250), dec!(12.50));
    }

    #[test]
    fn test_parse_success_webhook() {
        let body = serde_json::json!({
            "event": "charge.success",
            "data": {
                "reference": "CP-ABC123",
                "amount": 500_000,
                "id": 9911,
                "gateway_response": "Approved"
            }
        });
        let raw = serde_json::to_vec(&body).unwrap();

        let WebhookPayload::Event(event) = adapter().parse_webhook(&raw).unwrap() else {
            panic!("expected a payment event");
        };
        assert_eq!(event.key, EventKey::Reference("CP-ABC123".into()));
        assert_eq!(event.outcome, PaymentOutcome::Completed);
        assert_eq!(event.confirmed_amount, Some(dec!(5000)));
        assert_eq!(event.external_id.as_deref(), Some("9911"));
        assert!(event.error_message.is_none());
    }

    #[test]
    fn test_parse_failed_webhook_keeps_message() {
        let body = serde_json::json!({
            "event": "charge.failed",
            "data": {
                "reference": "CP-ABC124",
                "gateway_response": "Insufficient funds"
            }
        });
        let raw = serde_json::to_vec(&body).unwrap();

        let WebhookPayload::Event(event) = adapter().parse_webhook(&raw).unwrap() else {
            panic!("expected a payment event");
        };
        assert_eq!(event.outcome, PaymentOutcome::Failed);
        assert_eq!(event.error_message.as_deref(), Some("Insufficient funds"));
    }

    #[test]
    fn test_parse_non_charge_event_is_unhandled_not_error() {
        let body = serde_json::json!({
            "event": "refund.processed",
            "data": { "reference": "CP-ABC125" }
        });
        let raw = serde_json::to_vec(&body).unwrap();

        let WebhookPayload::Unhandled { kind, .. } = adapter().parse_webhook(&raw).unwrap() else {
            panic!("expected an unhandled payload");
        };
        assert_eq!(kind, "refund.processed");
    }

    #[test]
    fn test_authenticate_requires_signature() {
        let result = adapter().authenticate_webhook(b"{}", None);
        assert!(matches!(result, Err(DomainError::Authenticity(_))));
    }

    #[test]
    fn test_authenticate_accepts_valid_signature() {
        let adapter = adapter();
        let body = br#"{"event":"charge.success"}"#;
        let signature = crate::signature::sign_card_webhook(body, "whsec_test");

        assert!(adapter.authenticate_webhook(body, Some(&signature)).is_ok());
        assert!(
            adapter
                .authenticate_webhook(b"tampered", Some(&signature))
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_initialize_rejects_bad_email_before_network() {
        let req = InitializePayment {
            reference: "CP-1".into(),
            amount: dec!(100),
            currency: Currency::KES,
            customer_email: "not-an-email".into(),
            customer_phone: None,
            metadata: serde_json::Value::Null,
        };

        // base_url is unreachable; a validation error proves no call was made.
        let result = adapter().initialize(&req).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }
}
