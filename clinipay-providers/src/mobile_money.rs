//! Mobile-money push-prompt gateway adapter.
//!
//! `initialize` triggers an asynchronous prompt on the customer's handset and
//! returns a provider-assigned checkout request id, not the final reference.
//! The authoritative confirmation usually arrives later via webhook carrying
//! a result code (0 = success); `verify` polls by checkout id in the
//! meantime. Prompts can silently time out on the handset with no webhook at
//! all, so callers re-verify explicitly after a bounded wait.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use tokio::sync::Mutex;

use clinipay_types::{
    DomainError, EventKey, InitializePayment, PaymentOutcome, PaymentProvider, Provider,
    ProviderEvent, ProviderHandle, ProviderRefund, ProviderVerdict, RefundStatus, WebhookPayload,
    normalize_phone,
};

use crate::config::MobileMoneyConfig;
use crate::signature::constant_time_token_eq;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result code pushed by the provider when the customer cancels the prompt.
const RESULT_CANCELLED_BY_USER: i64 = 1032;

/// Error code returned by the status query while the prompt is still open.
const ERROR_STILL_PROCESSING: &str = "500.001.1001";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PushResponse {
    response_code: String,
    response_description: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryResponse {
    result_code: Option<String>,
    result_desc: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Adapter for the mobile-money push-prompt gateway.
pub struct MobileMoneyAdapter {
    cfg: MobileMoneyConfig,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl MobileMoneyAdapter {
    pub fn new(cfg: MobileMoneyConfig) -> Self {
        Self {
            cfg,
            client: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    /// Derives the API password: Base64(shortcode + passkey + timestamp).
    fn password(&self, timestamp: &str) -> String {
        BASE64.encode(format!(
            "{}{}{}",
            self.cfg.shortcode, self.cfg.passkey, timestamp
        ))
    }

    fn timestamp() -> String {
        Utc::now().format("%Y%m%d%H%M%S").to_string()
    }

    /// Fetches (or reuses) an OAuth access token.
    async fn access_token(&self) -> Result<String, DomainError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.access_token.clone());
            }
        }

        let response = self
            .client
            .get(format!(
                "{}/oauth/v1/generate?grant_type=client_credentials",
                self.cfg.base_url
            ))
            .basic_auth(&self.cfg.consumer_key, Some(&self.cfg.consumer_secret))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| DomainError::Provider(format!("token request failed: {}", e)))?;

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Provider(format!("malformed token response: {}", e)))?;

        let expires_in: i64 = token.expires_in.parse().unwrap_or(3600);
        // Refresh one minute early to absorb clock skew.
        let expires_at = Utc::now() + chrono::Duration::seconds(expires_in - 60);

        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at,
        });

        Ok(access_token)
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, DomainError> {
        let token = self.access_token().await?;
        self.client
            .post(format!("{}{}", self.cfg.base_url, path))
            .bearer_auth(token)
            .timeout(REQUEST_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| DomainError::Provider(format!("mobile money request failed: {}", e)))
    }

    /// Whole currency units for the push API.
    fn whole_units(amount: Decimal) -> Result<i64, DomainError> {
        amount
            .round()
            .to_i64()
            .ok_or_else(|| DomainError::Validation(format!("amount {} out of range", amount)))
    }
}

#[async_trait]
impl PaymentProvider for MobileMoneyAdapter {
    fn provider(&self) -> Provider {
        Provider::MobileMoneyGateway
    }

    async fn initialize(&self, req: &InitializePayment) -> Result<ProviderHandle, DomainError> {
        // Fail fast before any network call.
        if req.amount <= Decimal::ZERO {
            return Err(DomainError::Validation(
                "amount must be greater than zero".into(),
            ));
        }
        let phone = req.customer_phone.as_deref().ok_or_else(|| {
            DomainError::Validation("phone number is required for mobile money".into())
        })?;
        let phone = normalize_phone(phone)?;

        let timestamp = Self::timestamp();
        let body = serde_json::json!({
            "BusinessShortCode": self.cfg.shortcode,
            "Password": self.password(&timestamp),
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": Self::whole_units(req.amount)?,
            "PartyA": phone,
            "PartyB": self.cfg.shortcode,
            "PhoneNumber": phone,
            "CallBackURL": format!("{}?token={}", self.cfg.callback_url, self.cfg.webhook_token),
            "AccountReference": req.reference,
            "TransactionDesc": "Clinic payment",
        });

        let response = self.post_json("/mpesa/stkpush/v1/processrequest", &body).await?;
        let push: PushResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Provider(format!("malformed push response: {}", e)))?;

        if push.response_code != "0" {
            return Err(DomainError::Provider(
                push.response_description
                    .unwrap_or_else(|| "push prompt rejected".into()),
            ));
        }

        let checkout_request_id = push.checkout_request_id.ok_or_else(|| {
            DomainError::Provider("push response missing CheckoutRequestID".into())
        })?;

        tracing::info!(
            reference = %req.reference,
            checkout_request_id = %checkout_request_id,
            "mobile money prompt sent"
        );

        Ok(ProviderHandle {
            reference: req.reference.clone(),
            redirect_url: None,
            checkout_request_id: Some(checkout_request_id),
        })
    }

    async fn verify(&self, key: &EventKey) -> Result<ProviderVerdict, DomainError> {
        let checkout_request_id = match key {
            EventKey::CheckoutRequestId(id) => id,
            EventKey::Reference(_) => {
                return Err(DomainError::Validation(
                    "mobile money verification is keyed by checkout request id".into(),
                ));
            }
        };

        let timestamp = Self::timestamp();
        let body = serde_json::json!({
            "BusinessShortCode": self.cfg.shortcode,
            "Password": self.password(&timestamp),
            "Timestamp": timestamp,
            "CheckoutRequestID": checkout_request_id,
        });

        let response = self.post_json("/mpesa/stkpushquery/v1/query", &body).await?;

        if !response.status().is_success() {
            let err: ApiError = response
                .json()
                .await
                .map_err(|e| DomainError::Provider(format!("malformed error response: {}", e)))?;

            // The query API reports an open prompt as an error; that is a
            // pending verdict, not a failure.
            if err.error_code.as_deref() == Some(ERROR_STILL_PROCESSING) {
                return Ok(ProviderVerdict {
                    outcome: None,
                    external_id: None,
                    confirmed_amount: None,
                    message: err.error_message,
                });
            }

            return Err(DomainError::Provider(
                err.error_message
                    .unwrap_or_else(|| "status query rejected".into()),
            ));
        }

        let query: QueryResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Provider(format!("malformed query response: {}", e)))?;

        let outcome = match query.result_code.as_deref() {
            Some("0") => Some(PaymentOutcome::Completed),
            Some(_) => Some(PaymentOutcome::Failed),
            None => None,
        };

        Ok(ProviderVerdict {
            outcome,
            external_id: None,
            confirmed_amount: None,
            message: query.result_desc,
        })
    }

    async fn refund(
        &self,
        reference: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<ProviderRefund, DomainError> {
        let body = serde_json::json!({
            "CommandID": "TransactionReversal",
            "TransactionID": reference,
            "Amount": Self::whole_units(amount)?,
            "ReceiverParty": self.cfg.shortcode,
            "RecieverIdentifierType": "11",
            "Remarks": reason,
            "ResultURL": format!("{}?token={}", self.cfg.callback_url, self.cfg.webhook_token),
            "QueueTimeOutURL": format!("{}?token={}", self.cfg.callback_url, self.cfg.webhook_token),
        });

        let response = self.post_json("/mpesa/reversal/v1/request", &body).await?;
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DomainError::Provider(format!("malformed reversal response: {}", e)))?;

        let conversation_id = payload
            .get("ConversationID")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DomainError::Provider("reversal response missing ConversationID".into()))?;

        // Reversals settle asynchronously; the caller re-checks later.
        Ok(ProviderRefund {
            refund_reference: conversation_id.to_string(),
            status: RefundStatus::Pending,
        })
    }

    fn authenticate_webhook(
        &self,
        _raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<(), DomainError> {
        // No provider signature exists on this rail; the callback URL carries
        // a shared-secret token instead.
        let token = signature.ok_or_else(|| {
            DomainError::Authenticity("missing mobile money callback token".into())
        })?;

        if !constant_time_token_eq(token, &self.cfg.webhook_token) {
            return Err(DomainError::Authenticity(
                "mobile money callback token mismatch".into(),
            ));
        }

        Ok(())
    }

    fn parse_webhook(&self, raw_body: &[u8]) -> Result<WebhookPayload, DomainError> {
        let payload: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| DomainError::Provider(format!("malformed callback payload: {}", e)))?;

        // Reversal results and queue-timeout notices land on the same URL as
        // STK callbacks but carry a top-level `Result` object instead.
        let Some(callback) = payload.get("Body").and_then(|b| b.get("stkCallback")) else {
            let kind = if payload.get("Result").is_some() {
                "reversal-result"
            } else {
                "unrecognized-callback"
            };
            return Ok(WebhookPayload::Unhandled {
                kind: kind.to_string(),
                raw: payload,
            });
        };

        let checkout_request_id = callback
            .get("CheckoutRequestID")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                DomainError::Provider("callback payload missing CheckoutRequestID".into())
            })?
            .to_string();

        let result_code = callback
            .get("ResultCode")
            .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .ok_or_else(|| DomainError::Provider("callback payload missing ResultCode".into()))?;

        let result_desc = callback
            .get("ResultDesc")
            .and_then(|v| v.as_str())
            .map(String::from);

        // CallbackMetadata is only present on success.
        let mut confirmed_amount = None;
        let mut external_id = None;
        if let Some(items) = callback
            .get("CallbackMetadata")
            .and_then(|m| m.get("Item"))
            .and_then(|i| i.as_array())
        {
            for item in items {
                match item.get("Name").and_then(|n| n.as_str()) {
                    Some("Amount") => {
                        confirmed_amount = item
                            .get("Value")
                            .and_then(|v| Decimal::from_str(&v.to_string()).ok());
                    }
                    Some("MpesaReceiptNumber") => {
                        external_id = item
                            .get("Value")
                            .and_then(|v| v.as_str())
                            .map(String::from);
                    }
                    _ => {}
                }
            }
        }

        let (outcome, error_message) = if result_code == 0 {
            (PaymentOutcome::Completed, None)
        } else {
            let desc = result_desc.unwrap_or_else(|| {
                if result_code == RESULT_CANCELLED_BY_USER {
                    "Request cancelled by user".into()
                } else {
                    format!("payment failed with result code {}", result_code)
                }
            });
            (PaymentOutcome::Failed, Some(desc))
        };

        Ok(WebhookPayload::Event(ProviderEvent {
            key: EventKey::CheckoutRequestId(checkout_request_id),
            outcome,
            confirmed_amount,
            external_id,
            error_message,
            raw: payload,
        }))
    }
}
