// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Paystack integration for deposit initialization.
//!
//! Outbound calls carry the secret key as a bearer token and a bounded
//! timeout; a failed call fails the caller's request synchronously. Webhook
//! verification lives in the ledger engine, not here — this client only
//! speaks the outbound direction.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, thiserror::Error)]
pub enum PaystackError {
    #[error("Paystack request failed: {0}")]
    Request(String),

    #[error("{message}")]
    Rejected {
        message: String,
        details: Option<Value>,
    },

    #[error("Paystack response was invalid: {0}")]
    InvalidResponse(String),
}

/// A redirectable payment handle returned by the processor, passed through
/// to the client verbatim.
#[derive(Debug, Clone)]
pub struct DepositAuthorization {
    pub authorization_url: String,
    pub access_code: String,
}

#[derive(Debug, Clone)]
pub struct PaystackClient {
    api_base_url: String,
    secret_key: String,
    http: Client,
}

impl PaystackClient {
    pub fn new(api_base_url: impl Into<String>, secret_key: impl Into<String>) -> Result<Self, PaystackError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| PaystackError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_base_url: api_base_url.into(),
            secret_key: secret_key.into(),
            http,
        })
    }

    /// `POST /transaction/initialize` — returns the authorization URL and
    /// access code for the hosted payment page.
    pub async fn initialize_transaction(
        &self,
        email: &str,
        amount_minor: u64,
        reference: &str,
    ) -> Result<DepositAuthorization, PaystackError> {
        let payload = json!({
            "email": email,
            "amount": amount_minor,
            "reference": reference,
        });

        let response = self
            .http
            .post(format!(
                "{}/transaction/initialize",
                self.api_base_url.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| PaystackError::Request(format!("POST /transaction/initialize failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            // Surface the processor's own message when the body parses
            let details: Option<Value> = serde_json::from_str(&body).ok();
            let message = details
                .as_ref()
                .and_then(|value| value.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Failed to initialize payment ({status})"));
            return Err(PaystackError::Rejected { message, details });
        }

        let body: Value = response.json().await.map_err(|e| {
            PaystackError::InvalidResponse(format!("initialize returned invalid JSON: {e}"))
        })?;

        let authorization_url = body
            .pointer("/data/authorization_url")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PaystackError::InvalidResponse("missing authorization_url in response".to_string())
            })?
            .to_string();

        let access_code = body
            .pointer("/data/access_code")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PaystackError::InvalidResponse("missing access_code in response".to_string())
            })?
            .to_string();

        Ok(DepositAuthorization {
            authorization_url,
            access_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_explicit_config() {
        let client = PaystackClient::new("https://api.paystack.co", "sk_test_x").unwrap();
        assert_eq!(client.api_base_url, "https://api.paystack.co");
    }

    #[test]
    fn rejected_error_prefers_processor_message() {
        let details: Value =
            serde_json::from_str(r#"{"status":false,"message":"Invalid key"}"#).unwrap();
        let err = PaystackError::Rejected {
            message: details
                .get("message")
                .and_then(Value::as_str)
                .unwrap()
                .to_string(),
            details: Some(details),
        };
        assert_eq!(err.to_string(), "Invalid key");
    }
}
