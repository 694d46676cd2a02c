//! M-Pesa (Safaricom Daraja) client.
//!
//! Obtains OAuth client-credentials tokens, caches them for their lifetime,
//! and submits STK push (Lipa na M-Pesa Online) requests.

use crate::config::MpesaConfig;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Local};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

pub const TOKEN_PATH: &str = "/oauth/v1/generate";
pub const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
pub const CALLBACK_PATH: &str = "/api/mpesa/stk/callback";
pub const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";

/// A cached token is reused only while it has more than this much life left.
const TOKEN_EXPIRY_MARGIN_MS: i64 = 5_000;

#[derive(Debug, Error)]
pub enum MpesaError {
    #[error("M-Pesa not configured: {0}")]
    NotConfigured(&'static str),

    #[error("M-Pesa request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("M-Pesa responded with status {status}")]
    Rejected { status: u16, body: Value },

    #[error("Unexpected M-Pesa response: {0}")]
    InvalidResponse(String),
}

impl MpesaError {
    /// Provider-facing detail suitable for echoing back to the caller.
    pub fn details(&self) -> Option<Value> {
        match self {
            MpesaError::NotConfigured(_) => None,
            MpesaError::Transport(e) => Some(Value::String(e.to_string())),
            MpesaError::Rejected { body, .. } => Some(body.clone()),
            MpesaError::InvalidResponse(msg) => Some(Value::String(msg.clone())),
        }
    }
}

impl From<MpesaError> for AppError {
    fn from(err: MpesaError) -> Self {
        match err {
            MpesaError::NotConfigured(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
            other => AppError::Upstream {
                message: "Failed to initiate STK push".to_string(),
                details: other.details(),
            },
        }
    }
}

struct CachedToken {
    access_token: Secret<String>,
    expires_at_ms: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(deserialize_with = "string_or_number")]
    expires_in: i64,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("expires_in out of range")),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// STK push request body in the provider's field naming.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushPayload {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: String,
    pub amount: String,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

/// Settings an STK push cannot be built without.
struct StkSettings<'a> {
    shortcode: &'a str,
    passkey: &'a str,
    callback_base_url: &'a str,
}

/// Daraja client. Clones share the same token cache.
#[derive(Clone)]
pub struct MpesaClient {
    client: Client,
    config: MpesaConfig,
    token_cache: Arc<Mutex<Option<CachedToken>>>,
}

impl MpesaClient {
    pub fn new(config: MpesaConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            token_cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Check if every credential needed for an STK push is set.
    pub fn is_configured(&self) -> bool {
        self.config.is_complete()
    }

    /// Bearer token for the Daraja API, fetched on demand and cached until
    /// shortly before it expires.
    ///
    /// The cache lock is never held across the token request, so a stalled
    /// fetch only delays its own caller.
    pub async fn access_token(&self) -> Result<String, MpesaError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let key = self
            .config
            .consumer_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(MpesaError::NotConfigured("MPESA_CONSUMER_KEY is not set"))?;
        let secret = self
            .config
            .consumer_secret
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .filter(|s| !s.is_empty())
            .ok_or(MpesaError::NotConfigured("MPESA_CONSUMER_SECRET is not set"))?;

        let requested_at = now_millis();
        let url = format!("{}{}", self.config.api_base_url, TOKEN_PATH);
        let response = self
            .client
            .get(&url)
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(key, Some(secret))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(status = %status, "M-Pesa token request failed");
            return Err(MpesaError::Rejected {
                status: status.as_u16(),
                body: parse_body(&body),
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| MpesaError::InvalidResponse(format!("token response: {}", e)))?;

        tracing::debug!(expires_in = token.expires_in, "M-Pesa access token refreshed");

        let access_token = token.access_token.clone();
        *self.token_cache.lock().await = Some(CachedToken {
            access_token: Secret::new(token.access_token),
            expires_at_ms: requested_at + token.expires_in * 1000,
        });

        Ok(access_token)
    }

    async fn cached_token(&self) -> Option<String> {
        let cache = self.token_cache.lock().await;
        cache
            .as_ref()
            .filter(|cached| cached.expires_at_ms - now_millis() > TOKEN_EXPIRY_MARGIN_MS)
            .map(|cached| cached.access_token.expose_secret().clone())
    }

    fn stk_settings(&self) -> Result<StkSettings<'_>, MpesaError> {
        let shortcode = self
            .config
            .shortcode
            .as_deref()
            .ok_or(MpesaError::NotConfigured("MPESA_SHORTCODE is not set"))?;
        let passkey = self
            .config
            .passkey
            .as_ref()
            .map(|p| p.expose_secret().as_str())
            .ok_or(MpesaError::NotConfigured("MPESA_PASSKEY is not set"))?;
        let callback_base_url = self
            .config
            .callback_base_url
            .as_deref()
            .ok_or(MpesaError::NotConfigured("MPESA_CALLBACK_BASE_URL is not set"))?;

        Ok(StkSettings {
            shortcode,
            passkey,
            callback_base_url,
        })
    }

    /// Fail early, before any network call, if an STK push cannot be built.
    pub fn ensure_stk_configured(&self) -> Result<(), MpesaError> {
        self.stk_settings().map(|_| ())
    }

    /// Build the STK push body for `booking_id` at the given provider timestamp.
    pub fn build_stk_payload(
        &self,
        booking_id: &str,
        phone: &str,
        amount: &str,
        timestamp: &str,
    ) -> Result<StkPushPayload, MpesaError> {
        let settings = self.stk_settings()?;

        Ok(StkPushPayload {
            business_short_code: settings.shortcode.to_string(),
            password: stk_password(settings.shortcode, settings.passkey, timestamp),
            timestamp: timestamp.to_string(),
            transaction_type: TRANSACTION_TYPE.to_string(),
            amount: amount.to_string(),
            party_a: phone.to_string(),
            party_b: settings.shortcode.to_string(),
            phone_number: phone.to_string(),
            callback_url: format!(
                "{}{}",
                settings.callback_base_url.trim_end_matches('/'),
                CALLBACK_PATH
            ),
            account_reference: format!("Booking-{}", booking_id),
            transaction_desc: format!("Payment for booking {}", booking_id),
        })
    }

    /// Send an STK push prompt to `phone` for `amount`, referencing `booking_id`.
    ///
    /// Returns the provider's raw response body, which carries the
    /// `CheckoutRequestID` later echoed by the result callback.
    pub async fn stk_push(
        &self,
        booking_id: &str,
        phone: &str,
        amount: &str,
    ) -> Result<Value, MpesaError> {
        let payload =
            self.build_stk_payload(booking_id, phone, amount, &stk_timestamp(Local::now()))?;
        let token = self.access_token().await?;

        let url = format!("{}{}", self.config.api_base_url, STK_PUSH_PATH);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, body = %body, "M-Pesa STK push response");

        if !status.is_success() {
            tracing::error!(
                status = %status,
                booking_id = %booking_id,
                "M-Pesa STK push rejected"
            );
            return Err(MpesaError::Rejected {
                status: status.as_u16(),
                body: parse_body(&body),
            });
        }

        let response: Value = serde_json::from_str(&body)
            .map_err(|e| MpesaError::InvalidResponse(format!("STK push response: {}", e)))?;

        tracing::info!(
            booking_id = %booking_id,
            checkout_request_id = ?response.get("CheckoutRequestID"),
            "M-Pesa STK push accepted"
        );

        Ok(response)
    }
}

/// Provider timestamp: local time as `YYYYMMDDHHmmss`.
pub fn stk_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// `base64(shortcode + passkey + timestamp)`.
pub fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    general_purpose::STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
