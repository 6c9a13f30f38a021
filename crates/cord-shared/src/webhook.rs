//! Verification and decoding of webhook deliveries.
//!
//! A delivery carries a millisecond timestamp header, a signature header and
//! a raw body. The signature is `base64(HMAC-SHA256(secret, timestamp + ":" +
//! body))`. A delivery only becomes a typed [`WebhookEnvelope`] after the
//! signature and freshness checks pass: [`WebhookDelivery`] moves from
//! `Received` to `Verified` and only a verified delivery can be parsed.

use std::marker::PhantomData;
use std::time::Duration;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::constants::{
    DEFAULT_WEBHOOK_ACCEPT_AGE_SECS, EVENT_NOTIFICATION_CREATED, EVENT_THREAD_MESSAGE_ADDED,
    EVENT_URL_VERIFICATION,
};
use crate::core_data::{ClientUserData, CoreMessageData, CoreThreadData};
use crate::error::WebhookError;
use crate::notification::NotificationCreatedPayload;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy)]
pub struct ValidateOptions {
    /// Maximum distance between the delivery timestamp and now, either way.
    pub accept_age: Duration,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            accept_age: Duration::from_secs(DEFAULT_WEBHOOK_ACCEPT_AGE_SECS),
        }
    }
}

/// Compute the signature the sender attaches to a delivery.
pub fn sign_webhook_payload(
    secret: &str,
    timestamp: &str,
    body: &[u8],
) -> Result<String, WebhookError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::InvalidSecret)?;
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verify a delivery against the current wall clock.
pub fn validate_webhook_signature(
    body: &[u8],
    timestamp: Option<&str>,
    signature: Option<&str>,
    secret: &str,
    options: &ValidateOptions,
) -> Result<(), WebhookError> {
    validate_webhook_signature_at(
        body,
        timestamp,
        signature,
        secret,
        options,
        Utc::now().timestamp_millis(),
    )
}

/// Verify a delivery against an explicit `now` in Unix milliseconds.
pub fn validate_webhook_signature_at(
    body: &[u8],
    timestamp: Option<&str>,
    signature: Option<&str>,
    secret: &str,
    options: &ValidateOptions,
    now_ms: i64,
) -> Result<(), WebhookError> {
    let signature = signature.ok_or(WebhookError::MissingSignature)?;
    let timestamp = timestamp.ok_or(WebhookError::MissingTimestamp)?;

    let sent_ms: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| WebhookError::InvalidTimestamp(timestamp.to_string()))?;

    let max_age_ms = i64::try_from(options.accept_age.as_millis()).unwrap_or(i64::MAX);
    let age_ms = now_ms.saturating_sub(sent_ms).saturating_abs();
    if age_ms > max_age_ms {
        return Err(WebhookError::StaleTimestamp { age_ms, max_age_ms });
    }

    let expected = sign_webhook_payload(secret, timestamp, body)?;

    // Constant-time comparison.
    let expected_bytes = expected.as_bytes();
    let provided_bytes = signature.as_bytes();
    if expected_bytes.len() != provided_bytes.len()
        || expected_bytes.ct_eq(provided_bytes).unwrap_u8() != 1
    {
        return Err(WebhookError::SignatureMismatch);
    }

    Ok(())
}

/// Non-failing variant of [`validate_webhook_signature`].
pub fn is_valid_webhook_signature(
    body: &[u8],
    timestamp: Option<&str>,
    signature: Option<&str>,
    secret: &str,
    options: &ValidateOptions,
) -> bool {
    match validate_webhook_signature(body, timestamp, signature, secret, options) {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "Webhook signature rejected");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserToNotify {
    #[serde(flatten)]
    pub user: ClientUserData,
    #[serde(default)]
    pub reply_actions: Option<Vec<String>>,
}

/// Body of a `thread-message-added` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessageAddedPayload {
    pub message: CoreMessageData,
    pub thread: CoreThreadData,
    #[serde(default)]
    pub author: Option<ClientUserData>,
    #[serde(default)]
    pub users_to_notify: Vec<UserToNotify>,
}

/// Body of a `url-verification` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlVerificationPayload {
    #[serde(default)]
    pub message: String,
}

/// The closed set of webhook events.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    ThreadMessageAdded(Box<ThreadMessageAddedPayload>),
    NotificationCreated(Box<NotificationCreatedPayload>),
    UrlVerification(UrlVerificationPayload),
}

impl WebhookEvent {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::ThreadMessageAdded(_) => EVENT_THREAD_MESSAGE_ADDED,
            Self::NotificationCreated(_) => EVENT_NOTIFICATION_CREATED,
            Self::UrlVerification(_) => EVENT_URL_VERIFICATION,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EnvelopeHeader {
    #[serde(default, rename = "applicationID")]
    application_id: Option<String>,
    #[serde(default, rename = "projectID")]
    project_id: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

/// A decoded delivery: wrapper properties plus the typed event.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEnvelope {
    pub application_id: Option<String>,
    pub project_id: Option<String>,
    pub timestamp: Option<String>,
    pub event: WebhookEvent,
}

/// Decode a webhook body, dispatching on its `type` tag.
///
/// Unknown tags are an error: a new event type means the sender speaks a
/// newer protocol than this receiver.
pub fn parse_webhook_body(body: &str) -> Result<WebhookEnvelope, WebhookError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| WebhookError::MalformedBody(e.to_string()))?;

    let type_tag = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| WebhookError::MalformedBody("missing string `type` field".into()))?
        .to_string();

    // Older senders spread the event fields over the top level instead of
    // nesting them under `event`.
    let event_value = value.get("event").cloned().unwrap_or_else(|| value.clone());

    let event = match type_tag.as_str() {
        EVENT_THREAD_MESSAGE_ADDED => {
            WebhookEvent::ThreadMessageAdded(Box::new(decode_event(event_value)?))
        }
        EVENT_NOTIFICATION_CREATED => {
            WebhookEvent::NotificationCreated(Box::new(decode_event(event_value)?))
        }
        EVENT_URL_VERIFICATION => WebhookEvent::UrlVerification(decode_event(event_value)?),
        _ => return Err(WebhookError::UnknownEventType(type_tag)),
    };

    let header: EnvelopeHeader =
        serde_json::from_value(value).map_err(|e| WebhookError::MalformedBody(e.to_string()))?;

    Ok(WebhookEnvelope {
        application_id: header.application_id,
        project_id: header.project_id,
        timestamp: header.timestamp,
        event,
    })
}

fn decode_event<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
) -> Result<T, WebhookError> {
    serde_json::from_value(value).map_err(|e| WebhookError::MalformedBody(e.to_string()))
}

// ---------------------------------------------------------------------------
// Delivery state machine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Received;

#[derive(Debug)]
pub struct Verified;

/// A webhook delivery in state `S` (`Received` or `Verified`).
#[derive(Debug)]
pub struct WebhookDelivery<S> {
    body: Vec<u8>,
    timestamp: Option<String>,
    signature: Option<String>,
    _state: PhantomData<S>,
}

impl WebhookDelivery<Received> {
    pub fn receive(
        body: impl Into<Vec<u8>>,
        timestamp: Option<String>,
        signature: Option<String>,
    ) -> Self {
        Self {
            body: body.into(),
            timestamp,
            signature,
            _state: PhantomData,
        }
    }

    pub fn verify(
        self,
        secret: &str,
        options: &ValidateOptions,
    ) -> Result<WebhookDelivery<Verified>, WebhookError> {
        self.verify_at(secret, options, Utc::now().timestamp_millis())
    }

    pub fn verify_at(
        self,
        secret: &str,
        options: &ValidateOptions,
        now_ms: i64,
    ) -> Result<WebhookDelivery<Verified>, WebhookError> {
        validate_webhook_signature_at(
            &self.body,
            self.timestamp.as_deref(),
            self.signature.as_deref(),
            secret,
            options,
            now_ms,
        )?;
        Ok(WebhookDelivery {
            body: self.body,
            timestamp: self.timestamp,
            signature: self.signature,
            _state: PhantomData,
        })
    }
}

impl WebhookDelivery<Verified> {
    pub fn parse(self) -> Result<WebhookEnvelope, WebhookError> {
        let body = std::str::from_utf8(&self.body)
            .map_err(|e| WebhookError::MalformedBody(e.to_string()))?;
        parse_webhook_body(body)
    }
}
