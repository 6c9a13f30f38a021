use thiserror::Error;

/// Why a webhook delivery was rejected.
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Missing signature header")]
    MissingSignature,

    #[error("Missing timestamp header")]
    MissingTimestamp,

    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("Stale webhook: timestamp is {age_ms} ms away from now (max {max_age_ms} ms)")]
    StaleTimestamp { age_ms: i64, max_age_ms: i64 },

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Invalid signing secret")]
    InvalidSecret,

    #[error("Malformed webhook body: {0}")]
    MalformedBody(String),

    #[error("Unknown webhook event type: {0:?}")]
    UnknownEventType(String),
}

impl WebhookError {
    /// Authenticity failures, as opposed to shape failures of a body that
    /// was authentic.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingSignature
                | Self::MissingTimestamp
                | Self::InvalidTimestamp(_)
                | Self::StaleTimestamp { .. }
                | Self::SignatureMismatch
                | Self::InvalidSecret
        )
    }
}
