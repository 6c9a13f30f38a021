/// Header carrying the millisecond timestamp of a webhook delivery.
pub const HEADER_TIMESTAMP: &str = "X-Cord-Timestamp";

/// Header carrying the base64 HMAC-SHA256 signature of a webhook delivery.
pub const HEADER_SIGNATURE: &str = "X-Cord-Signature";

/// Default maximum age of a webhook delivery, in seconds.
pub const DEFAULT_WEBHOOK_ACCEPT_AGE_SECS: u64 = 300;

/// Time the sender waits for a 200 response before retrying, in seconds.
pub const WEBHOOK_RESPONSE_BUDGET_SECS: u64 = 3;

/// Prefix of an external ID that names an internal ID directly.
pub const INTERNAL_ID_PREFIX: &str = "cord:";

/// Prefix of locally allocated IDs that the server has not confirmed yet.
pub const OPTIMISTIC_ID_PREFIX: &str = "optimistic-";

/// Webhook event type tags.
pub const EVENT_THREAD_MESSAGE_ADDED: &str = "thread-message-added";
pub const EVENT_NOTIFICATION_CREATED: &str = "notification-created";
pub const EVENT_URL_VERIFICATION: &str = "url-verification";
