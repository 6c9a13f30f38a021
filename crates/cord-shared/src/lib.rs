//! # cord-shared
//!
//! Types shared by every Cord crate: identifiers, locations and metadata,
//! the declarative thread filter, webhook verification and decoding, and
//! notification shapes.

pub mod constants;
pub mod core_data;
pub mod error;
pub mod notification;
pub mod protocol;
pub mod types;
pub mod webhook;

pub use error::WebhookError;
