use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Command channel closed")]
    ChannelClosed,

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),
}
