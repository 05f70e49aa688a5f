use thiserror::Error;

/// Failure to hand an envelope to a parent destination.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Parent channel closed")]
    ChannelClosed,
    #[error("Destination refused origin: {0}")]
    OriginRefused(String),
    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// A failed network request, as seen by the caller that issued it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub stack: Option<String>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// Errors raised while reading from the host runtime (property getters, body duplication).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("Property access failed: {0}")]
    Accessor(String),
    #[error("Response body cannot be duplicated")]
    BodyUnavailable,
    #[error("{0}")]
    Other(String),
}

/// Errors from strict JSON rendering of host values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JsonError {
    #[error("Converting circular structure to JSON")]
    Circular,
    #[error("Do not know how to serialize a BigInt")]
    BigInt,
    #[error(transparent)]
    Host(#[from] HostError),
}
