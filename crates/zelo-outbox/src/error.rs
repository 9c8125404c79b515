//! Failure taxonomy for enqueue and delivery.
//!
//! The worker's transition logic keys off two properties of an error: whether
//! it can succeed on a later attempt ([`is_retryable`](OutboxError::is_retryable))
//! and whether the bridge is deliberately rejecting traffic
//! ([`is_circuit_open`](OutboxError::is_circuit_open)). Everything else is
//! immediately terminal.

use thiserror::Error;
use zelo_core::{CoreError, PayloadError, QuoteId, TemplateId};

/// Result type alias for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;

/// Errors produced while enqueuing or delivering a message.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// Destination number is malformed or not mobile-capable.
    #[error("invalid phone {phone}: {reason}")]
    InvalidPhone {
        /// The rejected number as supplied by the caller.
        phone: String,
        /// Why the number was rejected.
        reason: String,
    },

    /// Payload failed structural validation or could not be parsed.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),

    /// SEND_TEMPLATE referenced a template that does not exist.
    #[error("template not found: {id}")]
    TemplateMissing {
        /// Identifier the payload referenced.
        id: TemplateId,
    },

    /// SEND_TEMPLATE referenced a template that was deactivated.
    #[error("template is inactive: {id}")]
    TemplateInactive {
        /// Identifier the payload referenced.
        id: TemplateId,
    },

    /// A `{{variable}}` placeholder had no value to substitute.
    #[error("unresolved template variable: {name}")]
    UnresolvedVariable {
        /// Name of the placeholder that stayed unresolved.
        name: String,
    },

    /// SEND_PROPOSTA or SEND_CONTRATO referenced a quote that does not exist.
    #[error("quote not found: {id}")]
    QuoteNotFound {
        /// Identifier the payload referenced.
        id: QuoteId,
    },

    /// Embedded document content could not be decoded.
    #[error("invalid document content: {reason}")]
    InvalidDocument {
        /// Why decoding failed.
        reason: String,
    },

    /// The chat bridge rejected or failed the send.
    #[error("bridge error: {message}")]
    Bridge {
        /// Failure text from the bridge or transport.
        message: String,
    },

    /// The bridge is deliberately rejecting new attempts for now.
    #[error("bridge circuit is open")]
    CircuitOpen,

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] CoreError),

    /// Unexpected internal failure.
    #[error("internal error: {message}")]
    Internal {
        /// Internal failure text.
        message: String,
    },
}

impl OutboxError {
    /// Creates an invalid-phone error.
    pub fn invalid_phone(phone: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPhone {
            phone: phone.into(),
            reason: reason.into(),
        }
    }

    /// Creates a bridge error from a failure message.
    pub fn bridge(message: impl Into<String>) -> Self {
        Self::Bridge {
            message: message.into(),
        }
    }

    /// Creates an invalid-document error.
    pub fn invalid_document(reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            reason: reason.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true when a later attempt could still succeed.
    ///
    /// Bridge and storage failures are transient; everything discoverable
    /// from the payload itself (phone, template, variables, linked records)
    /// stays broken no matter how often it is retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Bridge { .. } | Self::Storage(_) => true,

            Self::InvalidPhone { .. }
            | Self::InvalidPayload(_)
            | Self::TemplateMissing { .. }
            | Self::TemplateInactive { .. }
            | Self::UnresolvedVariable { .. }
            | Self::QuoteNotFound { .. }
            | Self::InvalidDocument { .. }
            | Self::CircuitOpen
            | Self::Internal { .. } => false,
        }
    }

    /// Returns true for the distinguished circuit-open condition, which is
    /// rescheduled on a short fixed delay without consuming retry budget.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen)
    }
}
