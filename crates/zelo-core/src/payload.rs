//! Message payload schema and validation.
//!
//! The payload is the JSON document stored in the outbox and re-parsed on
//! every delivery attempt. It uses the platform wire vocabulary: camelCase
//! field names and an `intent` tag selecting what to send.

use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{EvaluationId, QuoteId, ScheduledSendId, TemplateId};

/// Minimum length for the idempotency key and internal message id.
pub const MIN_IDENTITY_KEY_LEN: usize = 8;

/// Delivery channel for an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    /// WhatsApp via the chat bridge.
    Whatsapp,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whatsapp => write!(f, "WHATSAPP"),
        }
    }
}

/// Optional links from a message back to the platform records that caused
/// it. Side-effect subscribers key off these fields after delivery settles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    /// Evaluation to update with the delivery outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_id: Option<EvaluationId>,
    /// Scheduled send to settle with the delivery outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_send_id: Option<ScheduledSendId>,
}

impl MessageContext {
    /// Returns true when no platform record is linked.
    pub fn is_empty(&self) -> bool {
        self.evaluation_id.is_none() && self.scheduled_send_id.is_none()
    }
}

/// What to send, tagged by `intent` in the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent")]
pub enum MessageIntent {
    /// Plain text message.
    #[serde(rename = "SEND_TEXT", rename_all = "camelCase")]
    SendText {
        /// Message body.
        text: String,
    },

    /// Text message rendered from a template.
    ///
    /// Either `templateId` (a stored template) or `templateContent` (an
    /// inline body) must be present; inline content wins when both are.
    #[serde(rename = "SEND_TEMPLATE", rename_all = "camelCase")]
    SendTemplate {
        /// Stored template to render.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template_id: Option<TemplateId>,
        /// Inline template body.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template_content: Option<String>,
        /// Values substituted into `{{variable}}` placeholders.
        #[serde(default)]
        variables: HashMap<String, String>,
    },

    /// Document attachment with caption.
    #[serde(rename = "SEND_DOCUMENT", rename_all = "camelCase")]
    SendDocument {
        /// File name presented to the recipient.
        file_name: String,
        /// MIME type of the attachment.
        mime_type: String,
        /// Caption shown alongside the document.
        caption: String,
        /// Base64-encoded document bytes.
        content: String,
    },

    /// Proposal document generated from a quote.
    #[serde(rename = "SEND_PROPOSTA", rename_all = "camelCase")]
    SendProposta {
        /// Quote the proposal is generated from.
        quote_id: QuoteId,
    },

    /// Contract document generated from a quote.
    #[serde(rename = "SEND_CONTRATO", rename_all = "camelCase")]
    SendContrato {
        /// Quote the contract is generated from.
        quote_id: QuoteId,
    },
}

impl MessageIntent {
    /// Wire name of the intent tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendText { .. } => "SEND_TEXT",
            Self::SendTemplate { .. } => "SEND_TEMPLATE",
            Self::SendDocument { .. } => "SEND_DOCUMENT",
            Self::SendProposta { .. } => "SEND_PROPOSTA",
            Self::SendContrato { .. } => "SEND_CONTRATO",
        }
    }
}

/// The full message payload persisted with an outbox item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Delivery channel.
    pub channel: Channel,
    /// Deduplication key, at least [`MIN_IDENTITY_KEY_LEN`] characters.
    pub idempotency_key: String,
    /// Platform message identifier, at least [`MIN_IDENTITY_KEY_LEN`]
    /// characters.
    pub internal_message_id: String,
    /// When the payload was accepted.
    pub created_at: DateTime<Utc>,
    /// Links back to the platform records behind this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<MessageContext>,
    /// Free-form caller data carried along untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// What to send.
    #[serde(flatten)]
    pub intent: MessageIntent,
}

impl MessagePayload {
    /// Checks structural rules that serde alone cannot express.
    pub fn validate(&self) -> Result<(), PayloadError> {
        check_identity_key("idempotencyKey", &self.idempotency_key)?;
        check_identity_key("internalMessageId", &self.internal_message_id)?;

        match &self.intent {
            MessageIntent::SendText { text } => {
                if text.trim().is_empty() {
                    return Err(PayloadError::Empty { field: "text" });
                }
            }
            MessageIntent::SendTemplate {
                template_id,
                template_content,
                ..
            } => {
                if template_id.is_none() && template_content.is_none() {
                    return Err(PayloadError::TemplateSourceMissing);
                }
                if let Some(content) = template_content {
                    if content.trim().is_empty() {
                        return Err(PayloadError::Empty {
                            field: "templateContent",
                        });
                    }
                }
            }
            MessageIntent::SendDocument {
                file_name,
                mime_type,
                content,
                ..
            } => {
                if file_name.trim().is_empty() {
                    return Err(PayloadError::Empty { field: "fileName" });
                }
                if mime_type.trim().is_empty() {
                    return Err(PayloadError::Empty { field: "mimeType" });
                }
                if content.is_empty() {
                    return Err(PayloadError::Empty { field: "content" });
                }
            }
            MessageIntent::SendProposta { .. } | MessageIntent::SendContrato { .. } => {}
        }

        Ok(())
    }

    /// Parses a payload from its stored JSON form.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, PayloadError> {
        serde_json::from_value(value.clone()).map_err(|e| PayloadError::Json(e.to_string()))
    }

    /// Serializes the payload to its stored JSON form.
    pub fn to_value(&self) -> Result<serde_json::Value, PayloadError> {
        serde_json::to_value(self).map_err(|e| PayloadError::Json(e.to_string()))
    }
}

fn check_identity_key(field: &'static str, value: &str) -> Result<(), PayloadError> {
    if value.is_empty() {
        return Err(PayloadError::Empty { field });
    }
    if value.len() < MIN_IDENTITY_KEY_LEN {
        return Err(PayloadError::TooShort {
            field,
            min: MIN_IDENTITY_KEY_LEN,
        });
    }
    Ok(())
}

/// Validation and parse errors for message payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// A required field is empty or missing.
    #[error("{field} must not be empty")]
    Empty {
        /// Wire name of the offending field.
        field: &'static str,
    },

    /// An identity key is shorter than the required minimum.
    #[error("{field} must be at least {min} characters")]
    TooShort {
        /// Wire name of the offending field.
        field: &'static str,
        /// Minimum accepted length.
        min: usize,
    },

    /// SEND_TEMPLATE carried neither a template id nor inline content.
    #[error("SEND_TEMPLATE requires a templateId or inline templateContent")]
    TemplateSourceMissing,

    /// The stored JSON does not parse as a payload.
    #[error("payload is not valid json: {0}")]
    Json(String),
}
