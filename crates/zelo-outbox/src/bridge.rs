//! Chat bridge contract and its HTTP implementation.
//!
//! The bridge is the external service that actually talks to the chat
//! provider. The outbox only depends on the [`ChatBridge`] trait; the
//! HTTP client here is the production implementation and tests substitute
//! a scripted stub.

use std::{fmt, time::Duration};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{OutboxError, Result};

/// Error code the bridge returns while its circuit breaker is open.
pub const CIRCUIT_OPEN_CODE: &str = "CIRCUIT_OPEN";

/// Content handed to the bridge for one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Plain or rendered text.
    Text {
        /// Message body.
        text: String,
    },
    /// Document attachment with caption.
    Document {
        /// File name presented to the recipient.
        file_name: String,
        /// MIME type of the attachment.
        mime_type: String,
        /// Caption shown alongside the document.
        caption: String,
        /// Raw document bytes.
        content: Vec<u8>,
    },
}

/// Outcome of a bridge send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeResponse {
    /// Whether the provider accepted the message.
    pub success: bool,
    /// Provider-assigned message identifier on success.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Failure text on rejection.
    #[serde(default)]
    pub error: Option<String>,
    /// Machine-readable failure code; `CIRCUIT_OPEN` is specially handled.
    #[serde(default)]
    pub error_code: Option<String>,
}

impl BridgeResponse {
    /// A successful send carrying the provider message id.
    pub fn ok(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
            error_code: None,
        }
    }

    /// A rejected send with a failure message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
            error_code: None,
        }
    }

    /// The distinguished circuit-open rejection.
    pub fn circuit_open() -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some("circuit breaker is open".to_string()),
            error_code: Some(CIRCUIT_OPEN_CODE.to_string()),
        }
    }

    /// Returns true when the bridge reported an open circuit.
    pub fn is_circuit_open(&self) -> bool {
        self.error_code.as_deref() == Some(CIRCUIT_OPEN_CODE)
    }
}

/// Sends messages through the external chat provider.
///
/// `Err` means the attempt never reached a provider verdict (network,
/// timeout) and is always retryable; a returned [`BridgeResponse`] carries
/// the provider's own verdict, including circuit-open.
#[async_trait::async_trait]
pub trait ChatBridge: Send + Sync + fmt::Debug {
    /// Delivers one message to the given E.164 number.
    async fn send(&self, phone: &str, message: &OutboundMessage) -> Result<BridgeResponse>;
}

/// Configuration for the HTTP chat bridge client.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base URL of the bridge service.
    pub base_url: String,
    /// Request timeout; delivery timeouts are the bridge's responsibility,
    /// this only bounds the HTTP round trip.
    pub timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3100".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBody<'a> {
    phone: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

/// Production bridge client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpChatBridge {
    client: reqwest::Client,
    config: BridgeConfig,
}

impl HttpChatBridge {
    /// Creates the client from configuration.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OutboxError::internal(format!("failed to build bridge client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl ChatBridge for HttpChatBridge {
    async fn send(&self, phone: &str, message: &OutboundMessage) -> Result<BridgeResponse> {
        let body = match message {
            OutboundMessage::Text { text } => SendBody {
                phone,
                kind: "text",
                text: Some(text),
                file_name: None,
                mime_type: None,
                caption: None,
                content: None,
            },
            OutboundMessage::Document {
                file_name,
                mime_type,
                caption,
                content,
            } => SendBody {
                phone,
                kind: "document",
                text: None,
                file_name: Some(file_name),
                mime_type: Some(mime_type),
                caption: Some(caption),
                content: Some(BASE64.encode(content)),
            },
        };

        let url = format!("{}/send", self.config.base_url.trim_end_matches('/'));
        debug!(url = %url, phone = %phone, "sending message through chat bridge");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OutboxError::bridge(format!("bridge request timed out: {e}"))
                } else {
                    OutboxError::bridge(format!("bridge request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            // The bridge reports business rejections in a 200 body; a non-2xx
            // status is the service itself misbehaving, which is retryable.
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "bridge returned an error status");
            return Err(OutboxError::bridge(format!(
                "bridge returned HTTP {status}: {text}"
            )));
        }

        response
            .json::<BridgeResponse>()
            .await
            .map_err(|e| OutboxError::bridge(format!("unreadable bridge response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_open_is_detected_by_code() {
        assert!(BridgeResponse::circuit_open().is_circuit_open());
        assert!(!BridgeResponse::failure("rejected").is_circuit_open());
        assert!(!BridgeResponse::ok("wamid-1").is_circuit_open());
    }

    #[test]
    fn response_parses_from_wire_form() {
        let response: BridgeResponse = serde_json::from_str(
            r#"{"success": false, "error": "throttled", "errorCode": "CIRCUIT_OPEN"}"#,
        )
        .unwrap();
        assert!(response.is_circuit_open());
        assert_eq!(response.error.as_deref(), Some("throttled"));
        assert!(response.message_id.is_none());
    }

    #[test]
    fn success_response_carries_message_id() {
        let response: BridgeResponse =
            serde_json::from_str(r#"{"success": true, "messageId": "abc"}"#).unwrap();
        assert!(response.success);
        assert_eq!(response.message_id.as_deref(), Some("abc"));
    }

    #[test]
    fn document_body_encodes_content() {
        let body = SendBody {
            phone: "+5511999998888",
            kind: "document",
            text: None,
            file_name: Some("contrato.pdf"),
            mime_type: Some("application/pdf"),
            caption: Some("Segue o contrato"),
            content: Some(BASE64.encode(b"hello")),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["type"], "document");
        assert_eq!(value["fileName"], "contrato.pdf");
        assert_eq!(value["content"], "aGVsbG8=");
        assert!(value.get("text").is_none());
    }
}
