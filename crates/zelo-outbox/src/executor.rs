//! Delivery executor.
//!
//! Turns one claimed item into one bridge call: resolves the intent into an
//! outbound message (looking up templates and quotes, rendering documents),
//! sends it, and applies the one post-send side effect that belongs to
//! delivery itself, the quote status stamp.

use std::{collections::HashMap, sync::Arc};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::{debug, warn};
use zelo_core::{
    models::{OutboxItem, Quote, QuoteStatus},
    payload::{MessageIntent, MessagePayload},
    time::Clock,
};

use crate::{
    bridge::{ChatBridge, OutboundMessage},
    error::{OutboxError, Result},
    render::{render_template, DocumentRenderer},
    store::OutboxStore,
};

/// Result of a successful delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    /// Identifier assigned by the chat provider, when it returned one.
    pub provider_message_id: Option<String>,
}

/// Variables available to quote-document captions.
fn quote_variables(quote: &Quote) -> HashMap<String, String> {
    HashMap::from([
        ("nome".to_string(), quote.customer_name.clone()),
        ("valor".to_string(), quote.formatted_total()),
        ("telefone".to_string(), quote.phone.clone()),
    ])
}

/// Executes one delivery attempt for a claimed item.
pub struct DeliveryExecutor {
    bridge: Arc<dyn ChatBridge>,
    renderer: Arc<dyn DocumentRenderer>,
    store: Arc<dyn OutboxStore>,
    clock: Arc<dyn Clock>,
}

impl DeliveryExecutor {
    /// Wires the executor from its collaborators.
    pub fn new(
        bridge: Arc<dyn ChatBridge>,
        renderer: Arc<dyn DocumentRenderer>,
        store: Arc<dyn OutboxStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bridge,
            renderer,
            store,
            clock,
        }
    }

    /// Attempts delivery of one item whose payload already parsed.
    ///
    /// Failures carry the taxonomy the worker's transition logic needs:
    /// retryable, terminal, or circuit-open.
    pub async fn execute(
        &self,
        item: &OutboxItem,
        payload: &MessagePayload,
    ) -> Result<DeliveryOutcome> {
        let message = self.resolve(payload).await?;
        debug!(item_id = %item.id, intent = payload.intent.name(), "attempting delivery");

        let response = self.bridge.send(&item.phone, &message).await?;
        if response.is_circuit_open() {
            return Err(OutboxError::CircuitOpen);
        }
        if !response.success {
            return Err(OutboxError::bridge(
                response
                    .error
                    .unwrap_or_else(|| "bridge rejected the message".to_string()),
            ));
        }

        // The message is out; a failed quote stamp must not undo that, so it
        // is logged and the outcome stands.
        let quote_stamp = match &payload.intent {
            MessageIntent::SendProposta { quote_id } => {
                Some((*quote_id, QuoteStatus::PropostaEnviada))
            }
            MessageIntent::SendContrato { quote_id } => {
                Some((*quote_id, QuoteStatus::ContratoEnviado))
            }
            _ => None,
        };
        if let Some((quote_id, quote_status)) = quote_stamp {
            if let Some(quote) = self.store.find_quote(quote_id).await? {
                if let Err(e) = self
                    .store
                    .record_quote_sent(quote_id, quote_status, quote.total_cents, self.clock.now())
                    .await
                {
                    warn!(item_id = %item.id, quote_id = %quote_id, error = %e,
                        "quote status update failed after delivery");
                }
            }
        }

        Ok(DeliveryOutcome {
            provider_message_id: response.message_id,
        })
    }

    /// Resolves an intent into the message handed to the bridge.
    async fn resolve(&self, payload: &MessagePayload) -> Result<OutboundMessage> {
        match &payload.intent {
            MessageIntent::SendText { text } => Ok(OutboundMessage::Text { text: text.clone() }),

            MessageIntent::SendTemplate {
                template_id,
                template_content,
                variables,
            } => {
                // Inline content wins over a stored template.
                let content = match (template_content, template_id) {
                    (Some(inline), _) => inline.clone(),
                    (None, Some(id)) => {
                        let template = self
                            .store
                            .find_template(*id)
                            .await?
                            .ok_or(OutboxError::TemplateMissing { id: *id })?;
                        if !template.active {
                            return Err(OutboxError::TemplateInactive { id: *id });
                        }
                        template.content
                    }
                    (None, None) => {
                        return Err(OutboxError::InvalidPayload(
                            zelo_core::PayloadError::TemplateSourceMissing,
                        ));
                    }
                };
                let text = render_template(&content, variables)?;
                Ok(OutboundMessage::Text { text })
            }

            MessageIntent::SendDocument {
                file_name,
                mime_type,
                caption,
                content,
            } => {
                let bytes = BASE64
                    .decode(content.as_bytes())
                    .map_err(|e| OutboxError::invalid_document(format!("bad base64: {e}")))?;
                Ok(OutboundMessage::Document {
                    file_name: file_name.clone(),
                    mime_type: mime_type.clone(),
                    caption: caption.clone(),
                    content: bytes,
                })
            }

            MessageIntent::SendProposta { quote_id } => {
                let quote = self.require_quote(*quote_id).await?;
                let document = self.renderer.render_proposta(&quote).await?;
                self.document_message(document, &quote)
            }

            MessageIntent::SendContrato { quote_id } => {
                let quote = self.require_quote(*quote_id).await?;
                let document = self.renderer.render_contrato(&quote).await?;
                self.document_message(document, &quote)
            }
        }
    }

    async fn require_quote(&self, id: zelo_core::models::QuoteId) -> Result<Quote> {
        self.store
            .find_quote(id)
            .await?
            .ok_or(OutboxError::QuoteNotFound { id })
    }

    fn document_message(
        &self,
        document: crate::render::RenderedDocument,
        quote: &Quote,
    ) -> Result<OutboundMessage> {
        let caption = render_template(&document.caption, &quote_variables(quote))?;
        Ok(OutboundMessage::Document {
            file_name: document.file_name,
            mime_type: document.mime_type,
            caption,
            content: document.content,
        })
    }
}
