//! Scripted stand-ins for the external collaborators.

use std::{
    collections::VecDeque,
    sync::Mutex,
};

use zelo_core::Quote;
use zelo_outbox::{
    BridgeResponse, ChatBridge, DocumentRenderer, OutboundMessage, OutboxError, RenderedDocument,
    Result, WorkerNotifier,
};

/// Chat bridge that replays a scripted sequence of responses.
///
/// Responses are consumed in push order; once the script runs out, every
/// further send succeeds with a generated message id. All calls are
/// recorded for assertions.
#[derive(Debug, Default)]
pub struct ScriptedBridge {
    script: Mutex<VecDeque<Result<BridgeResponse>>>,
    calls: Mutex<Vec<(String, OutboundMessage)>>,
}

impl ScriptedBridge {
    /// Creates a bridge with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a successful send returning the given provider id.
    pub fn push_success(&self, message_id: impl Into<String>) {
        self.push(Ok(BridgeResponse::ok(message_id)));
    }

    /// Scripts a provider rejection.
    pub fn push_failure(&self, error: impl Into<String>) {
        self.push(Ok(BridgeResponse::failure(error)));
    }

    /// Scripts a circuit-open rejection.
    pub fn push_circuit_open(&self) {
        self.push(Ok(BridgeResponse::circuit_open()));
    }

    /// Scripts a transport-level failure that never reached the provider.
    pub fn push_transport_error(&self, message: impl Into<String>) {
        self.push(Err(OutboxError::bridge(message)));
    }

    fn push(&self, response: Result<BridgeResponse>) {
        self.script.lock().unwrap().push_back(response);
    }

    /// Number of send attempts observed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Every observed call as `(phone, message)` pairs.
    pub fn calls(&self) -> Vec<(String, OutboundMessage)> {
        self.calls.lock().unwrap().clone()
    }

    /// The most recent call, panicking when none happened.
    pub fn last_call(&self) -> (String, OutboundMessage) {
        self.calls
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no bridge calls recorded")
    }
}

#[async_trait::async_trait]
impl ChatBridge for ScriptedBridge {
    async fn send(&self, phone: &str, message: &OutboundMessage) -> Result<BridgeResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((phone.to_string(), message.clone()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(BridgeResponse::ok(format!("wamid-{}", uuid::Uuid::new_v4()))))
    }
}

/// Renderer producing fixed documents with configurable captions.
#[derive(Debug, Clone)]
pub struct StaticRenderer {
    /// Caption template attached to proposal documents.
    pub proposta_caption: String,
    /// Caption template attached to contract documents.
    pub contrato_caption: String,
}

impl Default for StaticRenderer {
    fn default() -> Self {
        Self {
            proposta_caption: "Olá {{nome}}, segue sua proposta de {{valor}}.".to_string(),
            contrato_caption: "Olá {{nome}}, segue o contrato para assinatura.".to_string(),
        }
    }
}

impl StaticRenderer {
    /// Creates the renderer with default captions.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DocumentRenderer for StaticRenderer {
    async fn render_proposta(&self, quote: &Quote) -> Result<RenderedDocument> {
        Ok(RenderedDocument {
            file_name: format!("proposta-{}.pdf", quote.id),
            mime_type: "application/pdf".to_string(),
            content: b"%PDF-1.4 proposta".to_vec(),
            caption: self.proposta_caption.clone(),
        })
    }

    async fn render_contrato(&self, quote: &Quote) -> Result<RenderedDocument> {
        Ok(RenderedDocument {
            file_name: format!("contrato-{}.pdf", quote.id),
            mime_type: "application/pdf".to_string(),
            content: b"%PDF-1.4 contrato".to_vec(),
            caption: self.contrato_caption.clone(),
        })
    }
}

/// Notifier whose nudges always fail, for exercising the best-effort path.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingNotifier;

#[async_trait::async_trait]
impl WorkerNotifier for FailingNotifier {
    async fn nudge(&self) -> Result<()> {
        Err(OutboxError::internal("notifier unavailable"))
    }
}
