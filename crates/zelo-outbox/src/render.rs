//! Document renderer contract and template substitution.
//!
//! Proposal and contract PDFs are produced by an external rendering
//! service; the outbox treats it as an opaque byte-producing function
//! behind [`DocumentRenderer`]. Template substitution for message text and
//! captions is a plain `{{variable}}` scan with no escaping or nesting.

use std::{collections::HashMap, fmt, time::Duration};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use zelo_core::Quote;

use crate::error::{OutboxError, Result};

/// A rendered document ready to hand to the bridge.
///
/// The caption may still contain `{{variable}}` placeholders; the executor
/// substitutes quote fields into it before sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// File name presented to the recipient.
    pub file_name: String,
    /// MIME type of the document.
    pub mime_type: String,
    /// Raw document bytes.
    pub content: Vec<u8>,
    /// Caption template for the accompanying message.
    pub caption: String,
}

/// Produces proposal and contract documents from a quote.
#[async_trait::async_trait]
pub trait DocumentRenderer: Send + Sync + fmt::Debug {
    /// Renders the proposal document for a quote.
    async fn render_proposta(&self, quote: &Quote) -> Result<RenderedDocument>;

    /// Renders the contract document for a quote.
    async fn render_contrato(&self, quote: &Quote) -> Result<RenderedDocument>;
}

/// Substitutes `{{variable}}` placeholders in a template.
///
/// Every placeholder must resolve; the first unresolved one fails the
/// render with a non-retryable error naming the variable.
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> Result<String> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // No closing braces: treat the remainder as literal text.
            output.push_str(&rest[start..]);
            return Ok(output);
        };
        let name = after[..end].trim();
        match variables.get(name) {
            Some(value) => output.push_str(value),
            None => {
                return Err(OutboxError::UnresolvedVariable {
                    name: name.to_string(),
                });
            }
        }
        rest = &after[end + 2..];
    }

    output.push_str(rest);
    Ok(output)
}

/// Configuration for the HTTP document renderer client.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Base URL of the rendering service.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3200".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderBody {
    file_name: String,
    mime_type: String,
    content: String,
    caption: String,
}

/// Production renderer client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDocumentRenderer {
    client: reqwest::Client,
    config: RendererConfig,
}

impl HttpDocumentRenderer {
    /// Creates the client from configuration.
    pub fn new(config: RendererConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OutboxError::internal(format!("failed to build renderer client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn render(&self, kind: &str, quote: &Quote) -> Result<RenderedDocument> {
        let url = format!("{}/render/{kind}", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(quote)
            .send()
            .await
            .map_err(|e| OutboxError::bridge(format!("renderer request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OutboxError::bridge(format!(
                "renderer returned HTTP {status}: {text}"
            )));
        }

        let body: RenderBody = response
            .json()
            .await
            .map_err(|e| OutboxError::bridge(format!("unreadable renderer response: {e}")))?;

        let content = BASE64
            .decode(body.content.as_bytes())
            .map_err(|e| OutboxError::invalid_document(format!("renderer content: {e}")))?;

        Ok(RenderedDocument {
            file_name: body.file_name,
            mime_type: body.mime_type,
            content,
            caption: body.caption,
        })
    }
}

#[async_trait::async_trait]
impl DocumentRenderer for HttpDocumentRenderer {
    async fn render_proposta(&self, quote: &Quote) -> Result<RenderedDocument> {
        self.render("proposta", quote).await
    }

    async fn render_contrato(&self, quote: &Quote) -> Result<RenderedDocument> {
        self.render("contrato", quote).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn substitutes_all_placeholders() {
        let result = render_template(
            "Olá {{nome}}, sua mensalidade é {{valor}}.",
            &vars(&[("nome", "Maria"), ("valor", "R$ 1.899,00")]),
        )
        .unwrap();
        assert_eq!(result, "Olá Maria, sua mensalidade é R$ 1.899,00.");
    }

    #[test]
    fn unresolved_placeholder_names_the_variable() {
        let error = render_template("Olá {{nome}}", &HashMap::new()).unwrap_err();
        match error {
            OutboxError::UnresolvedVariable { name } => assert_eq!(name, "nome"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn placeholder_names_are_trimmed() {
        let result = render_template("{{ nome }}", &vars(&[("nome", "Ana")])).unwrap();
        assert_eq!(result, "Ana");
    }

    #[test]
    fn repeated_placeholders_each_substitute() {
        let result = render_template("{{x}} e {{x}}", &vars(&[("x", "a")])).unwrap();
        assert_eq!(result, "a e a");
    }

    #[test]
    fn text_without_placeholders_passes_through() {
        let result = render_template("sem variáveis", &HashMap::new()).unwrap();
        assert_eq!(result, "sem variáveis");
    }

    #[test]
    fn unclosed_braces_are_literal() {
        let result = render_template("abc {{nome", &HashMap::new()).unwrap();
        assert_eq!(result, "abc {{nome");
    }
}
