//! Provider-agnostic LLM integration for the brochure pipeline.
//!
//! This crate exposes a common [`traits::LlmClient`] interface, concrete
//! clients for Ollama and OpenAI-compatible endpoints, and the
//! [`links::LinkSelector`] that asks a model which sub-pages matter. It also
//! provides a convenience function to initialize a client from a
//! [`brochure_common::LlmConfig`].
//!
//! # Examples
//! ```no_run
//! use brochure_common::{LlmConfig, Result};
//! use brochure_llm::ensure_llm_ready;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let cfg = LlmConfig::default();
//! let client = ensure_llm_ready(&cfg).await?;
//! assert_eq!(client.model_name(), "llama3.2");
//! # Ok(())
//! # }
//! ```
pub mod links;
pub mod ollama;
pub mod openai;
pub mod traits;

use brochure_common::{BrochureError, LlmConfig};
use ollama::OllamaClient;
use openai::OpenAiClient;
use std::sync::Arc;
use traits::{GenerationOptions, LlmClient};

/// Build the configured client and make sure it can serve requests.
///
/// For Ollama this probes the server and pulls a missing model when
/// `pull_missing` is set. OpenAI-compatible clients are returned as-is.
pub async fn ensure_llm_ready(
    config: &LlmConfig,
) -> brochure_common::Result<Arc<dyn LlmClient + Send + Sync + 'static>> {
    match config {
        #[cfg(feature = "ollama")]
        LlmConfig::Ollama {
            model,
            endpoint,
            temperature,
            max_tokens,
            pull_missing,
        } => {
            let client = OllamaClient::new(endpoint, model.clone())?.with_options(
                GenerationOptions {
                    temperature: *temperature,
                    max_tokens: *max_tokens,
                },
            );
            client.ensure_ready(*pull_missing).await?;
            Ok(Arc::new(client))
        }
        #[cfg(feature = "openai")]
        LlmConfig::OpenAi {
            model,
            auth_token,
            endpoint,
            temperature,
            max_tokens,
        } => {
            if auth_token.trim().is_empty() {
                return Err(BrochureError::Config(
                    "OpenAI provider requires an auth_token".to_string(),
                ));
            }
            let client = OpenAiClient::new(endpoint, auth_token.clone(), model.clone())?
                .with_options(GenerationOptions {
                    temperature: *temperature,
                    max_tokens: *max_tokens,
                });
            Ok(Arc::new(client))
        }
        LlmConfig::None => Err(BrochureError::Config("No LLM configured".to_string())),
        #[allow(unreachable_patterns)]
        _ => Err(BrochureError::Config("LLM provider not enabled".to_string())),
    }
}
