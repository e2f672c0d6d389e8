//! Common types and utilities shared across the brochure crates.
//!
//! This crate defines the provider-agnostic LLM configuration, the
//! observability helpers, and the shared error type used throughout the
//! workspace. It stays dependency-light so every other crate can use it.
//!
//! # Overview
//!
//! - [`LlmConfig`]: which chat provider to talk to, and with which model
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`BrochureError`] and [`Result`]: shared error handling
//!
//! # Examples
//!
//! ```rust
//! use brochure_common::LlmConfig;
//!
//! let cfg = LlmConfig::default();
//! assert_eq!(cfg.provider_name(), "ollama");
//! assert_eq!(cfg.model(), Some("llama3.2"));
//! ```
use serde::{Deserialize, Serialize};

pub mod observability;

/// Default model used when the configuration names none.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";

/// Character budget of the brochure user prompt.
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 5000;

/// Configuration for the chat provider used by the link selector and the
/// brochure generator.
///
/// Feature flags control which variants are compiled in.
/// See the `brochure-llm` crate for the concrete clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum LlmConfig {
    #[cfg(feature = "ollama")]
    Ollama {
        #[serde(default = "default_ollama_model")]
        model: String,
        #[serde(default = "default_ollama_endpoint")]
        endpoint: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
        /// Pull the model through the Ollama API when it is not installed.
        #[serde(default = "default_true")]
        pull_missing: bool,
    },
    #[cfg(feature = "openai")]
    OpenAi {
        #[serde(default = "default_openai_model")]
        model: String,
        auth_token: String,
        #[serde(default = "default_openai_endpoint")]
        endpoint: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    None,
}

fn default_ollama_model() -> String {
    DEFAULT_OLLAMA_MODEL.into()
}
fn default_ollama_endpoint() -> String {
    DEFAULT_OLLAMA_ENDPOINT.into()
}
fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.into()
}
fn default_openai_endpoint() -> String {
    DEFAULT_OPENAI_ENDPOINT.into()
}
fn default_true() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        // Default to a local Ollama if the feature is enabled
        #[cfg(feature = "ollama")]
        {
            Self::Ollama {
                model: default_ollama_model(),
                endpoint: default_ollama_endpoint(),
                temperature: None,
                max_tokens: None,
                pull_missing: true,
            }
        }
        #[cfg(not(feature = "ollama"))]
        {
            Self::None
        }
    }
}

impl LlmConfig {
    /// Short provider name as written in configuration files.
    pub fn provider_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "ollama")]
            Self::Ollama { .. } => "ollama",
            #[cfg(feature = "openai")]
            Self::OpenAi { .. } => "openai",
            Self::None => "none",
        }
    }

    /// The configured model identifier, if a provider is configured.
    pub fn model(&self) -> Option<&str> {
        match self {
            #[cfg(feature = "ollama")]
            Self::Ollama { model, .. } => Some(model),
            #[cfg(feature = "openai")]
            Self::OpenAi { model, .. } => Some(model),
            Self::None => None,
        }
    }

    /// Replace the model identifier, keeping every other setting.
    ///
    /// ```rust
    /// use brochure_common::LlmConfig;
    ///
    /// let cfg = LlmConfig::default().with_model("qwen2.5:7b");
    /// assert_eq!(cfg.model(), Some("qwen2.5:7b"));
    /// ```
    pub fn with_model(mut self, new_model: impl Into<String>) -> Self {
        match &mut self {
            #[cfg(feature = "ollama")]
            Self::Ollama { model, .. } => *model = new_model.into(),
            #[cfg(feature = "openai")]
            Self::OpenAi { model, .. } => *model = new_model.into(),
            Self::None => {}
        }
        self
    }
}

/// Error types used across the brochure pipeline.
#[derive(thiserror::Error, Debug)]
pub enum BrochureError {
    /// A page could not be retrieved or decoded.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The chat provider failed or returned something unusable.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Writing to the display surface failed.
    #[error("Display error: {0}")]
    Display(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenient alias for results that use [`BrochureError`].
pub type Result<T> = std::result::Result<T, BrochureError>;
