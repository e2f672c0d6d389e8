use crate::traits::{ChatMessage, GenerationOptions, LlmClient, LlmResponse, TextStream};
use async_trait::async_trait;
use brochure_common::{BrochureError, Result};
use brochure_http::{HttpClient, HttpError, RequestOpts};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

const OLLAMA_CONNECTION_ERROR: &str = "No running Ollama server detected. Start it with: `ollama serve` (after installing). Install instructions: https://github.com/ollama/ollama";

/// Ollama client for local model inference.
///
/// Expects a running Ollama server (see https://github.com/ollama/ollama).
pub struct OllamaClient {
    http: HttpClient,
    model: String,
    options: GenerationOptions,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "ChatOptions::is_empty")]
    options: ChatOptions,
}

#[derive(Serialize, Default)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

impl ChatOptions {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.num_predict.is_none()
    }
}

/// One reply object; the whole answer or one line of a streamed answer.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    #[serde(default)]
    status: String,
}

impl OllamaClient {
    /// Create a client for `model` served at `endpoint`. No request is made.
    pub fn new(endpoint: &str, model: String) -> Result<Self> {
        let http = HttpClient::new()
            .and_then(|c| c.with_base(endpoint))
            .map_err(|e| BrochureError::Llm(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            model,
            options: GenerationOptions::default(),
        })
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Verify the server is reachable and the model is installed, pulling it
    /// when `pull_missing` is set.
    pub async fn ensure_ready(&self, pull_missing: bool) -> Result<()> {
        let models = self.fetch_available_models().await?;

        if is_installed(&models, &self.model) {
            return Ok(());
        }
        if !pull_missing {
            return Err(BrochureError::Llm(format!(
                "Model {} is not installed; run `ollama pull {}`",
                self.model, self.model
            )));
        }

        tracing::info!("Model {} not found locally, pulling...", self.model);
        self.pull_model(&self.model).await
    }

    async fn fetch_available_models(&self) -> Result<Vec<String>> {
        let tags: TagsResponse = self
            .http
            .get_json("api/tags", RequestOpts::default())
            .await
            .map_err(|e| match e {
                HttpError::Network(_) => BrochureError::Llm(OLLAMA_CONNECTION_ERROR.to_string()),
                other => BrochureError::Llm(format!("Failed to fetch models: {other}")),
            })?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull_model(&self, model: &str) -> Result<()> {
        let payload = PullRequest {
            model,
            stream: false,
        };

        let resp: PullResponse = self
            .http
            .post_json("api/pull", &payload, RequestOpts::default())
            .await
            .map_err(|e| BrochureError::Llm(format!("Failed to pull model: {e}")))?;

        tracing::info!(status = %resp.status, "Successfully pulled model: {}", model);
        Ok(())
    }

    fn request<'a>(&'a self, messages: &'a [ChatMessage], stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages,
            stream,
            options: ChatOptions {
                temperature: self.options.temperature,
                num_predict: self.options.max_tokens,
            },
        }
    }
}

/// Ollama reports untagged pulls as `<model>:latest`.
fn is_installed(models: &[String], model: &str) -> bool {
    models
        .iter()
        .any(|m| m == model || (!model.contains(':') && *m == format!("{model}:latest")))
}

fn parse_chunk(line: &str) -> Result<ChatChunk> {
    let chunk: ChatChunk = serde_json::from_str(line)
        .map_err(|e| BrochureError::Llm(format!("Failed to parse stream chunk: {e}")))?;
    if let Some(error) = &chunk.error {
        return Err(BrochureError::Llm(format!("Ollama error: {error}")));
    }
    Ok(chunk)
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<LlmResponse> {
        let payload = self.request(messages, false);

        let chunk: ChatChunk = self
            .http
            .post_json("api/chat", &payload, RequestOpts::default())
            .await
            .map_err(|e| BrochureError::Llm(format!("Chat request failed: {e}")))?;

        if let Some(error) = chunk.error {
            return Err(BrochureError::Llm(format!("Ollama error: {error}")));
        }

        Ok(LlmResponse {
            text: chunk.message.map(|m| m.content).unwrap_or_default(),
            model: chunk.model.or_else(|| Some(self.model.clone())),
            tokens_used: chunk.eval_count,
        })
    }

    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let payload = self.request(messages, true);

        let mut lines = self
            .http
            .post_lines("api/chat", &payload, RequestOpts::default())
            .await
            .map_err(|e| BrochureError::Llm(format!("Chat request failed: {e}")))?;

        Ok(Box::pin(async_stream::stream! {
            while let Some(line) = lines.next().await {
                let chunk = match line {
                    Ok(line) => parse_chunk(&line),
                    Err(e) => Err(BrochureError::Llm(format!("Chat stream failed: {e}"))),
                };
                match chunk {
                    Ok(chunk) => {
                        if let Some(message) = chunk.message {
                            if !message.content.is_empty() {
                                yield Ok(message.content);
                            }
                        }
                        if chunk.done {
                            tracing::debug!(eval_count = ?chunk.eval_count, "ollama.stream.done");
                            break;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.fetch_available_models().await.is_ok())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
