use crate::traits::{ChatMessage, GenerationOptions, LlmClient, LlmResponse, TextStream};
use async_trait::async_trait;
use brochure_common::{BrochureError, Result};
use brochure_http::{Auth, HttpClient, HttpError, RequestOpts};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

const SSE_DATA_PREFIX: &str = "data:";
const SSE_DONE: &str = "[DONE]";

/// Client for OpenAI-compatible chat completion endpoints.
pub struct OpenAiClient {
    http: HttpClient,
    api_key: String,
    model: String,
    options: GenerationOptions,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

/// One `data:` event of a streamed completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    /// Compatible servers report failures mid-stream as an `error` event.
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a new client for the given endpoint, API key and model.
    pub fn new(endpoint: &str, api_key: String, model: String) -> Result<Self> {
        let http = HttpClient::new()
            .and_then(|c| c.with_base(endpoint))
            .map_err(|e| BrochureError::Llm(format!("HttpClient init failed: {e}")))?;

        Ok(Self {
            http,
            api_key,
            model,
            options: GenerationOptions::default(),
        })
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    fn opts(&self) -> RequestOpts<'_> {
        RequestOpts {
            auth: Some(Auth::Bearer(&self.api_key)),
            ..Default::default()
        }
    }

    fn request<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        stream: bool,
    ) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages,
            stream,
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        }
    }
}

/// Interpret one server-sent-event line.
///
/// `Ok(None)` means the line carries no text (comments, other fields, empty
/// deltas); the end marker is reported separately by [`is_done`].
fn parse_event(line: &str) -> Result<Option<String>> {
    let Some(data) = line.strip_prefix(SSE_DATA_PREFIX) else {
        return Ok(None);
    };
    let data = data.trim();
    if data == SSE_DONE {
        return Ok(None);
    }
    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| BrochureError::Llm(format!("Failed to parse stream event: {e}")))?;
    if let Some(error) = chunk.error {
        return Err(BrochureError::Llm(match error.kind {
            Some(kind) => format!("OpenAI stream error ({kind}): {}", error.message),
            None => format!("OpenAI stream error: {}", error.message),
        }));
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty()))
}

fn is_done(line: &str) -> bool {
    line.strip_prefix(SSE_DATA_PREFIX)
        .is_some_and(|d| d.trim() == SSE_DONE)
}

fn http_to_brochure(e: HttpError) -> BrochureError {
    BrochureError::Llm(format!("{e}"))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<LlmResponse> {
        let resp: ChatCompletionResponse = self
            .http
            .post_json("chat/completions", &self.request(messages, false), self.opts())
            .await
            .map_err(http_to_brochure)?;

        let text = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BrochureError::Llm("completion contained no choices".to_string()))?;

        Ok(LlmResponse {
            text,
            model: Some(resp.model),
            tokens_used: resp.usage.map(|u| u.total_tokens),
        })
    }

    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let mut lines = self
            .http
            .post_lines("chat/completions", &self.request(messages, true), self.opts())
            .await
            .map_err(http_to_brochure)?;

        Ok(Box::pin(async_stream::stream! {
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        yield Err(http_to_brochure(e));
                        break;
                    }
                };
                if is_done(&line) {
                    break;
                }
                match parse_event(&line) {
                    Ok(Some(text)) => yield Ok(text),
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }))
    }

    async fn health_check(&self) -> Result<bool> {
        let models: std::result::Result<serde_json::Value, HttpError> =
            self.http.get_json("models", self.opts()).await;
        match models {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("OpenAi health check failed: {}", e);
                Ok(false)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delta_events() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_event(line).unwrap().as_deref(), Some("Hello"));
    }

    #[test]
    fn ignores_role_only_deltas_and_comments() {
        assert_eq!(
            parse_event(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            None
        );
        assert_eq!(parse_event(": keep-alive").unwrap(), None);
    }

    #[test]
    fn recognizes_done_marker() {
        assert!(is_done("data: [DONE]"));
        assert!(is_done("data:[DONE]"));
        assert!(!is_done(r#"data: {"choices":[]}"#));
    }

    #[test]
    fn error_event_is_an_error() {
        let err = parse_event(r#"data: {"error":{"message":"rate limited","type":"server_error"}}"#)
            .unwrap_err();
        assert!(matches!(err, BrochureError::Llm(_)));
        assert!(err.to_string().contains("rate limited"), "{err}");
        assert!(err.to_string().contains("server_error"), "{err}");

        let err = parse_event(r#"data: {"error":{"message":"overloaded"}}"#).unwrap_err();
        assert!(err.to_string().contains("overloaded"), "{err}");
    }

    #[test]
    fn malformed_event_is_an_error() {
        assert!(parse_event("data: {not json").is_err());
    }
}
