//! Minimal HTTP client with safe logging and line-framed streaming.
//!
//! - Plain-text GETs for page fetching (status is reported, never an error)
//! - JSON POSTs for chat APIs, with provider error messages surfaced
//! - Streamed POSTs split into lines (NDJSON and server-sent events)
//! - Optional *raw* request/response logging via `BROCHURE_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), brochure_http::HttpError> {
//! let client = brochure_http::HttpClient::new()?;
//! let page = client
//!     .get_text("https://example.com", brochure_http::RequestOpts::default())
//!     .await?;
//! println!("{} bytes from {}", page.body.len(), page.url);
//! # Ok(()) }
//! ```
//!
//! Security: `Auth::Bearer` values are sanitized before use, and logs only
//! ever include the auth kind, not the secret.
//!
//! Observability: structured `tracing` events are emitted for request start,
//! response headers, body snippets (truncated), final errors, and
//! (optionally) raw request/response lines under target `http.raw`.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::pin::Pin;
use std::time::{Duration, Instant};
use thiserror::Error;

// ==============================
// Raw logging toggles
// ==============================

const RAW_ENV: &str = "BROCHURE_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024; // cap raw body logs (64 KiB)
const SNIPPET_MAX: usize = 500;

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

/// Render a best-effort curl command for repro/debug, with secrets redacted.
fn make_curl(method: &Method, url: &Url, headers: &HeaderMap, body: Option<&[u8]>) -> String {
    let mut parts = vec!["curl".to_string(), format!("-X{}", method)];
    for (key, val) in redact_headers(headers) {
        parts.push(format!("-H '{}: {}'", key, val.replace('\'', r"'\''")));
    }
    if let Some(bytes) = body {
        if let Ok(s) = std::str::from_utf8(bytes) {
            let mut s = s.to_string();
            if s.len() > RAW_MAX_BODY {
                truncate_on_boundary(&mut s, RAW_MAX_BODY);
                s.push('…');
            }
            parts.push(format!("-d '{}'", s.replace('\'', r"'\''")));
        } else {
            parts.push(format!("--data-binary @- # ({} bytes)", bytes.len()));
        }
    }
    parts.push(format!("'{}'", url.as_str()));
    parts.join(" ")
}

/// Redact sensitive headers for logging
fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let mut val = v.to_str().unwrap_or("").to_string();
            if key.eq_ignore_ascii_case("authorization") {
                val = "Bearer <redacted>".into();
            }
            (key, val)
        })
        .collect()
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("server returned error {status}: {message}")]
    Api { status: StatusCode, message: String },
}

// ==============================
// Auth & Request Options
// ==============================

/// Authentication strategies supported by the HTTP client helpers.
///
/// ```
/// use brochure_http::Auth;
///
/// let bearer = Auth::Bearer("token");
/// match bearer {
///     Auth::Bearer(value) => assert_eq!(value, "token"),
///     Auth::None => unreachable!(),
/// }
/// ```
#[derive(Clone, Debug)]
pub enum Auth<'a> {
    /// Authorization: Bearer <token>
    Bearer(&'a str),
    None,
}

/// Per-request tuning knobs for the HTTP client.
///
/// ```
/// use brochure_http::{Auth, RequestOpts};
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     auth: Some(Auth::Bearer("sk-demo")),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(opts.headers.is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub auth: Option<Auth<'a>>,
    pub headers: Option<HeaderMap>,
}

/// Body of a plain-text GET, together with where it actually came from.
#[derive(Debug, Clone)]
pub struct TextResponse {
    /// Final URL after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub body: String,
}

/// Lines of a streamed response body, without their terminators.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String, HttpError>> + Send>>;

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    base: Option<Url>,
    inner: Client,
    default_headers: HeaderMap,
    /// Applied to requests that carry no explicit timeout. `None` waits forever.
    pub default_timeout: Option<Duration>,
}

impl HttpClient {
    /// Construct a client with no base URL, no timeout and no default headers.
    ///
    /// ```no_run
    /// use brochure_http::{HttpClient, HttpError};
    ///
    /// let client = HttpClient::new()?;
    /// assert!(client.default_timeout.is_none());
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new() -> Result<Self, HttpError> {
        let inner = Client::builder()
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base: None,
            inner,
            default_headers: HeaderMap::new(),
            default_timeout: None,
        })
    }

    /// Anchor relative request paths to `base`.
    ///
    /// A trailing slash is added so that `base` keeps its last path segment
    /// when joined (`https://api.openai.com/v1` + `chat/completions`).
    ///
    /// ```no_run
    /// use brochure_http::{HttpClient, HttpError};
    ///
    /// let client = HttpClient::new()?.with_base("http://localhost:11434")?;
    /// assert_eq!(client.resolve("api/chat")?.as_str(), "http://localhost:11434/api/chat");
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn with_base(mut self, base: &str) -> Result<Self, HttpError> {
        let mut normalized = base.trim_end_matches('/').to_string();
        normalized.push('/');
        self.base = Some(Url::parse(&normalized).map_err(|e| HttpError::Url(e.to_string()))?);
        Ok(self)
    }

    /// Set a timeout for every request that does not override it.
    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = Some(dur);
        self
    }

    /// Send `user_agent` as the `User-Agent` header on every request.
    pub fn with_user_agent(mut self, user_agent: &str) -> Result<Self, HttpError> {
        let value = HeaderValue::from_str(user_agent)
            .map_err(|e| HttpError::Build(format!("invalid User-Agent: {e}")))?;
        self.default_headers.insert(USER_AGENT, value);
        Ok(self)
    }

    /// Resolve `path` to a full URL. Absolute URLs are used as-is.
    pub fn resolve(&self, path: &str) -> Result<Url, HttpError> {
        if let Ok(abs) = Url::parse(path) {
            return Ok(abs);
        }
        match &self.base {
            Some(base) => base.join(path).map_err(|e| HttpError::Url(e.to_string())),
            None => Err(HttpError::Url(format!("relative path without base: {path}"))),
        }
    }

    // ==============================
    // Public API
    // ==============================

    /// GET a document as text. Non-success statuses are returned, not raised.
    pub async fn get_text(
        &self,
        path: &str,
        opts: RequestOpts<'_>,
    ) -> Result<TextResponse, HttpError> {
        let url = self.resolve(path)?;
        let resp = self.send::<()>(Method::GET, url, None, &opts).await?;
        let final_url = resp.url().clone();
        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            tracing::warn!(url=%final_url, message=%e, "http.network_error.body");
            HttpError::Network(e.to_string())
        })?;

        tracing::trace!(body_snippet=%snip_body(body.as_bytes()), "http.response.body_snippet");
        if !status.is_success() {
            tracing::warn!(url=%final_url, %status, "http.get_text.non_success");
        }

        Ok(TextResponse {
            url: final_url,
            status,
            body,
        })
    }

    /// GET JSON. Non-success statuses become [`HttpError::Api`].
    pub async fn get_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let url = self.resolve(path)?;
        let resp = self.send::<()>(Method::GET, url, None, &opts).await?;
        decode_json(resp).await
    }

    /// POST a JSON body and decode a JSON reply.
    pub async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.resolve(path)?;
        let resp = self.send(Method::POST, url, Some(body), &opts).await?;
        decode_json(resp).await
    }

    /// POST a JSON body and stream the reply back line by line.
    ///
    /// The status is checked before streaming starts; a non-success status
    /// reads the whole body for its error message.
    pub async fn post_lines<B>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOpts<'_>,
    ) -> Result<LineStream, HttpError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.resolve(path)?;
        let resp = self.send(Method::POST, url, Some(body), &opts).await?;
        let status = resp.status();
        if !status.is_success() {
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| HttpError::Network(e.to_string()))?;
            return Err(api_error(status, &bytes));
        }
        Ok(split_lines(resp.bytes_stream()))
    }

    // ==============================
    // Core request implementation
    // ==============================

    async fn send<B>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
        opts: &RequestOpts<'_>,
    ) -> Result<Response, HttpError>
    where
        B: Serialize + ?Sized,
    {
        let mut rb: RequestBuilder = self.inner.request(method.clone(), url.clone());

        let timeout = opts.timeout.or(self.default_timeout);
        if let Some(t) = timeout {
            rb = rb.timeout(t);
        }

        // serialize ourselves so raw logging sees the exact bytes
        let mut request_body_bytes: Option<Vec<u8>> = None;
        if let Some(b) = body {
            let bytes = serde_json::to_vec(b).map_err(|e| HttpError::Build(e.to_string()))?;
            request_body_bytes = Some(bytes.clone());
            rb = rb
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(bytes);
        }

        let mut merged = self.default_headers.clone();
        if let Some(hdrs) = &opts.headers {
            for (k, v) in hdrs.iter() {
                merged.insert(k, v.clone());
            }
        }
        rb = rb.headers(merged.clone());

        if let Some(Auth::Bearer(tok)) = &opts.auth {
            let tok = sanitize_api_key(tok)?;
            rb = rb.bearer_auth(tok);
        }

        let auth_kind = match &opts.auth {
            Some(Auth::Bearer(_)) => "bearer",
            Some(Auth::None) | None => "none",
        };

        tracing::debug!(
            method=%method,
            host_path=%format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
            timeout_ms=?timeout.map(|t| t.as_millis() as u64),
            auth_kind,
            has_body=%body.is_some(),
            "http.request.start"
        );

        if raw_enabled() {
            let curl = make_curl(&method, &url, &merged, request_body_bytes.as_deref());
            tracing::debug!(target: "http.raw", %curl, "request");
        }

        let t0 = Instant::now();
        let resp = rb.send().await.map_err(|err| {
            tracing::warn!(url=%url, message=%err, "http.network_error.send");
            HttpError::Network(err.to_string())
        })?;

        tracing::debug!(
            status=%resp.status(),
            duration_ms=t0.elapsed().as_millis() as u64,
            content_length=?resp.content_length(),
            "http.response.headers"
        );

        if raw_enabled() {
            let hdrs = redact_headers(resp.headers());
            tracing::info!(target: "http.raw", status=%resp.status(), headers=?hdrs, "response");
        }

        Ok(resp)
    }
}

async fn decode_json<T: DeserializeOwned>(resp: Response) -> Result<T, HttpError> {
    let status = resp.status();
    let bytes = resp.bytes().await.map_err(|e| {
        tracing::warn!(message=%e, "http.network_error.body");
        HttpError::Network(e.to_string())
    })?;

    let snippet = snip_body(&bytes);
    tracing::trace!(body_snippet=%snippet, "http.response.body_snippet");

    if !status.is_success() {
        let err = api_error(status, &bytes);
        tracing::warn!(%status, error=%err, body_snippet=%snippet, "http.error");
        return Err(err);
    }

    serde_json::from_slice::<T>(&bytes).map_err(|e| {
        tracing::warn!(
            serde_line=%e.line(),
            serde_col=%e.column(),
            serde_err=%e.to_string(),
            body_snippet=%snippet,
            "http.response.decode_error"
        );
        HttpError::Decode(e.to_string(), snippet)
    })
}

fn api_error(status: StatusCode, body: &[u8]) -> HttpError {
    HttpError::Api {
        status,
        message: extract_error_message(body),
    }
}

// ==============================
// Line framing
// ==============================

/// Split a chunked byte stream into lines.
///
/// Chunk boundaries may fall anywhere, including inside a multi-byte
/// character; lines are only decoded once complete. Empty lines are dropped
/// and `\r\n` terminators are handled. A trailing line without a newline is
/// still yielded.
pub fn split_lines<S, E>(stream: S) -> LineStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut stream = Box::pin(stream);
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let message = e.to_string();
                    tracing::warn!(message=%message, "http.network_error.stream");
                    yield Err(HttpError::Network(message));
                    return;
                }
            };
            buf.extend_from_slice(&chunk);
            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let text = decode_line(&line);
                if !text.is_empty() {
                    yield Ok(text);
                }
            }
        }
        let text = decode_line(&buf);
        if !text.is_empty() {
            yield Ok(text);
        }
    })
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

// ==============================
// Helpers
// ==============================

fn extract_error_message(body: &[u8]) -> String {
    // OpenAI style: {"error":{"message":"..."}}
    #[derive(Deserialize)]
    struct OpenAiEnv {
        error: OpenAiDetail,
    }
    #[derive(Deserialize)]
    struct OpenAiDetail {
        message: String,
    }

    // Ollama and generic: {"error":"..."} or {"message":"..."} or {"detail":"..."}
    #[derive(Deserialize)]
    struct Msg {
        #[serde(default)]
        error: String,
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
    }

    if let Ok(env) = serde_json::from_slice::<OpenAiEnv>(body) {
        return env.error.message;
    }
    if let Ok(m) = serde_json::from_slice::<Msg>(body) {
        if !m.error.is_empty() {
            return m.error;
        }
        if !m.message.is_empty() {
            return m.message;
        }
        if !m.detail.is_empty() {
            return m.detail;
        }
    }
    snip_body(body)
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > SNIPPET_MAX {
        truncate_on_boundary(&mut snip, SNIPPET_MAX);
        snip.push_str("...");
    }
    snip
}

fn truncate_on_boundary(s: &mut String, max_bytes: usize) {
    let mut cut = max_bytes.min(s.len());
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

fn sanitize_api_key(raw: &str) -> Result<String, HttpError> {
    // 1) Trim outer spaces/quotes
    let mut s = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();

    // 2) Remove *all* ASCII whitespace (spaces, tabs, newlines, carriage returns)
    s.retain(|ch| !ch.is_ascii_whitespace());

    // 3) Ensure ASCII and no control chars
    if !s.is_ascii() {
        return Err(HttpError::Build("API key contains non-ASCII bytes".into()));
    }
    if s.bytes().any(|b| b < 0x20 || b == 0x7F) {
        return Err(HttpError::Build(
            "API key contains control characters".into(),
        ));
    }

    // 4) Validate header value upfront for clear errors
    HeaderValue::from_str(&format!("Bearer {}", s))
        .map_err(|e| HttpError::Build(format!("invalid Authorization header: {e}")))?;
    Ok(s)
}
