//! Ask a model which outbound links of a page belong in a company brochure.
//!
//! The model is told to answer with `{"links":[{"type":..,"url":..}]}`. Its
//! reply is normalized (code fences removed), validated against that shape,
//! and flattened into URL strings. Anything that goes wrong here degrades to
//! an empty list: a brochure can still be written from the landing page.

use crate::traits::LlmClient;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const LINK_SYSTEM_PROMPT: &str = r#"You are provided with a list of links found on a webpage.
You are able to decide which of the links would be most relevant to include in a brochure about the company,
such as links to an About page, or a Company page, or Careers/Jobs pages.
Respond only in JSON like this:
{
  "links": [
    {"type": "about page", "url": "https://example.com/about"},
    {"type": "careers page", "url": "https://example.com/careers"}
  ]
}"#;

/// How to read a link entry that lacks a usable `"url"` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlPolicy {
    /// Only a non-empty string `"url"` counts; other entries are skipped.
    #[default]
    Strict,
    /// Fall back to the first string value of the entry, whatever its key.
    FirstValue,
}

/// One accepted entry of the model's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevantLink {
    pub kind: Option<String>,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct LinksWire {
    #[serde(default)]
    links: Vec<Map<String, Value>>,
}

/// Selects brochure-relevant links with a single model call.
#[derive(Clone)]
pub struct LinkSelector {
    llm: Arc<dyn LlmClient + Send + Sync>,
    policy: UrlPolicy,
}

impl LinkSelector {
    pub fn new(llm: Arc<dyn LlmClient + Send + Sync>) -> Self {
        Self {
            llm,
            policy: UrlPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: UrlPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pick the relevant links among `links`, all found on `page_url`.
    ///
    /// Never fails: model errors and unusable answers are logged and yield an
    /// empty list.
    pub async fn select(&self, page_url: &str, links: &[String]) -> Vec<String> {
        let prompt = links_user_prompt(page_url, links);

        let response = match self.llm.ask(LINK_SYSTEM_PROMPT, &prompt).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(page = page_url, error = %e, "link selection request failed");
                return Vec::new();
            }
        };
        tracing::debug!(page = page_url, reply = %response.text, "link selection reply");

        match parse_links(&response.text, self.policy) {
            Ok(selected) => {
                tracing::info!(
                    page = page_url,
                    candidates = links.len(),
                    selected = selected.len(),
                    "links selected"
                );
                selected.into_iter().map(|l| l.url).collect()
            }
            Err(e) => {
                tracing::warn!(page = page_url, error = %e, "Error parsing link selection JSON");
                Vec::new()
            }
        }
    }
}

/// The user message: page URL, instructions, then every raw href on its own line.
pub fn links_user_prompt(page_url: &str, links: &[String]) -> String {
    let mut prompt = format!(
        "Here is the list of links on the website of {page_url}. \
         Please decide which of these are relevant for a brochure \
         (About, Company, Careers). Ignore email/terms/privacy links.\n\n"
    );
    prompt.push_str(&links.join("\n"));
    prompt
}

/// Remove a leading ```` ```json ```` or ```` ``` ```` fence and the closing one.
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let fence_chars = |c: char| c == '`' || c.is_whitespace();
    if let Some(rest) = text.strip_prefix("```json") {
        rest.trim_matches(fence_chars)
    } else if let Some(rest) = text.strip_prefix("```") {
        rest.trim_matches(fence_chars)
    } else {
        text
    }
}

/// Parse a link-selection reply into its accepted entries, in reply order.
///
/// A missing `"links"` key is an empty answer. A top level that is not an
/// object, or a `"links"` value that is not an array of objects, is an error.
pub fn parse_links(
    text: &str,
    policy: UrlPolicy,
) -> Result<Vec<RelevantLink>, serde_json::Error> {
    let wire: LinksWire = serde_json::from_str(strip_code_fence(text))?;

    let mut out = Vec::with_capacity(wire.links.len());
    for (idx, entry) in wire.links.into_iter().enumerate() {
        let kind = entry
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string);
        match entry_url(&entry, policy) {
            Some(url) => out.push(RelevantLink { kind, url }),
            None => tracing::warn!(index = idx, ?policy, "link entry without a url skipped"),
        }
    }
    Ok(out)
}

fn entry_url(entry: &Map<String, Value>, policy: UrlPolicy) -> Option<String> {
    let explicit = entry
        .get("url")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    if let Some(url) = explicit {
        return Some(url.to_string());
    }
    match policy {
        UrlPolicy::Strict => None,
        UrlPolicy::FirstValue => entry
            .values()
            .next()
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    }
}
