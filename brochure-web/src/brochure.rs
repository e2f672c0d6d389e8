//! Brochure prompt building and generation, whole or streamed.

use crate::aggregate::ContentAggregator;
use brochure_common::{Result, DEFAULT_MAX_PROMPT_CHARS};
use brochure_llm::traits::{LlmClient, TextStream};
use futures::StreamExt;
use std::sync::Arc;

pub const BROCHURE_SYSTEM_PROMPT: &str = "You are an assistant that analyzes the contents of several relevant pages from a company website \
and creates a short brochure about the company for prospective customers, investors and recruits. Respond in markdown. \
Include details of company culture, customers and careers/jobs if available.";

/// Somewhere to show markdown. Streaming calls `show` again with the full
/// text so far after every fragment; implementations replace what they
/// showed before.
pub trait MarkdownDisplay {
    fn show(&mut self, markdown: &str) -> Result<()>;
}

pub struct BrochureGenerator {
    llm: Arc<dyn LlmClient + Send + Sync>,
    aggregator: ContentAggregator,
    max_prompt_chars: usize,
}

impl BrochureGenerator {
    pub fn new(llm: Arc<dyn LlmClient + Send + Sync>, aggregator: ContentAggregator) -> Self {
        Self {
            llm,
            aggregator,
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
        }
    }

    pub fn with_max_prompt_chars(mut self, max: usize) -> Self {
        self.max_prompt_chars = max;
        self
    }

    /// Wrap an already aggregated `document` for `company_name`, cut to the budget.
    pub fn user_prompt(&self, company_name: &str, document: &str) -> String {
        let prompt = format!(
            "You are looking at a company called: {company_name}\n\n\
             Here are the contents of its landing page and other relevant pages. \
             Use this information to build a short brochure of the company in markdown.\n\n\
             {document}"
        );
        truncate_chars(&prompt, self.max_prompt_chars).to_string()
    }

    /// Aggregate `url` and build the user prompt from it.
    pub async fn build_user_prompt(&self, company_name: &str, url: &str) -> Result<String> {
        let document = self.aggregator.aggregate(url).await?;
        let prompt = self.user_prompt(company_name, &document);
        tracing::debug!(
            company = company_name,
            document_chars = document.chars().count(),
            prompt_chars = prompt.chars().count(),
            "brochure prompt built"
        );
        Ok(prompt)
    }

    /// Generate the brochure in one request, show it once and return it.
    pub async fn create(
        &self,
        company_name: &str,
        url: &str,
        display: &mut dyn MarkdownDisplay,
    ) -> Result<String> {
        let prompt = self.build_user_prompt(company_name, url).await?;
        let response = self.llm.ask(BROCHURE_SYSTEM_PROMPT, &prompt).await?;
        tracing::info!(
            company = company_name,
            model = ?response.model,
            tokens = ?response.tokens_used,
            "brochure created"
        );
        display.show(&response.text)?;
        Ok(response.text)
    }

    /// Open the streamed brochure without consuming it.
    pub async fn open_stream(&self, company_name: &str, url: &str) -> Result<TextStream> {
        let prompt = self.build_user_prompt(company_name, url).await?;
        self.llm.ask_stream(BROCHURE_SYSTEM_PROMPT, &prompt).await
    }

    /// Stream the brochure into `display`, returning the cleaned final text.
    pub async fn stream(
        &self,
        company_name: &str,
        url: &str,
        display: &mut dyn MarkdownDisplay,
    ) -> Result<String> {
        let stream = self.open_stream(company_name, url).await?;
        let brochure = render_stream(stream, display).await?;
        tracing::info!(
            company = company_name,
            chars = brochure.chars().count(),
            "brochure streamed"
        );
        Ok(brochure)
    }
}

/// Accumulate `stream`, re-showing the cleaned text after every fragment.
pub async fn render_stream(
    mut stream: TextStream,
    display: &mut dyn MarkdownDisplay,
) -> Result<String> {
    let mut response = String::new();
    let mut cleaned = String::new();
    while let Some(fragment) = stream.next().await {
        response.push_str(&fragment?);
        cleaned = clean_streamed(&response);
        display.show(&cleaned)?;
    }
    Ok(cleaned)
}

/// Drop code fence markers and the word `markdown` so a reply wrapped in
/// ```` ```markdown ```` renders as markdown rather than as a code block.
pub fn clean_streamed(text: &str) -> String {
    text.replace("```", "").replace("markdown", "")
}

/// The longest prefix of `s` holding at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
