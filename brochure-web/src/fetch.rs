use crate::extract::Page;
use brochure_common::{BrochureError, Result};
use brochure_http::{HttpClient, RequestOpts};
use std::time::Duration;

/// Identifies requests as a desktop Chrome so sites serve their normal markup.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36";

/// Fetches one page over HTTP and parses it into a [`Page`].
#[derive(Clone)]
pub struct PageFetcher {
    http: HttpClient,
}

impl PageFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let http = HttpClient::new()
            .and_then(|c| c.with_user_agent(user_agent))
            .map_err(|e| BrochureError::Fetch(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Give up on a page after `timeout`. Without it requests wait indefinitely.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.with_timeout(timeout);
        self
    }

    /// GET `url` and extract its title, text and links.
    ///
    /// Transport failures are returned to the caller; error statuses are not,
    /// their body is parsed like any other page.
    pub async fn fetch(&self, url: &str) -> Result<Page> {
        let resp = self
            .http
            .get_text(url, RequestOpts::default())
            .await
            .map_err(|e| BrochureError::Fetch(e.to_string()))?;

        if !resp.status.is_success() {
            tracing::warn!(url, status = %resp.status, "page answered with an error status");
        }
        let page = Page::from_html(url, &resp.body);
        tracing::info!(
            url,
            status = %resp.status,
            title = page.title(),
            text_chars = page.text().chars().count(),
            links = page.links().len(),
            "page fetched"
        );
        Ok(page)
    }
}
