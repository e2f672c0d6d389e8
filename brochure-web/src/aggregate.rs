use crate::fetch::PageFetcher;
use brochure_common::Result;
use brochure_llm::links::LinkSelector;
use url::Url;

/// Folds a landing page and its brochure-relevant sub-pages into one document.
#[derive(Clone)]
pub struct ContentAggregator {
    fetcher: PageFetcher,
    selector: LinkSelector,
}

impl ContentAggregator {
    pub fn new(fetcher: PageFetcher, selector: LinkSelector) -> Self {
        Self { fetcher, selector }
    }

    pub fn fetcher(&self) -> &PageFetcher {
        &self.fetcher
    }

    /// Links of `root_url` that the selector considers brochure-relevant,
    /// exactly as the model returned them.
    pub async fn relevant_links(&self, root_url: &str) -> Result<Vec<String>> {
        let landing = self.fetcher.fetch(root_url).await?;
        Ok(self.selector.select(landing.url(), landing.links()).await)
    }

    /// Landing page contents followed by every selected sub-page.
    ///
    /// Only the landing page fetch can fail the whole call. A sub-page that
    /// cannot be fetched leaves an inline note and the loop moves on.
    pub async fn aggregate(&self, root_url: &str) -> Result<String> {
        let landing = self.fetcher.fetch(root_url).await?;
        let mut result = format!("Landing page:\n{}", landing.contents());

        let links = self.selector.select(landing.url(), landing.links()).await;
        if links.is_empty() {
            result.push_str("\n\nNo valid subpage links found.\n");
            return Ok(result);
        }

        for link in links {
            let link = resolve_link(root_url, &link);
            match self.fetcher.fetch(&link).await {
                Ok(page) => {
                    result.push_str(&format!("\n\nURL: {link}\n{}", page.contents()));
                }
                Err(e) => {
                    tracing::warn!(link = %link, error = %e, "sub-page fetch failed");
                    result.push_str(&format!("\nCould not fetch content from {link}: {e}\n"));
                }
            }
        }

        tracing::info!(
            root = root_url,
            chars = result.chars().count(),
            "website details aggregated"
        );
        Ok(result)
    }
}

/// Links that do not start with `http` are taken relative to `root_url`.
/// A link that cannot be joined is returned unchanged.
pub fn resolve_link(root_url: &str, link: &str) -> String {
    if link.starts_with("http") {
        return link.to_string();
    }
    Url::parse(root_url)
        .and_then(|base| base.join(link))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| link.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_links_are_kept() {
        assert_eq!(
            resolve_link("https://x.com", "https://other.com/about"),
            "https://other.com/about"
        );
    }

    #[test]
    fn relative_links_join_the_root() {
        assert_eq!(resolve_link("https://x.com", "/about"), "https://x.com/about");
        assert_eq!(
            resolve_link("https://x.com/en/home", "careers"),
            "https://x.com/en/careers"
        );
        assert_eq!(
            resolve_link("https://x.com", "//cdn.x.com/team"),
            "https://cdn.x.com/team"
        );
    }

    #[test]
    fn other_schemes_pass_through_join() {
        assert_eq!(
            resolve_link("https://x.com", "mailto:x@x.com"),
            "mailto:x@x.com"
        );
    }

    #[test]
    fn unjoinable_root_leaves_link_alone() {
        assert_eq!(resolve_link("not a url", "/about"), "/about");
    }
}
