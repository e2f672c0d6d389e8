use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

/// Title used when a document has no (non-empty) `<title>`.
pub const NO_TITLE: &str = "No title found";

/// Subtrees dropped from the body before its text is collected.
const STRIPPED_TAGS: [&str; 4] = ["script", "style", "img", "input"];

/// A fetched page reduced to what the brochure needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    url: String,
    title: String,
    text: String,
    links: Vec<String>,
}

impl Page {
    /// Parse `html` served at `url`.
    ///
    /// ```
    /// use brochure_web::Page;
    ///
    /// let page = Page::from_html(
    ///     "https://x.com",
    ///     "<html><head><title> Acme </title></head>\
    ///      <body><h1>Acme</h1><script>track()</script><a href=\"/about\">About</a></body></html>",
    /// );
    /// assert_eq!(page.title(), "Acme");
    /// assert_eq!(page.text(), "Acme\nAbout");
    /// assert_eq!(page.links(), ["/about"]);
    /// ```
    pub fn from_html(url: impl Into<String>, html: &str) -> Self {
        let doc = Html::parse_document(html);
        Self {
            url: url.into(),
            title: extract_title(&doc),
            text: if has_body_tag(html) {
                extract_body_text(&doc)
            } else {
                String::new()
            },
            links: extract_links(&doc),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }

    /// Title and text in the layout used inside the aggregate document.
    pub fn contents(&self) -> String {
        format!(
            "Webpage Title:\n{}\nWebpage Contents:\n{}\n",
            self.title, self.text
        )
    }
}

fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("static selector"))
}

pub fn extract_title(doc: &Html) -> String {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    doc.select(selector(&SELECTOR, "title"))
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NO_TITLE.to_string())
}

/// Every non-empty `href` of every anchor, in document order.
pub fn extract_links(doc: &Html) -> Vec<String> {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    doc.select(selector(&SELECTOR, "a"))
        .filter_map(|e| e.value().attr("href"))
        .filter(|href| !href.is_empty())
        .map(str::to_string)
        .collect()
}

/// Trimmed, non-empty text nodes of `<body>` joined by newlines, skipping
/// [`STRIPPED_TAGS`] subtrees.
pub fn extract_body_text(doc: &Html) -> String {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    let Some(body) = doc.select(selector(&SELECTOR, "body")).next() else {
        return String::new();
    };
    let mut segments = Vec::new();
    collect_text(body, &mut segments);
    segments.join("\n")
}

fn collect_text<'a>(element: ElementRef<'a>, out: &mut Vec<&'a str>) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(trimmed);
            }
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if !STRIPPED_TAGS.contains(&child_el.value().name()) {
                collect_text(child_el, out);
            }
        }
    }
}

/// HTML5 parsing always synthesizes a `<body>`; only an explicit one counts.
///
/// Comments and raw-text elements are cut out first so that `<body` inside
/// them is not mistaken for the start tag. An unterminated comment runs to
/// the end of the document.
fn has_body_tag(html: &str) -> bool {
    static NOT_MARKUP: OnceLock<Regex> = OnceLock::new();
    static BODY: OnceLock<Regex> = OnceLock::new();
    let not_markup = NOT_MARKUP.get_or_init(|| {
        Regex::new(
            r"(?is)<!--.*?-->|<!--.*|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<title\b.*?</title\s*>|<textarea\b.*?</textarea\s*>",
        )
        .expect("static regex")
    });
    let markup = not_markup.replace_all(html, "");
    BODY.get_or_init(|| Regex::new(r"(?i)<body[\s>/]").expect("static regex"))
        .is_match(&markup)
}
