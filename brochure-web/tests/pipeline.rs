use async_trait::async_trait;
use brochure_common::{BrochureError, Result};
use brochure_llm::links::{LinkSelector, LINK_SYSTEM_PROMPT};
use brochure_llm::traits::{ChatMessage, LlmClient, LlmResponse, TextStream};
use brochure_web::brochure::{render_stream, BROCHURE_SYSTEM_PROMPT};
use brochure_web::fetch::DEFAULT_USER_AGENT;
use brochure_web::{BrochureGenerator, ContentAggregator, MarkdownDisplay, PageFetcher};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Answers link selection with `links_reply` and brochure requests with
/// `brochure`, streamed as `fragments`. Keeps every user prompt it receives.
struct ScriptedLlm {
    links_reply: String,
    brochure: String,
    fragments: Vec<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(links_reply: &str) -> Self {
        Self {
            links_reply: links_reply.to_string(),
            brochure: "# Acme\nA fine company.".to_string(),
            fragments: Vec::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn streaming(mut self, fragments: &[&str]) -> Self {
        self.fragments = fragments.iter().map(|s| s.to_string()).collect();
        self
    }

    fn record(&self, messages: &[ChatMessage]) -> bool {
        let is_links = messages[0].content == LINK_SYSTEM_PROMPT;
        if !is_links {
            assert_eq!(messages[0].content, BROCHURE_SYSTEM_PROMPT);
        }
        self.prompts
            .lock()
            .unwrap()
            .push(messages[1].content.clone());
        is_links
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<LlmResponse> {
        let text = if self.record(messages) {
            self.links_reply.clone()
        } else {
            self.brochure.clone()
        };
        Ok(LlmResponse {
            text,
            model: Some("scripted".into()),
            tokens_used: None,
        })
    }

    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        if self.record(messages) {
            return Err(BrochureError::Llm("links are never streamed".into()));
        }
        let items: Vec<Result<String>> = self.fragments.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct RecordingDisplay {
    shown: Vec<String>,
}

impl MarkdownDisplay for RecordingDisplay {
    fn show(&mut self, markdown: &str) -> Result<()> {
        self.shown.push(markdown.to_string());
        Ok(())
    }
}

fn html(title: &str, body: &str) -> String {
    format!("<html><head><title>{title}</title></head><body>{body}</body></html>")
}

async fn mount_page(server: &MockServer, at: &str, page: String, times: u64) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(page),
        )
        .expect(times)
        .mount(server)
        .await;
}

fn aggregator(llm: Arc<ScriptedLlm>) -> ContentAggregator {
    let fetcher = PageFetcher::new(DEFAULT_USER_AGENT).unwrap();
    ContentAggregator::new(fetcher, LinkSelector::new(llm))
}

const LANDING_BODY: &str = r#"<h1>Acme</h1><p>Rockets for everyone.</p>
    <a href="/about">About</a><a href="/careers">Careers</a><a href="mailto:x@x.com">Mail</a>"#;

#[tokio::test]
async fn aggregates_landing_page_and_selected_subpages_only() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html("Acme", LANDING_BODY), 1).await;
    mount_page(&server, "/about", html("About Acme", "<p>Founded 1950.</p>"), 1).await;
    mount_page(&server, "/careers", html("Careers", "<p>Join us.</p>"), 0).await;

    let root = server.uri();
    let reply = format!(r#"{{"links":[{{"type":"about page","url":"{root}/about"}}]}}"#);
    let llm = Arc::new(ScriptedLlm::new(&reply));

    let document = aggregator(llm.clone()).aggregate(&root).await.unwrap();

    assert_eq!(
        document,
        format!(
            "Landing page:\nWebpage Title:\nAcme\nWebpage Contents:\nAcme\nRockets for everyone.\nAbout\nCareers\nMail\n\
             \n\nURL: {root}/about\nWebpage Title:\nAbout Acme\nWebpage Contents:\nFounded 1950.\n"
        )
    );

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| {
        r.headers.get("user-agent").and_then(|v| v.to_str().ok()) == Some(DEFAULT_USER_AGENT)
    }));

    let link_prompt = llm.last_prompt();
    assert!(link_prompt.contains(&format!("links on the website of {root}")));
    assert!(link_prompt.ends_with("/about\n/careers\nmailto:x@x.com"));
}

#[tokio::test]
async fn relative_selected_links_resolve_against_the_root() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html("Acme", LANDING_BODY), 1).await;
    mount_page(&server, "/careers", html("Careers", "<p>Join us.</p>"), 1).await;

    let llm = Arc::new(ScriptedLlm::new(
        r#"{"links":[{"type":"careers page","url":"/careers"}]}"#,
    ));
    let root = server.uri();
    let document = aggregator(llm).aggregate(&root).await.unwrap();

    assert!(document.contains(&format!("\n\nURL: {root}/careers\nWebpage Title:\nCareers\n")));
}

#[tokio::test]
async fn unreachable_subpage_leaves_a_note_and_keeps_the_rest() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html("Acme", LANDING_BODY), 1).await;
    mount_page(&server, "/about", html("About Acme", "<p>Founded 1950.</p>"), 1).await;

    let root = server.uri();
    let reply = format!(
        r#"{{"links":[
            {{"type":"team page","url":"http://127.0.0.1:1/team"}},
            {{"type":"about page","url":"{root}/about"}}
        ]}}"#
    );
    let document = aggregator(Arc::new(ScriptedLlm::new(&reply)))
        .aggregate(&root)
        .await
        .unwrap();

    assert_eq!(
        document
            .matches("\nCould not fetch content from http://127.0.0.1:1/team: ")
            .count(),
        1
    );
    assert!(document.contains("Founded 1950."));
    let note_at = document.find("Could not fetch").unwrap();
    let about_at = document.find("Founded 1950.").unwrap();
    assert!(note_at < about_at);
}

#[tokio::test]
async fn no_selected_links_adds_the_no_subpage_note() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html("Acme", "<p>Only a landing page.</p>"), 1).await;

    let llm = Arc::new(ScriptedLlm::new("I am not JSON"));
    let document = aggregator(llm).aggregate(&server.uri()).await.unwrap();

    assert_eq!(
        document,
        "Landing page:\nWebpage Title:\nAcme\nWebpage Contents:\nOnly a landing page.\n\
         \n\nNo valid subpage links found.\n"
    );
}

#[tokio::test]
async fn error_status_pages_are_still_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404).set_body_string(html("Not here", "<p>Gone</p>")))
        .mount(&server)
        .await;

    let fetcher = PageFetcher::new(DEFAULT_USER_AGENT).unwrap();
    let page = fetcher.fetch(&server.uri()).await.unwrap();
    assert_eq!(page.title(), "Not here");
    assert_eq!(page.text(), "Gone");
}

#[tokio::test]
async fn unreachable_landing_page_fails_the_pipeline() {
    let llm = Arc::new(ScriptedLlm::new(r#"{"links":[]}"#));
    let generator = BrochureGenerator::new(llm.clone(), aggregator(llm.clone()));
    let mut display = RecordingDisplay::default();

    let err = generator
        .create("Acme", "http://127.0.0.1:1/", &mut display)
        .await
        .unwrap_err();

    assert!(matches!(err, BrochureError::Fetch(_)));
    assert!(llm.prompts.lock().unwrap().is_empty());
    assert!(display.shown.is_empty());
}

#[tokio::test]
async fn create_shows_and_returns_the_raw_reply() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html("Acme", "<p>Rockets.</p>"), 1).await;

    let llm = Arc::new(ScriptedLlm::new(r#"{"links":[]}"#));
    let generator = BrochureGenerator::new(llm.clone(), aggregator(llm.clone()));
    let mut display = RecordingDisplay::default();

    let brochure = generator
        .create("Acme", &server.uri(), &mut display)
        .await
        .unwrap();

    assert_eq!(brochure, "# Acme\nA fine company.");
    assert_eq!(display.shown, vec![brochure.clone()]);

    let prompt = llm.last_prompt();
    assert!(prompt.starts_with(
        "You are looking at a company called: Acme\n\n\
         Here are the contents of its landing page and other relevant pages. \
         Use this information to build a short brochure of the company in markdown.\n\n\
         Landing page:\nWebpage Title:\nAcme\n"
    ));
    assert!(prompt.ends_with("No valid subpage links found.\n"));
}

#[tokio::test]
async fn long_sites_are_cut_to_the_prompt_budget() {
    let server = MockServer::start().await;
    let filler = "é".repeat(12_000);
    mount_page(&server, "/", html("Acme", &format!("<p>{filler}</p>")), 2).await;

    let llm = Arc::new(ScriptedLlm::new(r#"{"links":[]}"#));
    let generator = BrochureGenerator::new(llm.clone(), aggregator(llm.clone()));

    let prompt = generator.build_user_prompt("Acme", &server.uri()).await.unwrap();
    assert_eq!(prompt.chars().count(), 5000);

    let prompt = generator
        .with_max_prompt_chars(100)
        .build_user_prompt("Acme", &server.uri())
        .await
        .unwrap();
    assert_eq!(prompt.chars().count(), 100);
}

#[tokio::test]
async fn stream_shows_cleaned_snapshots_and_returns_the_last() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html("Acme", "<p>Rockets.</p>"), 1).await;

    let llm = Arc::new(
        ScriptedLlm::new(r#"{"links":[]}"#).streaming(&[
            "```mark",
            "down\n# Acme",
            "\nGreat ",
            "place```",
        ]),
    );
    let generator = BrochureGenerator::new(llm.clone(), aggregator(llm.clone()));
    let mut display = RecordingDisplay::default();

    let brochure = generator
        .stream("Acme", &server.uri(), &mut display)
        .await
        .unwrap();

    assert_eq!(
        display.shown,
        vec!["mark", "\n# Acme", "\n# Acme\nGreat ", "\n# Acme\nGreat place"]
    );
    assert_eq!(brochure, "\n# Acme\nGreat place");
}

#[tokio::test]
async fn stream_error_surfaces_after_partial_output() {
    let items: Vec<Result<String>> = vec![
        Ok("# Acme".to_string()),
        Err(BrochureError::Llm("connection reset".into())),
    ];
    let mut display = RecordingDisplay::default();

    let err = render_stream(Box::pin(futures::stream::iter(items)), &mut display)
        .await
        .unwrap_err();

    assert!(matches!(err, BrochureError::Llm(_)));
    assert_eq!(display.shown, vec!["# Acme"]);
}

#[tokio::test]
async fn empty_stream_yields_empty_brochure() {
    let items: Vec<Result<String>> = Vec::new();
    let mut display = RecordingDisplay::default();

    let brochure = render_stream(Box::pin(futures::stream::iter(items)), &mut display)
        .await
        .unwrap();

    assert_eq!(brochure, "");
    assert!(display.shown.is_empty());
}
