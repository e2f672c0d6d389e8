use anyhow::Result;
use brochure_common::observability::init_logging;
use brochure_config::{BrochureConfig, BrochureConfigLoader};
use brochure_llm::ensure_llm_ready;
use brochure_llm::links::LinkSelector;
use brochure_web::fetch::DEFAULT_USER_AGENT;
use brochure_web::{BrochureGenerator, ContentAggregator, PageFetcher};
use clap::{Parser, Subcommand};
use display::TerminalDisplay;
use std::path::PathBuf;
mod display;

/// Write a short markdown brochure about a company from its website.
#[derive(Debug, Parser)]
#[command(name = "brochure", version)]
struct Cli {
    /// Extra YAML config file, merged over the per-user one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model name, overriding the configured one.
    #[arg(long, global = true)]
    model: Option<String>,

    /// Chat provider (ollama or openai).
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Character budget of the brochure prompt.
    #[arg(long = "max-chars", global = true)]
    max_chars: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate the brochure in one request and print it.
    Create { name: String, url: String },
    /// Generate the brochure, rendering it as it streams in.
    Stream { name: String, url: String },
    /// Print the links the model considers brochure-relevant.
    Links { url: String },
    /// Print a page's title, text and links as extracted.
    Page { url: String },
}

fn load_config(cli: &Cli) -> Result<BrochureConfig> {
    let mut loader = BrochureConfigLoader::new().with_default_file();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    if let Some(provider) = &cli.provider {
        loader = loader.with_override("llm.provider", provider.as_str())?;
    }
    if let Some(model) = &cli.model {
        loader = loader.with_override("llm.model", model.as_str())?;
    }
    if let Some(max) = cli.max_chars {
        loader = loader.with_override("brochure.max_prompt_chars", i64::from(max))?;
    }
    Ok(loader.load()?)
}

fn build_fetcher(cfg: &BrochureConfig) -> Result<PageFetcher> {
    let user_agent = cfg.fetch.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
    let mut fetcher = PageFetcher::new(user_agent)?;
    if let Some(timeout) = cfg.fetch.timeout() {
        fetcher = fetcher.with_timeout(timeout);
    }
    Ok(fetcher)
}

async fn build_pipeline(cfg: &BrochureConfig) -> Result<(ContentAggregator, BrochureGenerator)> {
    let llm = ensure_llm_ready(&cfg.llm).await?;
    let selector = LinkSelector::new(llm.clone()).with_policy(cfg.brochure.url_policy);
    let aggregator = ContentAggregator::new(build_fetcher(cfg)?, selector);
    let generator = BrochureGenerator::new(llm, aggregator.clone())
        .with_max_prompt_chars(cfg.brochure.max_prompt_chars);
    Ok((aggregator, generator))
}

async fn run(command: Command, cfg: BrochureConfig) -> Result<()> {
    match command {
        Command::Page { url } => {
            let page = build_fetcher(&cfg)?.fetch(&url).await?;
            print!("{}", page.contents());
            println!("Links:");
            for link in page.links() {
                println!("{link}");
            }
        }
        Command::Links { url } => {
            let (aggregator, _) = build_pipeline(&cfg).await?;
            for link in aggregator.relevant_links(&url).await? {
                println!("{link}");
            }
        }
        Command::Create { name, url } => {
            let (_, generator) = build_pipeline(&cfg).await?;
            let mut display = TerminalDisplay::stdout();
            generator.create(&name, &url, &mut display).await?;
            display.finish()?;
        }
        Command::Stream { name, url } => {
            let (_, generator) = build_pipeline(&cfg).await?;
            let mut display = TerminalDisplay::stdout();
            generator.stream(&name, &url, &mut display).await?;
            display.finish()?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config first: it decides where logs go. CLI flags beat env, env beats files.
    let cfg = load_config(&cli)?;
    let log_path = init_logging(cfg.logging.to_log_config("brochure"))?;
    tracing::info!(
        log = %log_path.display(),
        provider = cfg.llm.provider_name(),
        model = ?cfg.llm.model(),
        "brochure starting"
    );

    tokio::select! {
        res = run(cli.command, cfg) => {
            if let Err(e) = &res {
                tracing::error!(error = %e, "brochure failed");
            }
            res
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted");
            println!();
            Ok(())
        }
    }
}
