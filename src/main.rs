use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

use feedstock::feed::{self, Digest, Entry, Feed, FeedParser};
use feedstock::{strip_unsafe, Config};

#[derive(Parser, Debug)]
#[command(name = "feedstock", about = "Normalize RSS/Atom feeds and sanitize feed HTML")]
struct Args {
    /// Path to a TOML config file with parser limits
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a feed document and print it as JSON
    Parse {
        /// Feed document, or `-` for stdin
        file: String,

        /// URL the document was fetched from
        #[arg(long, default_value = "")]
        url: String,
    },
    /// Strip unsafe markup from an HTML fragment
    Sanitize {
        /// HTML fragment, or `-` for stdin
        file: String,
    },
    /// List the subscription URLs in an OPML file
    Opml {
        file: String,
    },
    /// Find the feed an HTML page advertises
    Discover {
        file: PathBuf,

        /// URL of the page, used to resolve relative links
        #[arg(long)]
        url: String,
    },
}

#[derive(Serialize)]
struct EntryReport<'a> {
    unique_id: String,
    digest: Digest,
    #[serde(flatten)]
    entry: &'a Entry,
}

#[derive(Serialize)]
struct FeedReport<'a> {
    digest: Digest,
    url: &'a str,
    title: &'a str,
    description: &'a str,
    updated: Option<chrono::DateTime<chrono::Utc>>,
    www_url: &'a str,
    dialect: feed::Dialect,
    retrieved: chrono::DateTime<chrono::Utc>,
    hourly_update_frequency: f64,
    hub_url: Option<&'a str>,
    topic: Option<&'a str>,
    entries: Vec<EntryReport<'a>>,
    errors: Vec<String>,
}

impl<'a> FeedReport<'a> {
    fn new(feed: &'a Feed, errors: Vec<String>) -> Self {
        Self {
            digest: feed.digest(),
            url: &feed.url,
            title: &feed.title,
            description: &feed.description,
            updated: feed.updated,
            www_url: &feed.www_url,
            dialect: feed.dialect,
            retrieved: feed.retrieved,
            hourly_update_frequency: feed.hourly_update_frequency,
            hub_url: feed.hub_url.as_deref(),
            topic: feed.topic.as_deref(),
            entries: feed
                .entries
                .iter()
                .map(|entry| EntryReport {
                    unique_id: entry.unique_id(),
                    digest: entry.digest(),
                    entry,
                })
                .collect(),
            errors,
        }
    }
}

/// Reads a whole input, `-` meaning stdin.
async fn read_input(file: &str) -> Result<Vec<u8>> {
    if file == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut buf)
            .await
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read '{file}'"))
}

async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read '{}'", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => Config::default(),
    };

    match args.command {
        Command::Parse { file, url } => {
            let bytes = read_input(&file).await?;
            let parser = FeedParser::new(config.parse_options());
            let parsed = parser
                .unmarshal(&url, &bytes)
                .with_context(|| format!("Failed to parse feed '{file}'"))?;
            let errors = parsed.errors.iter().map(ToString::to_string).collect();
            let report = FeedReport::new(&parsed.feed, errors);
            let json = serde_json::to_string_pretty(&report).context("Failed to serialize feed")?;
            println!("{json}");
        }
        Command::Sanitize { file } => {
            let bytes = read_input(&file).await?;
            let html = String::from_utf8_lossy(&bytes);
            println!("{}", strip_unsafe(&html));
        }
        Command::Opml { file } => {
            let opml = feed::opml::parse_file(&file)
                .await
                .with_context(|| format!("Failed to read OPML '{file}'"))?;
            let subscriptions = opml.subscriptions();
            if subscriptions.is_empty() {
                eprintln!("Warning: No valid feeds found in OPML file");
            }
            for outline in subscriptions {
                println!("{}\t{}", outline.xml_url, outline.display_title());
            }
        }
        Command::Discover { file, url } => {
            let html = read_text(&file).await?;
            match feed::extract_feed_link(&url, &html)
                .with_context(|| format!("Failed to resolve feed link for '{url}'"))?
            {
                Some(link) => println!("{link}"),
                None => {
                    tracing::info!(url = %url, "Page advertises no feed");
                    eprintln!("No feed link found");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
