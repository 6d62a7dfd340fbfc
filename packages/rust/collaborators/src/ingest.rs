//! Ingestion collaborators: a local JSON feed file, GNews-style HTTP APIs,
//! and RSS/Atom feeds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use feed_rs::model::Entry;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use marketpulse_shared::{
    AppConfig, Arity, CallArgs, Collaborator, CollaboratorError, CollaboratorFuture,
    CollaboratorOutput, PipelineError, Record, Result,
};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("marketpulse/", env!("CARGO_PKG_VERSION"));

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(timeout)
        .build()
        .map_err(|e| PipelineError::Network(format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// feed_file
// ---------------------------------------------------------------------------

/// Reads a JSON array of article objects from disk.
#[derive(Debug, Clone)]
pub struct FeedFile {
    path: PathBuf,
}

impl FeedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let path = config
            .sources
            .feed_path
            .as_ref()
            .ok_or_else(|| PipelineError::config("sources.feed_path is not set"))?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Collaborator for FeedFile {
    fn name(&self) -> &str {
        "feed_file"
    }

    fn arity(&self) -> Arity {
        Arity::TakesNoInput
    }

    fn call(&self, _args: CallArgs) -> CollaboratorFuture {
        let path = self.path.clone();
        Box::pin(async move {
            load_feed(&path)
                .await
                .map(CollaboratorOutput::Records)
                .map_err(CollaboratorError::from)
        })
    }
}

/// Parse a feed file into records. Every array element must be an object.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn load_feed(path: &Path) -> Result<Vec<Record>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PipelineError::io(path, e))?;

    let values: Vec<Value> = serde_json::from_str(&content).map_err(|e| {
        PipelineError::parse(format!("{}: expected a JSON array of articles: {e}", path.display()))
    })?;

    let records = values
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            Record::from_value(value).ok_or_else(|| {
                PipelineError::parse(format!("{}: element {i} is not an object", path.display()))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(count = records.len(), "loaded feed file");
    Ok(records)
}

// ---------------------------------------------------------------------------
// http_api
// ---------------------------------------------------------------------------

/// Polls news API endpoints returning `{"articles": [...]}`.
///
/// A failing endpoint is logged and skipped; the others still contribute.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    urls: Vec<Url>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    articles: Vec<ApiArticle>,
}

#[derive(Debug, Deserialize)]
struct ApiArticle {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

impl ApiArticle {
    fn into_record(self) -> Record {
        let content = self
            .description
            .filter(|d| !d.is_empty())
            .or(self.content)
            .unwrap_or_default();
        let published_at = self
            .published_at
            .unwrap_or_else(|| Utc::now().to_rfc3339());

        Record::new()
            .with("title", self.title.map_or(Value::Null, Value::from))
            .with("content", content)
            .with("link", self.url.map_or(Value::Null, Value::from))
            .with("source", "API")
            .with("published_at", published_at)
    }
}

impl HttpApi {
    pub fn new(urls: Vec<Url>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            urls,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        if config.sources.api_urls.is_empty() {
            return Err(PipelineError::config("sources.api_urls is empty"));
        }
        Self::new(
            config.sources.api_urls.clone(),
            Duration::from_secs(config.sources.request_timeout_secs),
        )
    }

    /// Fetch every endpoint in order and concatenate their articles.
    #[instrument(skip_all, fields(endpoints = self.urls.len()))]
    pub async fn fetch_all(&self) -> Vec<Record> {
        let mut records = Vec::new();
        for url in &self.urls {
            match fetch_articles(&self.client, url).await {
                Ok(items) => {
                    info!(%url, count = items.len(), "fetched articles");
                    records.extend(items);
                }
                Err(e) => warn!(%url, error = %e, "API fetch failed, skipping endpoint"),
            }
        }
        records
    }
}

impl Collaborator for HttpApi {
    fn name(&self) -> &str {
        "http_api"
    }

    fn arity(&self) -> Arity {
        Arity::TakesNoInput
    }

    fn call(&self, _args: CallArgs) -> CollaboratorFuture {
        let api = self.clone();
        Box::pin(async move { Ok(CollaboratorOutput::Records(api.fetch_all().await)) })
    }
}

async fn fetch_articles(client: &Client, url: &Url) -> Result<Vec<Record>> {
    debug!(%url, "requesting articles");

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| PipelineError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::Network(format!("{url}: HTTP {status}")));
    }

    let body: ApiResponse = response
        .json()
        .await
        .map_err(|e| PipelineError::parse(format!("{url}: invalid JSON body: {e}")))?;

    Ok(body.articles.into_iter().map(ApiArticle::into_record).collect())
}

// ---------------------------------------------------------------------------
// rss
// ---------------------------------------------------------------------------

/// Reads RSS 2.0 / Atom feeds.
///
/// A feed that fails to download or parse is logged and skipped.
#[derive(Debug, Clone)]
pub struct RssFeeds {
    client: Client,
    urls: Vec<Url>,
}

impl RssFeeds {
    pub fn new(urls: Vec<Url>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            urls,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        if config.sources.rss_feeds.is_empty() {
            return Err(PipelineError::config("sources.rss_feeds is empty"));
        }
        Self::new(
            config.sources.rss_feeds.clone(),
            Duration::from_secs(config.sources.request_timeout_secs),
        )
    }

    /// Fetch every feed in order and concatenate their entries.
    #[instrument(skip_all, fields(feeds = self.urls.len()))]
    pub async fn fetch_all(&self) -> Vec<Record> {
        let mut records = Vec::new();
        for url in &self.urls {
            match fetch_feed(&self.client, url).await {
                Ok(items) => {
                    info!(%url, count = items.len(), "fetched feed entries");
                    records.extend(items);
                }
                Err(e) => warn!(%url, error = %e, "RSS fetch failed, skipping feed"),
            }
        }
        records
    }
}

impl Collaborator for RssFeeds {
    fn name(&self) -> &str {
        "rss"
    }

    fn arity(&self) -> Arity {
        Arity::TakesNoInput
    }

    fn call(&self, _args: CallArgs) -> CollaboratorFuture {
        let feeds = self.clone();
        Box::pin(async move { Ok(CollaboratorOutput::Records(feeds.fetch_all().await)) })
    }
}

async fn fetch_feed(client: &Client, url: &Url) -> Result<Vec<Record>> {
    debug!(%url, "requesting feed");

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| PipelineError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::Network(format!("{url}: HTTP {status}")));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| PipelineError::Network(format!("{url}: {e}")))?;

    let feed = feed_rs::parser::parse(&body[..])
        .map_err(|e| PipelineError::parse(format!("{url}: invalid feed: {e}")))?;

    Ok(feed.entries.into_iter().map(entry_record).collect())
}

fn entry_record(entry: Entry) -> Record {
    let content = entry
        .summary
        .map(|s| s.content)
        .filter(|s| !s.is_empty())
        .or_else(|| entry.content.and_then(|c| c.body))
        .unwrap_or_default();
    let link = entry.links.into_iter().next().map(|l| l.href);
    let published_at = entry
        .published
        .or(entry.updated)
        .unwrap_or_else(Utc::now)
        .to_rfc3339();

    Record::new()
        .with("title", entry.title.map_or(Value::Null, |t| Value::from(t.content)))
        .with("content", content)
        .with("link", link.map_or(Value::Null, Value::from))
        .with("source", "RSS")
        .with("published_at", published_at)
}
