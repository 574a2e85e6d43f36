use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::{ClipError, Result};

/// Result of an enrichment step, marshaled back to the owner task which
/// patches the item and persists.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichEvent {
    Metadata {
        id: Uuid,
        title: Option<String>,
        thumbnail_url: Option<String>,
    },
    Thumbnail {
        id: Uuid,
        bytes: Vec<u8>,
    },
}

/// Network seam for enrichment, so tests can script responses.
#[async_trait]
pub trait MetadataFetcher: Send + Sync + 'static {
    async fn fetch_page(&self, url: &str) -> Result<String>;
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("clipstack/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| ClipError::Fetch(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MetadataFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ClipError::Fetch(e.to_string()))?;
        response
            .text()
            .await
            .map_err(|e| ClipError::Fetch(e.to_string()))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ClipError::Fetch(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClipError::Fetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Launches and tracks enrichment fetches. At most one task is in flight
/// per item id and per step: enqueueing again for the same id aborts the
/// previous task for that id, and only that one. Failures are dropped
/// silently; nothing is retried.
pub struct Enricher {
    fetcher: Arc<dyn MetadataFetcher>,
    events: mpsc::Sender<EnrichEvent>,
    page_tasks: HashMap<Uuid, JoinHandle<()>>,
    thumb_tasks: HashMap<Uuid, JoinHandle<()>>,
}

impl Enricher {
    pub fn new(fetcher: Arc<dyn MetadataFetcher>, events: mpsc::Sender<EnrichEvent>) -> Self {
        Self {
            fetcher,
            events,
            page_tasks: HashMap::new(),
            thumb_tasks: HashMap::new(),
        }
    }

    /// Fetch the page behind a URL item and report its title and thumbnail
    /// URL, if any.
    pub fn enqueue_page(&mut self, id: Uuid, url: String) {
        if let Some(previous) = self.page_tasks.remove(&id) {
            previous.abort();
        }
        let fetcher = Arc::clone(&self.fetcher);
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            match fetcher.fetch_page(&url).await {
                Ok(html) => {
                    let title = extract_title(&html);
                    let thumbnail_url = extract_thumbnail_url(&html, &url);
                    if title.is_some() || thumbnail_url.is_some() {
                        let _ = events
                            .send(EnrichEvent::Metadata {
                                id,
                                title,
                                thumbnail_url,
                            })
                            .await;
                    }
                }
                Err(e) => tracing::debug!("metadata fetch for {} dropped: {}", url, e),
            }
        });
        self.page_tasks.insert(id, handle);
    }

    /// Independently cancelable second step: fetch the thumbnail bytes.
    pub fn enqueue_thumbnail(&mut self, id: Uuid, thumbnail_url: String) {
        if let Some(previous) = self.thumb_tasks.remove(&id) {
            previous.abort();
        }
        let fetcher = Arc::clone(&self.fetcher);
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            match fetcher.fetch_bytes(&thumbnail_url).await {
                Ok(bytes) if !bytes.is_empty() => {
                    let _ = events.send(EnrichEvent::Thumbnail { id, bytes }).await;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("thumbnail fetch for {} dropped: {}", thumbnail_url, e)
                }
            }
        });
        self.thumb_tasks.insert(id, handle);
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.page_tasks.drain() {
            handle.abort();
        }
        for (_, handle) in self.thumb_tasks.drain() {
            handle.abort();
        }
    }
}

impl Drop for Enricher {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Pull the page title out of an HTML document: first `<title>` element,
/// entities decoded for the common cases, whitespace collapsed. Empty
/// titles are reported as absent.
pub fn extract_title(html: &str) -> Option<String> {
    let re = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok()?;
    let raw = re.captures(html)?.get(1)?.as_str();
    let decoded = decode_entities(raw);
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Thumbnail source: `og:image` when declared, else the site favicon.
pub fn extract_thumbnail_url(html: &str, page_url: &str) -> Option<String> {
    for pattern in [
        r#"(?is)<meta[^>]+property\s*=\s*["']og:image["'][^>]+content\s*=\s*["']([^"']+)["']"#,
        r#"(?is)<meta[^>]+content\s*=\s*["']([^"']+)["'][^>]+property\s*=\s*["']og:image["']"#,
    ] {
        if let Some(found) = Regex::new(pattern)
            .ok()
            .and_then(|re| re.captures(html))
            .and_then(|caps| caps.get(1))
        {
            if let Some(resolved) = resolve_url(found.as_str(), page_url) {
                return Some(resolved);
            }
        }
    }
    origin_of(page_url).map(|origin| format!("{}/favicon.ico", origin))
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// `scheme://host[:port]` of a URL string, without a trailing slash.
fn origin_of(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let host = rest.split(['/', '?', '#']).next()?;
    if host.is_empty() {
        return None;
    }
    Some(format!("{}://{}", scheme, host))
}

fn resolve_url(candidate: &str, page_url: &str) -> Option<String> {
    if candidate.contains("://") {
        return Some(candidate.to_string());
    }
    if let Some(rest) = candidate.strip_prefix("//") {
        let scheme = page_url.split("://").next()?;
        return Some(format!("{}://{}", scheme, rest));
    }
    if candidate.starts_with('/') {
        return Some(format!("{}{}", origin_of(page_url)?, candidate));
    }
    None
}
