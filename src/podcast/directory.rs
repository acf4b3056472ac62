use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use super::feed::{FeedError, parse_feed};
use super::Podcast;
use crate::http::{HttpError, HttpFetcher};

pub const ITUNES_BASE_URL: &str = "https://itunes.apple.com";

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("no podcast found for \"{0}\"")]
    NotFound(String),

    #[error("directory request failed: {0}")]
    Http(#[from] HttpError),

    #[error("directory response was not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("feed could not be parsed: {0}")]
    Feed(#[from] FeedError),
}

/// Resolves a spoken show name to a fetched feed. Implementations block
/// until the feed is available or the lookup failed.
pub trait DirectoryClient: Send + Sync {
    fn resolve(&self, show: &str) -> Result<Podcast, DirectoryError>;
}

pub struct ItunesDirectory {
    base_url: String,
    http: HttpFetcher,
}

impl ItunesDirectory {
    pub fn new(base_url: impl Into<String>, http: HttpFetcher) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn search_feed_url(&self, show: &str) -> Result<String, DirectoryError> {
        let url = format!("{}/search", self.base_url);
        let raw = self.http.get_text(
            &url,
            &[("attribute", "titleTerm"), ("term", show), ("media", "podcast")],
        )?;
        let parsed: Value = serde_json::from_str(&raw)?;
        first_feed_url(&parsed).ok_or_else(|| DirectoryError::NotFound(show.to_string()))
    }

    pub fn fetch_podcast(&self, feed_url: &str) -> Result<Podcast, DirectoryError> {
        let xml = self.http.get_text(feed_url, &[])?;
        Ok(parse_feed(feed_url, &xml)?)
    }
}

impl DirectoryClient for ItunesDirectory {
    fn resolve(&self, show: &str) -> Result<Podcast, DirectoryError> {
        let show = show.trim();
        if show.is_empty() {
            return Err(DirectoryError::NotFound(String::new()));
        }
        let feed_url = self.search_feed_url(show)?;
        debug!(%show, %feed_url, "directory match");
        let podcast = self.fetch_podcast(&feed_url)?;
        info!(
            %show,
            title = %podcast.title,
            episodes = podcast.len(),
            "resolved podcast"
        );
        Ok(podcast)
    }
}

fn first_feed_url(value: &Value) -> Option<String> {
    value
        .get("results")?
        .as_array()?
        .iter()
        .filter_map(|result| result.get("feedUrl")?.as_str())
        .map(str::trim)
        .find(|url| !url.is_empty())
        .map(str::to_string)
}
