//! Buzz-scoring collaborator — Hacker News and Reddit mention counts.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::EnrichError;
use crate::model::SocialScore;

/// Queries are truncated to this many characters.
const MAX_QUERY_LEN: usize = 100;

const USER_AGENT: &str = concat!("inboxbrief/", env!("CARGO_PKG_VERSION"));

/// Scores a title's external attention. Either signal source failing
/// counts as zero mentions for that source; the derived buzz level is
/// computed from whatever survived.
#[async_trait]
pub trait BuzzScorer: Send + Sync {
    async fn score(&self, title: &str) -> Result<SocialScore, EnrichError>;
}

/// HN Algolia + Reddit search implementation.
pub struct WebBuzzScorer {
    client: reqwest::Client,
    hn_base_url: String,
    reddit_base_url: String,
}

#[derive(Deserialize)]
struct HnSearchResult {
    #[serde(default)]
    hits: Vec<HnHit>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct HnHit {
    points: Option<u32>,
    num_comments: Option<u32>,
}

#[derive(Deserialize)]
struct RedditSearchResult {
    data: RedditListing,
}

#[derive(Deserialize)]
struct RedditListing {
    #[serde(default)]
    children: Vec<RedditPost>,
}

#[derive(Deserialize)]
struct RedditPost {
    data: RedditPostData,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RedditPostData {
    score: Option<u32>,
    num_comments: Option<u32>,
}

impl Default for WebBuzzScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl WebBuzzScorer {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            hn_base_url: "https://hn.algolia.com".to_string(),
            reddit_base_url: "https://www.reddit.com".to_string(),
        }
    }

    /// Point both searches at different bases (test servers).
    pub fn with_base_urls(
        mut self,
        hn_base_url: impl Into<String>,
        reddit_base_url: impl Into<String>,
    ) -> Self {
        self.hn_base_url = hn_base_url.into();
        self.reddit_base_url = reddit_base_url.into();
        self
    }

    async fn fetch_hn_mentions(&self, query: &str) -> Result<u32, EnrichError> {
        let resp: HnSearchResult = self
            .client
            .get(format!("{}/api/v1/search", self.hn_base_url))
            .query(&[("query", query), ("tags", "story"), ("hitsPerPage", "5")])
            .send()
            .await
            .map_err(|e| EnrichError::Buzz(e.to_string()))?
            .error_for_status()
            .map_err(|e| EnrichError::Buzz(e.to_string()))?
            .json()
            .await
            .map_err(|e| EnrichError::Buzz(e.to_string()))?;

        Ok(resp
            .hits
            .iter()
            .map(|h| h.points.unwrap_or(0) + h.num_comments.unwrap_or(0))
            .sum())
    }

    async fn fetch_reddit_mentions(&self, query: &str) -> Result<u32, EnrichError> {
        let resp: RedditSearchResult = self
            .client
            .get(format!("{}/search.json", self.reddit_base_url))
            .query(&[
                ("q", query),
                ("sort", "relevance"),
                ("limit", "5"),
                ("t", "week"),
            ])
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| EnrichError::Buzz(e.to_string()))?
            .error_for_status()
            .map_err(|e| EnrichError::Buzz(e.to_string()))?
            .json()
            .await
            .map_err(|e| EnrichError::Buzz(e.to_string()))?;

        Ok(resp
            .data
            .children
            .iter()
            .map(|p| p.data.score.unwrap_or(0) + p.data.num_comments.unwrap_or(0))
            .sum())
    }
}

#[async_trait]
impl BuzzScorer for WebBuzzScorer {
    async fn score(&self, title: &str) -> Result<SocialScore, EnrichError> {
        let query: String = title.chars().take(MAX_QUERY_LEN).collect();

        let (hn, reddit) = tokio::join!(
            self.fetch_hn_mentions(&query),
            self.fetch_reddit_mentions(&query),
        );

        // Either side failing counts as zero for that side.
        let hn_mentions = hn.unwrap_or_else(|e| {
            debug!(error = %e, "HN buzz lookup failed");
            0
        });
        let reddit_mentions = reddit.unwrap_or_else(|e| {
            debug!(error = %e, "Reddit buzz lookup failed");
            0
        });

        Ok(SocialScore::new(hn_mentions, reddit_mentions))
    }
}
