//! Image search, Firecrawl `/v2/search` style.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::{Artifact, ArtifactSource, Fetched};
use crate::catalog::CatalogEntry;
use crate::constants::{
    DEFAULT_QUERY_SUFFIX, DEFAULT_SEARCH_ENDPOINT, DEFAULT_SEARCH_LIMIT, SEARCH_TIMEOUT,
};
use crate::error::{FetchError, PipelineError};
use crate::retry::{RetryPolicy, retry_with_backoff};

/// Settings for [`SearchSource`].
#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Search endpoint
    pub endpoint: String,
    /// Bearer token
    pub api_key: String,
    /// Appended to the entry name to build the default query
    pub query_suffix: String,
    /// Number of results requested, only the first is used
    pub limit: u8,
    /// Pause between alternate queries for the same entry
    pub query_cooldown: Duration,
    /// Per-request timeout
    pub timeout: Duration,
}

impl SearchConfig {
    /// Defaults for everything but the key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            api_key: api_key.into(),
            query_suffix: DEFAULT_QUERY_SUFFIX.to_string(),
            limit: DEFAULT_SEARCH_LIMIT,
            query_cooldown: Duration::from_secs(3),
            timeout: SEARCH_TIMEOUT,
        }
    }
}

#[derive(Serialize, Debug)]
struct SearchRequest<'a> {
    query: &'a str,
    limit: u8,
    sources: [SearchSourceKind; 1],
}

#[derive(Serialize, Debug)]
struct SearchSourceKind {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize, Debug)]
struct SearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<SearchData>,
}

#[derive(Deserialize, Debug, Default)]
struct SearchData {
    #[serde(default)]
    images: Vec<ImageResult>,
}

#[derive(Deserialize, Debug)]
struct ImageResult {
    #[serde(default, rename = "imageUrl")]
    image_url: Option<String>,
}

/// Finds an image URL for an entry by text search.
#[derive(Debug)]
pub struct SearchSource {
    client: reqwest::Client,
    endpoint: Url,
    config: SearchConfig,
}

impl SearchSource {
    /// Validates the endpoint and builds the HTTP client.
    pub fn new(config: SearchConfig) -> Result<Self, PipelineError> {
        let endpoint = Url::parse(&config.endpoint)?;
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    /// Queries tried for an entry: the default one, then any alternates from the catalog.
    pub fn queries(&self, entry: &CatalogEntry) -> Vec<String> {
        let suffix = self.config.query_suffix.trim();
        let default = if suffix.is_empty() {
            entry.name.clone()
        } else {
            format!("{} {}", entry.name, suffix)
        };
        let mut queries = vec![default];
        for query in &entry.queries {
            if !queries.contains(query) {
                queries.push(query.clone());
            }
        }
        queries
    }

    /// One search request. `Ok(None)` means the remote had no usable result.
    async fn search_once(&self, query: &str) -> Result<Option<String>, FetchError> {
        let body = SearchRequest {
            query,
            limit: self.config.limit,
            sources: [SearchSourceKind { kind: "images" }],
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(FetchError::from_status(status, &bytes));
        }

        let parsed: SearchResponse = serde_json::from_slice(&bytes)?;
        if !parsed.success {
            return Err(FetchError::Malformed(
                "search response reported success=false".to_string(),
            ));
        }
        Ok(first_image_url(parsed.data.unwrap_or_default()))
    }
}

/// The first result's URL, if it is an http(s) URL.
fn first_image_url(data: SearchData) -> Option<String> {
    let url = data.images.into_iter().next()?.image_url?;
    match Url::parse(url.trim()) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Some(parsed.to_string()),
        _ => {
            debug!("Ignoring unusable image URL {url:?}");
            None
        }
    }
}

impl ArtifactSource for SearchSource {
    fn name(&self) -> &'static str {
        "search"
    }

    async fn fetch_artifact(
        &self,
        entry: &CatalogEntry,
        policy: &RetryPolicy,
    ) -> Result<Fetched, FetchError> {
        let this = self;
        let queries = self.queries(entry);
        let mut last_error = None;

        for (index, query) in queries.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.query_cooldown).await;
            }
            info!("Searching: {query:?}");
            match retry_with_backoff(policy, &entry.name, move || this.search_once(query)).await {
                Ok(Some(url)) => return Ok(Fetched::Found(Artifact::Url(url))),
                Ok(None) => {}
                Err(err) => last_error = Some(err),
            }
        }

        // NotFound only when every query got a clean empty answer.
        match last_error {
            Some(err) => Err(err),
            None => Ok(Fetched::NotFound(format!(
                "no image found for {} quer{}",
                queries.len(),
                if queries.len() == 1 { "y" } else { "ies" }
            ))),
        }
    }
}
