//! Tavily Search Client
//!
//! Internet search service used for live context augmentation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::ServiceError;
use crate::services::SearchService;

const TAVILY_API_URL: &str = "https://api.tavily.com/search";

/// Results returned per query
const MAX_RESULTS: usize = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tavily API client
#[derive(Clone)]
pub struct TavilyClient {
    client: Client,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// One search hit, also the rendered shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub content: String,
}

impl TavilyClient {
    pub fn new(api_key: Option<&str>) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.map(|s| s.to_string()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tavily_api_key.as_deref())
    }

    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    /// Probe the API once to confirm the key works
    pub async fn verify(&self) -> bool {
        if !self.is_available() {
            error!("Tavily API key is missing. Set TAVILY_API_KEY.");
            return false;
        }

        match self.search("test query").await {
            Ok(_) => {
                info!("Tavily API key verified");
                true
            }
            Err(e) => {
                error!("Failed to verify Tavily API key: {}", e);
                false
            }
        }
    }
}

/// Render hits as the JSON text handed to prompts
pub fn render_hits(hits: &[SearchHit]) -> String {
    serde_json::to_string(hits).unwrap_or_else(|_| "[]".to_string())
}

#[async_trait]
impl SearchService for TavilyClient {
    async fn search(&self, query: &str) -> Result<String, ServiceError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ServiceError::Auth("TAVILY_API_KEY not set".to_string()))?;

        debug!("Sending Tavily search: {}", query);

        let response = self
            .client
            .post(TAVILY_API_URL)
            .json(&SearchRequest {
                api_key,
                query,
                search_depth: "advanced",
                max_results: MAX_RESULTS,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &text));
        }

        let result: SearchResponse = response.json().await?;
        debug!("Tavily returned {} results", result.results.len());

        Ok(render_hits(&result.results))
    }
}
