//! HTTP similarity-search client
//!
//! Talks to an embedding-backed search service exposing
//! `POST {base}/search` with `{ "query", "k" }`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::error;

use super::{Passage, Retriever, StoredPassage};
use crate::error::AdvisorError;
use crate::Result;

pub struct HttpRetriever {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Documents(Vec<StoredPassage>),
    Wrapped { documents: Vec<StoredPassage> },
}

impl HttpRetriever {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn search_url(&self) -> String {
        format!("{}/search", self.base_url)
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        let response = self
            .client
            .post(self.search_url())
            .json(&json!({ "query": query, "k": k }))
            .send()
            .await
            .map_err(|e| {
                error!("Similarity search request failed: {}", e);
                AdvisorError::Retrieval(format!("search request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdvisorError::Retrieval(format!(
                "search service returned {}: {}",
                status, body
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| AdvisorError::Retrieval(format!("invalid search response: {}", e)))?;

        let documents = match parsed {
            SearchResponse::Documents(docs) => docs,
            SearchResponse::Wrapped { documents } => documents,
        };

        Ok(documents.into_iter().map(Passage::from).collect())
    }
}
