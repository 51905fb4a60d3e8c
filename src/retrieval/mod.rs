//! Context retrieval
//!
//! Turns a profile into a short list of topical queries, fans them out to a
//! similarity-search collaborator and keeps a capped, de-duplicated set of
//! passages. Accumulation order is query order, then result order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::config::{AppConfig, RetrievalConfig};
use crate::models::UserProfile;
use crate::prompt::clip;
use crate::Result;

pub mod http;
pub mod store;

pub use http::HttpRetriever;
pub use store::DocumentStore;

pub const EMPLOYER_QUERIES: [&str; 3] = [
    "401(k) basics fees match",
    "Roth 401(k) vs Traditional 401(k)",
    "auto-enrollment target-date funds",
];
pub const HEALTH_ACCOUNT_QUERY: &str = "HSA eligibility HDHP tax benefits vs FSA";
pub const SAVINGS_GOAL_QUERY: &str = "saving plan contribution priority emergency fund rule of thumb";
pub const DEFAULT_QUERY: &str = "retirement plan basics";

pub const MAX_QUERIES: usize = 4;

/// Characters of passage content used in the de-duplication key
pub const DEDUP_PREFIX_CHARS: usize = 120;

/// A retrieved text chunk and its source label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
    pub source: String,
}

impl Passage {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
        }
    }
}

/// Similarity-search collaborator
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` passages most similar to `query`, best first
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>>;
}

/// Passages retained for one request, in accumulation order
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievedContext {
    pub passages: Vec<Passage>,
    pub queries: Vec<String>,
}

impl RetrievedContext {
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn contents(&self) -> Vec<&str> {
        self.passages.iter().map(|p| p.content.as_str()).collect()
    }

    /// Non-empty sources, first occurrence order
    pub fn unique_sources(&self) -> Vec<String> {
        unique_sources(self.passages.iter().map(|p| p.source.as_str()))
    }
}

pub(crate) fn unique_sources<'a>(sources: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    sources
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(*s))
        .map(str::to_string)
        .collect()
}

/// Topical queries for a profile (at most four)
pub fn build_queries(profile: &UserProfile) -> Vec<String> {
    let mut queries: Vec<String> = Vec::new();

    if profile.help_type().is_employer() {
        queries.extend(EMPLOYER_QUERIES.iter().map(|q| q.to_string()));
    }

    if profile
        .form
        .benefits
        .employer_plan_options
        .iter()
        .any(|o| o.is_health_account())
    {
        queries.push(HEALTH_ACCOUNT_QUERY.to_string());
    }

    let has_goal = profile
        .form
        .savings_goal
        .what_are_you_saving_for
        .as_deref()
        .is_some_and(|goal| !goal.is_empty());
    if has_goal {
        queries.push(SAVINGS_GOAL_QUERY.to_string());
    }

    queries.truncate(MAX_QUERIES);
    if queries.is_empty() {
        queries.push(DEFAULT_QUERY.to_string());
    }
    queries
}

/// Collect at most `k_total` unique passages for a profile.
///
/// Retriever errors are returned as-is; the caller decides how to surface them.
pub async fn retrieve_contexts(
    retriever: &dyn Retriever,
    profile: &UserProfile,
    config: RetrievalConfig,
) -> Result<RetrievedContext> {
    let queries = build_queries(profile);
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut passages: Vec<Passage> = Vec::with_capacity(config.k_total);

    'queries: for query in &queries {
        if passages.len() >= config.k_total {
            break;
        }

        let docs = retriever.search(query, config.k_each).await?;
        debug!(query = %query, returned = docs.len(), "Similarity search completed");

        for doc in docs.into_iter().take(config.k_each) {
            let key = (
                doc.source.clone(),
                clip(&doc.content, DEDUP_PREFIX_CHARS).to_string(),
            );
            if !seen.insert(key) {
                continue;
            }
            passages.push(doc);
            if passages.len() >= config.k_total {
                break 'queries;
            }
        }
    }

    Ok(RetrievedContext { passages, queries })
}

/// Remote search service when `RETRIEVAL_URL` is set, otherwise the local store
pub async fn retriever_from_config(config: &AppConfig) -> Result<Arc<dyn Retriever>> {
    match &config.retrieval_url {
        Some(url) => {
            info!(url = %url, "Using remote similarity search");
            Ok(Arc::new(HttpRetriever::new(url, config.inference.timeout)?))
        }
        None => Ok(Arc::new(DocumentStore::open(&config.vector_store_dir).await?)),
    }
}

/// Fixed answers per query; records every call it receives.
#[derive(Default)]
pub struct StaticRetriever {
    answers: HashMap<String, Vec<Passage>>,
    fallback: Vec<Passage>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl StaticRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(mut self, query: &str, passages: Vec<Passage>) -> Self {
        self.answers.insert(query.to_string(), passages);
        self
    }

    /// Passages returned for queries without a dedicated answer
    pub fn with_fallback(mut self, passages: Vec<Passage>) -> Self {
        self.fallback = passages;
        self
    }

    /// Queries received so far, with the requested `k`
    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((query.to_string(), k));
        }
        let passages = self.answers.get(query).unwrap_or(&self.fallback);
        Ok(passages.iter().take(k).cloned().collect())
    }
}

/// Wire shape shared by the HTTP service and the local document file
#[derive(Debug, Deserialize)]
pub(crate) struct StoredPassage {
    #[serde(alias = "page_content")]
    content: String,
    #[serde(default)]
    metadata: StoredMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct StoredMetadata {
    #[serde(default)]
    source: Option<String>,
}

impl From<StoredPassage> for Passage {
    fn from(stored: StoredPassage) -> Self {
        Passage {
            content: stored.content,
            source: stored.metadata.source.unwrap_or_default(),
        }
    }
}
