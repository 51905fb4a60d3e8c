//! Local document store
//!
//! Reads `documents.json` from the vector-store directory into an in-RAM
//! full-text index and ranks passages with BM25. Used when no search service
//! is configured.

use async_trait::async_trait;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{self, Schema, Value as TantivyValue, STORED, TEXT};
use tantivy::{doc, Index, IndexReader, ReloadPolicy, TantivyDocument};
use tracing::{info, warn};

use super::{Passage, Retriever, StoredPassage};
use crate::error::AdvisorError;
use crate::Result;

pub const DOCUMENTS_FILE: &str = "documents.json";

const WRITER_HEAP_BYTES: usize = 15_000_000;

pub struct DocumentStore {
    index: Index,
    reader: IndexReader,
    id_field: schema::Field,
    content_field: schema::Field,
    passages: Vec<Passage>,
}

impl DocumentStore {
    /// `id` points back into `passages`; only `content` is tokenized
    fn build_schema() -> (Schema, schema::Field, schema::Field) {
        let mut sb = Schema::builder();
        let id_field = sb.add_u64_field("id", STORED);
        let content_field = sb.add_text_field("content", TEXT);
        (sb.build(), id_field, content_field)
    }

    /// Open the store in `dir`; a missing file yields an empty store
    pub async fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(DOCUMENTS_FILE);

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Document store not found, retrieval will be empty");
                return Self::from_passages(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let stored: Vec<StoredPassage> = serde_json::from_str(&raw)?;
        let store = Self::from_passages(stored.into_iter().map(Passage::from).collect())?;
        info!(path = %path.display(), documents = store.len(), "Document store loaded");
        Ok(store)
    }

    pub fn from_passages(passages: Vec<Passage>) -> Result<Self> {
        let (schema, id_field, content_field) = Self::build_schema();
        let index = Index::create_in_ram(schema);

        let mut writer = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
        for (id, passage) in (0u64..).zip(passages.iter()) {
            writer.add_document(doc!(
                id_field => id,
                content_field => passage.content.as_str(),
            ))?;
        }
        writer.commit()?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            id_field,
            content_field,
            passages,
        })
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

#[async_trait]
impl Retriever for DocumentStore {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        let terms = query_terms(query);
        if k == 0 || terms.is_empty() || self.is_empty() {
            return Ok(Vec::new());
        }

        let parser = QueryParser::for_index(&self.index, vec![self.content_field]);
        let parsed = parser
            .parse_query(&terms)
            .map_err(|e| AdvisorError::Retrieval(format!("Invalid search query: {}", e)))?;

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(k))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (_score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let passage = doc
                .get_first(self.id_field)
                .and_then(|v| v.as_u64())
                .and_then(|id| self.passages.get(id as usize));
            if let Some(passage) = passage {
                results.push(passage.clone());
            }
        }

        Ok(results)
    }
}

/// Free text reduced to plain lowercase terms so query syntax never leaks in
fn query_terms(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DocumentStore {
        DocumentStore::from_passages(vec![
            Passage::new("Roth 401(k) contributions are made after tax.", "roth.md"),
            Passage::new("An HSA requires an HDHP to be eligible.", "hsa.md"),
            Passage::new("Traditional 401(k) contributions lower taxable income.", "trad.md"),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_matching_passages_only() {
        let results = store()
            .search("Roth 401(k) vs Traditional 401(k)", 4)
            .await
            .unwrap();
        let mut sources: Vec<_> = results.iter().map(|p| p.source.as_str()).collect();
        sources.sort();
        assert_eq!(sources, vec!["roth.md", "trad.md"]);
    }

    #[tokio::test]
    async fn test_rare_term_outranks_shared_term() {
        let results = store().search("Roth 401(k)", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source, "roth.md");
        assert_eq!(results[1].source, "trad.md");
    }

    #[tokio::test]
    async fn test_query_syntax_is_plain_text() {
        let results = store().search("HSA AND (HDHP OR \"eligible", 4).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "hsa.md");
    }

    #[test]
    fn test_no_match_returns_nothing() {
        let store = store();
        assert!(tokio_test::block_on(store.search("zebra", 4)).unwrap().is_empty());
        assert!(tokio_test::block_on(store.search("?!", 4)).unwrap().is_empty());
        assert!(tokio_test::block_on(store.search("Roth", 0)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty_store() {
        let dir = std::env::temp_dir().join(format!("advisor-missing-{}", uuid::Uuid::new_v4()));
        let store = DocumentStore::open(&dir).await.unwrap();
        assert!(store.is_empty());
        assert!(store.search("HSA", 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_reads_documents_file() {
        let dir = std::env::temp_dir().join(format!("advisor-store-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(
            dir.join(DOCUMENTS_FILE),
            r#"[{"page_content": "HSA eligibility rules", "metadata": {"source": "hsa.md"}}]"#,
        )
        .await
        .unwrap();

        let store = DocumentStore::open(&dir).await.unwrap();
        assert_eq!(store.len(), 1);
        let results = store.search("HSA eligibility HDHP", 2).await.unwrap();
        assert_eq!(results[0].source, "hsa.md");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
