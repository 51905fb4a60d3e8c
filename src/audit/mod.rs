//! Audit trail of generation requests
//!
//! Every plan, recommendation and insights request leaves one record,
//! addressable by its request id. Profiles are stored only as a hash.
//! The log keeps the most recent records and drops the oldest at capacity.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::AdvisorError;
use crate::Result;

pub const DEFAULT_AUDIT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    Plan,
    InvestmentCoach,
    MarketInsights,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRecord {
    pub request_id: Uuid,
    pub kind: GenerationKind,
    pub model: String,
    pub success: bool,
    pub chunks_used: usize,
    pub sources: Vec<String>,
    pub queries: Vec<String>,
    pub profile_hash: String,
    pub total_s: f64,
    pub created_at: DateTime<Utc>,
}

impl GenerationRecord {
    pub fn new(kind: GenerationKind, model: impl Into<String>, profile_hash: String) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            kind,
            model: model.into(),
            success: false,
            chunks_used: 0,
            sources: Vec::new(),
            queries: Vec::new(),
            profile_hash,
            total_s: 0.0,
            created_at: Utc::now(),
        }
    }
}

/// In-memory audit storage, insertion ordered and bounded
pub struct AuditLog {
    records: Arc<RwLock<IndexMap<Uuid, GenerationRecord>>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    /// A capacity of zero is treated as one
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(IndexMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Store a record; ids are never reused. Evicts the oldest at capacity.
    pub async fn record(&self, record: GenerationRecord) -> Result<Uuid> {
        let request_id = record.request_id;
        let mut records = self.records.write().await;
        if records.contains_key(&request_id) {
            return Err(AdvisorError::Audit(format!("duplicate request id {}", request_id)));
        }
        while records.len() >= self.capacity {
            if let Some((evicted, _)) = records.shift_remove_index(0) {
                debug!(%evicted, "Audit log full, dropped oldest record");
            }
        }
        records.insert(request_id, record);
        Ok(request_id)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn get(&self, request_id: Uuid) -> Option<GenerationRecord> {
        let records = self.records.read().await;
        records.get(&request_id).cloned()
    }

    /// Newest first
    pub async fn recent(&self, limit: usize) -> Vec<GenerationRecord> {
        let records = self.records.read().await;

        let mut items: Vec<_> = records.values().rev().cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit);
        items
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 of the JSON form of `value`, hex encoded.
/// Serialization streams straight into the hasher.
pub fn compute_profile_hash<T: Serialize + ?Sized>(value: &T) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), value).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_profile;
    use chrono::Duration;

    #[test]
    fn test_profile_hash_is_stable() {
        let profile = sample_profile();
        let first = compute_profile_hash(&profile);
        assert_eq!(first.len(), 64);
        assert_eq!(first, compute_profile_hash(&profile));

        let mut other = sample_profile();
        other.quiz.age += 1;
        assert_ne!(first, compute_profile_hash(&other));
    }

    #[tokio::test]
    async fn test_record_and_get() {
        let log = AuditLog::new();
        let mut record = GenerationRecord::new(GenerationKind::Plan, "test/model", "abc".to_string());
        record.success = true;
        record.sources = vec!["irs.gov".to_string()];

        let id = log.record(record.clone()).await.unwrap();

        let stored = log.get(id).await.unwrap();
        assert_eq!(stored.kind, GenerationKind::Plan);
        assert_eq!(stored.sources, record.sources);
        assert!(log.get(Uuid::new_v4()).await.is_none());

        assert!(log.record(record).await.is_err());
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let log = AuditLog::new();
        let now = Utc::now();
        for (offset, kind) in [
            (2, GenerationKind::Plan),
            (0, GenerationKind::MarketInsights),
            (1, GenerationKind::InvestmentCoach),
        ] {
            let mut record = GenerationRecord::new(kind, "m", String::new());
            record.created_at = now - Duration::seconds(offset);
            log.record(record).await.unwrap();
        }

        let recent = log.recent(2).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind, GenerationKind::MarketInsights);
        assert_eq!(recent[1].kind, GenerationKind::InvestmentCoach);
    }

    #[tokio::test]
    async fn test_oldest_record_evicted_at_capacity() {
        let log = AuditLog::with_capacity(2);
        let first = log
            .record(GenerationRecord::new(GenerationKind::Plan, "m", String::new()))
            .await
            .unwrap();
        let second = log
            .record(GenerationRecord::new(GenerationKind::InvestmentCoach, "m", String::new()))
            .await
            .unwrap();
        let third = log
            .record(GenerationRecord::new(GenerationKind::MarketInsights, "m", String::new()))
            .await
            .unwrap();

        assert_eq!(log.len().await, 2);
        assert!(log.get(first).await.is_none());
        assert!(log.get(second).await.is_some());
        assert!(log.get(third).await.is_some());
    }
}
