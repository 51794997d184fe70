//! In-memory Vector Index
//!
//! 프로세스 메모리에 엔트리를 두는 전수 검색 인덱스입니다.
//! 영속성이 필요 없는 작업과 파이프라인 테스트에 사용합니다.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::vector::{
    ensure_dimension, rank_by_score, DistanceMetric, IndexEntry, RetrievalResult, ScoredEntry,
    VectorIndex,
};
use crate::embedding::EmbeddingVector;

#[derive(Debug, Default)]
struct Inner {
    /// (삽입 순번, 엔트리)
    entries: Vec<(u64, IndexEntry)>,
    next_seq: u64,
}

/// 메모리 벡터 인덱스
#[derive(Debug)]
pub struct MemoryVectorIndex {
    dimension: usize,
    metric: DistanceMetric,
    inner: RwLock<Inner>,
}

impl MemoryVectorIndex {
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn lock_error<T>(e: std::sync::PoisonError<T>) -> anyhow::Error {
        anyhow::anyhow!("Lock error: {}", e)
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<usize> {
        for entry in entries {
            ensure_dimension(self.dimension, entry.vector.dim(), "Entry vector")?;
        }

        let mut inner = self.inner.write().map_err(Self::lock_error)?;
        for entry in entries {
            // 교체된 엔트리는 새 순번을 받습니다
            inner.entries.retain(|(_, e)| e.id != entry.id);
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.entries.push((seq, entry.clone()));
        }

        Ok(entries.len())
    }

    async fn query(&self, vector: &EmbeddingVector, k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Ok(vec![]);
        }
        ensure_dimension(self.dimension, vector.dim(), "Query vector")?;

        let inner = self.inner.read().map_err(Self::lock_error)?;
        let scored = inner
            .entries
            .iter()
            .map(|(seq, entry)| {
                let score = self.metric.similarity(&entry.vector.values, &vector.values);
                (
                    *seq,
                    ScoredEntry {
                        entry: entry.clone(),
                        score,
                    },
                )
            })
            .collect();

        Ok(rank_by_score(scored, k))
    }

    async fn count(&self) -> Result<usize> {
        let inner = self.inner.read().map_err(Self::lock_error)?;
        Ok(inner.entries.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::Chunk;
    use std::collections::BTreeMap;

    fn entry(id: &str, values: Vec<f32>) -> IndexEntry {
        IndexEntry {
            id: id.to_string(),
            chunk: Chunk {
                text: format!("text {}", id),
                sequence_index: 0,
                source_offset: 0,
            },
            vector: EmbeddingVector::new(values),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty() {
        let index = MemoryVectorIndex::new(2, DistanceMetric::Cosine);
        let results = index.query(&vec![1.0, 0.0].into(), 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_query_sorted_and_k_zero() {
        let index = MemoryVectorIndex::new(2, DistanceMetric::Cosine);
        index
            .upsert(&[
                entry("a", vec![1.0, 0.0]),
                entry("b", vec![0.0, 1.0]),
                entry("c", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = index.query(&vec![1.0, 0.1].into(), 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].entry.id, "a");
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

        assert!(index.query(&vec![1.0, 0.1].into(), 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_id() {
        let index = MemoryVectorIndex::new(2, DistanceMetric::Cosine);
        index.upsert(&[entry("a", vec![1.0, 0.0])]).await.unwrap();
        index.upsert(&[entry("a", vec![0.0, 1.0])]).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let results = index.query(&vec![0.0, 1.0].into(), 1).await.unwrap();
        assert!((results[0].score - 1.0).abs() < 0.0001);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let index = MemoryVectorIndex::new(3, DistanceMetric::Cosine);
        assert!(index.upsert(&[entry("a", vec![1.0, 0.0])]).await.is_err());
        assert!(index.query(&vec![1.0].into(), 1).await.is_err());
    }
}
