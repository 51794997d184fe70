//! Vector Index - 벡터 인덱스 트레이트 및 유틸리티
//!
//! 인덱스 엔트리/검색 결과 타입과 유사도 함수를 정의합니다.
//! 구현체: [`super::LanceVectorIndex`] (영속), [`super::MemoryVectorIndex`] (프로세스 메모리)

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::chunker::{Chunk, ChunkConfig};
use crate::embedding::EmbeddingVector;

// ============================================================================
// Types
// ============================================================================

/// 인덱스 엔트리 (저장용)
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// 안정적인 식별자 (콘텐츠 주소 기반)
    pub id: String,
    /// 원본 청크
    pub chunk: Chunk,
    /// 임베딩 벡터
    pub vector: EmbeddingVector,
    /// 부가 메타데이터 (source, document 등)
    pub metadata: BTreeMap<String, String>,
}

/// 점수가 매겨진 검색 결과 하나
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub entry: IndexEntry,
    /// 유사도 (높을수록 유사)
    pub score: f32,
}

/// 검색 결과: 유사도 내림차순, 길이 ≤ k
pub type RetrievalResult = Vec<ScoredEntry>;

/// 유사도 메트릭 (인덱스 생성 시 고정)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// 코사인 유사도
    #[default]
    Cosine,
    /// 유클리드 거리 (1 / (1 + d²)로 변환)
    L2,
    /// 내적
    Dot,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::Dot => "dot",
        }
    }

    /// 두 벡터의 유사도
    pub fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::L2 => 1.0 / (1.0 + squared_l2(a, b)),
            Self::Dot => dot_product(a, b),
        }
    }

    /// LanceDB `_distance` 값을 유사도로 변환
    ///
    /// LanceDB는 cosine에 `1 - cos`, l2에 제곱 거리, dot에 `1 - a·b`를 반환합니다.
    pub fn similarity_from_distance(&self, distance: f32) -> f32 {
        match self {
            Self::Cosine => 1.0 - distance,
            Self::L2 => 1.0 / (1.0 + distance),
            Self::Dot => 1.0 - distance,
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "l2" | "euclidean" => Ok(Self::L2),
            "dot" => Ok(Self::Dot),
            other => anyhow::bail!("Unknown distance metric: {}", other),
        }
    }
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// VectorIndex 트레이트 (async)
///
/// 동시 읽기는 허용하고 쓰기는 단일 writer를 가정합니다.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 엔트리 배치 upsert. 반환 시점에 배치는 영속화되어 있어야 합니다.
    ///
    /// 같은 id의 엔트리는 교체됩니다.
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<usize>;

    /// k개의 최근접 엔트리 (유사도 내림차순, 동점은 먼저 삽입된 순)
    async fn query(&self, vector: &EmbeddingVector, k: usize) -> Result<RetrievalResult>;

    /// 엔트리 개수
    async fn count(&self) -> Result<usize>;

    /// 인덱스 벡터 차원
    fn dimension(&self) -> usize;

    /// 인덱스 유사도 메트릭
    fn metric(&self) -> DistanceMetric;
}

/// 결과 정렬: 유사도 내림차순, 동점은 삽입 순번 오름차순
pub fn rank_by_score(mut scored: Vec<(u64, ScoredEntry)>, k: usize) -> RetrievalResult {
    scored.sort_by(|(seq_a, a), (seq_b, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(seq_a.cmp(seq_b))
    });
    scored.truncate(k);
    scored.into_iter().map(|(_, s)| s).collect()
}

/// 차원 검증
pub fn ensure_dimension(expected: usize, actual: usize, what: &str) -> Result<()> {
    if expected != actual {
        anyhow::bail!(
            "{} has dimension {}, index expects {}",
            what,
            actual,
            expected
        );
    }
    Ok(())
}

// ============================================================================
// Entry Identity
// ============================================================================

/// 문서 키: 텍스트와 청킹 설정의 해시
///
/// 같은 문서를 같은 설정으로 다시 수집하면 같은 키가 나옵니다.
pub fn document_key(text: &str, config: &ChunkConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:", config.chunk_size, config.chunk_overlap));
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 엔트리 id: 문서 키 + 청크 순번의 해시
pub fn entry_id(document_key: &str, sequence_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", document_key, sequence_index));
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot = dot_product(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_empty() {
        let a: Vec<f32> = vec![];
        assert_eq!(cosine_similarity(&a, &a), 0.0);
    }

    #[test]
    fn test_metric_similarity() {
        let a = [1.0, 2.0];
        let b = [1.0, 2.0];
        assert!((DistanceMetric::L2.similarity(&a, &b) - 1.0).abs() < 0.0001);
        assert!((DistanceMetric::Dot.similarity(&a, &b) - 5.0).abs() < 0.0001);
        assert!((DistanceMetric::Cosine.similarity_from_distance(0.25) - 0.75).abs() < 0.0001);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("Cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!("l2".parse::<DistanceMetric>().unwrap(), DistanceMetric::L2);
        assert!("manhattan".parse::<DistanceMetric>().is_err());
        assert_eq!(DistanceMetric::Dot.to_string(), "dot");
    }

    #[test]
    fn test_rank_ties_by_insertion() {
        let entry = |id: &str| IndexEntry {
            id: id.to_string(),
            chunk: Chunk {
                text: id.to_string(),
                sequence_index: 0,
                source_offset: 0,
            },
            vector: EmbeddingVector::new(vec![1.0]),
            metadata: BTreeMap::new(),
        };
        let scored = vec![
            (3, ScoredEntry { entry: entry("late"), score: 0.5 }),
            (1, ScoredEntry { entry: entry("early"), score: 0.5 }),
            (2, ScoredEntry { entry: entry("best"), score: 0.9 }),
        ];

        let ranked = rank_by_score(scored, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].entry.id, "best");
        assert_eq!(ranked[1].entry.id, "early");
    }

    #[test]
    fn test_entry_identity_is_stable() {
        let config = ChunkConfig::default();
        let key = document_key("same text", &config);
        assert_eq!(key, document_key("same text", &config));
        assert_ne!(
            key,
            document_key(
                "same text",
                &ChunkConfig {
                    chunk_size: 400,
                    chunk_overlap: 100
                }
            )
        );
        assert_eq!(entry_id(&key, 0), entry_id(&key, 0));
        assert_ne!(entry_id(&key, 0), entry_id(&key, 1));
        assert_eq!(key.len(), 64);
    }
}
