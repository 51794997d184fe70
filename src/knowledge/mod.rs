//! Knowledge 모듈 - 청킹 + 벡터 인덱스
//!
//! - Chunker: 구분자 우선순위 기반 재귀 분할 (정확한 overlap)
//! - VectorIndex: 인덱스 포트와 유사도 계산
//! - LanceDB: 영속 벡터 인덱스 (컬렉션 = 테이블)
//! - Catalog: SQLite 컬렉션 레지스트리 + 수집 진행 상황
//! - Memory: 프로세스 내 인덱스

mod catalog;
mod chunker;
mod lance;
mod memory;
mod vector;

use std::path::PathBuf;

// Re-exports
pub use catalog::{
    Catalog, CollectionInfo, CollectionSpec, IngestionRecord, IngestionStatus, CATALOG_FILE,
};
pub use chunker::{split, Chunk, ChunkConfig, RecursiveChunker};
pub use lance::LanceVectorIndex;
pub use memory::MemoryVectorIndex;
pub use vector::{
    cosine_similarity, document_key, dot_product, entry_id, ensure_dimension, rank_by_score,
    squared_l2, DistanceMetric, IndexEntry, RetrievalResult, ScoredEntry, VectorIndex,
};

/// 기본 데이터 디렉토리
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".grounded-rag")
}

/// 기본 벡터 저장소 디렉토리
pub fn default_store_dir() -> PathBuf {
    get_data_dir().join("vectors")
}
