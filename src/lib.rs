//! grounded-rag - 근거 기반 질의응답 (RAG) 시스템
//!
//! 문서를 겹치는 청크로 나누어 LanceDB 컬렉션에 임베딩과 함께 저장하고,
//! 질문 시 벡터 검색 결과와 외부 지식(Wikipedia) 요약을 합친 컨텍스트로
//! 생성 모델(Ollama)에 근거 기반 프롬프트를 보냅니다.

pub mod cli;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod external;
pub mod generation;
pub mod knowledge;
pub mod pipeline;
pub mod retry;

// Re-exports
pub use config::RagConfig;
pub use context::{assemble, AssembledContext};
pub use embedding::{EmbeddingProvider, EmbeddingVector, OllamaEmbedding, RetryingEmbedder};
pub use error::{BoxError, RagError};
pub use external::{ExternalKnowledge, KnowledgeBackend, KnowledgeSnippet, LookupFailure, WikipediaBackend};
pub use generation::{
    AnswerGenerator, GeneratedAnswer, GenerationBackend, OllamaGenerator, SamplingParams,
};
pub use knowledge::{
    get_data_dir, split, Chunk, ChunkConfig, CollectionSpec, DistanceMetric, IndexEntry,
    LanceVectorIndex, MemoryVectorIndex, RecursiveChunker, RetrievalResult, ScoredEntry,
    VectorIndex,
};
pub use pipeline::{IngestReport, Ingestor, QueryOutcome, QueryPipeline, QuerySettings, QueryStage};
pub use retry::RetryPolicy;
