//! 파이프라인 - 수집(ingestion)과 질의(query) 흐름
//!
//! - Ingestor: Chunker → EmbeddingProvider → VectorIndex, 배치 단위 순차 커밋
//! - QueryPipeline: 임베딩 → (인덱스 검색 ∥ 외부 지식 조회) → 컨텍스트 조립 → 답변 생성
//!
//! 컴포넌트의 `anyhow` 에러는 이 경계에서 [`RagError`]로 분류됩니다.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::context::{assemble, AssembledContext};
use crate::embedding::{check_batch, EmbeddingProvider};
use crate::error::RagError;
use crate::external::{ExternalKnowledge, KnowledgeBackend, KnowledgeSnippet};
use crate::generation::{
    AnswerGenerator, GeneratedAnswer, GenerationBackend, SamplingParams, DEFAULT_MODEL,
};
use crate::knowledge::{
    document_key, entry_id, Catalog, IndexEntry, IngestionStatus, RecursiveChunker,
    RetrievalResult, VectorIndex,
};

/// 기본 upsert 배치 크기
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// 기본 임베딩 호출당 텍스트 수
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

// ============================================================================
// Ingestor
// ============================================================================

/// 문서 하나의 수집 결과
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub source: String,
    pub document_key: String,
    pub total_chunks: usize,
    /// 이번 실행 이전에 이미 커밋되어 있던 청크 수
    pub resumed_from: usize,
    pub committed_chunks: usize,
    pub batches: usize,
    /// 이미 완료된 문서라 건너뛰었는지
    pub skipped: bool,
}

/// 진행 상황 기록 대상
#[derive(Clone)]
struct ProgressLog {
    catalog: Catalog,
    collection: String,
}

/// 수집기 (단일 writer, 배치 순차 처리)
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    chunker: RecursiveChunker,
    batch_size: usize,
    embed_batch_size: usize,
    progress: Option<ProgressLog>,
}

impl Ingestor {
    /// 새 수집기 생성
    ///
    /// 임베딩 차원과 인덱스 차원이 다르면 설정 에러입니다.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        chunker: RecursiveChunker,
    ) -> Result<Self, RagError> {
        if embedder.dimension() != index.dimension() {
            return Err(RagError::config(format!(
                "embedding model '{}' produces {}-dim vectors but the index expects {}",
                embedder.model_id(),
                embedder.dimension(),
                index.dimension()
            )));
        }

        Ok(Self {
            embedder,
            index,
            chunker,
            batch_size: DEFAULT_BATCH_SIZE,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            progress: None,
        })
    }

    /// 배치 크기 설정
    pub fn with_batch_sizes(mut self, batch_size: usize, embed_batch_size: usize) -> Result<Self, RagError> {
        if batch_size == 0 || embed_batch_size == 0 {
            return Err(RagError::config("batch sizes must be greater than 0"));
        }
        self.batch_size = batch_size;
        self.embed_batch_size = embed_batch_size;
        Ok(self)
    }

    /// 카탈로그에 진행 상황을 기록하고, 중단된 수집을 재개합니다
    pub fn with_progress(mut self, catalog: Catalog, collection: impl Into<String>) -> Self {
        self.progress = Some(ProgressLog {
            catalog,
            collection: collection.into(),
        });
        self
    }

    /// 문서 하나 수집
    ///
    /// 배치 하나가 커밋된 뒤에 다음 배치를 시작합니다.
    /// 실패하면 이미 커밋된 청크 수를 담은 [`RagError::Ingestion`]을 반환합니다.
    pub async fn ingest(&self, source: &str, raw_text: &str) -> Result<IngestReport, RagError> {
        let run_id = Uuid::new_v4();
        let chunks = self.chunker.split(raw_text);
        let key = document_key(raw_text, self.chunker.config());
        let total = chunks.len();

        let mut report = IngestReport {
            run_id,
            source: source.to_string(),
            document_key: key.clone(),
            total_chunks: total,
            resumed_from: 0,
            committed_chunks: 0,
            batches: 0,
            skipped: false,
        };

        if total == 0 {
            tracing::info!("[{}] {} has no content, nothing to ingest", run_id, source);
            return Ok(report);
        }

        if let Some(previous) = self.previous_progress(&key)? {
            if previous.0 == IngestionStatus::Complete {
                tracing::info!("[{}] {} already ingested, skipping", run_id, source);
                report.committed_chunks = total;
                report.resumed_from = total;
                report.skipped = true;
                return Ok(report);
            }
            report.resumed_from = previous.1.min(total);
            tracing::info!(
                "[{}] Resuming {} from chunk {}/{}",
                run_id,
                source,
                report.resumed_from,
                total
            );
        }

        let mut committed = report.resumed_from;

        // 재개 시에도 배치 번호는 문서 처음 기준
        let first_batch = report.resumed_from / self.batch_size;

        for (i, window) in chunks[committed..].chunks(self.batch_size).enumerate() {
            let batch = first_batch + i;
            let fail = |err: anyhow::Error, committed: usize| RagError::Ingestion {
                batch,
                committed_chunks: committed,
                source: err.into(),
            };

            let texts: Vec<String> = window.iter().map(|c| c.text.clone()).collect();

            let mut vectors = Vec::with_capacity(texts.len());
            for sub in texts.chunks(self.embed_batch_size) {
                let embedded = self
                    .embedder
                    .embed_batch(sub)
                    .await
                    .map_err(|e| fail(e, committed))?;
                check_batch(sub.len(), self.index.dimension(), &embedded)
                    .map_err(|e| fail(e, committed))?;
                vectors.extend(embedded);
            }

            let entries: Vec<IndexEntry> = window
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| {
                    let mut metadata = BTreeMap::new();
                    metadata.insert("source".to_string(), source.to_string());
                    metadata.insert("document_key".to_string(), key.clone());
                    IndexEntry {
                        id: entry_id(&key, chunk.sequence_index),
                        chunk: chunk.clone(),
                        vector,
                        metadata,
                    }
                })
                .collect();

            self.index
                .upsert(&entries)
                .await
                .map_err(|e| fail(e, committed))?;

            committed += entries.len();
            report.batches += 1;

            if let Some(progress) = &self.progress {
                progress
                    .catalog
                    .record_progress(&progress.collection, &key, source, total, committed)
                    .map_err(|e| fail(e, committed))?;
            }

            tracing::info!(
                "[{}] Committed batch {} of {} ({}/{} chunks)",
                run_id,
                batch,
                source,
                committed,
                total
            );
        }

        report.committed_chunks = committed;
        Ok(report)
    }

    /// 이전 실행의 (상태, 커밋된 청크 수)
    fn previous_progress(&self, key: &str) -> Result<Option<(IngestionStatus, usize)>, RagError> {
        let Some(progress) = &self.progress else {
            return Ok(None);
        };

        let record = progress
            .catalog
            .get_ingestion(&progress.collection, key)
            .map_err(|e| RagError::Ingestion {
                batch: 0,
                committed_chunks: 0,
                source: e.into(),
            })?;

        Ok(record.map(|r| (r.status, r.committed_chunks)))
    }
}

// ============================================================================
// QueryPipeline
// ============================================================================

/// 질의 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Idle,
    Retrieving,
    Assembling,
    Generating,
    Done,
    Failed,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Retrieving => "retrieving",
            Self::Assembling => "assembling",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// 질의 설정
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySettings {
    pub top_k: usize,
    pub external_results: usize,
    pub model_id: String,
    pub sampling: SamplingParams,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            external_results: 3,
            model_id: DEFAULT_MODEL.to_string(),
            sampling: SamplingParams::default(),
        }
    }
}

/// 검색 단계 결과
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub results: RetrievalResult,
    pub snippets: Vec<KnowledgeSnippet>,
}

/// 질의 결과
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub answer: GeneratedAnswer,
    pub retrieved: Retrieved,
    pub context: AssembledContext,
}

/// 질의 파이프라인
pub struct QueryPipeline<K, G> {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    knowledge: ExternalKnowledge<K>,
    generator: AnswerGenerator<G>,
    settings: QuerySettings,
}

impl<K: KnowledgeBackend, G: GenerationBackend> QueryPipeline<K, G> {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        knowledge: ExternalKnowledge<K>,
        generator: AnswerGenerator<G>,
        settings: QuerySettings,
    ) -> Result<Self, RagError> {
        if settings.top_k == 0 {
            return Err(RagError::config("top_k must be at least 1"));
        }
        if embedder.dimension() != index.dimension() {
            return Err(RagError::config(format!(
                "query embedder produces {}-dim vectors but the index expects {}",
                embedder.dimension(),
                index.dimension()
            )));
        }
        settings.sampling.validate()?;

        Ok(Self {
            embedder,
            index,
            knowledge,
            generator,
            settings,
        })
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// 모델 변경 (대화 중 모델 선택 반영)
    pub fn set_model(&mut self, model_id: impl Into<String>) {
        self.settings.model_id = model_id.into();
    }

    pub fn generator(&self) -> &AnswerGenerator<G> {
        &self.generator
    }

    /// 검색 단계만 수행
    ///
    /// 인덱스 검색과 외부 지식 조회는 동시에 실행됩니다.
    /// 외부 지식 검색 실패는 빈 결과로 대체되지만, 인덱스 검색 실패는 에러입니다.
    pub async fn retrieve(&self, question: &str) -> Result<Retrieved, RagError> {
        let query_vector = self
            .embedder
            .embed_query(question)
            .await
            .map_err(RagError::retrieval)?;

        let (results, snippets) = tokio::join!(
            self.index.query(&query_vector, self.settings.top_k),
            self.knowledge.lookup(question, self.settings.external_results),
        );

        let results = results.map_err(RagError::retrieval)?;
        let snippets = snippets.unwrap_or_else(|e| {
            tracing::warn!("External knowledge lookup failed, continuing without it: {:#}", e);
            Vec::new()
        });

        tracing::debug!(
            "Retrieved {} index entries and {} external snippets",
            results.len(),
            snippets.len()
        );

        Ok(Retrieved { results, snippets })
    }

    /// 질문 하나에 답변
    pub async fn answer(&self, question: &str) -> Result<QueryOutcome, RagError> {
        let mut stage = QueryStage::Idle;
        let result = self.run_stages(question, &mut stage).await;

        match &result {
            Ok(_) => advance(&mut stage, QueryStage::Done),
            Err(e) => {
                tracing::warn!("Query failed while {}: {}", stage, e);
                advance(&mut stage, QueryStage::Failed);
            }
        }

        result
    }

    async fn run_stages(&self, question: &str, stage: &mut QueryStage) -> Result<QueryOutcome, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::config("question cannot be empty"));
        }

        advance(stage, QueryStage::Retrieving);
        let retrieved = self.retrieve(question).await?;

        advance(stage, QueryStage::Assembling);
        let context = assemble(&retrieved.results, &retrieved.snippets);

        advance(stage, QueryStage::Generating);
        let answer = self
            .generator
            .generate(
                question,
                &context,
                &self.settings.model_id,
                &self.settings.sampling,
            )
            .await?;

        Ok(QueryOutcome {
            answer,
            retrieved,
            context,
        })
    }
}

fn advance(stage: &mut QueryStage, next: QueryStage) {
    tracing::debug!("Query stage: {} -> {}", stage, next);
    *stage = next;
}

// ============================================================================
// Tests
// ============================================================================
