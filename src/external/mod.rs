//! 외부 지식 소스 모듈
//!
//! 벡터 인덱스와 독립적인 보조 지식(토픽 요약)을 조회합니다.
//! 후보를 하나씩 독립적으로 해석하고 성공한 것만 모읍니다.
//! 개별 후보의 해석 실패(모호한 토픽, 없는 페이지)는 건너뛸 뿐 호출 전체를 실패시키지 않습니다.

mod wikipedia;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use wikipedia::{WikipediaBackend, DEFAULT_WIKIPEDIA_API};

/// 기본 요약 최대 길이 (문자 수)
pub const DEFAULT_SUMMARY_CHARS: usize = 1000;

// ============================================================================
// Types
// ============================================================================

/// 외부 지식 조각
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeSnippet {
    /// 요약 텍스트 (최대 `summary_chars` 문자)
    pub text: String,
    /// 출처 표시 (예: "Wikipedia: Kerala Police Act")
    pub source_label: String,
}

/// 해석된 후보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub title: String,
    pub summary: String,
}

/// 후보 하나의 해석 실패 (로컬에서 복구되며 호출자에게 전달되지 않음)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupFailure {
    #[error("'{title}' is ambiguous (disambiguation page)")]
    Ambiguous { title: String },

    #[error("'{title}' does not exist")]
    Missing { title: String },

    #[error("'{title}' could not be resolved: {message}")]
    Other { title: String, message: String },
}

/// 조회 결과 상세 (성공한 조각 + 건너뛴 후보)
#[derive(Debug, Clone, Default)]
pub struct LookupReport {
    pub snippets: Vec<KnowledgeSnippet>,
    pub skipped: Vec<LookupFailure>,
}

// ============================================================================
// KnowledgeBackend Port
// ============================================================================

/// 외부 지식 백엔드 포트
#[async_trait]
pub trait KnowledgeBackend: Send + Sync {
    /// 토픽 검색 - 후보 식별자(제목) 목록
    async fn search(&self, topic: &str, limit: usize) -> Result<Vec<String>>;

    /// 후보 하나를 요약으로 해석
    async fn resolve(&self, candidate: &str) -> Result<ResolvedEntry, LookupFailure>;

    /// 출처 이름 (예: "Wikipedia")
    fn source_name(&self) -> &str;
}

// ============================================================================
// ExternalKnowledge
// ============================================================================

/// 외부 지식 소스
pub struct ExternalKnowledge<B> {
    backend: B,
    summary_chars: usize,
    topic_suffix: Option<String>,
}

impl<B: KnowledgeBackend> ExternalKnowledge<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            summary_chars: DEFAULT_SUMMARY_CHARS,
            topic_suffix: None,
        }
    }

    /// 요약 최대 길이 설정
    pub fn with_summary_chars(mut self, summary_chars: usize) -> Self {
        self.summary_chars = summary_chars;
        self
    }

    /// 검색어 뒤에 붙일 도메인 한정어 (예: "kerala laws")
    pub fn with_topic_suffix(mut self, suffix: Option<String>) -> Self {
        self.topic_suffix = suffix.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// 토픽 조회 - 해석에 성공한 후보의 요약만 반환
    ///
    /// 검색 호출 자체가 실패한 경우에만 에러를 반환합니다.
    pub async fn lookup(&self, topic: &str, num_results: usize) -> Result<Vec<KnowledgeSnippet>> {
        Ok(self.lookup_detailed(topic, num_results).await?.snippets)
    }

    /// 건너뛴 후보까지 포함한 조회
    pub async fn lookup_detailed(&self, topic: &str, num_results: usize) -> Result<LookupReport> {
        if num_results == 0 || topic.trim().is_empty() {
            return Ok(LookupReport::default());
        }

        let query = match &self.topic_suffix {
            Some(suffix) => format!("{} {}", topic.trim(), suffix),
            None => topic.trim().to_string(),
        };

        let mut candidates = self.backend.search(&query, num_results).await?;
        candidates.truncate(num_results);

        tracing::debug!(
            "{} search '{}' returned {} candidates",
            self.backend.source_name(),
            query,
            candidates.len()
        );

        let mut report = LookupReport::default();

        // 후보마다 독립적으로 시도하고 성공만 수집
        for candidate in &candidates {
            match self.backend.resolve(candidate).await {
                Ok(entry) => report.snippets.push(KnowledgeSnippet {
                    text: truncate_chars(&entry.summary, self.summary_chars),
                    source_label: format!("{}: {}", self.backend.source_name(), entry.title),
                }),
                Err(failure) => {
                    tracing::debug!("Skipping candidate: {}", failure);
                    report.skipped.push(failure);
                }
            }
        }

        Ok(report)
    }
}

/// 문자 단위 자르기 (UTF-8 안전)
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
