//! 에러 분류
//!
//! 파이프라인 경계에서 사용하는 에러 타입입니다.
//! 컴포넌트 내부는 `anyhow::Result`를 사용하고, 파이프라인이 이를 분류합니다.

use thiserror::Error;

/// 원인 에러 (anyhow 에러를 담기 위한 박스 타입)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 잘못된 설정 (청킹 파라미터, 컬렉션 선택 등) - 수집 시작 전에 검출
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 임베딩 배치 또는 인덱스 쓰기 실패
    ///
    /// `committed_chunks` 이전의 청크는 이미 커밋되어 있으며,
    /// 실패한 배치부터 다시 수집할 수 있습니다.
    #[error("ingestion failed at batch {batch} ({committed_chunks} chunks committed): {source}")]
    Ingestion {
        batch: usize,
        committed_chunks: usize,
        #[source]
        source: BoxError,
    },

    /// 인덱스 검색 실패
    #[error("retrieval failed: {0}")]
    Retrieval(#[source] BoxError),

    /// 생성 백엔드 호출 실패 또는 잘못된 응답
    #[error("generation failed: {0}")]
    Generation(#[source] BoxError),
}

impl RagError {
    /// 설정 에러 생성
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// 검색 에러로 분류
    pub fn retrieval(err: anyhow::Error) -> Self {
        Self::Retrieval(err.into())
    }

    /// 생성 에러로 분류
    pub fn generation(err: anyhow::Error) -> Self {
        Self::Generation(err.into())
    }

    /// 사용자가 입력을 바꿔 재시도할 수 있는 에러인지
    pub fn is_retryable_with_new_input(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Generation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingestion_error_message() {
        let err = RagError::Ingestion {
            batch: 3,
            committed_chunks: 200,
            source: anyhow::anyhow!("connection refused").into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("batch 3"));
        assert!(msg.contains("200 chunks committed"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_error_source_chain() {
        let err = RagError::generation(anyhow::anyhow!("timeout"));
        let source = std::error::Error::source(&err);
        assert!(source.is_some());
        assert!(err.is_retryable_with_new_input());
        assert!(!RagError::retrieval(anyhow::anyhow!("down")).is_retryable_with_new_input());
    }
}
