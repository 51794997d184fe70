//! 임베딩 모듈 - Ollama API를 통한 텍스트 벡터화
//!
//! 텍스트를 고정 차원 벡터로 변환하는 프로바이더입니다.
//! 프로바이더는 재시도하지 않으며, 재시도는 [`RetryingEmbedder`]로 바깥에서 감쌉니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OllamaEmbedding::new(base_url, "nomic-embed-text", 768, timeout)?;
//! let vectors = embedder.embed_batch(&["Hello, world!".to_string()]).await?;
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::retry::RetryPolicy;

// ============================================================================
// EmbeddingVector
// ============================================================================

/// 고정 차원 임베딩 벡터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub values: Vec<f32>,
}

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// 벡터 차원
    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// `embed_batch`는 입력과 같은 길이/순서의 벡터를 반환합니다.
/// 배치 안의 텍스트 하나라도 실패하면 배치 전체가 실패합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 배치 임베딩
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;

    /// 단일 쿼리 임베딩 (기본 구현: 크기 1 배치)
    async fn embed_query(&self, text: &str) -> Result<EmbeddingVector> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding provider returned no vector"))
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 모델 식별자
    fn model_id(&self) -> &str;
}

/// 배치 응답 검증 (개수/차원)
pub fn check_batch(expected_len: usize, dimension: usize, vectors: &[EmbeddingVector]) -> Result<()> {
    if vectors.len() != expected_len {
        anyhow::bail!(
            "Mismatch between request and response counts: {} vs {}",
            expected_len,
            vectors.len()
        );
    }
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.dim() != dimension) {
        anyhow::bail!(
            "Embedding {} has dimension {}, expected {}",
            i,
            v.dim(),
            dimension
        );
    }
    Ok(())
}

// ============================================================================
// Ollama Embedding
// ============================================================================

/// Ollama 임베딩 구현체
///
/// ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-embeddings
#[derive(Debug, Clone)]
pub struct OllamaEmbedding {
    endpoint: Url,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

/// Ollama 배치 임베딩 요청
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama 에러 응답
#[derive(Debug, Deserialize)]
pub(crate) struct OllamaError {
    pub(crate) error: String,
}

impl OllamaEmbedding {
    /// 새 Ollama 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `base_url` - Ollama 서버 주소 (예: http://localhost:11434)
    /// * `model` - 임베딩 모델 이름
    /// * `dimension` - 모델이 반환하는 벡터 차원
    /// * `timeout` - 요청 타임아웃
    pub fn new(base_url: &Url, model: &str, dimension: usize, timeout: Duration) -> Result<Self> {
        if model.trim().is_empty() {
            anyhow::bail!("Embedding model name cannot be empty");
        }
        if dimension == 0 {
            anyhow::bail!("Embedding dimension must be greater than 0");
        }

        let endpoint = base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint,
            model: model.to_string(),
            dimension,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        tracing::debug!("Embedding {} texts with {}", texts.len(), self.model);

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<OllamaError>(&body) {
                anyhow::bail!("Ollama embedding error ({}): {}", status, error.error);
            }
            anyhow::bail!("Ollama embedding error ({}): {}", status, body);
        }

        let parsed: EmbedResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;

        let vectors: Vec<EmbeddingVector> =
            parsed.embeddings.into_iter().map(EmbeddingVector::new).collect();
        check_batch(texts.len(), self.dimension, &vectors)?;

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// RetryingEmbedder
// ============================================================================

/// 재시도 정책을 덧씌운 프로바이더
///
/// 배치 단위로 재시도하므로 all-or-nothing 의미는 그대로 유지됩니다.
pub struct RetryingEmbedder<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E: EmbeddingProvider> RetryingEmbedder<E> {
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

#[async_trait]
impl<E: EmbeddingProvider> EmbeddingProvider for RetryingEmbedder<E> {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        self.policy
            .run("embedding batch", || self.inner.embed_batch(texts))
            .await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, dimension: usize) -> OllamaEmbedding {
        let url = Url::parse(&server.uri()).unwrap();
        OllamaEmbedding::new(&url, "nomic-embed-text", dimension, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_invalid_construction() {
        let url = Url::parse("http://localhost:11434").unwrap();
        assert!(OllamaEmbedding::new(&url, "", 768, Duration::from_secs(1)).is_err());
        assert!(OllamaEmbedding::new(&url, "m", 0, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_check_batch() {
        let ok = vec![EmbeddingVector::new(vec![0.0; 3]); 2];
        assert!(check_batch(2, 3, &ok).is_ok());
        assert!(check_batch(3, 3, &ok).is_err());
        assert!(check_batch(2, 4, &ok).is_err());
    }

    #[tokio::test]
    async fn test_ollama_embed_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_partial_json(serde_json::json!({
                "model": "nomic-embed-text",
                "input": ["a", "b"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "nomic-embed-text",
                "embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]
            })))
            .mount(&server)
            .await;

        let embedder = client_for(&server, 3);
        let vectors = embedder
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1].values, vec![0.4, 0.5, 0.6]);
        assert_eq!(embedder.model_id(), "nomic-embed-text");
    }

    #[tokio::test]
    async fn test_ollama_count_mismatch_fails_whole_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[0.1, 0.2, 0.3]]
            })))
            .mount(&server)
            .await;

        let embedder = client_for(&server, 3);
        let result = embedder
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ollama_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"error": "model not found"})),
            )
            .mount(&server)
            .await;

        let embedder = client_for(&server, 3);
        let err = embedder.embed_query("a").await.unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }

    struct Flaky {
        calls: AtomicUsize,
        failures: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for Flaky {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                anyhow::bail!("connection reset");
            }
            Ok(texts.iter().map(|_| EmbeddingVector::new(vec![1.0, 0.0])).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_id(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_retrying_embedder() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
        };
        let embedder = RetryingEmbedder::new(
            Flaky {
                calls: AtomicUsize::new(0),
                failures: 2,
            },
            policy,
        );

        let vectors = embedder.embed_batch(&["x".to_string()]).await.unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(embedder.inner().calls.load(Ordering::SeqCst), 3);
        assert_eq!(embedder.dimension(), 2);
    }
}
