//! 설정 - TOML 파일 + 환경 변수
//!
//! `--config`로 지정한 파일, 없으면 `<data_dir>/config.toml`을 읽습니다.
//! 파일이 없으면 기본값을 사용하며, `OLLAMA_HOST`가 있으면 Ollama 주소를 덮어씁니다.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RagError;
use crate::external::DEFAULT_SUMMARY_CHARS;
use crate::generation::{PromptConfig, SamplingParams, DEFAULT_MODEL};
use crate::knowledge::{default_store_dir, get_data_dir, ChunkConfig, DistanceMetric};
use crate::pipeline::{QuerySettings, DEFAULT_BATCH_SIZE, DEFAULT_EMBED_BATCH_SIZE};
use crate::retry::RetryPolicy;

/// 설정 파일 이름
pub const CONFIG_FILE: &str = "config.toml";

/// Ollama 주소 환경 변수
pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";

// ============================================================================
// Sections
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub store: StoreConfig,
    pub chunking: ChunkConfig,
    pub ollama: OllamaConfig,
    pub generation: GenerationConfig,
    pub knowledge: KnowledgeConfig,
    pub retrieval: RetrievalConfig,
    pub retry: RetryPolicy,
    pub prompt: PromptConfig,
}

/// 벡터 저장소
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 저장소 디렉토리 (없으면 `<data_dir>/vectors`)
    pub path: Option<PathBuf>,
    /// 컬렉션 이름
    pub collection: String,
    /// upsert 배치 크기 (청크 수)
    pub batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            collection: "kerala_laws".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Ollama 서버 및 임베딩 모델
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub url: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    /// 임베딩 호출당 텍스트 수
    pub embed_batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimension: 768,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            timeout_secs: 120,
        }
    }
}

/// 답변 생성
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    #[serde(flatten)]
    pub sampling: SamplingParams,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            sampling: SamplingParams::default(),
        }
    }
}

/// 외부 지식 소스 (Wikipedia)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub enabled: bool,
    pub api_url: String,
    pub results: usize,
    pub summary_chars: usize,
    /// 검색어 뒤에 붙일 도메인 한정어
    pub topic_suffix: Option<String>,
    pub timeout_secs: u64,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: crate::external::DEFAULT_WIKIPEDIA_API.to_string(),
            results: 3,
            summary_chars: DEFAULT_SUMMARY_CHARS,
            topic_suffix: Some("kerala laws".to_string()),
            timeout_secs: 30,
        }
    }
}

/// 인덱스 검색
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// 새 컬렉션 생성 시 사용할 메트릭
    pub metric: DistanceMetric,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            metric: DistanceMetric::Cosine,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl RagConfig {
    /// 기본 설정 파일 경로
    pub fn default_path() -> PathBuf {
        get_data_dir().join(CONFIG_FILE)
    }

    /// 설정 로드
    ///
    /// 명시한 파일이 없으면 에러, 기본 경로에 파일이 없으면 기본값을 사용합니다.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    tracing::debug!("No config file at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };

        config.apply_ollama_host(std::env::var(OLLAMA_HOST_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// 파일에서 읽기 (검증 전)
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// 파일로 저장
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// `OLLAMA_HOST` 값 반영 (스킴이 없으면 http로 간주)
    pub fn apply_ollama_host(&mut self, host: Option<String>) {
        if let Some(host) = host.map(|h| h.trim().to_string()).filter(|h| !h.is_empty()) {
            self.ollama.url = if host.contains("://") {
                host
            } else {
                format!("http://{}", host)
            };
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<(), RagError> {
        self.chunking.validate()?;
        self.generation.sampling.validate()?;
        self.ollama_url()?;
        self.knowledge_url()?;

        if self.store.collection.trim().is_empty() {
            return Err(RagError::config("store.collection cannot be empty"));
        }
        if self.store.batch_size == 0 {
            return Err(RagError::config("store.batch_size must be greater than 0"));
        }
        if self.ollama.embedding_model.trim().is_empty() {
            return Err(RagError::config("ollama.embedding_model cannot be empty"));
        }
        if self.ollama.embedding_dimension == 0 {
            return Err(RagError::config("ollama.embedding_dimension must be greater than 0"));
        }
        if self.ollama.embed_batch_size == 0 {
            return Err(RagError::config("ollama.embed_batch_size must be greater than 0"));
        }
        if self.generation.model.trim().is_empty() {
            return Err(RagError::config("generation.model cannot be empty"));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::config("retrieval.top_k must be at least 1"));
        }
        if self.knowledge.summary_chars == 0 {
            return Err(RagError::config("knowledge.summary_chars must be greater than 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(RagError::config("retry.max_attempts must be at least 1"));
        }

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Derived values
    // ------------------------------------------------------------------------

    pub fn ollama_url(&self) -> Result<Url, RagError> {
        Url::parse(&self.ollama.url)
            .map_err(|e| RagError::config(format!("invalid ollama.url '{}': {}", self.ollama.url, e)))
    }

    pub fn knowledge_url(&self) -> Result<Url, RagError> {
        Url::parse(&self.knowledge.api_url).map_err(|e| {
            RagError::config(format!(
                "invalid knowledge.api_url '{}': {}",
                self.knowledge.api_url, e
            ))
        })
    }

    /// 벡터 저장소 디렉토리
    pub fn store_dir(&self) -> PathBuf {
        self.store.path.clone().unwrap_or_else(default_store_dir)
    }

    pub fn ollama_timeout(&self) -> Duration {
        Duration::from_secs(self.ollama.timeout_secs)
    }

    pub fn knowledge_timeout(&self) -> Duration {
        Duration::from_secs(self.knowledge.timeout_secs)
    }

    /// 외부 지식 조회 개수 (비활성이면 0)
    pub fn external_results(&self) -> usize {
        if self.knowledge.enabled {
            self.knowledge.results
        } else {
            0
        }
    }

    /// 질의 파이프라인 설정
    pub fn query_settings(&self) -> QuerySettings {
        QuerySettings {
            top_k: self.retrieval.top_k,
            external_results: self.external_results(),
            model_id: self.generation.model.clone(),
            sampling: self.generation.sampling,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.store.batch_size, 5000);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.knowledge.results, 3);
        assert_eq!(config.knowledge.summary_chars, 1000);
        assert_eq!(config.generation.model, "llama3.1:latest");
        assert_eq!(config.generation.sampling.max_output_tokens, 500);
    }

    #[test]
    fn test_partial_toml() {
        let config: RagConfig = toml::from_str(
            r#"
            [store]
            collection = "statutes"

            [chunking]
            chunk_size = 800

            [generation]
            model = "mistral:7b"
            temperature = 0.2

            [retrieval]
            metric = "l2"
            "#,
        )
        .unwrap();

        assert_eq!(config.store.collection, "statutes");
        assert_eq!(config.store.batch_size, 5000);
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.generation.model, "mistral:7b");
        assert!((config.generation.sampling.temperature - 0.2).abs() < f32::EPSILON);
        assert!((config.generation.sampling.top_p - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.metric, DistanceMetric::L2);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = RagConfig::default();
        config.chunking.chunk_overlap = 500;
        assert!(matches!(config.validate(), Err(RagError::Configuration(_))));

        let mut config = RagConfig::default();
        config.ollama.url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = RagConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ollama_host_override() {
        let mut config = RagConfig::default();
        config.apply_ollama_host(Some("10.0.0.5:11434".to_string()));
        assert_eq!(config.ollama.url, "http://10.0.0.5:11434");

        config.apply_ollama_host(Some("https://ollama.internal".to_string()));
        assert_eq!(config.ollama.url, "https://ollama.internal");

        config.apply_ollama_host(Some("  ".to_string()));
        assert_eq!(config.ollama.url, "https://ollama.internal");
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = RagConfig::default();
        config.store.collection = "statutes".to_string();
        config.knowledge.enabled = false;
        config.save(&path).unwrap();

        let loaded = RagConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.external_results(), 0);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(RagConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
