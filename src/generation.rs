//! 답변 생성
//!
//! 조립된 컨텍스트로 근거 기반 프롬프트를 만들고 생성 모델을 호출합니다.
//! 생성 호출은 여기서 재시도하지 않습니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::context::AssembledContext;
use crate::embedding::OllamaError;
use crate::error::RagError;

/// 컨텍스트가 부족할 때 모델이 그대로 말해야 하는 문장
pub const INSUFFICIENT_INFORMATION: &str =
    "I don't have enough information to answer this question.";

/// 기본 생성 모델
pub const DEFAULT_MODEL: &str = "llama3.1:latest";

// ============================================================================
// Types
// ============================================================================

/// 샘플링 파라미터
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_output_tokens: 500,
        }
    }
}

impl SamplingParams {
    pub fn validate(&self) -> Result<(), RagError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::config(format!(
                "temperature must be within 0.0..=2.0 (got {})",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(RagError::config(format!(
                "top_p must be within (0.0, 1.0] (got {})",
                self.top_p
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(RagError::config("max_output_tokens must be greater than 0"));
        }
        Ok(())
    }
}

/// 생성된 답변
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub text: String,
    pub model_id: String,
    pub sampling_params: SamplingParams,
}

/// 프롬프트 페르소나 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// 어시스턴트 역할 (예: "legal assistant")
    pub persona: String,
    /// 전문 분야 (예: "kerala law")
    pub domain: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            persona: "legal assistant".to_string(),
            domain: "kerala law".to_string(),
        }
    }
}

// ============================================================================
// GenerationBackend Port
// ============================================================================

/// 생성 모델 백엔드 포트
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// 프롬프트 하나에 대한 완성 텍스트
    async fn complete(&self, model_id: &str, prompt: &str, params: &SamplingParams) -> Result<String>;
}

// ============================================================================
// AnswerGenerator
// ============================================================================

/// 근거 기반 답변 생성기
pub struct AnswerGenerator<B> {
    backend: B,
    prompt: PromptConfig,
}

impl<B: GenerationBackend> AnswerGenerator<B> {
    pub fn new(backend: B, prompt: PromptConfig) -> Self {
        Self { backend, prompt }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// 프롬프트 생성
    pub fn build_prompt(&self, question: &str, context: &AssembledContext) -> String {
        let PromptConfig { persona, domain } = &self.prompt;

        format!(
            "You are a knowledgeable {persona} specialising in {domain}. \
Answer the question accurately and concisely based ONLY on the provided context from our database \
and the reference material (only use reference information regarding {domain}). \
Do not use external knowledge or make up information. \
If the context lacks sufficient information, state: \"{fallback}\"

Provide your answer in this format:
- **Answer**: [Your direct answer]
- **Reasoning**: [Explanation based on context]
- **Sources**: [Cite specific parts of the context]

Context:
{context}

Question: {question}",
            fallback = INSUFFICIENT_INFORMATION,
            context = context.render(),
            question = question.trim(),
        )
    }

    /// 답변 생성
    pub async fn generate(
        &self,
        question: &str,
        context: &AssembledContext,
        model_id: &str,
        params: &SamplingParams,
    ) -> Result<GeneratedAnswer, RagError> {
        let prompt = self.build_prompt(question, context);
        tracing::debug!("Prompt built ({} chars) for model {}", prompt.len(), model_id);

        let raw = self
            .backend
            .complete(model_id, &prompt, params)
            .await
            .map_err(RagError::generation)?;

        let text = raw.trim();
        if text.is_empty() {
            return Err(RagError::generation(anyhow::anyhow!(
                "model {} returned an empty response",
                model_id
            )));
        }

        Ok(GeneratedAnswer {
            text: text.to_string(),
            model_id: model_id.to_string(),
            sampling_params: *params,
        })
    }
}

// ============================================================================
// Ollama Generator
// ============================================================================

/// Ollama 생성 백엔드
///
/// ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-completion
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    generate_url: Url,
    tags_url: Url,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// 설치된 모델 정보
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub digest: String,
}

impl OllamaGenerator {
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self> {
        let generate_url = base_url
            .join("/api/generate")
            .context("Failed to build generate URL")?;
        let tags_url = base_url
            .join("/api/tags")
            .context("Failed to build tags URL")?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            generate_url,
            tags_url,
            client,
        })
    }

    /// 설치된 모델 목록
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .client
            .get(self.tags_url.clone())
            .send()
            .await
            .context("Failed to connect to Ollama")?
            .error_for_status()
            .context("Ollama model list request failed")?;

        let tags: TagsResponse = response
            .json()
            .await
            .context("Failed to parse model list")?;

        Ok(tags.models)
    }
}

#[async_trait]
impl GenerationBackend for OllamaGenerator {
    async fn complete(&self, model_id: &str, prompt: &str, params: &SamplingParams) -> Result<String> {
        let request = GenerateRequest {
            model: model_id,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: params.temperature,
                top_p: params.top_p,
                num_predict: params.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.generate_url.clone())
            .json(&request)
            .send()
            .await
            .context("Failed to send generate request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<OllamaError>(&body) {
                anyhow::bail!("Ollama generate error ({}): {}", status, error.error);
            }
            anyhow::bail!("Ollama generate error ({}): {}", status, body);
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse generate response")?;

        Ok(parsed.response)
    }
}

/// 요청한 모델 이름을 설치된 이름으로 정규화
///
/// 태그 없이 요청했고 `:latest` 태그만 설치되어 있으면 태그를 붙입니다.
pub fn normalize_model_name(requested: &str, available: &[String]) -> Result<String, RagError> {
    let requested = requested.trim();
    let requested = if requested.is_empty() {
        DEFAULT_MODEL
    } else {
        requested
    };

    if available.iter().any(|m| m == requested) {
        return Ok(requested.to_string());
    }

    if !requested.contains(':') {
        let tagged = format!("{}:latest", requested);
        if available.contains(&tagged) {
            return Ok(tagged);
        }
    }

    Err(RagError::config(format!(
        "model '{}' not found. Available models: [{}]",
        requested,
        available.join(", ")
    )))
}

// ============================================================================
// Tests
// ============================================================================
