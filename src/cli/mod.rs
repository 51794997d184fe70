//! CLI 모듈
//!
//! grounded-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use walkdir::WalkDir;

use crate::config::RagConfig;
use crate::embedding::{EmbeddingProvider, OllamaEmbedding, RetryingEmbedder};
use crate::error::RagError;
use crate::external::{ExternalKnowledge, WikipediaBackend};
use crate::generation::{normalize_model_name, AnswerGenerator, OllamaGenerator};
use crate::knowledge::{
    get_data_dir, Catalog, CollectionSpec, LanceVectorIndex, RecursiveChunker, VectorIndex,
};
use crate::pipeline::{Ingestor, QueryOutcome, QueryPipeline, Retrieved};

/// 대화 종료 입력
const EXIT_COMMAND: &str = "exit";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "grounded-rag")]
#[command(version, about = "벡터 검색 + 외부 지식 기반 질의응답 시스템", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로 (기본: <data_dir>/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 텍스트, 파일, 또는 폴더(.txt)를 컬렉션에 수집
    Ingest {
        /// 직접 입력할 텍스트
        #[arg(short, long)]
        text: Option<String>,

        /// 수집할 파일 경로
        #[arg(long)]
        file: Option<PathBuf>,

        /// 수집할 폴더 경로 (재귀, .txt 파일)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 대상 컬렉션 (기본: 설정의 store.collection)
        #[arg(short, long)]
        collection: Option<String>,
    },

    /// 질문 하나에 답변
    Query {
        /// 질문
        question: String,

        /// 검색 컬렉션
        #[arg(short, long)]
        collection: Option<String>,

        /// 검색 결과 개수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// 생성 모델
        #[arg(short, long)]
        model: Option<String>,

        /// 답변 생성 없이 검색된 컨텍스트만 출력
        #[arg(long)]
        context_only: bool,
    },

    /// 대화형 질의 ('exit' 입력 시 종료)
    Chat {
        /// 검색 컬렉션
        #[arg(short, long)]
        collection: Option<String>,

        /// 생성 모델
        #[arg(short, long)]
        model: Option<String>,
    },

    /// 컬렉션 목록 / 삭제
    Collections {
        /// 삭제할 컬렉션 이름
        #[arg(long)]
        delete: Option<String>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = RagConfig::load(cli.config.as_deref()).context("설정 로드 실패")?;

    match cli.command {
        Commands::Ingest {
            text,
            file,
            dir,
            collection,
        } => cmd_ingest(&config, text, file, dir, collection).await,
        Commands::Query {
            question,
            collection,
            top_k,
            model,
            context_only,
        } => cmd_query(&config, &question, collection, top_k, model, context_only).await,
        Commands::Chat { collection, model } => cmd_chat(&config, collection, model).await,
        Commands::Collections { delete } => cmd_collections(&config, delete).await,
        Commands::Status => cmd_status(&config, cli.config.as_deref()).await,
    }
}

// ============================================================================
// Component Wiring
// ============================================================================

/// 재시도 정책을 덧씌운 Ollama 임베딩
fn build_embedder(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = OllamaEmbedding::new(
        &config.ollama_url()?,
        &config.ollama.embedding_model,
        config.ollama.embedding_dimension,
        config.ollama_timeout(),
    )?;
    Ok(Arc::new(RetryingEmbedder::new(embedding, config.retry)))
}

/// 질의 파이프라인 구성
async fn build_query_pipeline(
    config: &RagConfig,
    collection: &str,
) -> Result<QueryPipeline<WikipediaBackend, OllamaGenerator>> {
    let index = LanceVectorIndex::open(&config.store_dir(), collection).await?;

    // 질의 벡터는 컬렉션을 만든 모델과 같은 모델로 만들어야 합니다
    if index.spec().embedding_model != config.ollama.embedding_model {
        return Err(RagError::config(format!(
            "Collection '{}' was built with embedding model '{}', but '{}' is configured",
            collection,
            index.spec().embedding_model,
            config.ollama.embedding_model
        ))
        .into());
    }

    let knowledge = ExternalKnowledge::new(WikipediaBackend::new(
        config.knowledge_url()?,
        config.knowledge_timeout(),
    )?)
    .with_summary_chars(config.knowledge.summary_chars)
    .with_topic_suffix(config.knowledge.topic_suffix.clone());

    let generator = AnswerGenerator::new(
        OllamaGenerator::new(&config.ollama_url()?, config.ollama_timeout())?,
        config.prompt.clone(),
    );

    let pipeline = QueryPipeline::new(
        build_embedder(config)?,
        Arc::new(index),
        knowledge,
        generator,
        config.query_settings(),
    )?;

    Ok(pipeline)
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 수집 명령어 (ingest)
///
/// 문서마다 청킹 → 임베딩 → 배치 upsert를 순차로 수행합니다.
/// 중단된 문서는 다시 실행하면 마지막으로 커밋된 배치 다음부터 이어집니다.
async fn cmd_ingest(
    config: &RagConfig,
    text: Option<String>,
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
    collection: Option<String>,
) -> Result<()> {
    let documents: Vec<(String, String)> = if let Some(text) = text {
        vec![("direct-input".to_string(), text)]
    } else if let Some(ref path) = file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("파일 읽기 실패: {}", path.display()))?;
        vec![(path.display().to_string(), content)]
    } else if let Some(ref dir) = dir {
        collect_text_files(dir)?
    } else {
        bail!("--text, --file, --dir 중 하나를 지정해야 합니다");
    };

    if documents.is_empty() {
        println!("[!] 수집할 파일이 없습니다.");
        return Ok(());
    }

    let collection = collection.unwrap_or_else(|| config.store.collection.clone());
    let store_dir = config.store_dir();

    let index = LanceVectorIndex::create_or_open(
        &store_dir,
        CollectionSpec {
            name: collection.clone(),
            dimension: config.ollama.embedding_dimension,
            metric: config.retrieval.metric,
            embedding_model: config.ollama.embedding_model.clone(),
        },
    )
    .await
    .context("컬렉션 열기 실패")?;
    let catalog = index.catalog().clone();

    let ingestor = Ingestor::new(
        build_embedder(config)?,
        Arc::new(index),
        RecursiveChunker::new(config.chunking)?,
    )?
    .with_batch_sizes(config.store.batch_size, config.ollama.embed_batch_size)?
    .with_progress(catalog, collection.clone());

    let total_bytes: usize = documents.iter().map(|(_, text)| text.len()).sum();
    println!("[*] 수집 대상: {} 문서 ({})", documents.len(), format_bytes(total_bytes));
    println!(
        "    컬렉션: {} | 청크 {}자, 겹침 {}자",
        collection, config.chunking.chunk_size, config.chunking.chunk_overlap
    );
    println!();

    let mut success_count = 0;
    let mut error_count = 0;

    for (i, (source, content)) in documents.iter().enumerate() {
        print!("[{}/{}] {}... ", i + 1, documents.len(), source);
        let _ = std::io::stdout().flush();

        match ingestor.ingest(source, content).await {
            Ok(report) if report.skipped => {
                println!("이미 수집됨 ({} 청크)", report.total_chunks);
                success_count += 1;
            }
            Ok(report) => {
                if report.resumed_from > 0 {
                    print!("{}번째 청크부터 재개, ", report.resumed_from);
                }
                println!(
                    "완료 ({} 청크, {} 배치)",
                    report.committed_chunks, report.batches
                );
                success_count += 1;
            }
            Err(e) => {
                println!("실패: {}", e);
                error_count += 1;
            }
        }
    }

    println!();
    println!("[OK] 완료: 성공 {}, 실패 {}", success_count, error_count);
    if error_count > 0 {
        println!("     실패한 문서는 같은 명령을 다시 실행하면 이어서 수집합니다.");
    }

    Ok(())
}

/// 질의 명령어 (query)
async fn cmd_query(
    config: &RagConfig,
    question: &str,
    collection: Option<String>,
    top_k: Option<usize>,
    model: Option<String>,
    context_only: bool,
) -> Result<()> {
    let mut config = config.clone();
    if let Some(k) = top_k {
        config.retrieval.top_k = k;
    }
    if let Some(model) = model {
        config.generation.model = model;
    }
    config.validate()?;

    let collection = collection.unwrap_or_else(|| config.store.collection.clone());
    let pipeline = build_query_pipeline(&config, &collection).await?;

    println!("[*] 검색 중: \"{}\"", question);

    if context_only {
        let retrieved = pipeline.retrieve(question).await?;
        print_retrieved(&retrieved);
        return Ok(());
    }

    let outcome = pipeline.answer(question).await?;
    print_outcome(&outcome);

    Ok(())
}

/// 대화형 명령어 (chat)
///
/// 시작 전에 설치된 모델을 확인하고, 'exit'를 입력할 때까지 질문을 받습니다.
async fn cmd_chat(config: &RagConfig, collection: Option<String>, model: Option<String>) -> Result<()> {
    let collection = collection.unwrap_or_else(|| config.store.collection.clone());
    let mut pipeline = build_query_pipeline(config, &collection).await?;

    let models = pipeline
        .generator()
        .backend()
        .list_models()
        .await
        .context("Ollama 모델 목록 조회 실패")?;
    let available: Vec<String> = models.into_iter().map(|m| m.name).collect();

    if available.is_empty() {
        bail!("설치된 모델이 없습니다. 'ollama pull llama3.1' 으로 모델을 설치하세요");
    }
    println!("[*] 사용 가능한 모델: {}", available.join(", "));

    let requested = model.unwrap_or_else(|| config.generation.model.clone());
    let model_id = normalize_model_name(&requested, &available)?;
    pipeline.set_model(model_id.clone());

    println!("[OK] 컬렉션 '{}', 모델 '{}'", collection, model_id);
    println!("     질문을 입력하세요 ('{}' 입력 시 종료)", EXIT_COMMAND);
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("질문: ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await.context("입력 읽기 실패")? else {
            break;
        };
        let question = line.trim();

        if question.eq_ignore_ascii_case(EXIT_COMMAND) {
            break;
        }
        if question.is_empty() {
            continue;
        }

        match pipeline.answer(question).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) if e.is_retryable_with_new_input() => println!("[!] {}\n", e),
            Err(e) => println!("[!] {}\n    (인덱스와 Ollama 상태를 확인하세요)\n", e),
        }
    }

    println!("[*] 종료합니다.");
    Ok(())
}

/// 컬렉션 명령어 (collections)
async fn cmd_collections(config: &RagConfig, delete: Option<String>) -> Result<()> {
    let store_dir = config.store_dir();

    if let Some(name) = delete {
        if LanceVectorIndex::delete_collection(&store_dir, &name).await? {
            println!("[OK] 컬렉션 '{}' 삭제됨", name);
        } else {
            println!("[!] 컬렉션 '{}'을(를) 찾을 수 없습니다", name);
        }
        return Ok(());
    }

    let collections = LanceVectorIndex::list_collections(&store_dir)?;
    if collections.is_empty() {
        println!("[!] 컬렉션이 없습니다. 'grounded-rag ingest'로 문서를 수집하세요.");
        return Ok(());
    }

    let catalog = Catalog::open(&store_dir)?;

    println!("[OK] 컬렉션 ({} 개):\n", collections.len());
    for info in collections {
        let documents = catalog.list_ingestions(&info.spec.name)?;
        let chunks: usize = documents.iter().map(|d| d.committed_chunks).sum();

        println!("  {}", info.spec.name);
        println!(
            "        {}차원 | {} | 모델: {}",
            info.spec.dimension, info.spec.metric, info.spec.embedding_model
        );
        println!(
            "        문서 {} 건, 청크 {} 개 | 생성: {}",
            documents.len(),
            chunks,
            info.created_at.format("%Y-%m-%d %H:%M")
        );
        for doc in documents.iter().take(5) {
            println!(
                "          - {} ({}/{}, {:?})",
                truncate_text(&doc.source, 60),
                doc.committed_chunks,
                doc.total_chunks,
                doc.status
            );
        }
        println!();
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &RagConfig, config_path: Option<&Path>) -> Result<()> {
    println!("grounded-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", get_data_dir().display());
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(RagConfig::default_path);
    if config_path.exists() {
        println!("[OK] 설정 파일: {}", config_path.display());
    } else {
        println!("[*] 설정 파일 없음 (기본값 사용): {}", config_path.display());
    }

    let store_dir = config.store_dir();
    println!("[*] 벡터 저장소: {}", store_dir.display());

    match LanceVectorIndex::open(&store_dir, &config.store.collection).await {
        Ok(index) => match index.count().await {
            Ok(count) => println!(
                "[OK] 컬렉션 '{}': {} 청크 ({})",
                config.store.collection,
                count,
                index.metric()
            ),
            Err(e) => println!("[!] 컬렉션 통계 조회 실패: {}", e),
        },
        Err(e) => println!("[!] 컬렉션 열기 실패: {}", e),
    }

    match OllamaGenerator::new(&config.ollama_url()?, config.ollama_timeout()) {
        Ok(ollama) => match ollama.list_models().await {
            Ok(models) => println!(
                "[OK] Ollama ({}): 모델 {} 개",
                config.ollama.url,
                models.len()
            ),
            Err(e) => {
                println!("[!] Ollama 연결 실패: {}", config.ollama.url);
                tracing::debug!("Ollama 상태 확인 실패: {:#}", e);
            }
        },
        Err(e) => tracing::debug!("Ollama 클라이언트 생성 실패: {:#}", e),
    }

    if config.knowledge.enabled {
        println!(
            "[OK] 외부 지식: {} (최대 {} 건)",
            config.knowledge.api_url, config.knowledge.results
        );
    } else {
        println!("[*] 외부 지식: 비활성");
    }

    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_outcome(outcome: &QueryOutcome) {
    println!();
    println!("[OK] 답변 ({}):\n", outcome.answer.model_id);
    println!("{}", outcome.answer.text);
    println!();
    print_retrieved(&outcome.retrieved);
}

fn print_retrieved(retrieved: &Retrieved) {
    if retrieved.results.is_empty() {
        println!("[!] 검색된 문서가 없습니다.");
    } else {
        println!("참고 문서 ({} 건):", retrieved.results.len());
        for (i, scored) in retrieved.results.iter().enumerate() {
            let source = scored
                .entry
                .metadata
                .get("source")
                .map(String::as_str)
                .unwrap_or("-");
            println!(
                "  {}. [점수: {:.4}] {} #{}",
                i + 1,
                scored.score,
                source,
                scored.entry.chunk.sequence_index
            );
            println!("     {}", truncate_text(&scored.entry.chunk.text, 200));
        }
    }

    if !retrieved.snippets.is_empty() {
        println!("외부 참고 ({} 건):", retrieved.snippets.len());
        for snippet in &retrieved.snippets {
            println!("  - {}", snippet.source_label);
            println!("    {}", truncate_text(&snippet.text, 200));
        }
    }
    println!();
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 폴더의 .txt 파일 수집 (경로 순 정렬)
fn collect_text_files(dir: &Path) -> Result<Vec<(String, String)>> {
    if !dir.is_dir() {
        bail!("폴더가 아닙니다: {}", dir.display());
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
        })
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        match std::fs::read_to_string(&path) {
            Ok(content) => documents.push((path.display().to_string(), content)),
            Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
        }
    }

    Ok(documents)
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
