//! Catalog - rusqlite 기반 컬렉션/수집 진행 기록
//!
//! 벡터 저장소 디렉토리 안의 `catalog.db`에 저장됩니다.
//! - collections: 컬렉션 이름, 차원, 메트릭, 임베딩 모델 (생성 시 고정)
//! - ingestions: 문서별 커밋된 청크 수 (중단된 수집 재개용)

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::vector::DistanceMetric;

/// 카탈로그 파일 이름
pub const CATALOG_FILE: &str = "catalog.db";

// ============================================================================
// Types
// ============================================================================

/// 컬렉션 정의
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub embedding_model: String,
}

/// 등록된 컬렉션
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub spec: CollectionSpec,
    pub created_at: DateTime<Utc>,
}

/// 문서 수집 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IngestionStatus {
    InProgress,
    Complete,
}

impl IngestionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "complete" {
            Self::Complete
        } else {
            Self::InProgress
        }
    }
}

/// 문서별 수집 진행 기록
#[derive(Debug, Clone, Serialize)]
pub struct IngestionRecord {
    pub collection: String,
    pub document_key: String,
    pub source: String,
    pub total_chunks: usize,
    pub committed_chunks: usize,
    pub status: IngestionStatus,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Catalog
// ============================================================================

/// 컬렉션 카탈로그
#[derive(Clone)]
pub struct Catalog {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl Catalog {
    /// 저장소 디렉토리의 카탈로그 열기 (없으면 생성)
    pub fn open(store_dir: &Path) -> Result<Self> {
        if !store_dir.exists() {
            std::fs::create_dir_all(store_dir).context("Failed to create store directory")?;
        }

        let db_path = store_dir.join(CATALOG_FILE);
        let conn = Connection::open(&db_path).context("Failed to open catalog database")?;

        let catalog = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        };
        catalog.initialize()?;
        Ok(catalog)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                metric TEXT NOT NULL,
                embedding_model TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ingestions (
                collection TEXT NOT NULL,
                document_key TEXT NOT NULL,
                source TEXT NOT NULL,
                total_chunks INTEGER NOT NULL,
                committed_chunks INTEGER NOT NULL,
                status TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, document_key)
            );",
        )
        .context("Failed to create catalog tables")?;

        tracing::debug!("Catalog initialized at {:?}", self.db_path);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------------

    /// 컬렉션 조회
    pub fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT name, dimension, metric, embedding_model, created_at
             FROM collections WHERE name = ?1",
            params![name],
            row_to_collection,
        )
        .optional()
        .context("Failed to query collection")?
        .transpose()
    }

    /// 컬렉션 목록 (이름순)
    pub fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT name, dimension, metric, embedding_model, created_at
                 FROM collections ORDER BY name",
            )
            .context("Failed to prepare collection listing")?;

        let rows = stmt
            .query_map([], row_to_collection)
            .context("Failed to list collections")?;

        let mut collections = Vec::new();
        for row in rows {
            collections.push(row.context("Failed to read collection row")??);
        }
        Ok(collections)
    }

    /// 컬렉션 등록
    pub fn register_collection(&self, spec: &CollectionSpec) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO collections (name, dimension, metric, embedding_model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                spec.name,
                spec.dimension as i64,
                spec.metric.as_str(),
                spec.embedding_model,
                Utc::now().to_rfc3339()
            ],
        )
        .context("Failed to register collection")?;
        Ok(())
    }

    /// 컬렉션과 수집 기록 삭제
    pub fn remove_collection(&self, name: &str) -> Result<bool> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM ingestions WHERE collection = ?1", params![name])
            .context("Failed to delete ingestion records")?;
        let deleted = conn
            .execute("DELETE FROM collections WHERE name = ?1", params![name])
            .context("Failed to delete collection")?;
        Ok(deleted > 0)
    }

    // ------------------------------------------------------------------------
    // Ingestions
    // ------------------------------------------------------------------------

    /// 문서 수집 기록 조회
    pub fn get_ingestion(&self, collection: &str, document_key: &str) -> Result<Option<IngestionRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT collection, document_key, source, total_chunks, committed_chunks, status, updated_at
             FROM ingestions WHERE collection = ?1 AND document_key = ?2",
            params![collection, document_key],
            row_to_ingestion,
        )
        .optional()
        .context("Failed to query ingestion record")?
        .transpose()
    }

    /// 배치 커밋 후 진행 상황 기록
    pub fn record_progress(
        &self,
        collection: &str,
        document_key: &str,
        source: &str,
        total_chunks: usize,
        committed_chunks: usize,
    ) -> Result<()> {
        let status = if committed_chunks >= total_chunks {
            IngestionStatus::Complete
        } else {
            IngestionStatus::InProgress
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO ingestions
                (collection, document_key, source, total_chunks, committed_chunks, status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(collection, document_key) DO UPDATE SET
                source = excluded.source,
                total_chunks = excluded.total_chunks,
                committed_chunks = excluded.committed_chunks,
                status = excluded.status,
                updated_at = excluded.updated_at",
            params![
                collection,
                document_key,
                source,
                total_chunks as i64,
                committed_chunks as i64,
                status.as_str(),
                Utc::now().to_rfc3339()
            ],
        )
        .context("Failed to record ingestion progress")?;
        Ok(())
    }

    /// 컬렉션의 수집 기록 목록 (최근순)
    pub fn list_ingestions(&self, collection: &str) -> Result<Vec<IngestionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT collection, document_key, source, total_chunks, committed_chunks, status, updated_at
                 FROM ingestions WHERE collection = ?1 ORDER BY updated_at DESC",
            )
            .context("Failed to prepare ingestion listing")?;

        let rows = stmt
            .query_map(params![collection], row_to_ingestion)
            .context("Failed to list ingestions")?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.context("Failed to read ingestion row")??);
        }
        Ok(records)
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_collection(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<CollectionInfo>> {
    let name: String = row.get(0)?;
    let dimension: i64 = row.get(1)?;
    let metric: String = row.get(2)?;
    let embedding_model: String = row.get(3)?;
    let created_at: String = row.get(4)?;

    Ok(metric.parse::<DistanceMetric>().map(|metric| CollectionInfo {
        spec: CollectionSpec {
            name,
            dimension: dimension as usize,
            metric,
            embedding_model,
        },
        created_at: parse_time(&created_at),
    }))
}

fn row_to_ingestion(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<IngestionRecord>> {
    let total: i64 = row.get(3)?;
    let committed: i64 = row.get(4)?;
    let status: String = row.get(5)?;
    let updated_at: String = row.get(6)?;

    Ok(Ok(IngestionRecord {
        collection: row.get(0)?,
        document_key: row.get(1)?,
        source: row.get(2)?,
        total_chunks: total as usize,
        committed_chunks: committed as usize,
        status: IngestionStatus::parse(&status),
        updated_at: parse_time(&updated_at),
    }))
}

// ============================================================================
// Tests
// ============================================================================
