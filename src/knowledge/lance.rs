//! LanceDB Vector Index - 영속 벡터 인덱스
//!
//! 하나의 저장소 디렉토리에 여러 컬렉션(테이블)을 둘 수 있으며,
//! 컬렉션은 항상 이름으로 명시적으로 선택합니다.
//! 컬렉션의 차원/메트릭/임베딩 모델은 생성 시 카탈로그에 고정됩니다.
//!
//! ref: https://lancedb.github.io/lancedb/

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::table::Table;
use lancedb::DistanceType;
use regex::Regex;

use super::catalog::{Catalog, CollectionInfo, CollectionSpec};
use super::chunker::Chunk;
use super::vector::{
    ensure_dimension, rank_by_score, DistanceMetric, IndexEntry, RetrievalResult, ScoredEntry,
    VectorIndex,
};
use crate::embedding::EmbeddingVector;
use crate::error::RagError;

/// 동점 처리를 위한 추가 후보 수
const TIE_OVERSAMPLE: usize = 8;

impl From<DistanceMetric> for DistanceType {
    fn from(metric: DistanceMetric) -> Self {
        match metric {
            DistanceMetric::Cosine => DistanceType::Cosine,
            DistanceMetric::L2 => DistanceType::L2,
            DistanceMetric::Dot => DistanceType::Dot,
        }
    }
}

// ============================================================================
// LanceVectorIndex
// ============================================================================

/// LanceDB 컬렉션 하나에 대한 벡터 인덱스
///
/// 각 `upsert`는 하나의 LanceDB 커밋이며, 반환 시점에 디스크에 영속화됩니다.
pub struct LanceVectorIndex {
    table: Table,
    spec: CollectionSpec,
    catalog: Catalog,
    path: PathBuf,
    /// 다음 삽입 순번 (단일 writer 가정)
    next_seq: AtomicU64,
}

impl LanceVectorIndex {
    /// 수집용: 컬렉션이 없으면 생성, 있으면 정의가 일치하는지 확인 후 열기
    ///
    /// # Arguments
    /// * `path` - 저장소 디렉토리
    /// * `spec` - 컬렉션 정의 (이름, 차원, 메트릭, 임베딩 모델)
    pub async fn create_or_open(path: &Path, spec: CollectionSpec) -> Result<Self> {
        validate_collection_name(&spec.name)?;
        if spec.dimension == 0 {
            return Err(RagError::config("Collection dimension must be greater than 0").into());
        }

        let catalog = Catalog::open(path)?;
        let db = connect(path).await?;

        match catalog.get_collection(&spec.name)? {
            Some(existing) => check_spec(&existing.spec, &spec)?,
            None => {
                tracing::info!(
                    "Registering collection '{}' (dim={}, metric={}, model={})",
                    spec.name,
                    spec.dimension,
                    spec.metric,
                    spec.embedding_model
                );
                catalog.register_collection(&spec)?;
            }
        }

        let table = if table_exists(&db, &spec.name).await? {
            open_table(&db, &spec.name).await?
        } else {
            db.create_empty_table(&spec.name, Arc::new(create_schema(spec.dimension)?))
                .execute()
                .await
                .context("Failed to create collection table")?
        };

        Self::from_parts(table, spec, catalog, path).await
    }

    /// 검색용: 이미 존재하는 컬렉션을 이름으로 열기
    ///
    /// 컬렉션이 없으면 다른 컬렉션을 대신 고르지 않고 설정 에러를 반환합니다.
    pub async fn open(path: &Path, name: &str) -> Result<Self> {
        validate_collection_name(name)?;

        let catalog = Catalog::open(path)?;
        let info = match catalog.get_collection(name)? {
            Some(info) => info,
            None => {
                let available: Vec<String> = catalog
                    .list_collections()?
                    .into_iter()
                    .map(|c| c.spec.name)
                    .collect();
                return Err(RagError::config(format!(
                    "Collection '{}' not found in {}. Available collections: {:?}",
                    name,
                    path.display(),
                    available
                ))
                .into());
            }
        };

        let db = connect(path).await?;
        if !table_exists(&db, name).await? {
            return Err(RagError::config(format!(
                "Collection '{}' is registered but its table is missing in {}",
                name,
                path.display()
            ))
            .into());
        }
        let table = open_table(&db, name).await?;

        Self::from_parts(table, info.spec, catalog, path).await
    }

    async fn from_parts(table: Table, spec: CollectionSpec, catalog: Catalog, path: &Path) -> Result<Self> {
        let next_seq = match max_seq(&table).await? {
            Some(max) => max + 1,
            None => 0,
        };

        tracing::debug!(
            "Opened collection '{}' at {:?} (next_seq={})",
            spec.name,
            path,
            next_seq
        );

        Ok(Self {
            table,
            spec,
            catalog,
            path: path.to_path_buf(),
            next_seq: AtomicU64::new(next_seq),
        })
    }

    /// 저장소의 컬렉션 목록
    pub fn list_collections(path: &Path) -> Result<Vec<CollectionInfo>> {
        Catalog::open(path)?.list_collections()
    }

    /// 컬렉션 삭제 (테이블 + 카탈로그 기록)
    pub async fn delete_collection(path: &Path, name: &str) -> Result<bool> {
        validate_collection_name(name)?;

        let db = connect(path).await?;
        if table_exists(&db, name).await? {
            db.drop_table(name)
                .await
                .context("Failed to drop collection table")?;
        }

        Catalog::open(path)?.remove_collection(name)
    }

    pub fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[IndexEntry], first_seq: u64) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let seqs: Vec<i64> = (0..entries.len())
            .map(|i| (first_seq + i as u64) as i64)
            .collect();
        let sequence_indices: Vec<i64> = entries
            .iter()
            .map(|e| e.chunk.sequence_index as i64)
            .collect();
        let offsets: Vec<i64> = entries
            .iter()
            .map(|e| e.chunk.source_offset as i64)
            .collect();
        let texts: Vec<&str> = entries.iter().map(|e| e.chunk.text.as_str()).collect();
        let metadata = entries
            .iter()
            .map(|e| serde_json::to_string(&e.metadata))
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to serialize metadata")?;

        // 임베딩을 FixedSizeList로 변환
        let flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.vector.values.iter().copied())
            .collect();
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vectors = FixedSizeListArray::try_new(
            field,
            list_size(self.spec.dimension)?,
            Arc::new(Float32Array::from(flat)) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(create_schema(self.spec.dimension)?),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(Int64Array::from(seqs)),
                Arc::new(Int64Array::from(sequence_indices)),
                Arc::new(Int64Array::from(offsets)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(metadata)),
                Arc::new(vectors),
            ],
        )
        .context("Failed to create RecordBatch")
    }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        for entry in entries {
            ensure_dimension(self.spec.dimension, entry.vector.dim(), "Entry vector")?;
        }

        let mut ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            anyhow::bail!("Duplicate entry ids within one upsert batch");
        }

        let first_seq = self.next_seq.load(Ordering::SeqCst);
        let batch = self.entries_to_batch(entries, first_seq)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        // id 기준 merge: 기존 엔트리는 교체, 새 엔트리는 삽입
        let mut merge = self.table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .context("Failed to upsert vectors")?;

        self.next_seq
            .store(first_seq + entries.len() as u64, Ordering::SeqCst);

        tracing::debug!(
            "Committed {} entries to '{}' (seq {}..{})",
            entries.len(),
            self.spec.name,
            first_seq,
            first_seq + entries.len() as u64
        );

        Ok(entries.len())
    }

    async fn query(&self, vector: &EmbeddingVector, k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Ok(vec![]);
        }
        ensure_dimension(self.spec.dimension, vector.dim(), "Query vector")?;

        // k번째 점수와 같은 후보가 잘려 나갔을 수 있으면 범위를 두 배로 넓혀 재검색
        let total = self.count().await?;
        let mut limit = (k + TIE_OVERSAMPLE).min(total);
        let scored = loop {
            let scored = self.search(vector, limit).await?;
            if limit >= total || scored.len() < limit || !boundary_tied(&scored, k) {
                break scored;
            }
            tracing::debug!("Tie at rank {} spans {} candidates, widening search", k, limit);
            limit = (limit * 2).min(total);
        };

        Ok(rank_by_score(scored, k))
    }

    async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .context("Failed to count rows")
    }

    fn dimension(&self) -> usize {
        self.spec.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.spec.metric
    }
}

impl LanceVectorIndex {
    /// 최근접 `limit`개 후보를 (순번, 점수 엔트리)로 조회
    async fn search(&self, vector: &EmbeddingVector, limit: usize) -> Result<Vec<(u64, ScoredEntry)>> {
        if limit == 0 {
            return Ok(vec![]);
        }

        let stream = self
            .table
            .vector_search(vector.values.clone())
            .context("Failed to create vector search")?
            .column("vector")
            .distance_type(self.spec.metric.into())
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut scored = Vec::new();
        for batch in &batches {
            scored.extend(self.batch_to_scored(batch)?);
        }
        Ok(scored)
    }

    /// 검색 결과 배치를 (순번, 점수 엔트리)로 변환
    fn batch_to_scored(&self, batch: &RecordBatch) -> Result<Vec<(u64, ScoredEntry)>> {
        let ids = string_column(batch, "id")?;
        let seqs = int_column(batch, "seq")?;
        let sequence_indices = int_column(batch, "sequence_index")?;
        let offsets = int_column(batch, "source_offset")?;
        let texts = string_column(batch, "text")?;
        let metadata = string_column(batch, "metadata")?;

        let vectors = batch
            .column_by_name("vector")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing vector column"))?;

        // _distance 컬럼 (LanceDB가 자동 추가)
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

        let mut out = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let values = vectors.value(i);
            let values = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| anyhow::anyhow!("Vector column is not float32"))?
                .values()
                .to_vec();

            let metadata: BTreeMap<String, String> = serde_json::from_str(metadata.value(i))
                .context("Failed to parse entry metadata")?;

            let entry = IndexEntry {
                id: ids.value(i).to_string(),
                chunk: Chunk {
                    text: texts.value(i).to_string(),
                    sequence_index: sequence_indices.value(i) as usize,
                    source_offset: offsets.value(i) as usize,
                },
                vector: EmbeddingVector::new(values),
                metadata,
            };

            out.push((
                seqs.value(i) as u64,
                ScoredEntry {
                    entry,
                    score: self.spec.metric.similarity_from_distance(distances.value(i)),
                },
            ));
        }

        Ok(out)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 컬렉션 테이블 스키마 생성
/// 가져온 후보 중 가장 낮은 점수가 k번째 점수와 같은지
fn boundary_tied(scored: &[(u64, ScoredEntry)], k: usize) -> bool {
    if scored.len() <= k {
        return false;
    }
    let mut scores: Vec<f32> = scored.iter().map(|(_, s)| s.score).collect();
    scores.sort_by(|a, b| b.total_cmp(a));
    scores[k - 1] <= scores[scores.len() - 1]
}

fn create_schema(dimension: usize) -> Result<Schema> {
    Ok(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("seq", DataType::Int64, false),
        Field::new("sequence_index", DataType::Int64, false),
        Field::new("source_offset", DataType::Int64, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                list_size(dimension)?,
            ),
            false,
        ),
    ]))
}

fn list_size(dimension: usize) -> Result<i32> {
    i32::try_from(dimension).context("Embedding dimension too large")
}

/// 컬렉션 이름은 테이블 이름으로 쓰이므로 제한된 문자만 허용
fn validate_collection_name(name: &str) -> Result<()> {
    let re = Regex::new(r"^[A-Za-z0-9_\-]{1,64}$").context("Invalid name pattern")?;
    if !re.is_match(name) {
        return Err(RagError::config(format!(
            "Invalid collection name '{}': use 1-64 letters, digits, '_' or '-'",
            name
        ))
        .into());
    }
    Ok(())
}

/// 기존 컬렉션 정의와 요청 정의 비교
fn check_spec(existing: &CollectionSpec, requested: &CollectionSpec) -> Result<()> {
    if existing != requested {
        return Err(RagError::config(format!(
            "Collection '{}' was created with dim={}, metric={}, model={} \
             but dim={}, metric={}, model={} was requested",
            existing.name,
            existing.dimension,
            existing.metric,
            existing.embedding_model,
            requested.dimension,
            requested.metric,
            requested.embedding_model
        ))
        .into());
    }
    Ok(())
}

async fn connect(path: &Path) -> Result<Connection> {
    if !path.exists() {
        tokio::fs::create_dir_all(path)
            .await
            .context("Failed to create LanceDB directory")?;
    }

    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

    lancedb::connect(path_str)
        .execute()
        .await
        .context("Failed to connect to LanceDB")
}

/// 테이블 존재 여부 확인
async fn table_exists(db: &Connection, name: &str) -> Result<bool> {
    let names = db
        .table_names()
        .execute()
        .await
        .context("Failed to list tables")?;
    Ok(names.iter().any(|n| n == name))
}

async fn open_table(db: &Connection, name: &str) -> Result<Table> {
    db.open_table(name)
        .execute()
        .await
        .with_context(|| format!("Failed to open collection table '{}'", name))
}

/// 저장된 최대 삽입 순번
async fn max_seq(table: &Table) -> Result<Option<u64>> {
    let stream = table
        .query()
        .select(Select::columns(&["seq"]))
        .execute()
        .await
        .context("Failed to scan seq column")?;
    let batches: Vec<RecordBatch> = stream.try_collect().await?;

    let mut max: Option<i64> = None;
    for batch in &batches {
        let seqs = int_column(batch, "seq")?;
        for seq in seqs.iter().flatten() {
            max = Some(max.map_or(seq, |m| m.max(seq)));
        }
    }
    Ok(max.map(|m| m as u64))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn spec(name: &str) -> CollectionSpec {
        CollectionSpec {
            name: name.to_string(),
            dimension: DIM,
            metric: DistanceMetric::Cosine,
            embedding_model: "test-embed".to_string(),
        }
    }

    fn entry(id: &str, values: [f32; DIM]) -> IndexEntry {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), "test".to_string());
        IndexEntry {
            id: id.to_string(),
            chunk: Chunk {
                text: format!("chunk {}", id),
                sequence_index: 0,
                source_offset: 0,
            },
            vector: EmbeddingVector::new(values.to_vec()),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_lance_upsert_and_query() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::create_or_open(temp_dir.path(), spec("laws"))
            .await
            .unwrap();

        // 빈 인덱스
        let empty = index
            .query(&EmbeddingVector::new(vec![1.0, 0.0, 0.0, 0.0]), 3)
            .await
            .unwrap();
        assert!(empty.is_empty());

        let inserted = index
            .upsert(&[
                entry("a", [1.0, 0.0, 0.0, 0.0]),
                entry("b", [0.0, 1.0, 0.0, 0.0]),
                entry("c", [0.7, 0.7, 0.0, 0.0]),
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(index.count().await.unwrap(), 3);

        let results = index
            .query(&EmbeddingVector::new(vec![0.9, 0.1, 0.0, 0.0]), 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entry.id, "a");
        assert_eq!(results[0].entry.chunk.text, "chunk a");
        assert_eq!(results[0].entry.metadata.get("source").map(String::as_str), Some("test"));
        assert!(results[0].score >= results[1].score);

        assert!(index
            .query(&EmbeddingVector::new(vec![0.9, 0.1, 0.0, 0.0]), 0)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_lance_persists_and_breaks_ties_by_insertion() {
        let temp_dir = TempDir::new().unwrap();
        {
            let index = LanceVectorIndex::create_or_open(temp_dir.path(), spec("laws"))
                .await
                .unwrap();
            index.upsert(&[entry("first", [0.0, 0.0, 1.0, 0.0])]).await.unwrap();
        }

        // 재시작 후 다시 열기
        let index = LanceVectorIndex::open(temp_dir.path(), "laws").await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        index.upsert(&[entry("second", [0.0, 0.0, 1.0, 0.0])]).await.unwrap();

        let results = index
            .query(&EmbeddingVector::new(vec![0.0, 0.0, 1.0, 0.0]), 2)
            .await
            .unwrap();
        assert_eq!(results[0].entry.id, "first");
        assert_eq!(results[1].entry.id, "second");
    }

    #[tokio::test]
    async fn test_lance_wide_tie_returns_earliest_inserted() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::create_or_open(temp_dir.path(), spec("laws"))
            .await
            .unwrap();

        // 동일 벡터 12개를 세 번의 커밋으로 삽입 (k + 8 초과)
        let ids: Vec<String> = (0..12).map(|i| format!("e{:02}", i)).collect();
        for group in ids.chunks(4) {
            let entries: Vec<IndexEntry> = group
                .iter()
                .map(|id| entry(id, [0.5, 0.5, 0.5, 0.5]))
                .collect();
            index.upsert(&entries).await.unwrap();
        }
        index.upsert(&[entry("other", [1.0, 0.0, 0.0, 0.0])]).await.unwrap();

        let results = index
            .query(&EmbeddingVector::new(vec![0.5, 0.5, 0.5, 0.5]), 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entry.id, "e00");
        assert_eq!(results[1].entry.id, "e01");
    }

    #[test]
    fn test_boundary_tied() {
        let scored = |scores: &[f32]| -> Vec<(u64, ScoredEntry)> {
            scores
                .iter()
                .enumerate()
                .map(|(i, &score)| {
                    (i as u64, ScoredEntry { entry: entry("x", [1.0, 0.0, 0.0, 0.0]), score })
                })
                .collect()
        };

        assert!(boundary_tied(&scored(&[0.9, 0.5, 0.5, 0.5]), 2));
        assert!(!boundary_tied(&scored(&[0.9, 0.5, 0.4]), 2));
        assert!(!boundary_tied(&scored(&[0.9, 0.5]), 2));
    }

    #[tokio::test]
    async fn test_lance_upsert_replaces_same_id() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::create_or_open(temp_dir.path(), spec("laws"))
            .await
            .unwrap();

        index.upsert(&[entry("a", [1.0, 0.0, 0.0, 0.0])]).await.unwrap();
        index.upsert(&[entry("a", [0.0, 1.0, 0.0, 0.0])]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lance_explicit_collection_selection() {
        let temp_dir = TempDir::new().unwrap();
        LanceVectorIndex::create_or_open(temp_dir.path(), spec("laws"))
            .await
            .unwrap();

        let err = LanceVectorIndex::open(temp_dir.path(), "missing")
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::Configuration(_))
        ));
        assert!(err.to_string().contains("laws"));

        let collections = LanceVectorIndex::list_collections(temp_dir.path()).unwrap();
        assert_eq!(collections.len(), 1);
    }

    #[tokio::test]
    async fn test_lance_spec_mismatch_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        LanceVectorIndex::create_or_open(temp_dir.path(), spec("laws"))
            .await
            .unwrap();

        let mut other = spec("laws");
        other.dimension = 8;
        let err = LanceVectorIndex::create_or_open(temp_dir.path(), other)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_lance_delete_collection() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::create_or_open(temp_dir.path(), spec("laws"))
            .await
            .unwrap();
        index.upsert(&[entry("a", [1.0, 0.0, 0.0, 0.0])]).await.unwrap();

        assert!(LanceVectorIndex::delete_collection(temp_dir.path(), "laws")
            .await
            .unwrap());
        assert!(LanceVectorIndex::open(temp_dir.path(), "laws").await.is_err());
    }

    #[test]
    fn test_collection_name_validation() {
        assert!(validate_collection_name("kerala_laws-v1").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("../etc").is_err());
    }
}
