//! Text Chunking Module
//!
//! 계층적 구분자(문단 → 줄 → 단어 → 문자)로 텍스트를 분할하고
//! 인접 청크가 정확히 `chunk_overlap` 문자를 공유하도록 오버랩을 적용합니다.
//! 모든 길이는 바이트가 아닌 문자(char) 단위입니다.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// 구분자 우선순위 (빈 문자열 = 문자 경계)
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

// ============================================================================
// Types
// ============================================================================

/// 소스 문서의 연속된 부분 문자열
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 청크 텍스트 (비어있지 않음)
    pub text: String,
    /// 문서 내 순번 (0-based, 엄격히 증가)
    pub sequence_index: usize,
    /// 소스 텍스트에서 청크 시작 위치 (문자 오프셋)
    pub source_offset: usize,
}

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 인접 청크 간 공유 문자 수
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

impl ChunkConfig {
    /// 설정 검증
    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunk_size == 0 {
            return Err(RagError::config("chunk_size must be greater than 0"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// 청크당 새로 진행하는 문자 수
    fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 재귀 구분자 청커
///
/// 같은 입력과 설정에는 항상 바이트 단위로 동일한 청크 목록을 반환합니다.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    config: ChunkConfig,
}

impl RecursiveChunker {
    /// 검증된 설정으로 생성
    pub fn new(config: ChunkConfig) -> Result<Self, RagError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 텍스트를 오버랩 청크로 분할
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return vec![];
        }

        if char_len(text) <= self.config.chunk_size {
            return vec![Chunk {
                text: text.to_string(),
                sequence_index: 0,
                source_offset: 0,
            }];
        }

        let stride = self.config.stride();

        // 1. 구분자 계층으로 stride 이하의 세그먼트로 분할
        let mut segments = Vec::new();
        segment(text, 0, &SEPARATORS, stride, &mut segments);

        // 2. 세그먼트를 stride 이하의 코어로 병합
        let mut cores = merge_segments(text, segments, stride);

        // 3. overlap 이하인 첫 코어는 다음 코어와 합침 (첫 청크가 다음 청크의 접두어가 되지 않도록)
        fold_short_head(text, &mut cores, self.config.chunk_overlap);

        // 4. 각 코어를 이전 텍스트 쪽으로 overlap만큼 확장
        let mut chunks = Vec::with_capacity(cores.len());
        let mut core_char_start = 0;

        for (i, core) in cores.into_iter().enumerate() {
            let core_chars = char_len(&text[core.clone()]);
            let (start, char_start) = if i == 0 {
                (core.start, core_char_start)
            } else {
                let back = self.config.chunk_overlap.min(core_char_start);
                (back_chars(text, core.start, back), core_char_start - back)
            };

            chunks.push(Chunk {
                text: text[start..core.end].to_string(),
                sequence_index: i,
                source_offset: char_start,
            });

            core_char_start += core_chars;
        }

        tracing::debug!(
            "Split {} chars into {} chunks (size={}, overlap={})",
            core_char_start,
            chunks.len(),
            self.config.chunk_size,
            self.config.chunk_overlap
        );

        chunks
    }
}

/// 설정을 검증한 뒤 분할
pub fn split(raw_text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>, RagError> {
    let chunker = RecursiveChunker::new(ChunkConfig {
        chunk_size,
        chunk_overlap: overlap,
    })?;
    Ok(chunker.split(raw_text))
}

// ============================================================================
// Helper Functions
// ============================================================================

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 텍스트를 budget 문자 이하의 연속 세그먼트(바이트 범위)로 분할
///
/// 세그먼트를 이어 붙이면 원문과 정확히 일치합니다.
fn segment(text: &str, base: usize, separators: &[&str], budget: usize, out: &mut Vec<Range<usize>>) {
    if char_len(text) <= budget {
        out.push(base..base + text.len());
        return;
    }

    // 텍스트에 존재하는 첫 번째 구분자 선택
    let chosen = separators
        .iter()
        .position(|sep| !sep.is_empty() && text.contains(sep));

    match chosen {
        Some(idx) => {
            let rest = &separators[idx + 1..];
            let mut offset = base;
            for piece in text.split_inclusive(separators[idx]) {
                segment(piece, offset, rest, budget, out);
                offset += piece.len();
            }
        }
        None => {
            // 문자 경계에서 budget 단위로 절단
            let mut start = 0;
            let mut count = 0;
            for (i, _) in text.char_indices() {
                if count == budget {
                    out.push(base + start..base + i);
                    start = i;
                    count = 0;
                }
                count += 1;
            }
            out.push(base + start..base + text.len());
        }
    }
}

/// 인접 세그먼트를 budget 이하로 탐욕적 병합
fn merge_segments(text: &str, segments: Vec<Range<usize>>, budget: usize) -> Vec<Range<usize>> {
    let mut cores: Vec<Range<usize>> = Vec::new();
    let mut current: Option<(Range<usize>, usize)> = None;

    for seg in segments {
        let seg_chars = char_len(&text[seg.clone()]);
        current = match current {
            Some((range, chars)) if chars + seg_chars <= budget => {
                Some((range.start..seg.end, chars + seg_chars))
            }
            Some((range, _)) => {
                cores.push(range);
                Some((seg, seg_chars))
            }
            None => Some((seg, seg_chars)),
        };
    }

    if let Some((range, _)) = current {
        cores.push(range);
    }

    cores
}

/// 첫 코어가 `overlap` 문자 이하면 다음 코어를 흡수
///
/// 합친 길이는 overlap + stride = chunk_size를 넘지 않습니다.
fn fold_short_head(text: &str, cores: &mut Vec<Range<usize>>, overlap: usize) {
    while cores.len() > 1 && char_len(&text[cores[0].clone()]) <= overlap {
        let next = cores.remove(1);
        cores[0].end = next.end;
    }
}

/// `pos`에서 `n` 문자 앞의 바이트 위치
fn back_chars(text: &str, pos: usize, n: usize) -> usize {
    if n == 0 {
        return pos;
    }
    text[..pos]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

// ============================================================================
// Tests
// ============================================================================
