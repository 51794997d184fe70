//! Context 조립
//!
//! 인덱스 검색 결과(1차)와 외부 지식(2차)을 프롬프트용 컨텍스트로 합칩니다.
//! 각 섹션은 순위 순서대로 빈 줄로 이어 붙이며, 비어 있으면 고정 문구로 대체합니다.
//! 중복 제거는 하지 않습니다.

use serde::{Deserialize, Serialize};

use crate::external::KnowledgeSnippet;
use crate::knowledge::RetrievalResult;

/// 1차 섹션 대체 문구
pub const NO_DATABASE_CONTEXT: &str = "No relevant information found in the database.";

/// 2차 섹션 대체 문구
pub const NO_REFERENCE_CONTEXT: &str = "No relevant external reference information found.";

const SECTION_SEPARATOR: &str = "\n\n";

/// 조립된 컨텍스트 (두 섹션 모두 비어 있지 않음)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub primary_section: String,
    pub secondary_section: String,
}

impl AssembledContext {
    /// 1차 섹션이 검색 결과 없이 대체 문구인지
    pub fn primary_is_fallback(&self) -> bool {
        self.primary_section == NO_DATABASE_CONTEXT
    }

    /// 2차 섹션이 대체 문구인지
    pub fn secondary_is_fallback(&self) -> bool {
        self.secondary_section == NO_REFERENCE_CONTEXT
    }

    /// 프롬프트에 삽입할 형태로 렌더링
    pub fn render(&self) -> String {
        format!(
            "Database Context:\n{}\n\nReference Context:\n{}",
            self.primary_section, self.secondary_section
        )
    }
}

/// 검색 결과와 외부 지식을 하나의 컨텍스트로 조립
pub fn assemble(retrieved: &RetrievalResult, snippets: &[KnowledgeSnippet]) -> AssembledContext {
    let primary: Vec<&str> = retrieved
        .iter()
        .map(|scored| scored.entry.chunk.text.as_str())
        .collect();
    let secondary: Vec<&str> = snippets.iter().map(|s| s.text.as_str()).collect();

    AssembledContext {
        primary_section: join_or(&primary, NO_DATABASE_CONTEXT),
        secondary_section: join_or(&secondary, NO_REFERENCE_CONTEXT),
    }
}

fn join_or(parts: &[&str], fallback: &str) -> String {
    if parts.is_empty() {
        fallback.to_string()
    } else {
        parts.join(SECTION_SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingVector;
    use crate::knowledge::{Chunk, IndexEntry, ScoredEntry};
    use std::collections::BTreeMap;

    fn scored(text: &str, score: f32) -> ScoredEntry {
        ScoredEntry {
            entry: IndexEntry {
                id: text.to_string(),
                chunk: Chunk {
                    text: text.to_string(),
                    sequence_index: 0,
                    source_offset: 0,
                },
                vector: EmbeddingVector::new(vec![1.0]),
                metadata: BTreeMap::new(),
            },
            score,
        }
    }

    fn snippet(text: &str) -> KnowledgeSnippet {
        KnowledgeSnippet {
            text: text.to_string(),
            source_label: "Wikipedia: Test".to_string(),
        }
    }

    #[test]
    fn test_empty_inputs_use_fallbacks() {
        let context = assemble(&vec![], &[]);
        assert_eq!(context.primary_section, NO_DATABASE_CONTEXT);
        assert_eq!(context.secondary_section, NO_REFERENCE_CONTEXT);
        assert!(context.primary_is_fallback());
        assert!(context.secondary_is_fallback());
    }

    #[test]
    fn test_sections_joined_in_rank_order() {
        let retrieved = vec![scored("first", 0.9), scored("second", 0.5)];
        let context = assemble(&retrieved, &[snippet("ref a"), snippet("ref b")]);

        assert_eq!(context.primary_section, "first\n\nsecond");
        assert_eq!(context.secondary_section, "ref a\n\nref b");
        assert!(!context.primary_is_fallback());
    }

    #[test]
    fn test_duplicates_kept() {
        let retrieved = vec![scored("same", 0.9), scored("same", 0.9)];
        let context = assemble(&retrieved, &[]);
        assert_eq!(context.primary_section, "same\n\nsame");
    }

    #[test]
    fn test_render_layout() {
        let context = assemble(&vec![scored("The Act defines X.", 1.0)], &[]);
        assert_eq!(
            context.render(),
            "Database Context:\nThe Act defines X.\n\nReference Context:\nNo relevant external reference information found."
        );
    }
}
