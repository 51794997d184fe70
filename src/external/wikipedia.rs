//! Wikipedia 백엔드
//!
//! MediaWiki Action API로 검색하고 페이지 도입부 요약을 가져옵니다.
//! ref: https://www.mediawiki.org/wiki/API:Search
//! ref: https://www.mediawiki.org/wiki/Extension:TextExtracts

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use super::{KnowledgeBackend, LookupFailure, ResolvedEntry};

/// 기본 API 엔드포인트
pub const DEFAULT_WIKIPEDIA_API: &str = "https://en.wikipedia.org/w/api.php";

/// Wikipedia 백엔드
#[derive(Debug, Clone)]
pub struct WikipediaBackend {
    api_url: Url,
    client: reqwest::Client,
    whitespace: Regex,
}

// ----------------------------------------------------------------------------
// API 응답 (formatversion=2)
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    query: Option<PageQuery>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    extract: Option<String>,
    pageprops: Option<PageProps>,
}

#[derive(Debug, Deserialize)]
struct PageProps {
    disambiguation: Option<serde_json::Value>,
}

impl WikipediaBackend {
    /// 새 백엔드 생성
    ///
    /// # Arguments
    /// * `api_url` - MediaWiki api.php 주소
    /// * `timeout` - 요청 타임아웃
    pub fn new(api_url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("grounded-rag/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let whitespace = Regex::new(r"\s+").context("Invalid whitespace pattern")?;

        Ok(Self {
            api_url,
            client,
            whitespace,
        })
    }

    async fn fetch_page(&self, title: &str) -> Result<PageResponse> {
        let response = self
            .client
            .get(self.api_url.clone())
            .query(&[
                ("action", "query"),
                ("prop", "extracts|pageprops"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .send()
            .await
            .context("Failed to send page request")?
            .error_for_status()
            .context("Wikipedia page request failed")?;

        response
            .json::<PageResponse>()
            .await
            .context("Failed to parse page response")
    }
}

#[async_trait]
impl KnowledgeBackend for WikipediaBackend {
    async fn search(&self, topic: &str, limit: usize) -> Result<Vec<String>> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(self.api_url.clone())
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", topic),
                ("srlimit", limit.as_str()),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .send()
            .await
            .context("Failed to send search request")?
            .error_for_status()
            .context("Wikipedia search failed")?;

        let parsed: SearchResponse = response
            .json()
            .await
            .context("Failed to parse search response")?;

        Ok(parsed
            .query
            .map(|q| q.search.into_iter().map(|hit| hit.title).collect())
            .unwrap_or_default())
    }

    async fn resolve(&self, candidate: &str) -> Result<ResolvedEntry, LookupFailure> {
        let other = |message: String| LookupFailure::Other {
            title: candidate.to_string(),
            message,
        };

        let response = self
            .fetch_page(candidate)
            .await
            .map_err(|e| other(format!("{:#}", e)))?;

        let page = response
            .query
            .and_then(|q| q.pages.into_iter().next())
            .ok_or_else(|| LookupFailure::Missing {
                title: candidate.to_string(),
            })?;

        if page.missing || page.invalid {
            return Err(LookupFailure::Missing { title: page.title });
        }

        if page
            .pageprops
            .as_ref()
            .is_some_and(|p| p.disambiguation.is_some())
        {
            return Err(LookupFailure::Ambiguous { title: page.title });
        }

        let summary = page
            .extract
            .map(|e| self.whitespace.replace_all(&e, " ").trim().to_string())
            .unwrap_or_default();

        if summary.is_empty() {
            return Err(other("page has no summary".to_string()));
        }

        Ok(ResolvedEntry {
            title: page.title,
            summary,
        })
    }

    fn source_name(&self) -> &str {
        "Wikipedia"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::ExternalKnowledge;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn backend(server: &MockServer) -> WikipediaBackend {
        let url = Url::parse(&format!("{}/w/api.php", server.uri())).unwrap();
        WikipediaBackend::new(url, Duration::from_secs(5)).unwrap()
    }

    async fn mount_page(server: &MockServer, title: &str, page: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("prop", "extracts|pageprops"))
            .and(query_param("titles", title))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"query": {"pages": [page]}})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_search_titles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("list", "search"))
            .and(query_param("srsearch", "rent control kerala laws"))
            .and(query_param("srlimit", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": {"search": [{"title": "Rent control"}, {"title": "Kerala"}]}
            })))
            .mount(&server)
            .await;

        let titles = backend(&server)
            .await
            .search("rent control kerala laws", 3)
            .await
            .unwrap();
        assert_eq!(titles, vec!["Rent control", "Kerala"]);
    }

    #[tokio::test]
    async fn test_resolve_classifies_pages() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "Kerala",
            serde_json::json!({"title": "Kerala", "extract": "Kerala is a state\n\nin India."}),
        )
        .await;
        mount_page(
            &server,
            "Mercury",
            serde_json::json!({"title": "Mercury", "extract": "Mercury may refer to:",
                               "pageprops": {"disambiguation": ""}}),
        )
        .await;
        mount_page(
            &server,
            "Nowhere",
            serde_json::json!({"title": "Nowhere", "missing": true}),
        )
        .await;

        let backend = backend(&server).await;

        let entry = backend.resolve("Kerala").await.unwrap();
        assert_eq!(entry.summary, "Kerala is a state in India.");

        assert!(matches!(
            backend.resolve("Mercury").await,
            Err(LookupFailure::Ambiguous { .. })
        ));
        assert!(matches!(
            backend.resolve("Nowhere").await,
            Err(LookupFailure::Missing { .. })
        ));
    }

    #[tokio::test]
    async fn test_lookup_end_to_end_skips_disambiguation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("list", "search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": {"search": [{"title": "Kerala"}, {"title": "Mercury"}, {"title": "Kochi"}]}
            })))
            .mount(&server)
            .await;
        mount_page(
            &server,
            "Kerala",
            serde_json::json!({"title": "Kerala", "extract": "Kerala is a state in India."}),
        )
        .await;
        mount_page(
            &server,
            "Mercury",
            serde_json::json!({"title": "Mercury", "pageprops": {"disambiguation": ""}}),
        )
        .await;
        mount_page(
            &server,
            "Kochi",
            serde_json::json!({"title": "Kochi", "extract": "Kochi is a city."}),
        )
        .await;

        let source = ExternalKnowledge::new(backend(&server).await);
        let snippets = source.lookup("quick fact", 3).await.unwrap();
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[1].source_label, "Wikipedia: Kochi");
    }

    #[tokio::test]
    async fn test_server_error_on_resolve_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("prop", "extracts|pageprops"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = backend(&server).await.resolve("Anything").await;
        assert!(matches!(result, Err(LookupFailure::Other { .. })));
    }
}
