//! GitHub code search adapter for the public-code layer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::{CodeFragment, CodeSearchIndex, SearchHits};
use crate::error::{CollaboratorError, CollaboratorResult};

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const MAX_SOURCES: usize = 3;

/// Queries `GET /search/code` with a personal access token.
#[derive(Debug, Clone)]
pub struct GitHubCodeSearch {
    client: reqwest::Client,
    base_url: String,
    token: String,
    language: Option<String>,
}

impl GitHubCodeSearch {
    pub fn new(token: impl Into<String>) -> CollaboratorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("pbl-guardian/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(GitHubCodeSearch {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            language: None,
        })
    }

    /// Restrict results to one language (`language:` qualifier).
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Point at a different API host (GitHub Enterprise, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn query_for(&self, fragment: &CodeFragment) -> String {
        match &self.language {
            Some(lang) => format!("{} language:{}", fragment.query, lang),
            None => fragment.query.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    path: String,
    repository: Option<SearchRepository>,
}

#[derive(Debug, Deserialize)]
struct SearchRepository {
    full_name: String,
}

/// Map a non-success HTTP status to a collaborator error.
pub fn status_error(status: StatusCode) -> CollaboratorError {
    match status {
        StatusCode::UNAUTHORIZED => {
            CollaboratorError::Unauthorized("code search rejected the token".to_string())
        }
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            CollaboratorError::RateLimited(format!("code search (HTTP {})", status.as_u16()))
        }
        other => CollaboratorError::Http(format!("code search returned HTTP {}", other.as_u16())),
    }
}

/// Parse a search response body into hits.
pub fn parse_response(body: &str) -> CollaboratorResult<SearchHits> {
    let response: SearchResponse = serde_json::from_str(body)?;
    let sources = response
        .items
        .into_iter()
        .take(MAX_SOURCES)
        .map(|item| match item.repository {
            Some(repo) => format!("{}:{}", repo.full_name, item.path),
            None => item.path,
        })
        .collect();
    Ok(SearchHits {
        total_count: response.total_count,
        sources,
    })
}

#[async_trait]
impl CodeSearchIndex for GitHubCodeSearch {
    fn name(&self) -> &str {
        "github-code-search"
    }

    async fn search(&self, fragment: &CodeFragment) -> CollaboratorResult<SearchHits> {
        let query = self.query_for(fragment);
        let response = self
            .client
            .get(format!("{}/search/code", self.base_url))
            .query(&[("q", query.as_str())])
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3.text-match+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }
        let body = response.text().await?;
        let hits = parse_response(&body)?;
        debug!(function = %fragment.function, total = hits.total_count, "code search finished");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fragment() -> CodeFragment {
        CodeFragment {
            path: "src/app.py".into(),
            function: "merge_sorted".into(),
            lines: 9,
            query: "result append left right extend".into(),
        }
    }

    /// Serve one canned HTTP response on a loopback port.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_parse_response_bounds_sources() {
        let body = r#"{"total_count": 12, "items": [
            {"path": "a.py", "repository": {"full_name": "x/one"}},
            {"path": "b.py", "repository": {"full_name": "x/two"}},
            {"path": "c.py", "repository": {"full_name": "x/three"}},
            {"path": "d.py", "repository": {"full_name": "x/four"}}
        ]}"#;
        let hits = parse_response(body).unwrap();
        assert_eq!(hits.total_count, 12);
        assert_eq!(hits.sources, vec!["x/one:a.py", "x/two:b.py", "x/three:c.py"]);
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(status_error(StatusCode::FORBIDDEN), CollaboratorError::RateLimited(_)));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS),
            CollaboratorError::RateLimited(_)
        ));
        assert!(matches!(status_error(StatusCode::UNAUTHORIZED), CollaboratorError::Unauthorized(_)));
        assert!(matches!(status_error(StatusCode::BAD_GATEWAY), CollaboratorError::Http(_)));
    }

    #[test]
    fn test_language_qualifier() {
        let search = GitHubCodeSearch::new("t").unwrap().with_language("python");
        assert_eq!(
            search.query_for(&fragment()),
            "result append left right extend language:python"
        );
    }

    #[tokio::test]
    async fn test_search_success_against_local_server() {
        let base = serve_once(
            "200 OK",
            r#"{"total_count": 2, "items": [{"path": "sort.py", "repository": {"full_name": "algo/lib"}}]}"#,
        )
        .await;
        let search = GitHubCodeSearch::new("t").unwrap().with_base_url(base);
        let hits = search.search(&fragment()).await.unwrap();
        assert_eq!(hits.total_count, 2);
        assert_eq!(hits.sources, vec!["algo/lib:sort.py"]);
    }

    #[tokio::test]
    async fn test_rate_limit_against_local_server() {
        let base = serve_once("403 Forbidden", r#"{"message": "API rate limit exceeded"}"#).await;
        let search = GitHubCodeSearch::new("t").unwrap().with_base_url(base);
        let err = search.search(&fragment()).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::RateLimited(_)));
    }
}
