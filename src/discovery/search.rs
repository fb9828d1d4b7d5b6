//! DuckDuckGo HTML 검색 어댑터
//!
//! 자바스크립트 없이 렌더링되는 html.duckduckgo.com 엔드포인트를 사용합니다.
//! 결과 링크는 `/l/?uddg=<인코딩된 URL>` 형태의 리다이렉트로 감싸져 있어 디코딩이 필요합니다.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use super::{SearchBackend, SearchRequest};
use crate::fetcher::build_browser_client;

const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";
const DUCKDUCKGO_HOST: &str = "duckduckgo.com";

/// 결과 링크 셀렉터 (우선순위 순)
const RESULT_SELECTORS: [&str; 3] = ["a.result__a", "h2.result__title a", "a.result__url"];

/// DuckDuckGo 검색 백엔드
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGoSearch {
    /// 새 검색 백엔드 생성
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_browser_client(timeout)?,
            endpoint: DUCKDUCKGO_HTML_URL.to_string(),
        })
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoSearch {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<String>> {
        let mut params = vec![("q", request.query.as_str())];
        if let Some(recency) = request.recency {
            params.push(("df", recency.code()));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .context("Search request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Search returned HTTP {}", status);
        }

        let html = response
            .text()
            .await
            .context("Failed to read search response")?;

        let links = parse_result_links(&html, request.limit);
        tracing::debug!("DuckDuckGo returned {} result links", links.len());
        Ok(links)
    }

    fn surface_host(&self) -> &str {
        DUCKDUCKGO_HOST
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

/// 검색 결과 페이지에서 결과 URL 추출 (문서 순서 유지)
pub fn parse_result_links(html: &str, limit: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    for selector_str in RESULT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };

        for element in document.select(&selector) {
            if links.len() >= limit {
                break;
            }
            if let Some(url) = element.value().attr("href").and_then(decode_result_href) {
                links.push(url);
            }
        }

        // 첫 번째로 결과를 낸 셀렉터만 사용
        if !links.is_empty() {
            break;
        }
    }

    links
}

/// 결과 링크의 href를 실제 대상 URL로 변환
fn decode_result_href(href: &str) -> Option<String> {
    let href = href.trim();
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("https://{}{}", DUCKDUCKGO_HOST, href)
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&absolute).ok()?;

    // 리다이렉트 링크: uddg 파라미터에 원본 URL (query_pairs가 디코딩 처리)
    if parsed.path().starts_with("/l/") {
        return parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
    }

    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}
