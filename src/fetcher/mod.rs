//! 동시 수집 모듈 - URL 배치의 원본 HTML 가져오기
//!
//! 모든 요청을 tokio 런타임 위에서 동시에 실행하고, 입력 순서를 그대로
//! 유지한 채 URL마다 하나의 [`FetchResult`]를 돌려줍니다.
//!
//! - 요청별 타임아웃 (배치 전체가 아닌 개별 요청 단위)
//! - 일시적 실패(타임아웃, 연결 오류)만 재시도
//! - HTTP 에러 상태는 즉시 기록, 재시도 없음
//! - 호출자에게 에러를 던지지 않음: 모든 실패는 결과 값으로 표현

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, UPGRADE_INSECURE_REQUESTS};

// ============================================================================
// Browser Client
// ============================================================================

/// 단순 차단을 피하기 위한 브라우저 User-Agent
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// 최대 리다이렉트 횟수
const MAX_REDIRECTS: usize = 10;

/// 브라우저와 유사한 기본 헤더
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers
}

/// 브라우저 헤더와 리다이렉트 정책이 적용된 HTTP 클라이언트 생성
///
/// 수집기, URL 검증기, 검색 백엔드가 공통으로 사용합니다.
pub fn build_browser_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(browser_headers())
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

// ============================================================================
// Fetch Outcome
// ============================================================================

/// 수집 실패 분류
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// 200이 아닌 HTTP 응답
    #[error("HTTP {0}")]
    Http(u16),
    /// 요청 타임아웃 (재시도 대상)
    #[error("request timed out")]
    Timeout,
    /// 연결 실패 (재시도 대상)
    #[error("connection failed: {0}")]
    Connect(String),
    /// 그 외 요청 예외
    #[error("request failed: {0}")]
    Request(String),
    /// 200 응답이지만 본문이 비어 있음
    #[error("empty response")]
    EmptyResponse,
}

impl FetchError {
    /// 재시도 가능한 일시적 실패인지
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Timeout | FetchError::Connect(_))
    }

    /// 결과 분류 이름
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Http(_) => "http_error",
            FetchError::Timeout => "timeout",
            FetchError::Connect(_) | FetchError::Request(_) => "request_exception",
            FetchError::EmptyResponse => "empty_response",
        }
    }

    /// 실패에 대응하는 HTTP 상태 (HTTP 이외 실패는 0)
    pub fn http_status(&self) -> u16 {
        match self {
            FetchError::Http(status) => *status,
            FetchError::EmptyResponse => 200,
            _ => 0,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else {
            FetchError::Request(e.to_string())
        }
    }
}

/// URL 하나의 수집 결과
///
/// 생성 후 불변입니다. 항상 다음 둘 중 하나만 성립합니다:
/// 본문이 비어 있지 않고 에러가 없음, 또는 에러가 설정됨.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    url: String,
    raw_html: String,
    http_status: u16,
    error: Option<FetchError>,
}

impl FetchResult {
    /// 성공 결과 생성 (본문이 비어 있으면 EmptyResponse 실패로 기록)
    pub fn success(url: impl Into<String>, http_status: u16, raw_html: impl Into<String>) -> Self {
        let raw_html = raw_html.into();
        if raw_html.trim().is_empty() {
            return Self::failure(url, FetchError::EmptyResponse);
        }

        Self {
            url: url.into(),
            raw_html,
            http_status,
            error: None,
        }
    }

    /// 실패 결과 생성
    pub fn failure(url: impl Into<String>, error: FetchError) -> Self {
        Self {
            url: url.into(),
            raw_html: String::new(),
            http_status: error.http_status(),
            error: Some(error),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn raw_html(&self) -> &str {
        &self.raw_html
    }

    /// HTTP 상태 코드 (HTTP 이외 실패는 0)
    pub fn http_status(&self) -> u16 {
        self.http_status
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// ============================================================================
// Fetcher Trait
// ============================================================================

/// 수집기 트레이트
///
/// 입력과 같은 길이, 같은 순서의 결과를 반환해야 하며 실패로 끝나지 않습니다.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// URL 배치 수집
    async fn fetch_all(&self, urls: &[String]) -> Vec<FetchResult>;
}

// ============================================================================
// HTTP Fetcher
// ============================================================================

/// 수집기 설정
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// 요청별 타임아웃
    pub timeout: Duration,
    /// URL당 최대 시도 횟수 (첫 시도 포함)
    pub max_attempts: u32,
    /// 재시도 전 대기 시간
    pub retry_backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_attempts: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// reqwest 기반 동시 수집기
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// 새 수집기 생성
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = build_browser_client(config.timeout)?;
        Ok(Self { client, config })
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Result<Self> {
        Self::new(FetchConfig::default())
    }

    /// 단일 URL 수집 (재시도 포함)
    async fn fetch_one(&self, url: &str) -> FetchResult {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match self.attempt(url).await {
                Ok((status, body)) => return FetchResult::success(url, status, body),
                Err(e) => e,
            };

            if error.is_transient() && attempt < max_attempts {
                tracing::debug!(
                    "Transient failure for {}: {} (attempt {}/{})",
                    url,
                    error,
                    attempt,
                    max_attempts
                );
                tokio::time::sleep(self.config.retry_backoff).await;
                continue;
            }

            tracing::warn!("Fetch failed for {}: {}", url, error);
            return FetchResult::failure(url, error);
        }
    }

    /// 한 번의 요청 시도
    async fn attempt(&self, url: &str) -> Result<(u16, String), FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(FetchError::Http(status));
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyResponse);
        }

        if !looks_like_html(&body) {
            tracing::warn!("Response from {} does not look like HTML", url);
        }

        Ok((status, body))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_all(&self, urls: &[String]) -> Vec<FetchResult> {
        tracing::info!("Fetching {} URLs", urls.len());

        let results = join_all(urls.iter().map(|url| self.fetch_one(url))).await;

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        tracing::info!("Fetched {}/{} URLs successfully", succeeded, urls.len());

        results
    }
}

/// HTML 마커 존재 여부 (참고용, 차단하지 않음)
pub fn looks_like_html(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    ["<html", "<!doctype", "<body"]
        .iter()
        .any(|marker| lower.contains(marker))
}

// ============================================================================
// Tests
// ============================================================================
