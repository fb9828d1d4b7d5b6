//! 소스 탐색 모듈 - 리서치 프롬프트를 검증된 URL 목록으로 변환
//!
//! 1. 프롬프트에서 최신성 의도를 감지해 검색 기간 필터와 연도 토큰을 붙임
//! 2. 검색 백엔드에 한 번 질의 (필요한 것보다 많은 결과 요청)
//! 3. fragment 제거, 중복 제거, 검색 엔진 자체 링크/과도하게 긴 URL 제거
//! 4. 목표 개수에 도달할 때까지 순차 검증 (요청 간 짧은 딜레이)
//! 5. 최소 개수 미달 시 고정 폴백 목록 반환
//!
//! 어떤 에러도 호출자에게 전파하지 않습니다.

mod search;

pub use search::{parse_result_links, DuckDuckGoSearch};

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Datelike;
use regex::Regex;
use url::Url;

use crate::validator::UrlValidator;

// ============================================================================
// Search Backend
// ============================================================================

/// 검색 기간 필터
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Recency {
    Day,
    Week,
    Month,
    Year,
}

impl Recency {
    /// 검색 엔진 파라미터 코드
    pub fn code(&self) -> &'static str {
        match self {
            Recency::Day => "d",
            Recency::Week => "w",
            Recency::Month => "m",
            Recency::Year => "y",
        }
    }
}

/// 검색 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// 최종 검색어
    pub query: String,
    /// 기간 필터
    pub recency: Option<Recency>,
    /// 요청할 원시 결과 수
    pub limit: usize,
}

/// 검색 백엔드 트레이트
///
/// 검색 엔진 마크업은 자주 바뀌므로 어댑터를 이 인터페이스 뒤에 둡니다.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// 관련도 순서의 결과 URL 목록
    async fn search(&self, request: &SearchRequest) -> Result<Vec<String>>;

    /// 검색 엔진 자신의 호스트 (결과에서 제외할 대상)
    fn surface_host(&self) -> &str;

    /// 백엔드 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Configuration
// ============================================================================

/// 탐색 설정
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// 검증 통과 목표 개수 (도달 시 조기 종료)
    pub target_validated: usize,
    /// 최소 검증 개수 (미달 시 폴백)
    pub min_validated: usize,
    /// 검색 엔진에 요청할 원시 결과 수
    pub raw_results: usize,
    /// 허용 URL 최대 길이
    pub max_url_len: usize,
    /// 검증 요청 간 딜레이
    pub validation_delay: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            target_validated: 20,
            min_validated: 3,
            raw_results: 40,
            max_url_len: 2048,
            validation_delay: Duration::from_millis(300),
        }
    }
}

/// 사용 가능한 계획이 없을 때 반환하는 자리표시 URL
pub const FALLBACK_URLS: [&str; 3] = [
    "https://www.example.com/",
    "https://www.example.org/",
    "https://www.example.net/",
];

/// 폴백 목록
pub fn fallback_urls() -> Vec<String> {
    FALLBACK_URLS.iter().map(|u| u.to_string()).collect()
}

/// 탐색 결과가 폴백 목록인지
pub fn is_fallback(urls: &[String]) -> bool {
    urls.len() == FALLBACK_URLS.len()
        && urls.iter().zip(FALLBACK_URLS.iter()).all(|(a, b)| a == b)
}

// ============================================================================
// Freshness Heuristics
// ============================================================================

/// 프롬프트에서 최신성 의도 감지
///
/// 여러 단서가 있으면 가장 좁은 기간을 선택합니다.
pub fn detect_recency(prompt: &str) -> Option<Recency> {
    let lower = prompt.to_lowercase();
    let mut recency: Option<Recency> = None;

    let rules: [(&str, Recency); 4] = [
        (r"\b(today|now|tonight|breaking)\b", Recency::Day),
        (r"\b(latest|news|current|currently|recent|recently)\b", Recency::Week),
        (r"\b(update|updates|updated)\b", Recency::Month),
        (r"\bthis year\b", Recency::Year),
    ];

    for (pattern, candidate) in rules {
        if let Ok(re) = Regex::new(pattern) {
            if re.is_match(&lower) {
                recency = Some(match recency {
                    Some(current) => current.min(candidate),
                    None => candidate,
                });
            }
        }
    }

    recency
}

/// 프롬프트로 검색 요청 구성
///
/// 최신성 의도가 있고 연도가 없으면 `year`를 검색어 끝에 붙입니다.
pub fn build_search_request(prompt: &str, limit: usize, year: i32) -> SearchRequest {
    let mut query = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    let recency = detect_recency(&query);

    if recency.is_some() {
        let year_token = year.to_string();
        if !query.split_whitespace().any(|w| w.contains(&year_token)) {
            query.push(' ');
            query.push_str(&year_token);
        }
    }

    SearchRequest {
        query,
        recency,
        limit,
    }
}

// ============================================================================
// SourceDiscovery
// ============================================================================

/// 소스 탐색기
pub struct SourceDiscovery {
    search: Box<dyn SearchBackend>,
    validator: Box<dyn UrlValidator>,
    config: DiscoveryConfig,
}

impl SourceDiscovery {
    /// 새 탐색기 생성
    pub fn new(
        search: Box<dyn SearchBackend>,
        validator: Box<dyn UrlValidator>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            search,
            validator,
            config,
        }
    }

    /// 프롬프트에 대한 검증된 URL 목록
    ///
    /// 호출할 때마다 검색을 다시 수행합니다.
    /// 최소 개수를 채우지 못하거나 에러가 나면 [`fallback_urls`]를 반환합니다.
    pub async fn discover(&self, prompt: &str) -> Vec<String> {
        match self.try_discover(prompt).await {
            Ok(urls) if urls.len() >= self.config.min_validated => {
                tracing::info!("Discovered {} validated sources", urls.len());
                urls
            }
            Ok(urls) => {
                tracing::warn!(
                    "Only {} validated sources (minimum {}), using fallback list",
                    urls.len(),
                    self.config.min_validated
                );
                fallback_urls()
            }
            Err(e) => {
                tracing::warn!("Discovery failed: {:#}, using fallback list", e);
                fallback_urls()
            }
        }
    }

    async fn try_discover(&self, prompt: &str) -> Result<Vec<String>> {
        if prompt.trim().is_empty() {
            bail!("empty research prompt");
        }

        let year = chrono::Utc::now().year();
        let request = build_search_request(prompt, self.config.raw_results, year);
        tracing::info!(
            "Searching {} for \"{}\" (recency: {:?})",
            self.search.name(),
            request.query,
            request.recency
        );

        let raw = self.search.search(&request).await?;
        let candidates = self.candidate_urls(raw);
        tracing::debug!("{} candidate URLs after filtering", candidates.len());

        let mut validated = Vec::new();
        for (i, url) in candidates.iter().enumerate() {
            if validated.len() >= self.config.target_validated {
                break;
            }

            if i > 0 && !self.config.validation_delay.is_zero() {
                tokio::time::sleep(self.config.validation_delay).await;
            }

            if self.validator.validate(url).await {
                validated.push(url.clone());
            } else {
                tracing::debug!("Validation failed: {}", url);
            }
        }

        Ok(validated)
    }

    /// 원시 검색 결과 정리 (순서 유지, 먼저 나온 것 우선)
    fn candidate_urls(&self, raw: Vec<String>) -> Vec<String> {
        let surface = self.search.surface_host().to_lowercase();
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for raw_url in raw {
            let Some(url) = normalize_candidate(&raw_url, self.config.max_url_len) else {
                continue;
            };

            if points_to_surface(&url, &surface) {
                continue;
            }

            if seen.insert(url.clone()) {
                candidates.push(url);
            }
        }

        candidates
    }
}

/// fragment 제거 및 기본 유효성 검사
///
/// 검색 결과 문자열을 그대로 유지합니다 (fragment만 잘라냄).
fn normalize_candidate(raw: &str, max_len: usize) -> Option<String> {
    let trimmed = raw.trim().split('#').next().unwrap_or("").trim_end();
    if trimmed.is_empty() || trimmed.len() > max_len {
        return None;
    }

    let url = Url::parse(trimmed).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }

    Some(trimmed.to_string())
}

/// 검색 엔진 자신을 가리키는 URL인지
fn points_to_surface(url: &str, surface: &str) -> bool {
    if surface.is_empty() {
        return false;
    }

    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .map(|host| host == surface || host.ends_with(&format!(".{}", surface)))
        .unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================
