//! 수집 오케스트레이터
//!
//! URL 목록을 받아 동시 수집 → 본문 추출 → 품질 게이트 → (선택) 관련도 게이트
//! → 중복 게이트 순으로 처리하고 정규화된 레코드를 반환합니다.
//!
//! 반환 순서: 통과한 성공 레코드(입력 순) 뒤에 수집 실패 레코드(입력 순).
//! 중복 판정용 해시 집합은 `Ingestor`가 소유하며 호출 간에 유지됩니다.

use anyhow::Result;

use crate::config::Settings;
use crate::extractor::{ContentExtractor, ExtractedRecord};
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::filter::{is_duplicate, relevance_score, QualityFilter, SeenHashes};

/// 한 번의 수집 실행 통계
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// 입력 URL 수
    pub attempted: usize,
    /// 반환된 성공 레코드 수
    pub succeeded: usize,
    /// 반환된 실패 레코드 수
    pub failed: usize,
    pub dropped_quality: usize,
    pub dropped_duplicate: usize,
    pub dropped_irrelevant: usize,
}

#[derive(Debug, Clone)]
struct RelevanceGate {
    keywords: Vec<String>,
    min_score: f64,
}

/// 수집 오케스트레이터
pub struct Ingestor {
    fetcher: Box<dyn Fetcher>,
    extractor: ContentExtractor,
    quality: QualityFilter,
    seen: SeenHashes,
    relevance: Option<RelevanceGate>,
}

impl Ingestor {
    pub fn new(fetcher: Box<dyn Fetcher>, quality: QualityFilter) -> Self {
        Self {
            fetcher,
            extractor: ContentExtractor::new(),
            quality,
            seen: SeenHashes::new(),
            relevance: None,
        }
    }

    /// 설정으로 HTTP 수집기 기반 오케스트레이터 생성
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let fetcher = HttpFetcher::new(settings.fetch.clone())?;
        Ok(Self::new(
            Box::new(fetcher),
            QualityFilter::new(settings.quality.clone()),
        ))
    }

    /// 키워드 관련도 게이트 활성화 (품질 게이트 다음, 중복 게이트 전)
    pub fn with_relevance(mut self, keywords: Vec<String>, min_score: f64) -> Self {
        if keywords.iter().any(|k| !k.trim().is_empty()) {
            self.relevance = Some(RelevanceGate {
                keywords,
                min_score: min_score.clamp(0.0, 1.0),
            });
        }
        self
    }

    /// 지금까지 등록된 해시 수
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// 새 실행을 위해 중복 상태 초기화
    pub fn reset(&mut self) {
        self.seen.clear();
    }

    /// URL 목록 수집. 실패하지 않습니다.
    pub async fn ingest(&mut self, urls: &[String]) -> Vec<ExtractedRecord> {
        self.ingest_with_stats(urls).await.0
    }

    /// 통계와 함께 수집
    pub async fn ingest_with_stats(
        &mut self,
        urls: &[String],
    ) -> (Vec<ExtractedRecord>, IngestStats) {
        let mut stats = IngestStats {
            attempted: urls.len(),
            ..Default::default()
        };

        let results = self.fetcher.fetch_all(urls).await;

        let mut successes = Vec::new();
        let mut failures = Vec::new();

        for result in results {
            let record = match result.error() {
                None => {
                    let content = self.extractor.extract(result.raw_html(), result.url());
                    ExtractedRecord::from_content(result.url(), content)
                }
                Some(error) => {
                    failures.push(ExtractedRecord::from_fetch_error(result.url(), error));
                    continue;
                }
            };

            if !self.quality.passes_quality(&record) {
                tracing::debug!(
                    "Dropped {} (quality: {} chars)",
                    record.url,
                    record.content.chars().count()
                );
                stats.dropped_quality += 1;
                continue;
            }

            if let Some(gate) = &self.relevance {
                let score = relevance_score(&record, &gate.keywords);
                if score < gate.min_score {
                    tracing::debug!("Dropped {} (relevance {:.2})", record.url, score);
                    stats.dropped_irrelevant += 1;
                    continue;
                }
            }

            if is_duplicate(&record, &mut self.seen) {
                tracing::debug!("Dropped {} (duplicate)", record.url);
                stats.dropped_duplicate += 1;
                continue;
            }

            successes.push(record);
        }

        stats.succeeded = successes.len();
        stats.failed = failures.len();

        tracing::info!(
            "Ingested {}/{} URLs ({} failed, {} low quality, {} duplicate, {} irrelevant)",
            stats.succeeded,
            stats.attempted,
            stats.failed,
            stats.dropped_quality,
            stats.dropped_duplicate,
            stats.dropped_irrelevant
        );

        successes.extend(failures);
        (successes, stats)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;

    use crate::extractor::RecordStatus;
    use crate::fetcher::{FetchError, FetchResult};
    use crate::test_support::article_html;

    /// URL별 고정 응답을 돌려주는 수집기
    struct MockFetcher {
        pages: HashMap<String, Result<String, FetchError>>,
    }

    impl MockFetcher {
        fn new(pages: Vec<(&str, Result<String, FetchError>)>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|(url, page)| (url.to_string(), page))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch_all(&self, urls: &[String]) -> Vec<FetchResult> {
            urls.iter()
                .map(|url| match self.pages.get(url) {
                    Some(Ok(html)) => FetchResult::success(url.as_str(), 200, html.as_str()),
                    Some(Err(e)) => FetchResult::failure(url.as_str(), e.clone()),
                    None => FetchResult::failure(url.as_str(), FetchError::Http(404)),
                })
                .collect()
        }
    }

    fn ingestor(pages: Vec<(&str, Result<String, FetchError>)>) -> Ingestor {
        Ingestor::new(Box::new(MockFetcher::new(pages)), QualityFilter::default())
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|u| u.to_string()).collect()
    }

    #[tokio::test]
    async fn test_success_and_http_error() {
        let mut ingestor = ingestor(vec![
            ("http://a", Ok(article_html("Harbor", "the harbor blockade"))),
            ("http://b", Err(FetchError::Http(404))),
        ]);

        let records = ingestor.ingest(&urls(&["http://a", "http://b"])).await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].url, "http://a");
        assert_eq!(records[0].status, RecordStatus::Success);
        assert_eq!(records[0].title, "Harbor");
        assert!(!records[0].content.contains("Sign in"));

        assert_eq!(records[1].url, "http://b");
        assert_eq!(records[1].status, RecordStatus::Failed);
        assert!(records[1].error.as_deref().unwrap_or("").contains("404"));
    }

    #[tokio::test]
    async fn test_identical_content_deduplicated() {
        let page = article_html("Same", "the same event");
        let mut ingestor = ingestor(vec![
            ("http://a", Ok(page.clone())),
            ("http://b", Ok(page)),
        ]);

        let (records, stats) = ingestor
            .ingest_with_stats(&urls(&["http://a", "http://b"]))
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "http://a");
        assert_eq!(stats.dropped_duplicate, 1);
        assert_eq!(ingestor.seen_count(), 2);
    }

    #[tokio::test]
    async fn test_successes_before_failures_in_input_order() {
        let mut ingestor = ingestor(vec![
            ("http://1", Err(FetchError::Timeout)),
            ("http://2", Ok(article_html("Two", "the second topic"))),
            ("http://3", Err(FetchError::Http(500))),
            ("http://4", Ok(article_html("Four", "the fourth topic"))),
        ]);

        let records = ingestor
            .ingest(&urls(&["http://1", "http://2", "http://3", "http://4"]))
            .await;

        let order: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(order, vec!["http://2", "http://4", "http://1", "http://3"]);
        assert_eq!(records[2].status, RecordStatus::Error);
        assert_eq!(records[3].status, RecordStatus::Failed);
    }

    #[tokio::test]
    async fn test_low_quality_dropped_silently() {
        let mut ingestor = ingestor(vec![
            ("http://short", Ok("<html><body><p>Too little here.</p></body></html>".into())),
            ("http://empty", Ok("<html><body><script>x()</script></body></html>".into())),
        ]);

        let (records, stats) = ingestor
            .ingest_with_stats(&urls(&["http://short", "http://empty"]))
            .await;

        assert!(records.is_empty());
        assert_eq!(stats.dropped_quality, 2);
        assert_eq!(stats.attempted, 2);
    }

    #[tokio::test]
    async fn test_dedup_persists_across_calls_until_reset() {
        let mut ingestor = ingestor(vec![("http://a", Ok(article_html("A", "the repeat")))]);
        let input = urls(&["http://a"]);

        assert_eq!(ingestor.ingest(&input).await.len(), 1);
        assert!(ingestor.ingest(&input).await.is_empty());

        ingestor.reset();
        assert_eq!(ingestor.seen_count(), 0);
        assert_eq!(ingestor.ingest(&input).await.len(), 1);
    }

    #[tokio::test]
    async fn test_relevance_gate() {
        let mut ingestor = ingestor(vec![
            ("http://port", Ok(article_html("Port strike", "the port strike"))),
            ("http://weather", Ok(article_html("Weather", "the rainy season"))),
        ])
        .with_relevance(vec!["strike".to_string()], 0.5);

        let (records, stats) = ingestor
            .ingest_with_stats(&urls(&["http://port", "http://weather"]))
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "http://port");
        assert_eq!(stats.dropped_irrelevant, 1);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let mut ingestor = ingestor(vec![]);
        let (records, stats) = ingestor.ingest_with_stats(&[]).await;
        assert!(records.is_empty());
        assert_eq!(stats, IngestStats::default());
    }
}
