//! osint-ingest - OSINT 소스 탐색 및 본문 수집 파이프라인
//!
//! 조사 프롬프트로 공개 웹 소스를 찾고, 동시에 수집하여
//! 정제/중복 제거된 기사 레코드로 정규화합니다.
//!
//! 탐색(`discovery`) → 수집(`fetcher`) → 추출(`extractor`) → 필터(`filter`)
//! 단계를 `ingest::Ingestor`가 묶습니다.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod extractor;
pub mod fetcher;
pub mod filter;
pub mod ingest;
pub mod storage;
pub mod summarize;
pub mod validator;

#[cfg(test)]
mod test_support;

// Re-exports
pub use config::{get_api_key, get_data_dir, has_api_key, Settings};
pub use discovery::{
    DiscoveryConfig, DuckDuckGoSearch, Recency, SearchBackend, SearchRequest, SourceDiscovery,
};
pub use extractor::{ContentExtractor, ExtractedContent, ExtractedRecord, RecordStatus};
pub use fetcher::{FetchConfig, FetchError, FetchResult, Fetcher, HttpFetcher};
pub use filter::{is_duplicate, relevance_score, QualityConfig, QualityFilter, SeenHashes};
pub use ingest::{IngestStats, Ingestor};
pub use storage::{RecordSink, RecordStore, StoredRecord};
pub use summarize::{GeminiSummarizer, Summarizer};
pub use validator::{HttpValidator, UrlValidator, ValidatorConfig};
