//! 설정 모듈
//!
//! 컴포넌트별 설정(`DiscoveryConfig`, `FetchConfig`, `ValidatorConfig`,
//! `QualityConfig`)을 모으고 `OSINT_*` 환경변수로 덮어씁니다.
//!
//! | 환경변수 | 대상 |
//! |---|---|
//! | `OSINT_FETCH_TIMEOUT_SECS` | 페이지 수집 타임아웃 |
//! | `OSINT_FETCH_ATTEMPTS` | 일시 장애 시 최대 시도 횟수 |
//! | `OSINT_VALIDATE_TIMEOUT_SECS` | URL 검증 타임아웃 |
//! | `OSINT_TARGET_VALIDATED` | 검증 목표 URL 수 |
//! | `OSINT_MIN_VALIDATED` | 폴백 전 최소 URL 수 |
//! | `OSINT_MIN_CHARS` / `OSINT_MIN_WORDS` | 품질 기준 |
//! | `OSINT_DATA_DIR` | 데이터 디렉토리 |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;

use crate::discovery::DiscoveryConfig;
use crate::fetcher::FetchConfig;
use crate::filter::QualityConfig;
use crate::validator::ValidatorConfig;

/// 데이터 디렉토리 경로 (`<data_local>/.osint-ingest/`)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".osint-ingest")
}

// ============================================================================
// Settings
// ============================================================================

/// 파이프라인 전체 설정
#[derive(Debug, Clone)]
pub struct Settings {
    pub discovery: DiscoveryConfig,
    pub fetch: FetchConfig,
    pub validator: ValidatorConfig,
    pub quality: QualityConfig,
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            fetch: FetchConfig::default(),
            validator: ValidatorConfig::default(),
            quality: QualityConfig::default(),
            data_dir: get_data_dir(),
        }
    }
}

impl Settings {
    /// 기본값 + 환경변수 덮어쓰기
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings
    }

    /// 조회 함수로 값을 덮어씀 (잘못된 값은 무시하고 경고)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secs) = parse_var::<u64, _>(&lookup, "OSINT_FETCH_TIMEOUT_SECS") {
            self.fetch.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var::<u32, _>(&lookup, "OSINT_FETCH_ATTEMPTS") {
            self.fetch.max_attempts = n.max(1);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "OSINT_VALIDATE_TIMEOUT_SECS") {
            self.validator.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var(&lookup, "OSINT_TARGET_VALIDATED") {
            self.discovery.target_validated = n;
        }
        if let Some(n) = parse_var(&lookup, "OSINT_MIN_VALIDATED") {
            self.discovery.min_validated = n;
        }
        if let Some(n) = parse_var(&lookup, "OSINT_MIN_CHARS") {
            self.quality.min_chars = n;
        }
        if let Some(n) = parse_var(&lookup, "OSINT_MIN_WORDS") {
            self.quality.min_words = n;
        }
        if let Some(dir) = lookup("OSINT_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }

        // 목표치가 최소치보다 작으면 항상 폴백되므로 맞춰줌
        if self.discovery.target_validated < self.discovery.min_validated {
            tracing::warn!(
                "OSINT_TARGET_VALIDATED ({}) below OSINT_MIN_VALIDATED ({}), raising target",
                self.discovery.target_validated,
                self.discovery.min_validated
            );
            self.discovery.target_validated = self.discovery.min_validated;
        }
    }

    /// SQLite 저장소 경로
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("records.db")
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

// ============================================================================
// API Key Management
// ============================================================================

const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    for var in API_KEY_VARS {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    API_KEY_VARS
        .iter()
        .any(|var| std::env::var(var).map(|k| !k.is_empty()).unwrap_or(false))
}

// ============================================================================
// Tests
// ============================================================================
