//! URL 검증 모듈
//!
//! 수집/추출 자원을 쓰기 전에 후보 URL이 실제로 살아 있는지 확인합니다.
//! HEAD 요청을 먼저 보내고, 실패하거나 200이 아니면 GET으로 다시 확인합니다.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::fetcher::build_browser_client;

// ============================================================================
// UrlValidator Trait
// ============================================================================

/// URL 검증기 트레이트
#[async_trait]
pub trait UrlValidator: Send + Sync {
    /// 최종 응답이 HTTP 200이면 true. 실패로 끝나지 않음.
    async fn validate(&self, url: &str) -> bool;
}

// ============================================================================
// HTTP Validator
// ============================================================================

/// 검증기 설정
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// 요청별 타임아웃
    pub timeout: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

/// reqwest 기반 URL 검증기 (리다이렉트 추적)
pub struct HttpValidator {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpValidator {
    /// 새 검증기 생성
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        let client = build_browser_client(config.timeout)?;
        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    /// 타임아웃을 지정하여 검증
    pub async fn validate_with_timeout(&self, url: &str, timeout: Duration) -> bool {
        match self.client.head(url).timeout(timeout).send().await {
            Ok(resp) if resp.status().as_u16() == 200 => return true,
            Ok(resp) => {
                tracing::debug!("HEAD {} returned {}, retrying with GET", url, resp.status());
            }
            Err(e) => {
                tracing::debug!("HEAD {} failed: {}, retrying with GET", url, e);
            }
        }

        match self.client.get(url).timeout(timeout).send().await {
            Ok(resp) => {
                let ok = resp.status().as_u16() == 200;
                if !ok {
                    tracing::debug!("GET {} returned {}", url, resp.status());
                }
                ok
            }
            Err(e) => {
                tracing::debug!("GET {} failed: {}", url, e);
                false
            }
        }
    }
}

#[async_trait]
impl UrlValidator for HttpValidator {
    async fn validate(&self, url: &str) -> bool {
        self.validate_with_timeout(url, self.timeout).await
    }
}

// ============================================================================
// Tests
// ============================================================================
