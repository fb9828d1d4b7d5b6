//! 요약 모듈 - Gemini API를 통한 수집 레코드 요약
//!
//! 레코드별 요약과 여러 요약을 묶은 종합 보고서를 생성합니다.
//! 실패는 에러가 아니라 `"Error generating summary: ..."` 형태의 문자열로 돌려줍니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let summarizer = GeminiSummarizer::from_env()?;
//! let summary = summarizer.summarize(&record.content).await;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::get_api_key;

// ============================================================================
// Summarizer Trait
// ============================================================================

/// 요약기 트레이트
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// 단일 텍스트 요약
    async fn summarize(&self, text: &str) -> String;

    /// 여러 요약을 주제 기준으로 종합
    async fn synthesize(&self, summaries: &[String], topic: &str) -> String;

    /// 요약기 이름
    fn name(&self) -> &str;
}

/// 요약 실패 문자열 접두사
pub const SUMMARY_ERROR_PREFIX: &str = "Error generating summary";

/// 요약기가 돌려준 문자열이 실패 표시인지
pub fn is_error_text(text: &str) -> bool {
    text.starts_with(SUMMARY_ERROR_PREFIX)
}

fn error_text(err: impl std::fmt::Display) -> String {
    format!("{}: {}", SUMMARY_ERROR_PREFIX, err)
}

// ============================================================================
// Configuration
// ============================================================================

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// 요약 입력 최대 문자 수
pub const MAX_INPUT_CHARS: usize = 15_000;

/// 요약기 설정
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub api_base: String,
    pub model: String,
    /// 윈도우당 최대 요청 수 (Gemini 무료 티어: 15 RPM)
    pub requests_per_window: u32,
    pub window: Duration,
    /// 호출 간 최소 딜레이
    pub min_delay: Duration,
    /// 429/전송 실패 시 최대 재시도 횟수
    pub max_retries: u32,
    /// 재시도 초기 백오프 (지수 증가)
    pub initial_backoff: Duration,
    pub max_input_chars: usize,
    pub timeout: Duration,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_base: GEMINI_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            requests_per_window: 15,
            window: Duration::from_secs(60),
            min_delay: Duration::from_millis(4000),
            max_retries: 3,
            initial_backoff: Duration::from_millis(2000),
            max_input_chars: MAX_INPUT_CHARS,
            timeout: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// Rate Limiter
// ============================================================================

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration, min_delay: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay,
            last_request: None,
        }
    }

    /// 요청 가능할 때까지 대기
    async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

// ============================================================================
// Gemini Summarizer
// ============================================================================

/// Gemini generateContent 기반 요약기
#[derive(Debug)]
pub struct GeminiSummarizer {
    api_key: String,
    client: reqwest::Client,
    config: SummarizerConfig,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// generateContent 요청 본문
#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// generateContent 응답
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

impl GeminiSummarizer {
    /// API 키와 설정으로 생성
    pub fn new(api_key: String, config: SummarizerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            config.requests_per_window,
            config.window,
            config.min_delay,
        )));

        Ok(Self {
            api_key,
            client,
            config,
            rate_limiter,
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    ///
    /// 우선순위: GEMINI_API_KEY > GOOGLE_AI_API_KEY
    pub fn from_env() -> Result<Self> {
        let api_key = get_api_key()?;
        Self::new(api_key, SummarizerConfig::default())
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }

    /// 프롬프트로 텍스트 생성 (429/전송 실패 시 지수 백오프 재시도)
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };
        let endpoint = self.endpoint();
        let max_retries = self.config.max_retries;

        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=max_retries {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            let backoff = self.config.initial_backoff * 2u32.pow(attempt);

            // API 키는 URL이 아닌 헤더로 전송
            let response = match self
                .client
                .post(&endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Failed to send request: {}", e));
                    if attempt < max_retries {
                        tracing::warn!(
                            "Request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            max_retries
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status.is_success() {
                return parse_generated_text(&body);
            }

            if status.as_u16() == 429 {
                tracing::warn!(
                    "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    max_retries
                );
                last_error = Some(anyhow::anyhow!("Rate limit exceeded (429)"));

                if attempt < max_retries {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
                    anyhow::bail!(
                        "Gemini API error ({}): {}",
                        error.error.status,
                        error.error.message
                    );
                }
                anyhow::bail!("Gemini API error ({}): {}", status, body);
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Generation failed after {} retries", max_retries)))
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return error_text("no content to summarize");
        }

        let input = truncate_chars(text, self.config.max_input_chars);
        match self.generate(&summary_prompt(input)).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("Summary failed: {:#}", e);
                error_text(e)
            }
        }
    }

    async fn synthesize(&self, summaries: &[String], topic: &str) -> String {
        let usable: Vec<&str> = summaries
            .iter()
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty() && !is_error_text(s))
            .collect();

        if usable.is_empty() {
            return error_text("no summaries to synthesize");
        }

        let prompt = synthesis_prompt(&usable, topic);
        let prompt = truncate_chars(&prompt, self.config.max_input_chars);
        match self.generate(prompt).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("Synthesis failed: {:#}", e);
                error_text(e)
            }
        }
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// Prompts & Parsing
// ============================================================================

fn summary_prompt(text: &str) -> String {
    format!(
        "You are an open-source intelligence analyst. Summarize the following article \
         in 3-5 sentences. Keep names, dates, places and figures exact. \
         Do not add information that is not in the text.\n\n---\n{}",
        text
    )
}

fn synthesis_prompt(summaries: &[&str], topic: &str) -> String {
    let mut prompt = format!(
        "You are an open-source intelligence analyst. Write a short executive briefing on \
         \"{}\" based only on the source summaries below. Note where sources agree or \
         conflict.\n",
        topic.trim()
    );
    for (i, summary) in summaries.iter().enumerate() {
        prompt.push_str(&format!("\n[Source {}]\n{}\n", i + 1, summary.trim()));
    }
    prompt
}

/// 첫 번째 후보의 텍스트 파트를 이어 붙임
fn parse_generated_text(body: &str) -> Result<String> {
    let response: GenerateResponse =
        serde_json::from_str(body).context("Failed to parse generateContent response")?;

    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        anyhow::bail!("Gemini returned no text");
    }
    Ok(text.to_string())
}

/// 문자 경계를 지키며 앞에서부터 최대 `max_chars`자
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::test_support::{Reply, TestServer};

    const OK_BODY: &str =
        r#"{"candidates":[{"content":{"parts":[{"text":"Convoy left "},{"text":"at dawn."}]}}]}"#;

    fn summarizer(base: &str) -> GeminiSummarizer {
        GeminiSummarizer::new(
            "fake_key".to_string(),
            SummarizerConfig {
                api_base: base.to_string(),
                min_delay: Duration::ZERO,
                max_retries: 2,
                initial_backoff: Duration::from_millis(10),
                timeout: Duration::from_secs(5),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("한국어입니다", 2), "한국");
    }

    #[test]
    fn test_parse_generated_text() {
        assert_eq!(parse_generated_text(OK_BODY).unwrap(), "Convoy left at dawn.");
        assert!(parse_generated_text(r#"{"candidates":[]}"#).is_err());
        assert!(parse_generated_text("not json").is_err());
    }

    #[test]
    fn test_synthesis_prompt_lists_sources() {
        let prompt = synthesis_prompt(&["first", "second"], " port strike ");
        assert!(prompt.contains("\"port strike\""));
        assert!(prompt.contains("[Source 1]\nfirst"));
        assert!(prompt.contains("[Source 2]\nsecond"));
    }

    #[test]
    fn test_is_error_text() {
        assert!(is_error_text(&error_text("boom")));
        assert!(!is_error_text("A normal summary."));
    }

    #[tokio::test]
    async fn test_summarize_success() {
        let server = TestServer::start(|_, _| Reply::ok(OK_BODY)).await;
        let s = summarizer(&server.base_url);

        assert_eq!(s.summarize("Some article text").await, "Convoy left at dawn.");
        assert_eq!(
            server.method_hits("POST", "/models/gemini-2.0-flash:generateContent"),
            1
        );
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let server = TestServer::start(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Reply::status(429, "")
            } else {
                Reply::ok(OK_BODY)
            }
        })
        .await;

        let summary = summarizer(&server.base_url).summarize("text").await;
        assert_eq!(summary, "Convoy left at dawn.");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_api_error_becomes_error_text() {
        let server = TestServer::start(|_, _| {
            Reply::status(
                400,
                r#"{"error":{"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#,
            )
        })
        .await;

        let summary = summarizer(&server.base_url).summarize("text").await;
        assert!(is_error_text(&summary));
        assert!(summary.contains("API key not valid"));
        // 429가 아닌 에러는 재시도하지 않음
        assert_eq!(server.hit_count("/models/gemini-2.0-flash:generateContent"), 1);
    }

    #[tokio::test]
    async fn test_persistent_rate_limit_gives_up() {
        let server = TestServer::start(|_, _| Reply::status(429, "")).await;

        let summary = summarizer(&server.base_url).summarize("text").await;
        assert!(summary.contains("429"));
        assert_eq!(server.hit_count("/models/gemini-2.0-flash:generateContent"), 3);
    }

    #[tokio::test]
    async fn test_empty_inputs_skip_request() {
        let s = summarizer("http://127.0.0.1:9");
        assert!(is_error_text(&s.summarize("   ").await));
        assert!(is_error_text(
            &s.synthesize(&[error_text("x"), String::new()], "topic").await
        ));
    }
}
