//! 품질/중복 필터 모듈
//!
//! 추출된 레코드 중 분석 가치가 없는 것(너무 짧음, 실패)과
//! 이미 본 레코드(같은 본문 또는 같은 URL)를 걸러냅니다.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::extractor::ExtractedRecord;

// ============================================================================
// Quality Gate
// ============================================================================

/// 품질 기준 설정
#[derive(Debug, Clone)]
pub struct QualityConfig {
    /// 최소 본문 길이 (문자 수)
    pub min_chars: usize,
    /// 최소 단어 수 (공백 기준)
    pub min_words: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_chars: 200,
            min_words: 50,
        }
    }
}

/// 품질 필터
#[derive(Debug, Clone, Default)]
pub struct QualityFilter {
    config: QualityConfig,
}

impl QualityFilter {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// 성공 레코드이고 본문이 길이/단어 수 기준을 넘으면 true
    pub fn passes_quality(&self, record: &ExtractedRecord) -> bool {
        if !record.is_success() {
            return false;
        }

        let content = record.content.trim();
        !content.is_empty()
            && content.chars().count() >= self.config.min_chars
            && content.split_whitespace().count() >= self.config.min_words
    }
}

// ============================================================================
// Dedup
// ============================================================================

/// 이미 본 본문/URL 해시 집합
#[derive(Debug, Clone, Default)]
pub struct SeenHashes {
    hashes: HashSet<String>,
}

impl SeenHashes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
    }

    fn insert(&mut self, hash: String) {
        self.hashes.insert(hash);
    }
}

fn tagged_hash(tag: &str, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tag.as_bytes());
    hasher.update(b":");
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 본문 해시 (SHA-256, 16진수 64자)
pub fn content_hash(content: &str) -> String {
    tagged_hash("content", content)
}

/// URL 해시
pub fn url_hash(url: &str) -> String {
    tagged_hash("url", url)
}

/// 본문 또는 URL이 이미 등록되어 있으면 true (아무것도 추가하지 않음)
///
/// 처음 보는 레코드면 두 해시를 모두 등록하고 false를 반환합니다.
pub fn is_duplicate(record: &ExtractedRecord, seen: &mut SeenHashes) -> bool {
    let content = content_hash(&record.content);
    let url = url_hash(&record.url);

    if seen.contains(&content) || seen.contains(&url) {
        return true;
    }

    seen.insert(content);
    seen.insert(url);
    false
}

// ============================================================================
// Relevance
// ============================================================================

const TITLE_WEIGHT: f64 = 2.0;
const CONTENT_WEIGHT: f64 = 1.0;

/// 키워드 관련도 점수 [0, 1]
///
/// 제목 일치 가중치 2, 본문 일치 가중치 1. 키워드가 없으면 1.0.
pub fn relevance_score(record: &ExtractedRecord, keywords: &[String]) -> f64 {
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();

    if keywords.is_empty() {
        return 1.0;
    }

    let title = record.title.to_lowercase();
    let content = record.content.to_lowercase();

    let score: f64 = keywords
        .iter()
        .map(|k| {
            let mut s = 0.0;
            if title.contains(k.as_str()) {
                s += TITLE_WEIGHT;
            }
            if content.contains(k.as_str()) {
                s += CONTENT_WEIGHT;
            }
            s
        })
        .sum();

    let max = keywords.len() as f64 * (TITLE_WEIGHT + CONTENT_WEIGHT);
    (score / max).clamp(0.0, 1.0)
}

// ============================================================================
// Tests
// ============================================================================
