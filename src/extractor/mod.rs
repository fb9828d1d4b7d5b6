//! 본문 추출 모듈
//!
//! 임의의 HTML에서 기사 본문을 분리하고 제목, 작성자, 게시일,
//! Open-Graph/Twitter 카드 메타데이터를 추출합니다.
//!
//! 1. `<title>` → 첫 `<h1>` 순으로 제목 결정
//! 2. `<meta>` 태그에서 메타데이터 수집
//! 3. script/style/nav/footer 등 비본문 요소 제거
//! 4. article → main → 본문 class/id 패턴 → body 순으로 본문 영역 선택
//! 5. 문단/제목/목록 블록 중 충분히 길고 상투 문구가 아닌 것만 수집
//! 6. 수집 결과가 너무 짧으면 영역 전체 텍스트로 폴백

pub mod entities;
mod metadata;

pub use entities::{extract_entities, top_entities, Entity, EntityKind};

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::fetcher::FetchError;

// ============================================================================
// Heuristics
// ============================================================================

/// 제거할 비본문 요소
const STRIP_SELECTOR: &str = "script, style, nav, footer, header, aside, iframe, noscript, form";

/// 텍스트를 수집할 블록 요소
const BLOCK_SELECTOR: &str = "p, h1, h2, h3, h4, h5, li";
const BLOCK_TAGS: [&str; 7] = ["p", "h1", "h2", "h3", "h4", "h5", "li"];

/// 본문 영역 class/id 패턴 (부분 일치, 대소문자 무시)
const CONTENT_PATTERNS: [&str; 8] = [
    "article-body",
    "post-content",
    "entry-content",
    "story-body",
    "article-content",
    "main-content",
    "content-body",
    "post-body",
];

/// 내비게이션/상투 문구 (부분 일치, 대소문자 무시)
const BOILERPLATE_PHRASES: [&str; 12] = [
    "skip to",
    "sign in",
    "log in",
    "subscribe",
    "newsletter",
    "cookie",
    "privacy policy",
    "terms of service",
    "follow us",
    "share this",
    "read more",
    "click here",
];

/// 블록 최소 길이 (초과해야 수집)
const MIN_BLOCK_CHARS: usize = 30;

/// 블록 수집 결과가 이보다 짧으면 영역 전체 텍스트 사용
const MIN_ASSEMBLED_CHARS: usize = 200;

// ============================================================================
// Types
// ============================================================================

/// 추출 내부 에러 (외부로 전파되지 않음)
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("invalid selector `{selector}`: {message}")]
    Selector {
        selector: &'static str,
        message: String,
    },
}

/// HTML에서 추출된 콘텐츠
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedContent {
    /// 페이지 제목
    pub title: String,
    /// 본문 텍스트 (문단은 빈 줄로 구분)
    pub content: String,
    pub author: Option<String>,
    pub publish_date: Option<String>,
    /// og:* → 접두사 없는 키, twitter:* → `twitter_` 접두사 키
    pub metadata: BTreeMap<String, String>,
}

/// 레코드 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// 본문 추출 성공
    Success,
    /// HTTP 에러, 빈 응답, 추출 결과 없음
    Failed,
    /// 타임아웃, 요청 예외
    Error,
}

/// 정규화된 수집 레코드
///
/// `status == Success`이면 `content`는 비어 있지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedRecord {
    pub url: String,
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub publish_date: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub status: RecordStatus,
    pub error: Option<String>,
}

impl ExtractedRecord {
    /// 추출 결과로 레코드 생성 (본문이 비면 Failed)
    pub fn from_content(url: impl Into<String>, content: ExtractedContent) -> Self {
        let (status, error) = if content.content.trim().is_empty() {
            (RecordStatus::Failed, Some("no extractable content".to_string()))
        } else {
            (RecordStatus::Success, None)
        };

        Self {
            url: url.into(),
            title: content.title,
            content: content.content,
            author: content.author,
            publish_date: content.publish_date,
            metadata: content.metadata,
            status,
            error,
        }
    }

    /// 수집 실패로 레코드 생성
    pub fn from_fetch_error(url: impl Into<String>, error: &FetchError) -> Self {
        let status = match error {
            FetchError::Http(_) | FetchError::EmptyResponse => RecordStatus::Failed,
            FetchError::Timeout | FetchError::Connect(_) | FetchError::Request(_) => {
                RecordStatus::Error
            }
        };

        Self {
            url: url.into(),
            title: String::new(),
            content: String::new(),
            author: None,
            publish_date: None,
            metadata: BTreeMap::new(),
            status,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }
}

// ============================================================================
// Content Extractor
// ============================================================================

/// HTML 본문 추출기 (상태 없음)
#[derive(Debug, Clone, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// HTML에서 콘텐츠 추출
    ///
    /// 실패하지 않습니다. 내부 에러 시 빈 결과를 반환합니다.
    pub fn extract(&self, html: &str, url: &str) -> ExtractedContent {
        match self.try_extract(html) {
            Ok(content) => {
                tracing::debug!(
                    "Extracted {} chars from {} (title: {:?})",
                    content.content.len(),
                    url,
                    content.title
                );
                content
            }
            Err(e) => {
                tracing::warn!("Extraction failed for {}: {}", url, e);
                ExtractedContent::default()
            }
        }
    }

    fn try_extract(&self, html: &str) -> Result<ExtractedContent, ExtractError> {
        let mut document = Html::parse_document(html);

        // 제목/메타데이터는 header 제거 전에 수집
        let title = extract_title(&document)?.unwrap_or_default();
        let page_meta = metadata::harvest(&document)?;

        strip_non_content(&mut document)?;

        let region = find_content_region(&document)?;
        let content = collect_content(region)?;

        Ok(ExtractedContent {
            title,
            content,
            author: page_meta.author,
            publish_date: page_meta.published,
            metadata: page_meta.fields,
        })
    }
}

pub(crate) fn selector(s: &'static str) -> Result<Selector, ExtractError> {
    Selector::parse(s).map_err(|e| ExtractError::Selector {
        selector: s,
        message: format!("{:?}", e),
    })
}

/// 제목 추출: `<title>` → 첫 `<h1>`
fn extract_title(document: &Html) -> Result<Option<String>, ExtractError> {
    let root = document.root_element();

    for selector_str in ["title", "h1"] {
        let sel = selector(selector_str)?;
        if let Some(element) = root.select(&sel).next() {
            let title = collapse_spaces(&element.text().collect::<String>());
            if !title.is_empty() {
                return Ok(Some(title));
            }
        }
    }

    Ok(None)
}

/// 비본문 요소를 트리에서 분리
fn strip_non_content(document: &mut Html) -> Result<(), ExtractError> {
    let sel = selector(STRIP_SELECTOR)?;
    let ids: Vec<_> = document
        .root_element()
        .select(&sel)
        .map(|element| element.id())
        .collect();

    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    Ok(())
}

/// 본문 영역 선택
///
/// 분리된 노드는 루트에서 도달할 수 없으므로 항상 루트 기준으로 탐색합니다.
fn find_content_region(document: &Html) -> Result<ElementRef<'_>, ExtractError> {
    let root = document.root_element();

    for semantic in ["article", "main"] {
        let sel = selector(semantic)?;
        if let Some(element) = root.select(&sel).next() {
            return Ok(element);
        }
    }

    let attributed = selector("[class], [id]")?;
    if let Some(element) = root.select(&attributed).find(|el| matches_content_pattern(el)) {
        return Ok(element);
    }

    let body = selector("body")?;
    Ok(root.select(&body).next().unwrap_or(root))
}

fn matches_content_pattern(element: &ElementRef) -> bool {
    let value = element.value();
    [value.attr("class"), value.id()]
        .into_iter()
        .flatten()
        .map(|attr| attr.to_lowercase())
        .any(|attr| CONTENT_PATTERNS.iter().any(|p| attr.contains(p)))
}

/// 영역에서 본문 텍스트 조립
fn collect_content(region: ElementRef) -> Result<String, ExtractError> {
    let sel = selector(BLOCK_SELECTOR)?;
    let mut blocks = Vec::new();

    for element in region.select(&sel) {
        // 중첩 블록(li 안의 p 등)은 바깥 블록에 포함됨
        if has_block_ancestor(element, region) {
            continue;
        }

        let text = collapse_spaces(&element.text().collect::<String>());
        if text.chars().count() > MIN_BLOCK_CHARS && !is_boilerplate(&text) {
            blocks.push(text);
        }
    }

    let assembled = blocks.join("\n\n");
    let content = if assembled.chars().count() < MIN_ASSEMBLED_CHARS {
        region_text(region)
    } else {
        assembled
    };

    Ok(normalize_whitespace(&content))
}

fn has_block_ancestor(element: ElementRef, region: ElementRef) -> bool {
    for node in element.ancestors() {
        if node.id() == region.id() {
            break;
        }
        if let Some(el) = node.value().as_element() {
            if BLOCK_TAGS.contains(&el.name()) {
                return true;
            }
        }
    }
    false
}

/// 상투 문구 포함 여부
pub fn is_boilerplate(text: &str) -> bool {
    let lower = text.to_lowercase();
    BOILERPLATE_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// 영역 전체 텍스트 (텍스트 노드를 공백으로 연결)
fn region_text(region: ElementRef) -> String {
    let mut text = String::new();

    for node in region.text() {
        let trimmed = node.trim();
        if !trimmed.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }

    text
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 공백 정규화 (문단 구분은 유지)
pub fn normalize_whitespace(text: &str) -> String {
    text.split("\n\n")
        .map(collapse_spaces)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ============================================================================
// Tests
// ============================================================================
