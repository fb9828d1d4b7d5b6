//! `<meta>` 태그 수집

use std::collections::BTreeMap;

use scraper::Html;

use super::{selector, ExtractError};

/// 페이지 메타데이터
#[derive(Debug, Default)]
pub(super) struct PageMeta {
    pub author: Option<String>,
    pub published: Option<String>,
    pub fields: BTreeMap<String, String>,
}

const AUTHOR_KEYS: [&str; 2] = ["author", "article:author"];
const PUBLISHED_KEYS: [&str; 2] = ["article:published_time", "publish_date"];

/// 문서의 모든 `<meta>` 태그에서 메타데이터 수집
///
/// 같은 키가 여러 번 나오면 먼저 나온 값을 사용합니다.
pub(super) fn harvest(document: &Html) -> Result<PageMeta, ExtractError> {
    let sel = selector("meta")?;
    let mut meta = PageMeta::default();

    for element in document.root_element().select(&sel) {
        let attrs = element.value();
        let Some(key) = attrs.attr("property").or_else(|| attrs.attr("name")) else {
            continue;
        };
        let Some(value) = attrs.attr("content").map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        let key = key.trim().to_lowercase();

        if let Some(field) = key.strip_prefix("og:") {
            meta.fields
                .entry(field.to_string())
                .or_insert_with(|| value.to_string());
        } else if let Some(field) = key.strip_prefix("twitter:") {
            meta.fields
                .entry(format!("twitter_{}", field))
                .or_insert_with(|| value.to_string());
        }

        if meta.author.is_none() && AUTHOR_KEYS.contains(&key.as_str()) {
            meta.author = Some(value.to_string());
        }
        if meta.published.is_none() && PUBLISHED_KEYS.contains(&key.as_str()) {
            meta.published = Some(value.to_string());
        }
    }

    Ok(meta)
}
