//! 엔티티 힌트 추출
//!
//! 본문에서 CVE 식별자, URL, 대문자로 시작하는 고유명사 구를 찾아냅니다.
//! 분석가가 수집 결과를 훑어볼 때 참고하는 힌트일 뿐, 개체명 인식기는 아닙니다.

use std::collections::HashMap;

use regex::Regex;
use serde::Serialize;

/// 엔티티 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Cve,
    Url,
    Entity,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Cve => "CVE",
            EntityKind::Url => "URL",
            EntityKind::Entity => "ENTITY",
        }
    }
}

/// 엔티티 힌트
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub value: String,
}

const CVE_PATTERN: &str = r"(?i)\bCVE-\d{4}-\d{4,7}\b";
const URL_PATTERN: &str = r#"https?://[^\s<>"'()\[\]]+"#;
const PHRASE_PATTERN: &str = r"\b[A-Z][a-zA-Z]+(?:\s+(?:of\s+)?[A-Z][a-zA-Z]+)+\b";

/// 구 맨 앞에서 떼어낼 단어
const LEADING_STOPWORDS: [&str; 13] = [
    "The", "A", "An", "This", "That", "In", "On", "At", "But", "And", "For", "When", "Also",
];

/// 텍스트의 모든 엔티티 출현 (시작 위치 순)
fn scan(text: &str) -> Vec<(usize, Entity)> {
    let mut found = Vec::new();

    if let Ok(re) = Regex::new(CVE_PATTERN) {
        for m in re.find_iter(text) {
            found.push((
                m.start(),
                Entity {
                    kind: EntityKind::Cve,
                    value: m.as_str().to_uppercase(),
                },
            ));
        }
    }

    let mut url_spans = Vec::new();
    if let Ok(re) = Regex::new(URL_PATTERN) {
        for m in re.find_iter(text) {
            let value = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
            url_spans.push((m.start(), m.end()));
            found.push((
                m.start(),
                Entity {
                    kind: EntityKind::Url,
                    value: value.to_string(),
                },
            ));
        }
    }

    if let Ok(re) = Regex::new(PHRASE_PATTERN) {
        for m in re.find_iter(text) {
            // URL 내부 매치 제외
            if url_spans.iter().any(|&(s, e)| m.start() >= s && m.start() < e) {
                continue;
            }
            if let Some(phrase) = trim_phrase(m.as_str()) {
                found.push((
                    m.start(),
                    Entity {
                        kind: EntityKind::Entity,
                        value: phrase,
                    },
                ));
            }
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    found
}

/// 앞쪽 불용어 제거 후 두 단어 이상이면 반환
fn trim_phrase(phrase: &str) -> Option<String> {
    let mut words: Vec<&str> = phrase.split_whitespace().collect();
    while words
        .first()
        .is_some_and(|w| LEADING_STOPWORDS.contains(w))
    {
        words.remove(0);
    }
    if words.first() == Some(&"of") {
        return None;
    }
    (words.len() >= 2).then(|| words.join(" "))
}

/// 중복 제거된 엔티티 힌트 (처음 나온 순서)
pub fn extract_entities(text: &str) -> Vec<Entity> {
    let mut seen = std::collections::HashSet::new();
    scan(text)
        .into_iter()
        .map(|(_, entity)| entity)
        .filter(|entity| seen.insert(entity.clone()))
        .collect()
}

/// 출현 빈도 상위 N개 엔티티 (동률이면 먼저 나온 것 우선)
pub fn top_entities<'a, I>(texts: I, n: usize) -> Vec<(Entity, usize)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<Entity, (usize, usize)> = HashMap::new();
    let mut order = 0usize;

    for text in texts {
        for (_, entity) in scan(text) {
            let entry = counts.entry(entity).or_insert_with(|| {
                order += 1;
                (0, order)
            });
            entry.0 += 1;
        }
    }

    let mut ranked: Vec<(Entity, usize, usize)> = counts
        .into_iter()
        .map(|(entity, (count, first))| (entity, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(n)
        .map(|(entity, count, _)| (entity, count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_mixed_in_order() {
        let text = "Researchers at Northern Signal Labs disclosed cve-2024-3094 today. \
                    Details: https://advisories.test/xz. Northern Signal Labs will follow up.";

        let entities = extract_entities(text);
        assert_eq!(
            entities,
            vec![
                Entity {
                    kind: EntityKind::Entity,
                    value: "Northern Signal Labs".into()
                },
                Entity {
                    kind: EntityKind::Cve,
                    value: "CVE-2024-3094".into()
                },
                Entity {
                    kind: EntityKind::Url,
                    value: "https://advisories.test/xz".into()
                },
            ]
        );
    }

    #[test]
    fn test_leading_stopword_trimmed() {
        let entities = extract_entities("The Ministry of Defence issued a statement.");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].value, "Ministry of Defence");

        // 불용어를 떼면 한 단어만 남는 경우
        assert!(extract_entities("The Ministry said nothing.").is_empty());
    }

    #[test]
    fn test_top_entities_counts_across_texts() {
        let texts = [
            "Blue Harbor reported CVE-2023-1111.",
            "Blue Harbor again. Also CVE-2023-1111 and CVE-2023-2222.",
            "Blue Harbor closed.",
        ];

        let top = top_entities(texts.iter().copied(), 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0.value, "Blue Harbor");
        assert_eq!(top[0].1, 3);
        assert_eq!(top[1].0.value, "CVE-2023-1111");
        assert_eq!(top[1].1, 2);
    }

    #[test]
    fn test_no_entities() {
        assert!(extract_entities("nothing notable here, all lowercase.").is_empty());
    }
}
