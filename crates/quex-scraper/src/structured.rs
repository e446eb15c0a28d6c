use std::collections::HashMap;

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use url::Url;

use crate::dates::normalize_date;
use crate::dom::QUESTION_PATH;
use crate::record::{slug_from_url, QuestionRecord};
use crate::text::{join_list, split_list, uniq};

/// Key aliases checked on candidate objects, in priority order.
const IDENTITY_KEYS: &[&str] = &["id", "questionId", "slug"];
const CONTENT_KEYS: &[&str] = &["title", "question", "name", "content"];
const LINK_KEYS: &[&str] = &["href", "url"];
const TAG_LIST_KEYS: &[&str] = &["tags", "categories", "topics", "labels"];
const TAG_SCALAR_KEYS: &[&str] = &["tag", "category", "topic"];
const COMPANY_LIST_KEYS: &[&str] = &["companies"];
const COMPANY_SCALAR_KEYS: &[&str] = &["company"];
const ANSWER_COUNT_KEYS: &[&str] = &[
    "answersCount",
    "answerCount",
    "numAnswers",
    "answers_count",
    "answer_count",
    "totalAnswers",
    "total_answers",
];
const DATE_KEYS: &[&str] = &[
    "createdAt",
    "publishedAt",
    "date",
    "updatedAt",
    "created_at",
    "published_at",
    "updated_at",
];

static EMBEDDED_DATA: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script#__NEXT_DATA__").unwrap());

/// Parses the page's embedded structured-data blob, if any.
pub fn parse_embedded_json(doc: &Html) -> Option<Value> {
    let script = doc.select(&EMBEDDED_DATA).next()?;
    let json = script.text().collect::<String>();
    serde_json::from_str(json.trim()).ok()
}

/// Walks an arbitrary JSON tree and accumulates question-like objects
/// into a map keyed by slug. Sightings of the same slug at different
/// depths enrich a single entry.
pub fn collect_questions(root: &Value, base: &Url) -> HashMap<String, QuestionRecord> {
    let mut found = HashMap::new();
    visit(root, base, &mut found);
    log::debug!("Structured data yielded {} entries", found.len());
    found
}

fn visit(node: &Value, base: &Url, found: &mut HashMap<String, QuestionRecord>) {
    match node {
        Value::Array(items) => items.iter().for_each(|item| visit(item, base, found)),
        Value::Object(map) => {
            if let Some(url) = classify(map, base) {
                if let Some(slug) = slug_from_url(&url) {
                    let entry = found.entry(slug).or_insert_with(|| QuestionRecord {
                        show_page_link: url.clone(),
                        ..Default::default()
                    });
                    absorb(entry, map);
                }
            }
            map.values().for_each(|child| visit(child, base, found));
        }
        _ => (),
    }
}

/// Decides whether an object looks like a question and, when it does,
/// returns the absolute URL of its detail page. Requires some identity
/// (an id-like key or a question-path link) plus some content key.
fn classify(map: &Map<String, Value>, base: &Url) -> Option<String> {
    let has_identity = IDENTITY_KEYS.iter().any(|key| map.contains_key(*key));
    let has_path = LINK_KEYS.iter().any(|key| {
        matches!(map.get(*key), Some(Value::String(s)) if s.contains(QUESTION_PATH))
    });
    let has_content = CONTENT_KEYS.iter().any(|key| map.contains_key(*key));
    if !(has_identity || has_path) || !has_content {
        return None;
    }

    let href = LINK_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(String::from)
        .or_else(|| {
            map.get("slug")
                .and_then(Value::as_str)
                .map(|slug| format!("{QUESTION_PATH}{slug}"))
        })?;
    if !href.contains(QUESTION_PATH) {
        return None;
    }
    if href.starts_with("http") {
        Some(href)
    } else {
        base.join(&href).ok().map(String::from)
    }
}

fn absorb(entry: &mut QuestionRecord, map: &Map<String, Value>) {
    if entry.question_text.is_empty() {
        if let Some(text) = CONTENT_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
        {
            entry.question_text = text.trim().to_string();
        }
    }

    // Tags and companies accumulate across sightings.
    let mut tags = split_list(&entry.tags);
    for key in TAG_LIST_KEYS {
        push_strings(map.get(*key), &mut tags);
    }
    for key in TAG_SCALAR_KEYS {
        if let Some(tag) = map.get(*key).and_then(Value::as_str) {
            tags.push(tag.to_string());
        }
    }
    entry.tags = join_list(&uniq(tags));

    let mut companies = split_list(&entry.company_names);
    for key in COMPANY_LIST_KEYS {
        push_strings(map.get(*key), &mut companies);
    }
    for key in COMPANY_SCALAR_KEYS {
        if let Some(company) = map.get(*key).and_then(Value::as_str) {
            companies.push(company.to_string());
        }
    }
    entry.company_names = join_list(&uniq(companies));

    for key in ANSWER_COUNT_KEYS {
        if let Some(count) = map.get(*key).and_then(as_count) {
            if count > 0 {
                entry.answer_count = entry.answer_count.max(count);
                break;
            }
        }
    }
    if let Some(Value::Array(answers)) = map.get("answers") {
        entry.answer_count = entry.answer_count.max(answers.len() as u64);
    }

    if entry.asked_when.is_empty() {
        for key in DATE_KEYS {
            if let Some(raw) = map.get(*key).and_then(Value::as_str) {
                let date = normalize_date(raw);
                if !date.is_empty() {
                    entry.asked_when = date;
                    break;
                }
            }
        }
    }
}

fn as_count(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn push_strings(value: Option<&Value>, out: &mut Vec<String>) {
    if let Some(Value::Array(items)) = value {
        out.extend(items.iter().filter_map(Value::as_str).map(String::from));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Url {
        Url::parse("https://example.com").unwrap()
    }

    #[test]
    fn test_classify_needs_identity_and_content() {
        let found = collect_questions(&json!({"title": "orphan"}), &base());
        assert!(found.is_empty());
        let found = collect_questions(&json!({"slug": "abc"}), &base());
        assert!(found.is_empty());
        let found = collect_questions(&json!({"slug": "abc", "title": "ok"}), &base());
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_nested_discovery() {
        let blob = json!({
            "props": { "pageProps": { "data": { "questions": [
                { "slug": "lru-cache", "title": "Design an LRU cache",
                  "tags": ["caching"], "answersCount": 4 }
            ]}}}
        });
        let found = collect_questions(&blob, &base());
        let rec = &found["lru-cache"];
        assert_eq!(rec.question_text, "Design an LRU cache");
        assert_eq!(rec.tags, "caching");
        assert_eq!(rec.answer_count, 4);
        assert_eq!(rec.show_page_link, "https://example.com/questions/lru-cache");
    }

    #[test]
    fn test_same_slug_accumulates() {
        let blob = json!([
            { "slug": "abc", "title": "T", "tags": ["a"], "answerCount": 2 },
            { "href": "/questions/abc", "question": "ignored, first title wins",
              "topics": ["b"], "company": "Stripe", "numAnswers": 5 }
        ]);
        let found = collect_questions(&blob, &base());
        assert_eq!(found.len(), 1);
        let rec = &found["abc"];
        assert_eq!(rec.question_text, "T");
        assert_eq!(rec.tags, "a, b");
        assert_eq!(rec.company_names, "Stripe");
        assert_eq!(rec.answer_count, 5);
    }

    #[test]
    fn test_answers_array_length() {
        let blob = json!({ "slug": "abc", "title": "T", "answers": [{}, {}, {}] });
        let found = collect_questions(&blob, &base());
        assert_eq!(found["abc"].answer_count, 3);
    }

    #[test]
    fn test_date_aliases() {
        let blob = json!({ "slug": "abc", "title": "T", "created_at": "2024-01-05T10:00:00Z" });
        let found = collect_questions(&blob, &base());
        assert_eq!(found["abc"].asked_when, "05/01/2024");
    }

    #[test]
    fn test_absolute_href_kept() {
        let blob = json!({
            "id": 7, "title": "T",
            "url": "https://example.com/questions/from-url?utm=x"
        });
        let found = collect_questions(&blob, &base());
        let rec = &found["from-url"];
        assert_eq!(rec.show_page_link, "https://example.com/questions/from-url?utm=x");
    }

    #[test]
    fn test_embedded_script_parsing() {
        let doc = Html::parse_document(concat!(
            r#"<html><body><script id="__NEXT_DATA__" type="application/json">"#,
            r#"{"props":{"q":{"slug":"abc","title":"T"}}}"#,
            "</script></body></html>",
        ));
        let blob = parse_embedded_json(&doc).unwrap();
        let found = collect_questions(&blob, &base());
        assert_eq!(found["abc"].question_text, "T");

        let doc = Html::parse_document("<html><body></body></html>");
        assert!(parse_embedded_json(&doc).is_none());
    }
}
