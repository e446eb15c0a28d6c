use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::dates::{find_date, normalize_date};
use crate::record::QuestionRecord;
use crate::text::{clean, join_list, uniq};

/// Path prefix that identifies a question detail link.
pub const QUESTION_PATH: &str = "/questions/";

/// Lowercased needles whose presence in the page text means the site is
/// refusing to serve content.
const BLOCK_INDICATORS: &[&str] = &["captcha", "blocked", "rate limit", "too many requests"];

fn selectors(css: &[&str]) -> Vec<Selector> {
    css.iter()
        .map(|s| Selector::parse(s).expect("Invalid selector"))
        .collect()
}

static TITLE_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&["h3", "h4", r#"[class*="title"]"#, r#"[class*="question"]"#])
});

static TAG_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        r#"[class*="tag"]"#,
        r#"[class*="category"]"#,
        r#"[class*="topic"]"#,
        r#"[class*="label"]"#,
        r#"[class*="badge"]"#,
        r#"[data-testid*="tag"]"#,
        r#"[data-testid*="category"]"#,
        r#"a[href*="type="]"#,
        r#"a[href*="category="]"#,
        r#"a[href*="tag="]"#,
        r#"span[class*="tag"]"#,
        r#"div[class*="tag"]"#,
    ])
});

static ANSWER_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        r#"[class*="answer"]"#,
        r#"[class*="response"]"#,
        r#"[class*="reply"]"#,
        r#"[class*="comment"]"#,
        r#"[id*="answer"]"#,
        r#"[data-testid*="answer"]"#,
        r#"[data-testid*="response"]"#,
    ])
});

static CARD_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        r#"[class*="question"]"#,
        r#"[class*="card"]"#,
        "article",
        "li",
        ".question-item",
        ".question-card",
    ])
});

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static TIME_EL: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static DETAIL_LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="/questions/"]"#).unwrap());
static COMPANY_LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="?company="]"#).unwrap());
static COMPANY_BADGES: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[class*="company"]"#).unwrap());

/// Ordered answer-count phrasings; within the first family that matches,
/// the count is the maximum across all its matches.
static ANSWER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\b(\d+)\s+(?:answers?|repl(?:y|ies)|responses?)\b").unwrap(),
        Regex::new(r"(?i)\b(?:answers?|repl(?:y|ies)|responses?)\s*[:\-]?\s*(\d+)").unwrap(),
    ]
});

static KNOWN_COMPANIES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(Google|Facebook|Meta|Amazon|Apple|Microsoft|Netflix|Uber|Airbnb|Twitter",
        r"|LinkedIn|Salesforce|Adobe|Oracle|IBM|Intel|NVIDIA|AMD|Tesla|SpaceX|Stripe",
        r"|Square|Palantir|Databricks|Snowflake|MongoDB|Atlassian|Slack|Zoom|Discord",
        r"|TikTok|ByteDance|Alibaba|Tencent|Baidu)\b",
    ))
    .unwrap()
});

fn flatten_text(el: ElementRef) -> String {
    clean(&el.text().collect::<Vec<_>>().join(" "))
}

/// Detects blocking or CAPTCHA interstitials from the page text.
pub fn page_blocked(doc: &Html) -> bool {
    let text = flatten_text(doc.root_element()).to_lowercase();
    BLOCK_INDICATORS.iter().any(|needle| text.contains(needle))
}

fn extract_answer_count(scope: ElementRef, text: &str) -> u64 {
    for pattern in ANSWER_PATTERNS.iter() {
        let max = pattern
            .captures_iter(text)
            .filter_map(|caps| caps[1].parse::<u64>().ok())
            .max();
        if let Some(max) = max {
            return max;
        }
    }
    // No phrasing matched, fall back to counting answer-like elements.
    ANSWER_SELECTORS
        .iter()
        .map(|sel| scope.select(sel).count() as u64)
        .sum()
}

fn first_nonempty(scope: ElementRef, chain: &[Selector]) -> Option<String> {
    chain
        .iter()
        .filter_map(|sel| scope.select(sel).next())
        .map(flatten_text)
        .find(|t| !t.is_empty())
}

/// Extracts one partial question record from a card-like DOM scope.
pub fn extract_card(scope: ElementRef, base: &Url) -> QuestionRecord {
    let text = flatten_text(scope);

    let question_text = first_nonempty(scope, &TITLE_SELECTORS)
        .or_else(|| scope.select(&ANCHOR).next().map(flatten_text))
        .unwrap_or_default();

    let mut tags = vec![];
    for sel in TAG_SELECTORS.iter() {
        tags.extend(scope.select(sel).map(flatten_text));
    }
    let tags: Vec<String> = uniq(tags)
        .into_iter()
        .filter(|tag| (1..50).contains(&tag.chars().count()))
        .collect();

    let mut companies: Vec<String> = scope.select(&COMPANY_LINKS).map(flatten_text).collect();
    companies.extend(scope.select(&COMPANY_BADGES).map(flatten_text));
    companies.extend(KNOWN_COMPANIES.find_iter(&text).map(|m| m.as_str().to_string()));
    let companies: Vec<String> = uniq(companies)
        .into_iter()
        .filter(|name| (2..100).contains(&name.chars().count()))
        .collect();

    let answer_count = extract_answer_count(scope, &text);

    let mut asked_when = String::new();
    if let Some(time) = scope.select(&TIME_EL).next() {
        let raw = time
            .value()
            .attr("datetime")
            .map(str::to_string)
            .unwrap_or_else(|| flatten_text(time));
        asked_when = normalize_date(&raw);
    }
    if asked_when.is_empty() {
        asked_when = find_date(&text).map(normalize_date).unwrap_or_default();
    }

    let show_page_link = scope
        .select(&DETAIL_LINKS)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| base.join(href).ok())
        .map(String::from)
        .unwrap_or_default();

    QuestionRecord {
        question_text,
        company_names: join_list(&companies),
        asked_when,
        tags: join_list(&tags),
        answer_count,
        show_page_link,
    }
}

/// Extracts every candidate question card from an index page, in
/// document order. Assumes the caller already ran [`page_blocked`].
pub fn parse_index_page(doc: &Html, base: &Url) -> Vec<QuestionRecord> {
    let root = doc.root_element();
    let mut cards: Vec<ElementRef> = vec![];
    for sel in CARD_SELECTORS.iter() {
        cards = root.select(sel).collect();
        if !cards.is_empty() {
            break;
        }
    }
    if cards.is_empty() {
        // Last resort: anchor on detail links and climb to their cards.
        cards = root
            .select(&DETAIL_LINKS)
            .map(nearest_container)
            .collect();
    }
    cards
        .into_iter()
        .map(|scope| extract_card(scope, base))
        .filter(QuestionRecord::is_identified)
        .collect()
}

/// Walks up from a detail link to the closest container-like ancestor.
fn nearest_container(link: ElementRef) -> ElementRef {
    let mut node = link.parent();
    let mut fallback = None;
    while let Some(n) = node {
        if let Some(el) = ElementRef::wrap(n) {
            if fallback.is_none() {
                fallback = Some(el);
            }
            if matches!(el.value().name(), "div" | "li" | "article") {
                return el;
            }
        }
        node = n.parent();
    }
    fallback.unwrap_or(link)
}
