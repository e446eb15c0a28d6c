use quex_scraper::dom::{page_blocked, parse_index_page};
use quex_scraper::record::merge;
use quex_scraper::structured::{collect_questions, parse_embedded_json};
use scraper::Html;
use url::Url;

fn base() -> Url {
    Url::parse("https://example.com").unwrap()
}

#[test]
fn index_page_with_complete_card() {
    let doc = Html::parse_document(
        r#"<html><body>
          <article class="question-card">
            <h3>What is a hash table?</h3>
            <a href="/questions/what-is-a-hash-table/answers">View answers</a>
            <span class="meta">3 answers</span>
            <time datetime="2024-01-05">Jan 5, 2024</time>
          </article>
        </body></html>"#,
    );
    assert!(!page_blocked(&doc));
    let records = parse_index_page(&doc, &base());
    assert_eq!(records.len(), 1);
    let rec = &records[0];
    assert_eq!(rec.question_text, "What is a hash table?");
    assert_eq!(rec.answer_count, 3);
    assert_eq!(rec.asked_when, "05/01/2024");
    assert_eq!(
        rec.show_page_link,
        "https://example.com/questions/what-is-a-hash-table/answers"
    );
    assert_eq!(rec.slug().as_deref(), Some("what-is-a-hash-table"));
}

#[test]
fn index_card_enriched_from_embedded_data() {
    let doc = Html::parse_document(concat!(
        r##"<html><body>
          <div class="question-item">
            <h3>Design a URL shortener</h3>
            <a href="/questions/design-a-url-shortener">Open</a>
          </div>
          <script id="__NEXT_DATA__" type="application/json">"##,
        r#"{"props":{"pageProps":{"questions":[
            {"slug":"design-a-url-shortener","title":"Design a URL shortener",
             "tags":["system-design"],"answersCount":4,
             "createdAt":"2023-11-20T08:00:00Z"}]}}}"#,
        "</script></body></html>",
    ));
    let mut records = parse_index_page(&doc, &base());
    assert_eq!(records.len(), 1);

    let blob = parse_embedded_json(&doc).unwrap();
    let by_slug = collect_questions(&blob, &base());
    let rec = records.remove(0);
    let extra = rec.slug().and_then(|slug| by_slug.get(&slug).cloned());
    let merged = merge(&rec, extra.as_ref());

    assert_eq!(merged.question_text, "Design a URL shortener");
    assert_eq!(merged.tags, "system-design");
    assert_eq!(merged.answer_count, 4);
    assert_eq!(merged.asked_when, "20/11/2023");
    assert_eq!(
        merged.show_page_link,
        "https://example.com/questions/design-a-url-shortener"
    );
}

#[test]
fn dom_fields_win_over_embedded_data() {
    let doc = Html::parse_document(concat!(
        r##"<html><body>
          <div class="question-item">
            <h3>Reverse a linked list</h3>
            <span class="tag">linked-lists</span>
            <span>7 answers</span>
            <a href="/questions/reverse-a-linked-list">Open</a>
          </div>
          <script id="__NEXT_DATA__" type="application/json">"##,
        r#"{"q":{"slug":"reverse-a-linked-list","title":"A different title",
             "tags":["algorithms"],"answerCount":2}}"#,
        "</script></body></html>",
    ));
    let records = parse_index_page(&doc, &base());
    let blob = parse_embedded_json(&doc).unwrap();
    let by_slug = collect_questions(&blob, &base());
    let rec = &records[0];
    let extra = rec.slug().and_then(|slug| by_slug.get(&slug).cloned());
    let merged = merge(rec, extra.as_ref());

    assert_eq!(merged.question_text, "Reverse a linked list");
    assert_eq!(merged.tags, "linked-lists");
    assert_eq!(merged.answer_count, 7);
}

#[test]
fn blocked_page_detected_before_extraction() {
    let doc = Html::parse_document(
        r#"<html><body>
          <h1>Too many requests</h1>
          <p>Please slow down and try again later.</p>
        </body></html>"#,
    );
    assert!(page_blocked(&doc));
}

#[test]
fn malformed_embedded_json_degrades_to_dom_only() {
    let doc = Html::parse_document(
        r#"<html><body>
          <div class="question-item">
            <h3>Explain CAP theorem</h3>
            <a href="/questions/explain-cap-theorem">Open</a>
          </div>
          <script id="__NEXT_DATA__" type="application/json">{"truncated": </script>
        </body></html>"#,
    );
    assert!(parse_embedded_json(&doc).is_none());
    let records = parse_index_page(&doc, &base());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].question_text, "Explain CAP theorem");
}

#[test]
fn detail_page_enriches_base_record() {
    let base_record = quex_scraper::record::QuestionRecord {
        question_text: String::from("Design a rate limiter"),
        show_page_link: String::from("https://example.com/questions/design-a-rate-limiter"),
        ..Default::default()
    };
    let doc = Html::parse_document(concat!(
        r##"<html><body><script id="__NEXT_DATA__" type="application/json">"##,
        r#"{"props":{"question":{"slug":"design-a-rate-limiter",
             "title":"Design a rate limiter","companies":["Stripe"],
             "topics":["system-design"],"answers":[{},{}],
             "publishedAt":"2024-02-10T00:00:00Z"}}}"#,
        "</script></body></html>",
    ));
    let blob = parse_embedded_json(&doc).unwrap();
    let by_slug = collect_questions(&blob, &base());
    let extra = base_record.slug().and_then(|slug| by_slug.get(&slug).cloned());
    let merged = merge(&base_record, extra.as_ref());

    assert_eq!(merged.company_names, "Stripe");
    assert_eq!(merged.tags, "system-design");
    assert_eq!(merged.answer_count, 2);
    assert_eq!(merged.asked_when, "10/02/2024");
    assert_eq!(merged.show_page_link, base_record.show_page_link);
}
