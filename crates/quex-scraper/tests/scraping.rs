use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quex_crawler::{
    CountedTx, CrawlRequest, FailureRecord, Label, ScrapOutcome, Scrapable, ScrapingContext,
};
use quex_scraper::{QuestionScraper, QuestionScraperConfig};

fn out_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("quex-scraping-{}-{name}", std::process::id()))
}

// The CSV writer thread is process-wide, so the whole crawl-state walk
// lives in one test: blocked index page, index fan-out, detail persist,
// explicit failure, then the flushed files.
#[test]
fn crawl_states_drive_records_and_failures() {
    let invalid = QuestionScraperConfig {
        start_page: 7,
        end_page: 2,
        ..Default::default()
    };
    assert!(QuestionScraper::new(&invalid).is_err());

    let csv_file = out_path("questions.csv");
    let failures_file = out_path("failures.csv");
    let config = QuestionScraperConfig {
        start_page: 1,
        end_page: 1,
        csv_file: Some(csv_file.clone()),
        failures_file: Some(failures_file.clone()),
        ..Default::default()
    };
    let mut scraper = QuestionScraper::new(&config).unwrap();

    let (tx_req, mut rx_req) = tokio::sync::mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    scraper.init(CountedTx::new(tx_req, pending.clone()));

    let index_url = config.index_url(1);

    let outcome = scraper
        .scrap(
            String::from("<html><body><h1>You have been blocked</h1></body></html>"),
            ScrapingContext::with_request(CrawlRequest::index(index_url.clone(), 1)),
        )
        .unwrap();
    assert_eq!(outcome, ScrapOutcome::Blocked);
    assert!(rx_req.try_recv().is_err());

    let index_page = r#"<html><body>
        <div class="question-item">
          <h3>Design a rate limiter</h3>
          <span>3 answers</span>
          <a href="/questions/design-a-rate-limiter">Open</a>
        </div>
      </body></html>"#;
    let outcome = scraper
        .scrap(
            String::from(index_page),
            ScrapingContext::with_request(CrawlRequest::index(index_url, 1)),
        )
        .unwrap();
    assert_eq!(outcome, ScrapOutcome::Scraped(1));
    assert_eq!(pending.load(Ordering::SeqCst), 1);

    let detail = rx_req.try_recv().unwrap();
    assert_eq!(detail.label, Label::Detail);
    assert_eq!(
        detail.url,
        "https://www.tryexponent.com/questions/design-a-rate-limiter"
    );
    let base_record = detail.base.clone().unwrap();
    assert_eq!(base_record.question_text, "Design a rate limiter");
    assert_eq!(base_record.answer_count, 3);

    let detail_page = concat!(
        r#"<html><body><script id="__NEXT_DATA__" type="application/json">"#,
        r#"{"question":{"slug":"design-a-rate-limiter","title":"Design a rate limiter","#,
        r#""tags":["system-design"],"answersCount":5}}"#,
        "</script></body></html>",
    );
    let outcome = scraper
        .scrap(
            String::from(detail_page),
            ScrapingContext::with_request(CrawlRequest::detail(detail.url.clone(), base_record)),
        )
        .unwrap();
    assert_eq!(outcome, ScrapOutcome::Scraped(1));

    scraper.record_failure(FailureRecord::new(
        "https://www.tryexponent.com/questions/broken",
        Label::Detail,
        "unexpected end of markup",
    ));

    scraper.finalizer();

    let questions = fs::read_to_string(&csv_file).unwrap();
    let mut lines = questions.lines();
    assert_eq!(
        lines.next(),
        Some("questionText,companyNames,askedWhen,tags,answerCount,showPageLink")
    );
    let row = lines.next().unwrap();
    assert!(row.starts_with("Design a rate limiter,"), "row: {row}");
    assert!(row.contains("system-design"));
    assert!(row.contains(",5,"));
    assert!(row.ends_with("/questions/design-a-rate-limiter"));
    assert!(lines.next().is_none(), "exactly one question row expected");

    let failures = fs::read_to_string(&failures_file).unwrap();
    let mut lines = failures.lines();
    assert_eq!(lines.next(), Some("url,label,error,status,timestamp"));
    let row = lines.next().unwrap();
    assert!(
        row.starts_with("https://www.tryexponent.com/questions/broken,DETAIL,"),
        "row: {row}"
    );
    assert!(row.contains("unexpected end of markup"));

    fs::remove_file(csv_file).ok();
    fs::remove_file(failures_file).ok();
}
