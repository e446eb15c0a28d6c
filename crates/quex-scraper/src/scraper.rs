use std::thread;

use anyhow::{anyhow, ensure, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use once_cell::sync::OnceCell;
use scraper::Html;
use url::Url;

use quex_crawler::{
    CountedTx, CrawlRequest, FailureRecord, Label, ScrapOutcome, Scrapable, ScrapingContext,
};

use crate::config::QuestionScraperConfig;
use crate::dom::{page_blocked, parse_index_page};
use crate::record::{dedup_by_slug, merge, slug_from_url, QuestionRecord};
use crate::structured::{collect_questions, parse_embedded_json};
use crate::writer::{Output, OutputSinks};

// Process-wide output channel: (tx_output, tx_stop, rx_done). A single
// writer thread owns the CSV sinks; the finalizer handshakes through
// tx_stop/rx_done to get everything flushed.
static TX_OUTPUT: OnceCell<(Sender<Output>, Sender<()>, Receiver<()>)> = OnceCell::new();

pub struct QuestionScraper {
    config: QuestionScraperConfig,
    base: Url,
    tx_output: Sender<Output>,
    tx_req: Option<CountedTx<QuestionRecord>>,
}

impl Scrapable for QuestionScraper {
    type Config = QuestionScraperConfig;
    type Payload = QuestionRecord;

    fn new(config: &QuestionScraperConfig) -> Result<Self> {
        ensure!(
            config.start_page <= config.end_page,
            "startPage ({}) must not exceed endPage ({})",
            config.start_page,
            config.end_page
        );
        let base = Url::parse(&config.base_url)?;

        let (tx_output, _, _) = TX_OUTPUT.get_or_try_init::<_, anyhow::Error>(|| {
            let mut sinks = OutputSinks::open(config)?;
            let (tx_output, rx_output) = unbounded::<Output>();
            let (tx_stop, rx_stop) = bounded::<()>(1);
            let (tx_done, rx_done) = bounded::<()>(1);
            thread::spawn(move || loop {
                crossbeam_channel::select! {
                    recv(rx_stop) -> _ => {
                        // Rows queued before the stop signal must still
                        // land; select picks arbitrarily among ready
                        // channels.
                        for output in rx_output.try_iter() {
                            if let Err(e) = sinks.write(&output) {
                                log::error!("Couldn't write output row: {e}");
                            }
                        }
                        if let Err(e) = sinks.flush() {
                            log::error!("Couldn't flush output: {e}");
                        }
                        tx_done.send(()).ok();
                        break;
                    },
                    recv(rx_output) -> msg => {
                        msg.map(|output| {
                            if let Err(e) = sinks.write(&output) {
                                log::error!("Couldn't write output row: {e}");
                            }
                        })
                        .ok();
                    }
                }
            });
            Ok((tx_output, tx_stop, rx_done))
        })?;

        Ok(Self {
            config: config.clone(),
            base,
            tx_output: tx_output.clone(),
            tx_req: None,
        })
    }

    fn init(&mut self, tx_req: CountedTx<QuestionRecord>) {
        self.tx_req = Some(tx_req);
    }

    fn seed(&self) -> Vec<CrawlRequest<QuestionRecord>> {
        (self.config.start_page..=self.config.end_page)
            .map(|page| CrawlRequest::index(self.config.index_url(page), page))
            .collect()
    }

    fn scrap(
        &mut self,
        page: String,
        ctx: ScrapingContext<QuestionRecord>,
    ) -> Result<ScrapOutcome> {
        let doc = Html::parse_document(&page);
        match ctx.label() {
            Label::Index => self.scrap_index(&doc, &ctx),
            Label::Detail => self.scrap_detail(&doc, &ctx),
        }
    }

    fn record_failure(&mut self, failure: FailureRecord) {
        self.tx_output.send(Output::Failure(failure)).ok();
    }

    fn finalizer(&mut self) {
        if let Some((_, tx_stop, rx_done)) = TX_OUTPUT.get() {
            tx_stop.send(()).ok();
            rx_done.recv().ok();
        }
    }
}

impl QuestionScraper {
    fn persist(&self, record: QuestionRecord) -> Result<()> {
        self.tx_output
            .send(Output::Question(record))
            .map_err(|e| anyhow!("Output channel closed: {e}"))
    }

    fn scrap_index(
        &mut self,
        doc: &Html,
        ctx: &ScrapingContext<QuestionRecord>,
    ) -> Result<ScrapOutcome> {
        if page_blocked(doc) {
            return Ok(ScrapOutcome::Blocked);
        }

        let mut questions = parse_index_page(doc, &self.base);
        log::info!(
            "Found {} questions on index page {}",
            questions.len(),
            ctx.page_number().unwrap_or_default()
        );

        if let Some(blob) = parse_embedded_json(doc) {
            let mut by_slug = collect_questions(&blob, &self.base);
            for question in questions.iter_mut() {
                let extra = question.slug().and_then(|slug| by_slug.remove(&slug));
                *question = merge(question, extra.as_ref());
            }
        }

        let questions = dedup_by_slug(questions);
        let count = questions.len();
        for question in questions {
            match &self.tx_req {
                Some(tx_req)
                    if self.config.fetch_detail_meta && !question.show_page_link.is_empty() =>
                {
                    let url = question.show_page_link.clone();
                    tx_req.send(CrawlRequest::detail(url, question));
                }
                // Without a detail link, or with detail fetching off, the
                // index record is final.
                _ => self.persist(question)?,
            }
        }
        Ok(ScrapOutcome::Scraped(count))
    }

    fn scrap_detail(
        &mut self,
        doc: &Html,
        ctx: &ScrapingContext<QuestionRecord>,
    ) -> Result<ScrapOutcome> {
        let base_record = ctx.base().cloned().unwrap_or_default();
        let slug = if base_record.show_page_link.is_empty() {
            slug_from_url(ctx.url())
        } else {
            base_record.slug()
        };

        let by_slug = parse_embedded_json(doc).map(|blob| collect_questions(&blob, &self.base));
        let extra = match (&by_slug, &slug) {
            (Some(by_slug), Some(slug)) => by_slug.get(slug),
            _ => None,
        };
        if extra.is_none() {
            log::debug!("No structured entry for {}", ctx.url());
        }

        self.persist(merge(&base_record, extra))?;
        Ok(ScrapOutcome::Scraped(1))
    }
}

/// Scraps a single already-fetched page and flushes the output, for
/// one-shot runs outside the crawler.
pub fn scrap_page(
    config: &QuestionScraperConfig,
    page: String,
    url: Option<String>,
) -> Result<()> {
    let mut scraper = QuestionScraper::new(config)?;
    let url = url.unwrap_or_else(|| config.index_url(config.start_page));
    let request = CrawlRequest {
        url,
        label: Label::Index,
        page_number: Some(config.start_page),
        base: None,
    };
    let outcome = scraper.scrap(page, ScrapingContext::with_request(request))?;
    if outcome == ScrapOutcome::Blocked {
        log::warn!("Page shows blocking signals, nothing extracted");
    }
    scraper.finalizer();
    Ok(())
}
