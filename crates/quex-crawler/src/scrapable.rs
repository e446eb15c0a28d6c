use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Interface between the crawl engine and a domain scraper.
///
/// One instance is created per worker thread, plus one for seeding and
/// one for finalization; shared resources (like an output sink) must be
/// process-wide.
pub trait Scrapable {
    type Config: Clone + Send + 'static;

    /// Payload carried by follow-up requests, typically the partial
    /// record accumulated so far.
    type Payload: Clone + Send + 'static;

    fn new(config: &Self::Config) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Receives the handle used to submit follow-up requests.
    fn init(&mut self, _tx_req: CountedTx<Self::Payload>) {}

    /// The initial request frontier.
    fn seed(&self) -> Vec<CrawlRequest<Self::Payload>>;

    fn scrap(
        &mut self,
        page: String,
        ctx: ScrapingContext<Self::Payload>,
    ) -> anyhow::Result<ScrapOutcome>;

    /// Persists an explicit failure row.
    fn record_failure(&mut self, failure: FailureRecord);

    fn finalizer(&mut self) {}
}

/// Crawl stage a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Index,
    Detail,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Label::Index => write!(f, "INDEX"),
            Label::Detail => write!(f, "DETAIL"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlRequest<P> {
    pub url: String,
    pub label: Label,
    pub page_number: Option<usize>,
    pub base: Option<P>,
}

impl<P> CrawlRequest<P> {
    pub fn index(url: impl Into<String>, page_number: usize) -> Self {
        Self {
            url: url.into(),
            label: Label::Index,
            page_number: Some(page_number),
            base: None,
        }
    }

    pub fn detail(url: impl Into<String>, base: P) -> Self {
        Self {
            url: url.into(),
            label: Label::Detail,
            page_number: None,
            base: Some(base),
        }
    }
}

/// Outcome of scraping one fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapOutcome {
    /// Number of records handled for this page.
    Scraped(usize),
    /// Blocking indicators were detected; the page yielded nothing and
    /// the crawler should cool down before the next request.
    Blocked,
}

/// One failed or unprocessable request, persisted so that gaps in the
/// output are always explainable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub url: String,
    pub label: Label,
    pub error: String,
    pub status: Option<String>,
    pub timestamp: String,
}

impl FailureRecord {
    pub fn new(url: impl Into<String>, label: Label, error: impl fmt::Display) -> Self {
        Self {
            url: url.into(),
            label,
            error: error.to_string(),
            status: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// A request abandoned after its full retry budget.
    pub fn failed(url: impl Into<String>, label: Label, error: impl fmt::Display) -> Self {
        Self {
            status: Some(String::from("FAILED")),
            ..Self::new(url, label, error)
        }
    }
}

/// Request context handed to `Scrapable::scrap` along with the page.
pub struct ScrapingContext<P> {
    request: Rc<CrawlRequest<P>>,
}

impl<P> ScrapingContext<P> {
    pub fn new(request: Rc<CrawlRequest<P>>) -> Self {
        Self { request }
    }

    pub fn with_request(request: CrawlRequest<P>) -> Self {
        Self::new(Rc::new(request))
    }

    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn label(&self) -> Label {
        self.request.label
    }

    pub fn page_number(&self) -> Option<usize> {
        self.request.page_number
    }

    pub fn base(&self) -> Option<&P> {
        self.request.base.as_ref()
    }
}

/// Sender that counts submitted requests, so the crawler knows when all
/// pending work has drained.
pub struct CountedTx<P> {
    tx: mpsc::UnboundedSender<CrawlRequest<P>>,
    counter: Arc<AtomicUsize>,
}

impl<P> Clone for CountedTx<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            counter: self.counter.clone(),
        }
    }
}

impl<P> CountedTx<P> {
    pub fn new(tx: mpsc::UnboundedSender<CrawlRequest<P>>, counter: Arc<AtomicUsize>) -> Self {
        Self { tx, counter }
    }

    pub fn send(&self, request: CrawlRequest<P>) {
        match self.tx.send(request) {
            Ok(()) => {
                self.counter.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => log::error!("Couldn't send request: {e}"),
        }
    }
}
