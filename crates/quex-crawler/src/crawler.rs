use std::cmp;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Error, Result};
use futures::{try_join, StreamExt};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CACHE_CONTROL,
    CONNECTION, COOKIE, DNT, UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::CrawlerConfig;
use crate::limiter::RateLimiter;
use crate::scrapable::{
    CountedTx, CrawlRequest, FailureRecord, Label, ScrapOutcome, Scrapable, ScrapingContext,
};

enum FetchResult<P> {
    Page {
        page: String,
        request: CrawlRequest<P>,
    },
    Failed(FailureRecord),
}

fn http_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::ClientBuilder::new()
        .gzip(true)
        .deflate(true)
        .timeout(Duration::from_secs(config.request_timeout_secs));
    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy).context("Invalid proxy")?);
    }
    Ok(builder.build()?)
}

fn browser_headers(token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(DNT, HeaderValue::from_static("1"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("none"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}"))?,
    );
    Ok(headers)
}

async fn download<P>(
    cli: &reqwest::Client,
    config: &CrawlerConfig,
    request: &CrawlRequest<P>,
) -> Result<String> {
    let mut req = cli
        .get(request.url.as_str())
        .header(USER_AGENT, config.user_agent.as_str());
    if let Some(token) = &config.bearer_token {
        req = req.headers(browser_headers(token)?);
    }
    if let Some(cookies) = &config.cookies {
        req = req.header(COOKIE, cookies.as_str());
    }
    let resp = req.send().await?.error_for_status()?;
    Ok(resp.text().await?)
}

/// Fetches a page, retrying transient errors with a cooldown between
/// attempts. A request that exhausts its budget becomes a terminal
/// `FailureRecord` and triggers the longer failure cooldown.
async fn fetch_with_retries<P>(
    cli: &reqwest::Client,
    config: &CrawlerConfig,
    request: CrawlRequest<P>,
) -> FetchResult<P> {
    let mut last_err = None;
    for attempt in 1..=config.max_retries + 1 {
        match download(cli, config, &request).await {
            Ok(page) => return FetchResult::Page { page, request },
            Err(e) => {
                log::warn!(
                    "Fetch attempt {attempt}/{total} failed for {url}: {e}",
                    total = config.max_retries + 1,
                    url = request.url
                );
                last_err = Some(e);
                if attempt <= config.max_retries {
                    sleep(Duration::from_millis(config.cooldown_ms)).await;
                }
            }
        }
    }
    let error = last_err.map(|e| e.to_string()).unwrap_or_default();
    sleep(Duration::from_millis(config.failure_cooldown_ms)).await;
    FetchResult::Failed(FailureRecord::failed(request.url, request.label, error))
}

/// Crawls a site, driving a `Scrapable` implementation to completion.
///
/// Downloads run on the current tokio runtime, capped by
/// `concurrent_downloads` and the optional rate limit; fetched pages are
/// handed to `num_workers` scraper threads. The crawl ends when every
/// submitted request has been either scraped or recorded as a failure.
pub async fn crawl_site<T>(crawler_conf: &CrawlerConfig, scraper_conf: &T::Config) -> Result<()>
where
    T: Scrapable + 'static,
{
    // Validate the scraper config and compute the frontier before any
    // thread or request exists.
    let seed = <T as Scrapable>::new(scraper_conf)?.seed();

    let pages_in = Arc::new(AtomicUsize::new(0));
    let pages_out = Arc::new(AtomicUsize::new(0));
    let cooldown = Arc::new(AtomicBool::new(false));

    let (tx_stop, rx_stop) = crossbeam_channel::unbounded::<()>();
    let (tx_req, rx_req) = mpsc::unbounded_channel::<CrawlRequest<T::Payload>>();
    let (tx_page, rx_page) =
        crossbeam_channel::bounded::<FetchResult<T::Payload>>(crawler_conf.page_buffer);

    let tx_req = CountedTx::new(tx_req, pages_in.clone());
    for request in seed {
        tx_req.send(request);
    }

    let mut workers = vec![];
    for id in 0..crawler_conf.num_workers {
        let rx_stop = rx_stop.clone();
        let rx_page = rx_page.clone();
        let tx_req = tx_req.clone();
        let pages_out = pages_out.clone();
        let cooldown = cooldown.clone();
        let scraper_conf = scraper_conf.clone();
        let worker = thread::Builder::new().name(format!("{id}")).spawn(move || {
            let mut scraper = <T as Scrapable>::new(&scraper_conf)?;
            scraper.init(tx_req);
            loop {
                crossbeam_channel::select! {
                    recv(rx_page) -> fetched => {
                        let Ok(fetched) = fetched else { break };
                        match fetched {
                            FetchResult::Page { page, request } => {
                                let request = Rc::new(request);
                                let ctx = ScrapingContext::new(request.clone());
                                match scraper.scrap(page, ctx) {
                                    Ok(ScrapOutcome::Scraped(n)) => {
                                        log::debug!("Scraped {n} records from {}", request.url);
                                    }
                                    Ok(ScrapOutcome::Blocked) => {
                                        log::warn!(
                                            "Blocking signals on {}, cooling down",
                                            request.url
                                        );
                                        cooldown.store(true, Ordering::SeqCst);
                                    }
                                    Err(e) => {
                                        log::error!("Scrap failed for {}: {e}", request.url);
                                        scraper.record_failure(FailureRecord::new(
                                            request.url.clone(),
                                            request.label,
                                            &e,
                                        ));
                                        cooldown.store(true, Ordering::SeqCst);
                                    }
                                }
                            }
                            FetchResult::Failed(failure) => {
                                log::error!("Giving up on {}: {}", failure.url, failure.error);
                                scraper.record_failure(failure);
                            }
                        }
                        pages_out.fetch_add(1, Ordering::SeqCst);
                    },
                    recv(rx_stop) -> _ => break,
                }
            }
            Ok::<(), Error>(())
        })?;
        workers.push(worker);
    }
    // The workers hold the remaining senders; dropping these lets the
    // request stream end once every scraper is done.
    drop(tx_req);
    drop(rx_page);
    let workers = async move {
        tokio::task::spawn_blocking(move || {
            for worker in workers {
                worker
                    .join()
                    .map_err(|e| anyhow!("Couldn't join worker: {e:?}"))??;
            }
            Ok::<(), Error>(())
        })
        .await?
    };

    let cli = http_client(crawler_conf)?;
    let limiter = crawler_conf.rate_limit.map(|rl| {
        RateLimiter::new(rl.max_requests.get(), Duration::from_secs(rl.window_secs))
    });
    let index_seq = Arc::new(AtomicUsize::new(0));
    let cooldown_dl = cooldown.clone();
    let downloader = async {
        UnboundedReceiverStream::new(rx_req)
            .map(|request| {
                let cli = cli.clone();
                let limiter = limiter.clone();
                let cooldown = cooldown_dl.clone();
                let index_seq = index_seq.clone();
                async move {
                    if crawler_conf.request_delay_ms > 0 {
                        sleep(Duration::from_millis(crawler_conf.request_delay_ms)).await;
                    }
                    if cooldown.swap(false, Ordering::SeqCst) {
                        sleep(Duration::from_millis(crawler_conf.cooldown_ms)).await;
                    }
                    if let (Some(breather), Label::Index) = (crawler_conf.breather, request.label) {
                        let seq = index_seq.fetch_add(1, Ordering::SeqCst) + 1;
                        if seq % breather.every.get() == 0 {
                            sleep(Duration::from_millis(breather.delay_ms)).await;
                        }
                    }
                    if let Some(limiter) = &limiter {
                        limiter.throttle().await;
                    }
                    fetch_with_retries(&cli, crawler_conf, request).await
                }
            })
            .buffer_unordered(cmp::max(1, crawler_conf.concurrent_downloads))
            .map(|fetched| tx_page.send(fetched).ok())
            .collect::<Vec<_>>()
            .await;
        Ok::<(), Error>(())
    };

    let handle_sigint = crawler_conf.handle_sigint;
    let num_workers = crawler_conf.num_workers;
    let done = async move {
        loop {
            if handle_sigint {
                match timeout(Duration::from_secs(1), tokio::signal::ctrl_c()).await {
                    Ok(_) => {
                        for _ in 0..num_workers {
                            tx_stop.send(()).ok();
                        }
                        return Err(anyhow!("Interrupted"));
                    }
                    Err(_) => (),
                }
            } else {
                sleep(Duration::from_secs(1)).await;
            }
            if pages_out.load(Ordering::SeqCst) == pages_in.load(Ordering::SeqCst) {
                for _ in 0..num_workers {
                    tx_stop.send(()).ok();
                }
                return Ok::<(), Error>(());
            }
        }
    };

    let res = try_join!(workers, downloader, done);
    <T as Scrapable>::new(scraper_conf)?.finalizer();
    res?;
    Ok(())
}
