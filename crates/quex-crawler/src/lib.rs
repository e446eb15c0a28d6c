mod config;
mod crawler;
mod limiter;
mod scrapable;

pub use config::{Breather, CrawlerConfig, RateLimit};
pub use crawler::crawl_site;
pub use limiter::RateLimiter;
pub use scrapable::{
    CountedTx, CrawlRequest, FailureRecord, Label, ScrapOutcome, Scrapable, ScrapingContext,
};

pub use anyhow;
