pub mod config;
pub mod dates;
pub mod dom;
pub mod record;
mod scraper;
pub mod structured;
pub mod text;
pub mod writer;

pub use config::QuestionScraperConfig;
pub use scraper::{scrap_page, QuestionScraper};

pub use anyhow;
