use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dom::QUESTION_PATH;
use crate::writer::{CsvWriterConfig, FileMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionScraperConfig {
    /// First index page to fetch.
    #[serde(default = "default_start_page")]
    pub start_page: usize,
    /// Last index page to fetch, inclusive.
    #[serde(default = "default_end_page")]
    pub end_page: usize,
    /// Follow each question's detail page to enrich the record from its
    /// embedded data. When off, index records are final.
    #[serde(default = "default_fetch_detail_meta")]
    pub fetch_detail_meta: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Question rows go here; stdout when unset.
    #[serde(default)]
    pub csv_file: Option<PathBuf>,
    /// Failure rows go here; derived from `csv_file` or stderr when unset.
    #[serde(default)]
    pub failures_file: Option<PathBuf>,
    #[serde(default)]
    pub file_mode: FileMode,
    #[serde(default)]
    pub csv: CsvWriterConfig,
}

impl Default for QuestionScraperConfig {
    fn default() -> Self {
        Self {
            start_page: default_start_page(),
            end_page: default_end_page(),
            fetch_detail_meta: default_fetch_detail_meta(),
            base_url: default_base_url(),
            csv_file: None,
            failures_file: None,
            file_mode: FileMode::default(),
            csv: CsvWriterConfig::default(),
        }
    }
}

impl QuestionScraperConfig {
    /// URL of one page of the paginated question listing.
    pub fn index_url(&self, page: usize) -> String {
        format!(
            "{}{}?page={}",
            self.base_url.trim_end_matches('/'),
            QUESTION_PATH.trim_end_matches('/'),
            page
        )
    }
}

fn default_start_page() -> usize {
    1
}

fn default_end_page() -> usize {
    5
}

fn default_fetch_detail_meta() -> bool {
    true
}

fn default_base_url() -> String {
    String::from("https://www.tryexponent.com")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: QuestionScraperConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.start_page, 1);
        assert_eq!(config.end_page, 5);
        assert!(config.fetch_detail_meta);
        assert!(config.csv_file.is_none());
    }

    #[test]
    fn test_index_url() {
        let config = QuestionScraperConfig::default();
        assert_eq!(
            config.index_url(3),
            "https://www.tryexponent.com/questions?page=3"
        );
        let config = QuestionScraperConfig {
            base_url: String::from("https://example.com/"),
            ..Default::default()
        };
        assert_eq!(config.index_url(1), "https://example.com/questions?page=1");
    }
}
