use serde::{Deserialize, Serialize};
use url::Url;

/// One harvested question, serialized as a CSV row. With `Default` this
/// also serves as the partial record accumulated before reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub question_text: String,
    pub company_names: String,
    /// `DD/MM/YYYY`, or empty when no date could be recovered.
    pub asked_when: String,
    pub tags: String,
    pub answer_count: u64,
    pub show_page_link: String,
}

impl QuestionRecord {
    /// A card is worth keeping if anything identifies it.
    pub fn is_identified(&self) -> bool {
        !self.question_text.is_empty() || !self.show_page_link.is_empty()
    }

    pub fn slug(&self) -> Option<String> {
        slug_from_url(&self.show_page_link)
    }
}

/// Reconciles a DOM-derived record with a structured-data record for the
/// same question. The base wins wherever it already has content; the
/// answer count takes the max since either source may undercount.
pub fn merge(base: &QuestionRecord, extra: Option<&QuestionRecord>) -> QuestionRecord {
    let Some(extra) = extra else {
        return base.clone();
    };
    QuestionRecord {
        question_text: pick(&base.question_text, &extra.question_text),
        company_names: pick(&base.company_names, &extra.company_names),
        asked_when: pick(&base.asked_when, &extra.asked_when),
        tags: pick(&base.tags, &extra.tags),
        answer_count: base.answer_count.max(extra.answer_count),
        show_page_link: pick(&base.show_page_link, &extra.show_page_link),
    }
}

fn pick(base: &str, extra: &str) -> String {
    if base.is_empty() { extra } else { base }.to_string()
}

/// Collapses duplicate sightings of the same slug into one record, in
/// first-seen order. Nested card containers can match a question twice;
/// later sightings enrich the first instead of duplicating it. Records
/// without a slug pass through untouched.
pub fn dedup_by_slug(records: Vec<QuestionRecord>) -> Vec<QuestionRecord> {
    let mut index = std::collections::HashMap::new();
    let mut out: Vec<QuestionRecord> = Vec::with_capacity(records.len());
    for record in records {
        match record.slug() {
            Some(slug) => match index.get(&slug) {
                Some(&i) => {
                    let merged = merge(&out[i], Some(&record));
                    out[i] = merged;
                }
                None => {
                    index.insert(slug, out.len());
                    out.push(record);
                }
            },
            None => out.push(record),
        }
    }
    out
}

/// Derives the stable identifier segment from a question URL: the second
/// non-empty path segment when there are at least two, else the only
/// one. Query string and fragment never participate.
pub fn slug_from_url(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [] => None,
        [only] => Some((*only).to_string()),
        [_, slug, ..] => Some((*slug).to_string()),
    }
}
