use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20\d{2})-(\d{2})-(\d{2})\b").unwrap());

static MONTH_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2}),?\s+(20\d{2})\b")
        .unwrap()
});

static SLASH_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Finds the first date-shaped substring in free text, trying ISO forms
/// first, then month-name forms, then slash forms.
pub fn find_date(text: &str) -> Option<&str> {
    for pattern in [&*ISO_DATE, &*MONTH_DATE, &*SLASH_DATE] {
        if let Some(m) = pattern.find(text) {
            return Some(m.as_str());
        }
    }
    None
}

/// Normalizes a date found in markup or embedded data to `DD/MM/YYYY`.
///
/// Accepts RFC 3339 timestamps, `YYYY-MM-DD`, month-name forms like
/// `Jan 5, 2024` (any abbreviation length, so `Sept` works too), and
/// day-first `D/M/YYYY`. Returns an empty string when no calendar date
/// can be recovered.
pub fn normalize_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return format_date(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return format_date(dt.date());
    }
    if let Some(caps) = ISO_DATE.captures(raw) {
        if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
            return format_date(date);
        }
    }
    if let Some(caps) = MONTH_DATE.captures(raw) {
        let month = MONTHS
            .iter()
            .position(|m| m.eq_ignore_ascii_case(&caps[1]))
            .map(|i| i as u32 + 1);
        if let (Some(month), Ok(day), Ok(year)) = (month, caps[2].parse(), caps[3].parse()) {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return format_date(date);
            }
        }
    }
    if let Some(caps) = SLASH_DATE.captures(raw) {
        // Slash dates read day-first.
        if let Some(date) = dmy(&caps[1], &caps[2], &caps[3]) {
            return format_date(date);
        }
    }
    String::new()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn dmy(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    ymd(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339() {
        assert_eq!(normalize_date("2024-01-05T12:30:00Z"), "05/01/2024");
        assert_eq!(normalize_date("2024-01-05T12:30:00+02:00"), "05/01/2024");
        assert_eq!(normalize_date("2024-01-05T12:30:00"), "05/01/2024");
    }

    #[test]
    fn test_iso() {
        assert_eq!(normalize_date("2024-01-05"), "05/01/2024");
        assert_eq!(normalize_date("published 2024-01-05 by staff"), "05/01/2024");
    }

    #[test]
    fn test_month_names() {
        assert_eq!(normalize_date("Jan 5, 2024"), "05/01/2024");
        assert_eq!(normalize_date("January 5, 2024"), "05/01/2024");
        assert_eq!(normalize_date("Sept 3, 2023"), "03/09/2023");
        assert_eq!(normalize_date("Dec 31 2023"), "31/12/2023");
    }

    #[test]
    fn test_slash_day_first() {
        assert_eq!(normalize_date("5/1/2024"), "05/01/2024");
        assert_eq!(normalize_date("28/2/2024"), "28/02/2024");
    }

    #[test]
    fn test_equivalent_forms_agree() {
        let forms = ["2024-01-05", "Jan 5, 2024", "5/1/2024"];
        for form in forms {
            assert_eq!(normalize_date(form), "05/01/2024", "input: {form}");
        }
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(normalize_date(""), "");
        assert_eq!(normalize_date("yesterday"), "");
        assert_eq!(normalize_date("2024-02-31"), "");
        assert_eq!(normalize_date("45/1/2024"), "");
    }

    #[test]
    fn test_find_date() {
        assert_eq!(find_date("Asked Jan 5, 2024 by a user"), Some("Jan 5, 2024"));
        assert_eq!(find_date("on 5/1/2024 something"), Some("5/1/2024"));
        assert_eq!(find_date("no date here"), None);
    }

    #[test]
    fn test_find_date_iso_takes_precedence() {
        assert_eq!(
            find_date("updated 2024-01-05, first asked Jan 3, 2024"),
            Some("2024-01-05")
        );
        assert_eq!(
            find_date("asked Jan 3, 2024, on 5/1/2024"),
            Some("Jan 3, 2024")
        );
    }
}
