use std::collections::HashSet;

/// Separator used for multi-valued fields in output rows.
pub const LIST_SEPARATOR: &str = ", ";

/// Collapses whitespace runs to single spaces and trims the ends.
pub fn clean(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trims entries, drops empties, and removes exact (case-sensitive)
/// duplicates while keeping first-occurrence order.
pub fn uniq<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = vec![];
    for item in items {
        let item = item.as_ref().trim();
        if item.is_empty() {
            continue;
        }
        if seen.insert(item.to_string()) {
            out.push(item.to_string());
        }
    }
    out
}

pub fn join_list(items: &[String]) -> String {
    items.join(LIST_SEPARATOR)
}

pub fn split_list(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}
