use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::item::{ClipKind, ClipboardItem};

/// Structured criteria derived from a query string. Ephemeral: parsed per
/// query, never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    pub text: String,
    pub kind: Option<ClipKind>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl SearchCriteria {
    pub fn parse(query: &str) -> Self {
        Self::parse_at(query, Utc::now())
    }

    /// Split on whitespace and pick out directives; every recognized
    /// directive overwrites any earlier one of the same kind. Whatever is
    /// left over becomes the free-text remainder.
    pub fn parse_at(query: &str, now: DateTime<Utc>) -> Self {
        let mut criteria = SearchCriteria::default();
        let mut free_text: Vec<&str> = Vec::new();

        for token in query.split_whitespace() {
            let lowered = token.to_ascii_lowercase();

            if let Some(value) = lowered.strip_prefix("type:") {
                if let Some(kind) = ClipKind::parse(value) {
                    criteria.kind = Some(kind);
                    continue;
                }
            } else if let Some(value) = lowered.strip_prefix("from:") {
                if let Some(start) = parse_day(value) {
                    criteria.from = Some(start);
                    continue;
                }
            } else if let Some(value) = lowered.strip_prefix("to:") {
                if let Some(start) = parse_day(value) {
                    // Exclusive at the following midnight, so `to:` covers
                    // the named day entirely.
                    criteria.to = Some(start + Duration::days(1));
                    continue;
                }
            } else if let Some((start, end)) = day_keyword(&lowered, now) {
                criteria.from = Some(start);
                criteria.to = Some(end);
                continue;
            } else if let Some(kind) = ClipKind::parse(&lowered) {
                criteria.kind = Some(kind);
                continue;
            }

            free_text.push(token);
        }

        criteria.text = free_text.join(" ");
        criteria
    }

    pub fn matches(&self, item: &ClipboardItem) -> bool {
        if let Some(kind) = self.kind {
            if item.kind != kind {
                return false;
            }
        }
        if let Some(from) = self.from {
            if item.copied_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if item.copied_at >= to {
                return false;
            }
        }
        if self.text.is_empty() {
            return true;
        }

        let query = self.text.to_lowercase();
        let haystack = item.searchable_text().to_lowercase();
        if haystack.contains(&query) {
            return true;
        }
        haystack.split_whitespace().any(|word| fuzzy_word_match(word, &query))
    }
}

fn parse_day(value: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

fn day_keyword(token: &str, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN));
    let tomorrow = today + Duration::days(1);
    match token {
        "today" => Some((today, tomorrow)),
        "yesterday" => Some((today - Duration::days(1), today)),
        "last7days" => Some((today - Duration::days(6), tomorrow)),
        "last30days" => Some((today - Duration::days(29), tomorrow)),
        _ => None,
    }
}

/// Approximate match of a single haystack word against the whole query:
/// containment, small edit distance, or subsequence in either direction.
fn fuzzy_word_match(word: &str, query: &str) -> bool {
    if word.contains(query) {
        return true;
    }
    if levenshtein(word, query) <= 2 {
        return true;
    }
    is_subsequence(query, word) || is_subsequence(word, query)
}

/// Classic two-row Levenshtein distance over chars. Inputs are already
/// lowercased by the caller.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// True when `needle` appears in `haystack` in order, not necessarily
/// contiguously.
fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut chars = needle.chars().peekable();
    for c in haystack.chars() {
        match chars.peek() {
            Some(&n) if n == c => {
                chars.next();
            }
            Some(_) => {}
            None => return true,
        }
    }
    chars.peek().is_none()
}
