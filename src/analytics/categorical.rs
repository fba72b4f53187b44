//! Categorical distributions (timezone, referrer domain, OS, browser, device).

#![allow(missing_docs)]

use std::collections::HashMap;

use serde::Serialize;
use url::Url;

use crate::normalize::record::EventRecord;

/// Maximum number of entries in a distribution.
pub const TOP_CATEGORIES: usize = 8;

/// Label used for records without a category value.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Label used for visits without a usable referrer.
pub const DIRECT_LABEL: &str = "Direct";

/// One ranked `(label, count)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub label: String,
    pub count: u64,
}

/// Count `key_fn(record)` occurrences and keep the [`TOP_CATEGORIES`] largest.
///
/// Empty keys count as [`UNKNOWN_LABEL`]. Ties keep first-seen order.
#[must_use]
pub fn aggregate_categorical<'a, I, F>(records: I, key_fn: F) -> Vec<CategoryCount>
where
    I: IntoIterator<Item = &'a EventRecord>,
    F: Fn(&EventRecord) -> String,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<CategoryCount> = Vec::new();

    for record in records {
        let mut label = key_fn(record);
        if label.is_empty() {
            label = UNKNOWN_LABEL.to_string();
        }
        if let Some(&pos) = positions.get(&label) {
            counts[pos].count += 1;
        } else {
            positions.insert(label.clone(), counts.len());
            counts.push(CategoryCount { label, count: 1 });
        }
    }

    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(TOP_CATEGORIES);
    counts
}

/// Bare hostname of a referrer URL without a leading `www.`.
///
/// Empty, `direct`, unparseable, and host-less referrers become [`DIRECT_LABEL`].
#[must_use]
pub fn normalize_referrer(referrer: &str) -> String {
    let trimmed = referrer.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("direct") {
        return DIRECT_LABEL.to_string();
    }
    Url::parse(trimmed)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .filter(|host| !host.is_empty())
        .map_or_else(
            || DIRECT_LABEL.to_string(),
            |host| host.strip_prefix("www.").unwrap_or(&host).to_string(),
        )
}

/// Standard distributions shown for a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Distributions {
    pub timezone: Vec<CategoryCount>,
    pub referrer: Vec<CategoryCount>,
    pub os: Vec<CategoryCount>,
    pub browser: Vec<CategoryCount>,
    pub device: Vec<CategoryCount>,
}

#[must_use]
pub fn distributions<'a, I>(records: I) -> Distributions
where
    I: IntoIterator<Item = &'a EventRecord>,
    I::IntoIter: Clone,
{
    let records = records.into_iter();
    Distributions {
        timezone: aggregate_categorical(records.clone(), |r| r.timezone.clone()),
        referrer: aggregate_categorical(records.clone(), |r| normalize_referrer(&r.referrer)),
        os: aggregate_categorical(records.clone(), |r| r.os.clone()),
        browser: aggregate_categorical(records.clone(), |r| r.browser.clone()),
        device: aggregate_categorical(records, |r| r.device_type.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn rec_with(f: impl FnOnce(&mut EventRecord)) -> EventRecord {
        let mut r = EventRecord::new("portfolio", Utc.timestamp_opt(0, 0).unwrap());
        f(&mut r);
        r
    }

    #[test]
    fn referrer_hostname_strips_www() {
        assert_eq!(normalize_referrer("https://www.example.com/path"), "example.com");
        assert_eq!(normalize_referrer("http://news.example.org/?q=1"), "news.example.org");
    }

    #[test]
    fn referrer_direct_cases() {
        assert_eq!(normalize_referrer(""), "Direct");
        assert_eq!(normalize_referrer("direct"), "Direct");
        assert_eq!(normalize_referrer("Direct"), "Direct");
        assert_eq!(normalize_referrer("not a url"), "Direct");
        assert_eq!(normalize_referrer("about:blank"), "Direct");
    }

    #[test]
    fn counts_sort_descending_and_default_unknown() {
        let records = vec![
            rec_with(|r| r.os = "Linux".into()),
            rec_with(|r| r.os = String::new()),
            rec_with(|r| r.os = "Windows".into()),
            rec_with(|r| r.os = "Windows".into()),
        ];
        let out = aggregate_categorical(&records, |r| r.os.clone());
        assert_eq!(
            out,
            vec![
                CategoryCount {
                    label: "Windows".into(),
                    count: 2
                },
                CategoryCount {
                    label: "Linux".into(),
                    count: 1
                },
                CategoryCount {
                    label: "Unknown".into(),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn truncates_to_top_eight() {
        let records: Vec<EventRecord> = (0..20)
            .map(|i| rec_with(|r| r.timezone = format!("tz-{}", i % 12)))
            .collect();
        let out = aggregate_categorical(&records, |r| r.timezone.clone());
        assert_eq!(out.len(), TOP_CATEGORIES);
        assert!(out.windows(2).all(|w| w[0].count >= w[1].count));
    }

    #[test]
    fn distributions_cover_all_dimensions() {
        let records = vec![
            rec_with(|r| {
                r.referrer = "https://www.google.com/".into();
                r.browser = "Chrome".into();
            }),
            rec_with(|r| r.referrer = String::new()),
        ];
        let d = distributions(&records);
        assert_eq!(d.referrer.len(), 2);
        assert_eq!(d.timezone[0].label, "Unknown");
        assert_eq!(d.device[0].label, "Unknown");
        assert_eq!(d.device[0].count, 2);
        assert_eq!(d.browser.len(), 2);
    }
}
