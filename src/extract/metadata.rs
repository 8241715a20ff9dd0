//! Page metadata from `<meta>` tags.

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::document::DocumentMetadata;

static ISO_DATE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})").unwrap()
});

// Meta keys holding the publication date, in priority order
const DATE_KEYS: &[&str] = &[
    "article:published_time",
    "og:published_time",
    "publishdate",
    "pubdate",
    "date",
    "dc.date",
];

const AUTHOR_KEYS: &[&str] = &["author", "article:author", "twitter:creator", "dc.creator"];

fn meta_content(document: &Html, key: &str) -> Option<String> {
    let raw = format!(r#"meta[property="{key}"], meta[name="{key}"], meta[itemprop="{key}"]"#);
    let selector = Selector::parse(&raw).ok()?;
    document
        .select(&selector)
        .filter_map(|m| m.value().attr("content"))
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty())
}

/// Normalize a date-ish string to `YYYY-MM-DD`, returning it unchanged when unparseable
pub fn normalize_date(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format("%Y-%m-%d").to_string();
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return dt.format("%Y-%m-%d").to_string();
    }
    if let Some(caps) = ISO_DATE_PREFIX.captures(raw) {
        let parts = (caps[1].parse::<i32>(), caps[2].parse::<u32>(), caps[3].parse::<u32>());
        if let (Ok(y), Ok(m), Ok(d)) = parts {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                return date.format("%Y-%m-%d").to_string();
            }
        }
    }
    raw.to_string()
}

/// Split a keyword list on ASCII and CJK commas
pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split([',', '，', ';', '、'])
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Author, publication date and keywords of a page
pub fn extract_metadata(document: &Html) -> DocumentMetadata {
    let published = DATE_KEYS
        .iter()
        .find_map(|key| meta_content(document, key))
        .or_else(|| {
            let selector = Selector::parse("time[datetime]").ok()?;
            document
                .select(&selector)
                .find_map(|t| t.value().attr("datetime").map(str::to_string))
        })
        .map(|d| normalize_date(&d));

    let author = AUTHOR_KEYS.iter().find_map(|key| meta_content(document, key));

    let mut tags = meta_content(document, "keywords")
        .map(|k| split_keywords(&k))
        .unwrap_or_default();
    if let Ok(selector) = Selector::parse(r#"meta[property="article:tag"]"#) {
        for tag in document.select(&selector).filter_map(|m| m.value().attr("content")) {
            let tag = tag.trim().to_string();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }

    DocumentMetadata {
        author,
        published,
        tags,
        site: None,
    }
}
