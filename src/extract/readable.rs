//! Main content detection.
//!
//! Explicit selectors are tried first; otherwise the `readability` crate
//! scores the page and its cleaned article subtree is converted to blocks.

use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use scraper::{ElementRef, Html, Selector};
use std::borrow::Cow;
use std::io::Cursor;
use url::Url;

use super::html::{element_text, element_to_blocks};
use super::metadata::extract_metadata;
use super::SelectorSet;
use crate::document::{ContentBlock, NormalizedDocument};

// A selector match needs at least this much text to be taken as the body
const MIN_SELECTED_CHARS: usize = 50;

static IMG_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap());

static LAZY_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\bdata-(?:src|original|url|lazy-src|actualsrc)\s*=\s*["']([^"']+)["']"#).unwrap()
});

static PLAIN_SRC: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?is)\ssrc\s*=\s*(?:"[^"]*"|'[^']*')"#).unwrap());

fn parse_selector(raw: &str) -> Option<Selector> {
    Selector::parse(raw).ok()
}

fn text_len(element: &ElementRef) -> usize {
    element.text().map(|t| t.trim().chars().count()).sum()
}

/// First explicit selector match carrying real content
pub fn find_selected_content<'a>(document: &'a Html, selectors: &SelectorSet) -> Option<ElementRef<'a>> {
    let image = parse_selector("img")?;
    selectors.content.iter().filter_map(|raw| parse_selector(raw)).find_map(|selector| {
        document
            .select(&selector)
            .find(|e| text_len(e) >= MIN_SELECTED_CHARS || e.select(&image).next().is_some())
    })
}

/// Copy lazy-loading sources into `src` so image cleanup keeps those images
fn promote_lazy_images(html: &str) -> Cow<'_, str> {
    IMG_TAG.replace_all(html, |caps: &Captures| {
        let tag = &caps[0];
        let Some(lazy) = LAZY_SRC.captures(tag) else {
            return tag.to_string();
        };
        let stripped = PLAIN_SRC.replace_all(tag, "");
        // `stripped` still opens with "<img"
        format!("<img src=\"{}\"{}", &lazy[1], &stripped[4..])
    })
}

/// Article subtree picked by readability scoring, as blocks
fn scored_content_blocks(html: &str, base: Option<&Url>) -> Option<Vec<ContentBlock>> {
    let base = base?;
    let prepared = promote_lazy_images(html);
    let mut reader = Cursor::new(prepared.as_bytes());
    let product = match ::readability::extractor::extract(&mut reader, base) {
        Ok(product) => product,
        Err(e) => {
            debug!("Readability scoring failed for {}: {}", base, e);
            return None;
        }
    };
    let fragment = Html::parse_fragment(&product.content);
    Some(element_to_blocks(&fragment.root_element(), Some(base)))
}

fn body_blocks(document: &Html, base: Option<&Url>) -> Vec<ContentBlock> {
    parse_selector("body")
        .and_then(|body| document.select(&body).next())
        .map(|body| element_to_blocks(&body, base))
        .unwrap_or_default()
}

/// Document title: explicit selectors, then `og:title`, then `<title>`, then the first `<h1>`
pub fn extract_title(document: &Html, selectors: &SelectorSet) -> String {
    let from_selectors = selectors.title.iter().find_map(|raw| {
        let selector = parse_selector(raw)?;
        document
            .select(&selector)
            .map(|e| element_text(&e))
            .find(|t| !t.is_empty())
    });
    if let Some(title) = from_selectors {
        return title;
    }

    let og_title = parse_selector(r#"meta[property="og:title"]"#).and_then(|sel| {
        document
            .select(&sel)
            .filter_map(|m| m.value().attr("content"))
            .map(|c| c.trim().to_string())
            .find(|c| !c.is_empty())
    });
    if let Some(title) = og_title {
        return title;
    }

    for raw in ["title", "h1"] {
        if let Some(selector) = parse_selector(raw) {
            if let Some(title) = document.select(&selector).map(|e| element_text(&e)).find(|t| !t.is_empty()) {
                return title;
            }
        }
    }

    String::new()
}

/// Extraction of a full HTML page: selectors, then readability scoring, then `<body>`
pub fn extract_readable(html: &str, page_url: &str, selectors: &SelectorSet) -> NormalizedDocument {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let title = extract_title(&document, selectors);
    let mut blocks = match find_selected_content(&document, selectors) {
        Some(main) => element_to_blocks(&main, base.as_ref()),
        None => scored_content_blocks(html, base.as_ref())
            .filter(|blocks| !blocks.is_empty())
            .unwrap_or_else(|| body_blocks(&document, base.as_ref())),
    };

    // The page title usually repeats as the first heading
    let repeated_title = matches!(blocks.first(), Some(ContentBlock::Heading { text, .. }) if text.trim() == title);
    if repeated_title {
        blocks.remove(0);
    }

    NormalizedDocument::from_blocks(title, page_url, blocks).with_metadata(extract_metadata(&document))
}
