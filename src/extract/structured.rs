//! Open structured-data formats: JSON-LD, microdata and Open Graph.
//!
//! Each function returns a possibly empty document; the adapter registry
//! decides whether the result counts as a success.

use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use super::html::{absolutize, element_text, element_to_blocks, text_to_blocks};
use super::metadata::{extract_metadata, normalize_date, split_keywords};
use crate::document::{ContentBlock, DocumentMetadata, NormalizedDocument};

const ARTICLE_TYPES: &[&str] = &[
    "Article",
    "NewsArticle",
    "BlogPosting",
    "TechArticle",
    "ScholarlyArticle",
    "Report",
    "SocialMediaPosting",
    "DiscussionForumPosting",
];

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn is_article(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => ARTICLE_TYPES.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(|t| t.as_str())
            .any(|t| ARTICLE_TYPES.contains(&t)),
        _ => false,
    }
}

fn collect_articles<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_articles(item, out)),
        Value::Object(_) => {
            if let Some(graph) = value.get("@graph") {
                collect_articles(graph, out);
            }
            if is_article(value) {
                out.push(value);
            }
        }
        _ => {}
    }
}

fn json_ld_author(article: &Value) -> Option<String> {
    let author = article.get("author")?;
    let first = match author {
        Value::Array(items) => items.first()?,
        other => other,
    };
    first
        .get("name")
        .and_then(|n| n.as_str())
        .or_else(|| first.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn json_ld_image(article: &Value) -> Option<String> {
    let image = article.get("image")?;
    match image {
        Value::String(url) => Some(url.clone()),
        Value::Array(items) => items.first().and_then(|first| {
            first.as_str().map(str::to_string).or_else(|| str_field(first, "url"))
        }),
        other => str_field(other, "url"),
    }
}

/// JSON-LD `Article`-family objects: headline and articleBody
pub fn extract_json_ld(html: &str, page_url: &str) -> NormalizedDocument {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return NormalizedDocument::new("", page_url);
    };

    let values: Vec<Value> = document
        .select(&selector)
        .filter_map(|script| serde_json::from_str::<Value>(script.inner_html().trim()).ok())
        .collect();

    let mut articles = Vec::new();
    for value in &values {
        collect_articles(value, &mut articles);
    }

    // Prefer the object that actually carries a body
    let Some(article) = articles
        .iter()
        .copied()
        .max_by_key(|a| str_field(a, "articleBody").map(|b| b.len()).unwrap_or(0))
    else {
        return NormalizedDocument::new("", page_url);
    };

    let title = str_field(article, "headline")
        .or_else(|| str_field(article, "name"))
        .unwrap_or_default();
    let base = Url::parse(page_url).ok();

    let mut blocks = Vec::new();
    if let Some(image) = json_ld_image(article).and_then(|i| absolutize(&i, base.as_ref())) {
        blocks.push(ContentBlock::image(image, title.clone()));
    }
    match str_field(article, "articleBody") {
        Some(body) if body.contains('<') => blocks.extend(super::html::fragment_to_blocks(&body, base.as_ref())),
        Some(body) => blocks.extend(text_to_blocks(&body)),
        None => blocks.extend(str_field(article, "description").map(ContentBlock::paragraph)),
    }

    let mut metadata = extract_metadata(&document);
    if let Some(author) = json_ld_author(article) {
        metadata.author = Some(author);
    }
    if let Some(date) = str_field(article, "datePublished") {
        metadata.published = Some(normalize_date(&date));
    }
    if metadata.tags.is_empty() {
        metadata.tags = str_field(article, "keywords").map(|k| split_keywords(&k)).unwrap_or_default();
    }

    NormalizedDocument::from_blocks(title, page_url, blocks).with_metadata(metadata)
}

/// Microdata: `itemprop="articleBody"` and `itemprop="headline"`
pub fn extract_microdata(html: &str, page_url: &str) -> NormalizedDocument {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let title = Selector::parse(r#"[itemprop="headline"], [itemprop="name"]"#)
        .ok()
        .and_then(|sel| {
            document
                .select(&sel)
                .map(|e| e.value().attr("content").map(str::to_string).unwrap_or_else(|| element_text(&e)))
                .find(|t| !t.trim().is_empty())
        })
        .unwrap_or_default();

    let blocks = Selector::parse(r#"[itemprop="articleBody"], [itemprop="text"]"#)
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|body| element_to_blocks(&body, base.as_ref()))
        .unwrap_or_default();

    NormalizedDocument::from_blocks(title, page_url, blocks).with_metadata(extract_metadata(&document))
}

/// Open Graph (with Twitter card fallbacks): title, description and image
pub fn extract_open_graph(html: &str, page_url: &str) -> NormalizedDocument {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let property = |keys: &[&str]| -> Option<String> {
        keys.iter().find_map(|key| {
            let raw = format!(r#"meta[property="{key}"], meta[name="{key}"]"#);
            let selector = Selector::parse(&raw).ok()?;
            document
                .select(&selector)
                .filter_map(|m| m.value().attr("content"))
                .map(|c| c.trim().to_string())
                .find(|c| !c.is_empty())
        })
    };

    let title = property(&["og:title", "twitter:title"]).unwrap_or_default();
    let mut blocks = Vec::new();
    if let Some(description) = property(&["og:description", "twitter:description", "description"]) {
        blocks.extend(text_to_blocks(&description));
    }
    if let Some(image) = property(&["og:image", "twitter:image"]).and_then(|i| absolutize(&i, base.as_ref())) {
        blocks.push(ContentBlock::image(image, title.clone()));
    }

    let metadata = DocumentMetadata {
        site: property(&["og:site_name"]),
        ..extract_metadata(&document)
    };

    NormalizedDocument::from_blocks(title, page_url, blocks).with_metadata(metadata)
}
