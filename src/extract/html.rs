//! HTML to `ContentBlock` conversion.
//!
//! Walks an element tree in document order, folding inline content into
//! Markdown-flavoured paragraph text and emitting one block per structural
//! element. URLs are resolved against the page URL.

use scraper::node::Node;
use scraper::{ElementRef, Html};
use std::collections::BTreeMap;
use url::Url;

use crate::document::ContentBlock;

// Elements never converted
const SKIPPED: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "footer", "aside", "form", "button",
    "input", "select", "textarea", "svg", "canvas", "head", "link", "meta",
];

// Elements that end the current inline run
const BLOCK_LEVEL: &[&str] = &[
    "p", "div", "section", "article", "main", "header", "h1", "h2", "h3", "h4", "h5", "h6",
    "ul", "ol", "li", "dl", "dt", "dd", "blockquote", "pre", "table", "figure", "figcaption",
    "img", "picture", "iframe", "video", "audio", "hr", "center", "body", "html",
];

// Attributes carrying the real source of lazy-loaded images, most specific first
const LAZY_IMAGE_ATTRS: &[&str] = &["data-src", "data-original", "data-url", "data-lazy-src", "data-actualsrc"];

/// Resolve a possibly relative or protocol-relative URL against the page URL
pub fn absolutize(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("javascript:") {
        return None;
    }
    if let Ok(url) = Url::parse(raw) {
        return Some(url.to_string());
    }
    match base {
        Some(base) => base.join(raw).ok().map(|u| u.to_string()),
        None if raw.starts_with("//") => Some(format!("https:{}", raw)),
        None => Some(raw.to_string()),
    }
}

fn first_srcset_candidate(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .find(|u| !u.is_empty())
}

/// Real source of an `<img>`, preferring lazy-loading attributes over placeholder `src`
pub fn image_source(img: &ElementRef, base: Option<&Url>) -> Option<String> {
    let element = img.value();

    let lazy = LAZY_IMAGE_ATTRS.iter().find_map(|attr| element.attr(attr));
    let srcset = element
        .attr("data-srcset")
        .or_else(|| element.attr("srcset"))
        .and_then(first_srcset_candidate);
    let src = element.attr("src").filter(|s| !s.starts_with("data:"));

    lazy.or(srcset).or(src).and_then(|raw| absolutize(raw, base))
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for c in text.chars() {
        if c.is_whitespace() && c != '\n' {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = c == '\n';
        }
    }
    out
}

fn tidy(text: &str) -> String {
    collapse_whitespace(text)
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Plain text of an element with whitespace collapsed
pub fn element_text(element: &ElementRef) -> String {
    tidy(&element.text().collect::<Vec<_>>().join(" "))
}

fn wrap_inline(marker: &str, inner: &str) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}{}{}", marker, trimmed, marker)
    }
}

/// Inline Markdown of an element's content (links, emphasis, code, line breaks)
fn inline_markdown(element: &ElementRef, base: Option<&Url>) -> String {
    let mut out = String::new();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&text.replace('\n', " ")),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    out.push_str(&inline_element(&child_el, base));
                }
            }
            _ => {}
        }
    }
    out
}

/// Inline Markdown of a single element, including its own wrapper
fn inline_element(element: &ElementRef, base: Option<&Url>) -> String {
    let name = element.value().name();
    if SKIPPED.contains(&name) || name == "img" {
        return String::new();
    }
    let inner = inline_markdown(element, base);
    match name {
        "br" => "\n".to_string(),
        "strong" | "b" => wrap_inline("**", &inner),
        "em" | "i" => wrap_inline("*", &inner),
        "code" => wrap_inline("`", &inner),
        "a" => match element.value().attr("href").and_then(|h| absolutize(h, base)) {
            Some(href) if !inner.trim().is_empty() && !href.starts_with('#') => {
                format!("[{}]({})", inner.trim(), href)
            }
            _ => inner,
        },
        _ => inner,
    }
}

/// Accumulates blocks while walking the tree
struct BlockWriter<'a> {
    base: Option<&'a Url>,
    blocks: Vec<ContentBlock>,
    inline: String,
}

impl<'a> BlockWriter<'a> {
    fn new(base: Option<&'a Url>) -> Self {
        Self { base, blocks: Vec::new(), inline: String::new() }
    }

    fn flush_inline(&mut self) {
        let text = tidy(&self.inline);
        self.inline.clear();
        if !text.is_empty() {
            self.blocks.push(ContentBlock::paragraph(text));
        }
    }

    fn push(&mut self, block: ContentBlock) {
        if !block.is_empty() {
            self.blocks.push(block);
        }
    }

    fn push_images_within(&mut self, element: &ElementRef) {
        for descendant in element.descendants().filter_map(ElementRef::wrap) {
            if descendant.value().name() == "img" {
                self.push_image(&descendant);
            }
        }
    }

    fn push_image(&mut self, img: &ElementRef) {
        if let Some(url) = image_source(img, self.base) {
            let alt = img.value().attr("alt").unwrap_or_default().trim().to_string();
            self.push(ContentBlock::image(url, alt));
        }
    }

    fn walk_children(&mut self, element: &ElementRef) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.inline.push_str(text),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.visit(&child_el);
                    }
                }
                _ => {}
            }
        }
    }

    fn visit(&mut self, element: &ElementRef) {
        let name = element.value().name();
        if SKIPPED.contains(&name) || element.value().attr("hidden").is_some() {
            return;
        }

        if !BLOCK_LEVEL.contains(&name) {
            // Inline element: keep in the current run, images excepted
            let has_image = element.descendants().filter_map(ElementRef::wrap).any(|e| e.value().name() == "img");
            if has_image {
                self.flush_inline();
                self.push_images_within(element);
            }
            self.inline.push_str(&inline_element(element, self.base));
            return;
        }

        self.flush_inline();
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<u8>().unwrap_or(2);
                self.push(ContentBlock::heading(level, tidy(&inline_markdown(element, self.base))));
            }
            "p" | "dt" | "dd" | "figcaption" => {
                let text = tidy(&inline_markdown(element, self.base));
                self.push(ContentBlock::paragraph(text));
                self.push_images_within(element);
            }
            "img" => self.push_image(element),
            "blockquote" => {
                let mut nested = BlockWriter::new(self.base);
                nested.walk_children(element);
                nested.flush_inline();
                let text = nested
                    .blocks
                    .iter()
                    .filter_map(|b| b.translatable_text())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                self.push(ContentBlock::quote(text));
            }
            "ul" | "ol" => self.push_list(element, name == "ol"),
            "li" => {
                let text = tidy(&inline_markdown(element, self.base));
                self.push(ContentBlock::paragraph(format!("- {}", text)));
            }
            "pre" => {
                let code = element.text().collect::<String>();
                if !code.trim().is_empty() {
                    self.push(ContentBlock::paragraph(format!("```\n{}\n```", code.trim_end())));
                }
            }
            "table" => self.push_table(element),
            "iframe" | "video" | "audio" => self.push_embed(element),
            "hr" => {}
            _ => {
                self.walk_children(element);
                self.flush_inline();
            }
        }
    }

    fn push_list(&mut self, list: &ElementRef, ordered: bool) {
        let items = list
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|e| e.value().name() == "li");
        for (i, item) in items.enumerate() {
            let text = tidy(&inline_markdown(&item, self.base));
            if text.is_empty() {
                self.push_images_within(&item);
                continue;
            }
            let bullet = if ordered { format!("{}.", i + 1) } else { "-".to_string() };
            self.push(ContentBlock::paragraph(format!("{} {}", bullet, text)));
            self.push_images_within(&item);
        }
    }

    fn push_table(&mut self, table: &ElementRef) {
        let rows: Vec<Vec<String>> = table
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|e| e.value().name() == "tr")
            .map(|tr| {
                tr.children()
                    .filter_map(ElementRef::wrap)
                    .filter(|c| matches!(c.value().name(), "td" | "th"))
                    .map(|cell| tidy(&inline_markdown(&cell, self.base)).replace('\n', " "))
                    .collect::<Vec<_>>()
            })
            .filter(|row| !row.is_empty())
            .collect();
        self.push(ContentBlock::Table { rows });
    }

    fn push_embed(&mut self, element: &ElementRef) {
        let mut metadata = BTreeMap::new();
        metadata.insert("kind".to_string(), element.value().name().to_string());
        let src = element.value().attr("src").or_else(|| element.value().attr("data-src"));
        if let Some(url) = src.and_then(|s| absolutize(s, self.base)) {
            if let Ok(parsed) = Url::parse(&url) {
                if let Some(host) = parsed.host_str() {
                    metadata.insert("provider".to_string(), host.to_string());
                }
            }
            metadata.insert("url".to_string(), url);
        }
        if let Some(title) = element.value().attr("title") {
            metadata.insert("title".to_string(), title.trim().to_string());
        }
        if metadata.len() > 1 {
            self.push(ContentBlock::Embed { metadata });
        }
    }

    fn finish(mut self) -> Vec<ContentBlock> {
        self.flush_inline();
        self.blocks
    }
}

/// Convert an element subtree into content blocks in reading order
pub fn element_to_blocks(element: &ElementRef, base: Option<&Url>) -> Vec<ContentBlock> {
    let mut writer = BlockWriter::new(base);
    writer.visit(element);
    writer.finish()
}

/// Convert an HTML fragment (API payloads, embedded bodies) into content blocks
pub fn fragment_to_blocks(fragment: &str, base: Option<&Url>) -> Vec<ContentBlock> {
    let html = Html::parse_fragment(fragment);
    let mut writer = BlockWriter::new(base);
    writer.walk_children(&html.root_element());
    writer.finish()
}

/// Split plain text into paragraph blocks at blank lines (single newlines when there are none)
pub fn text_to_blocks(text: &str) -> Vec<ContentBlock> {
    let normalized = text.replace("\r\n", "\n");
    let separator = if normalized.contains("\n\n") { "\n\n" } else { "\n" };
    normalized
        .split(separator)
        .map(tidy)
        .filter(|p| !p.is_empty())
        .map(ContentBlock::paragraph)
        .collect()
}
