/*!
 * Normalized document model.
 *
 * A `NormalizedDocument` is the structure-preserving representation of a
 * page after extraction. Block order is the canonical reading order and
 * no block is ever empty: `push` silently drops empty blocks.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single structural unit of page content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain paragraph (list items are folded into paragraphs with a bullet)
    Paragraph { text: String },

    /// Section heading, level 1 to 6
    Heading { level: u8, text: String },

    /// Image reference with its alternative text
    Image { url: String, alt_text: String },

    /// Block quotation
    Quote { text: String },

    /// Table as rows of cell text; the first row is the header
    Table { rows: Vec<Vec<String>> },

    /// Opaque embedded object (video, tweet, ...)
    Embed { metadata: BTreeMap<String, String> },
}

/// Structural tag of a block, kept by chunk pieces so reassembly can restore formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading(u8),
    Image,
    Quote,
    Table,
    Embed,
}

impl BlockKind {
    /// Render text carrying this tag back to Markdown.
    ///
    /// Tables and images are rendered by their block; here the text is already Markdown.
    pub fn render(&self, text: &str) -> String {
        match self {
            Self::Heading(level) => format!("{} {}", "#".repeat((*level).clamp(1, 6) as usize), text),
            Self::Quote => text
                .lines()
                .map(|line| if line.is_empty() { ">".to_string() } else { format!("> {}", line) })
                .collect::<Vec<_>>()
                .join("\n"),
            _ => text.to_string(),
        }
    }
}

impl ContentBlock {
    /// Create a paragraph block
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::Paragraph { text: text.into() }
    }

    /// Create a heading block
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self::Heading { level: level.clamp(1, 6), text: text.into() }
    }

    /// Create an image block
    pub fn image(url: impl Into<String>, alt_text: impl Into<String>) -> Self {
        Self::Image { url: url.into(), alt_text: alt_text.into() }
    }

    /// Create a quote block
    pub fn quote(text: impl Into<String>) -> Self {
        Self::Quote { text: text.into() }
    }

    /// Structural tag of this block
    pub fn kind(&self) -> BlockKind {
        match self {
            Self::Paragraph { .. } => BlockKind::Paragraph,
            Self::Heading { level, .. } => BlockKind::Heading(*level),
            Self::Image { .. } => BlockKind::Image,
            Self::Quote { .. } => BlockKind::Quote,
            Self::Table { .. } => BlockKind::Table,
            Self::Embed { .. } => BlockKind::Embed,
        }
    }

    /// Whether the block carries no content
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Paragraph { text } | Self::Heading { text, .. } | Self::Quote { text } => {
                text.trim().is_empty()
            }
            Self::Image { url, .. } => url.trim().is_empty(),
            Self::Table { rows } => rows.iter().all(|row| row.iter().all(|cell| cell.trim().is_empty())),
            Self::Embed { metadata } => metadata.is_empty(),
        }
    }

    /// Text sent to translation, or `None` for blocks that are carried verbatim
    pub fn translatable_text(&self) -> Option<String> {
        match self {
            Self::Paragraph { text } | Self::Heading { text, .. } | Self::Quote { text } => {
                Some(text.clone())
            }
            Self::Table { .. } => Some(self.to_markdown()),
            Self::Image { .. } | Self::Embed { .. } => None,
        }
    }

    /// Plain text content used for language detection
    pub fn plain_text(&self) -> String {
        match self {
            Self::Paragraph { text } | Self::Heading { text, .. } | Self::Quote { text } => text.clone(),
            Self::Table { rows } => rows
                .iter()
                .map(|row| row.join(" "))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Image { alt_text, .. } => alt_text.clone(),
            Self::Embed { .. } => String::new(),
        }
    }

    /// Render the block as Markdown
    pub fn to_markdown(&self) -> String {
        match self {
            Self::Paragraph { text } => text.clone(),
            Self::Heading { level, text } => BlockKind::Heading(*level).render(text),
            Self::Quote { text } => BlockKind::Quote.render(text),
            Self::Image { url, alt_text } => format!("![{}]({})", alt_text.replace(['[', ']'], ""), url),
            Self::Table { rows } => render_table(rows),
            Self::Embed { metadata } => match metadata.get("url") {
                Some(url) => {
                    let label = metadata
                        .get("title")
                        .or_else(|| metadata.get("provider"))
                        .unwrap_or(url);
                    format!("[{}]({})", label, url)
                }
                None => {
                    let attrs = metadata
                        .iter()
                        .map(|(k, v)| format!("{}={}", k, v))
                        .collect::<Vec<_>>()
                        .join(" ");
                    format!("<!-- embed {} -->", attrs)
                }
            },
        }
    }
}

fn render_table(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let format_row = |row: &Vec<String>| {
        let mut cells: Vec<String> = row.iter().map(|c| c.replace('|', "\\|")).collect();
        cells.resize(width, String::new());
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format_row(&rows[0]));
    lines.push(format!("|{}", " --- |".repeat(width)));
    for row in &rows[1..] {
        lines.push(format_row(row));
    }
    lines.join("\n")
}

/// Page metadata carried alongside the blocks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Author or account name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Publication date (YYYY-MM-DD when parseable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,

    /// Keywords
    #[serde(default)]
    pub tags: Vec<String>,

    /// Name of the site adapter that produced the document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
}

/// Structure-preserving representation of page content after extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    /// Document title
    pub title: String,

    /// Language tag, `None` while unknown
    pub language: Option<String>,

    /// Blocks in reading order
    blocks: Vec<ContentBlock>,

    /// URL the content was acquired from
    pub source_url: String,

    /// Additional metadata
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl NormalizedDocument {
    /// Create an empty document
    pub fn new(title: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            title: title.into().trim().to_string(),
            language: None,
            blocks: Vec::new(),
            source_url: source_url.into(),
            metadata: DocumentMetadata::default(),
        }
    }

    /// Create a document from blocks, dropping empty ones
    pub fn from_blocks(
        title: impl Into<String>,
        source_url: impl Into<String>,
        blocks: impl IntoIterator<Item = ContentBlock>,
    ) -> Self {
        let mut doc = Self::new(title, source_url);
        doc.extend(blocks);
        doc
    }

    /// Append a block; empty blocks are dropped
    pub fn push(&mut self, block: ContentBlock) {
        if !block.is_empty() {
            self.blocks.push(block);
        }
    }

    /// Append several blocks; empty blocks are dropped
    pub fn extend(&mut self, blocks: impl IntoIterator<Item = ContentBlock>) {
        for block in blocks {
            self.push(block);
        }
    }

    /// Blocks in reading order
    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    /// Consume the document, returning its blocks
    pub fn into_blocks(self) -> Vec<ContentBlock> {
        self.blocks
    }

    /// Whether neither a title nor any body block is present
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.blocks.is_empty()
    }

    /// Whether the document has body content
    pub fn has_body(&self) -> bool {
        !self.blocks.is_empty()
    }

    /// Plain text of the body, blocks separated by blank lines
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.plain_text())
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Markdown rendering of the body
    pub fn body_markdown(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.to_markdown())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Builder-style setter for metadata
    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
