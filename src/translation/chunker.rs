/*!
 * Chunk planning.
 *
 * Walks a document's blocks in reading order and packs them into
 * translation units that stay under a character budget. A block is only
 * split when it alone exceeds the budget, and then at the largest
 * available boundary: paragraph, line, sentence, clause, word, and for
 * scripts written without spaces, between characters.
 *
 * Pieces keep their trailing separators, so concatenating the pieces of
 * a block reproduces its text exactly.
 */

use serde::{Deserialize, Serialize};

use crate::document::{BlockKind, ContentBlock, NormalizedDocument};

/// Characters added between two segments of the same unit
const SEGMENT_SEPARATOR_COST: usize = 2;

/// A block, or a piece of a block, inside a translation unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSegment {
    /// Index of the source block in the document
    pub block_index: usize,
    /// Structural tag of the source block
    pub kind: BlockKind,
    /// Exact text of the piece, trailing separator included
    pub text: String,
    /// Whether the piece is sent to the translator
    pub translatable: bool,
}

impl ChunkSegment {
    /// Text sent to the translator
    pub fn payload(&self) -> &str {
        self.text.trim()
    }

    /// Whitespace that followed the piece in its block
    pub fn trailing_separator(&self) -> &str {
        &self.text[self.text.trim_end().len()..]
    }
}

/// One bounded call's worth of document text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationUnit {
    /// Position in the plan, starting at 0
    pub index: usize,
    /// Translatable text of the unit, segments separated by blank lines
    pub original_text: String,
    /// Set by the engine once the unit has been translated
    pub translated_text: Option<String>,
    /// Segments in reading order
    pub segments: Vec<ChunkSegment>,
}

impl TranslationUnit {
    fn new(index: usize) -> Self {
        Self {
            index,
            original_text: String::new(),
            translated_text: None,
            segments: Vec::new(),
        }
    }

    /// Segments sent to the translator
    pub fn translatable_segments(&self) -> impl Iterator<Item = &ChunkSegment> {
        self.segments.iter().filter(|s| s.translatable)
    }

    /// Whether the unit needs a translation call at all
    pub fn needs_translation(&self) -> bool {
        self.translatable_segments().next().is_some()
    }

    /// Size estimate checked against the budget
    pub fn size_estimate(&self) -> usize {
        let (count, total) = self
            .translatable_segments()
            .fold((0usize, 0usize), |(n, sum), s| (n + 1, sum + estimate_size(s.payload())));
        total + count.saturating_sub(1) * SEGMENT_SEPARATOR_COST
    }

    fn push(&mut self, segment: ChunkSegment) {
        if segment.translatable {
            if !self.original_text.is_empty() {
                self.original_text.push_str("\n\n");
            }
            self.original_text.push_str(segment.payload());
        }
        self.segments.push(segment);
    }
}

/// Ordered translation units of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPlan {
    /// Document title, translated by a dedicated call
    pub title: String,
    /// Budget the plan was built with
    pub budget: usize,
    /// Number of blocks in the source document
    pub block_count: usize,
    /// Units in chunk order, which is also block order
    pub units: Vec<TranslationUnit>,
}

impl ChunkPlan {
    /// Number of units that need a translation call
    pub fn translatable_units(&self) -> usize {
        self.units.iter().filter(|u| u.needs_translation()).count()
    }

    /// All segments in reading order
    pub fn segments(&self) -> impl Iterator<Item = &ChunkSegment> {
        self.units.iter().flat_map(|u| u.segments.iter())
    }

    /// Markdown of each source block, rebuilt by concatenating its pieces
    pub fn reassemble_original(&self) -> Vec<String> {
        let mut blocks: Vec<(BlockKind, String)> = Vec::with_capacity(self.block_count);
        for segment in self.segments() {
            match blocks.get_mut(segment.block_index) {
                Some((_, text)) => text.push_str(&segment.text),
                None => blocks.push((segment.kind, segment.text.clone())),
            }
        }
        blocks.into_iter().map(|(kind, text)| kind.render(&text)).collect()
    }
}

/// Size of a text as counted against the chunk budget
pub fn estimate_size(text: &str) -> usize {
    text.trim().chars().count()
}

#[derive(Debug, Clone, Copy)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Clause,
    Word,
    Glyph,
}

const BOUNDARIES: [Boundary; 6] = [
    Boundary::Paragraph,
    Boundary::Line,
    Boundary::Sentence,
    Boundary::Clause,
    Boundary::Word,
    Boundary::Glyph,
];

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | ';' | '。' | '！' | '？' | '；' | '…')
}

fn is_cjk_sentence_end(c: char) -> bool {
    matches!(c, '。' | '！' | '？' | '；' | '…')
}

fn is_clause_end(c: char) -> bool {
    matches!(c, '，' | '、' | '：' | '﹐' | '､')
}

/// Characters of scripts that do not separate words with spaces
fn is_unspaced_script(c: char) -> bool {
    matches!(c,
        '\u{3000}'..='\u{303F}'   // CJK symbols and punctuation
        | '\u{3040}'..='\u{30FF}' // Hiragana, Katakana
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{FF00}'..='\u{FFEF}' // fullwidth forms
    )
}

/// Split after each boundary, keeping the separator on the left piece
fn split_at(text: &str, boundary: Boundary) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i].1;
        let next = chars.get(i + 1).map(|(_, n)| *n);
        let is_break = match boundary {
            Boundary::Paragraph => c == '\n' && next == Some('\n'),
            Boundary::Line => c == '\n',
            Boundary::Sentence => {
                is_sentence_end(c) && (is_cjk_sentence_end(c) || next.is_none_or(char::is_whitespace))
            }
            Boundary::Clause => is_clause_end(c),
            Boundary::Word => c.is_whitespace(),
            Boundary::Glyph => next.is_some_and(|n| is_unspaced_script(c) || is_unspaced_script(n)),
        };
        if !is_break {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < chars.len() && chars[j].1.is_whitespace() {
            j += 1;
        }
        let end = chars.get(j).map_or(text.len(), |(pos, _)| *pos);
        // Leading whitespace stays with the piece that follows it
        if end < text.len() && !text[start..end].trim().is_empty() {
            parts.push(&text[start..end]);
            start = end;
        }
        i = j;
    }

    if start < text.len() {
        parts.push(&text[start..]);
    }
    parts
}

/// Split an oversized text into pieces that each fit the budget.
///
/// A piece only exceeds the budget when it is a single space-delimited word.
fn split_text(text: &str, budget: usize) -> Vec<String> {
    if estimate_size(text) <= budget {
        return vec![text.to_string()];
    }

    for boundary in BOUNDARIES {
        let parts = split_at(text, boundary);
        if parts.len() < 2 {
            continue;
        }

        let mut pieces = Vec::new();
        let mut current = String::new();
        for part in parts {
            if estimate_size(part) > budget {
                if !current.is_empty() {
                    pieces.push(std::mem::take(&mut current));
                }
                pieces.extend(split_text(part, budget));
            } else if !current.is_empty() && estimate_size(&format!("{current}{part}")) > budget {
                pieces.push(std::mem::replace(&mut current, part.to_string()));
            } else {
                current.push_str(part);
            }
        }
        if !current.is_empty() {
            pieces.push(current);
        }
        return pieces;
    }

    vec![text.to_string()]
}

/// Fold whitespace-only pieces into a neighbour so every piece has a payload
fn merge_blank_pieces(pieces: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(pieces.len());
    let mut pending = String::new();
    for piece in pieces {
        if piece.trim().is_empty() {
            pending.push_str(&piece);
        } else {
            merged.push(std::mem::take(&mut pending) + &piece);
        }
    }
    if !pending.is_empty() {
        match merged.last_mut() {
            Some(last) => last.push_str(&pending),
            None => merged.push(pending),
        }
    }
    merged
}

fn block_segments(index: usize, block: &ContentBlock, budget: usize) -> Vec<ChunkSegment> {
    let kind = block.kind();
    match block.translatable_text().filter(|text| !text.trim().is_empty()) {
        Some(text) => merge_blank_pieces(split_text(&text, budget))
            .into_iter()
            .map(|text| ChunkSegment { block_index: index, kind, text, translatable: true })
            .collect(),
        None => vec![ChunkSegment {
            block_index: index,
            kind,
            text: block.to_markdown(),
            translatable: false,
        }],
    }
}

/// Pack a document's blocks into translation units under `budget` characters.
///
/// A budget of zero is treated as one.
pub fn plan_chunks(doc: &NormalizedDocument, budget: usize) -> ChunkPlan {
    let budget = budget.max(1);
    let mut units: Vec<TranslationUnit> = Vec::new();
    let mut current = TranslationUnit::new(0);
    let mut current_size = 0usize;

    for (index, block) in doc.blocks().iter().enumerate() {
        for segment in block_segments(index, block, budget) {
            if segment.translatable {
                let size = estimate_size(segment.payload());
                let cost = if current_size == 0 { size } else { size + SEGMENT_SEPARATOR_COST };
                if current.needs_translation() && current_size + cost > budget {
                    let next = TranslationUnit::new(units.len() + 1);
                    units.push(std::mem::replace(&mut current, next));
                    current_size = size;
                } else {
                    current_size += cost;
                }
            }
            current.push(segment);
        }
    }
    if !current.segments.is_empty() {
        units.push(current);
    }

    ChunkPlan {
        title: doc.title.clone(),
        budget,
        block_count: doc.blocks().len(),
        units,
    }
}
