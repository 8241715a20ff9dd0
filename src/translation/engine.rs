/*!
 * Translation execution and reassembly.
 *
 * Units are translated one at a time in plan order. A unit that keeps
 * failing after its retries is left untranslated and its original text is
 * substituted on output; the run only fails when no unit at all could be
 * translated. Cancellation is observed between calls.
 */

use async_trait::async_trait;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::chunker::{ChunkPlan, TranslationUnit};
use crate::document::BlockKind;
use crate::errors::{ProviderError, TranslationError};

static SEGMENT_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"<<\s*SEG_(\d+)\s*>>").unwrap());
static END_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"<<\s*END\s*>>").unwrap());
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Capability turning a text into its translation
#[async_trait]
pub trait Translate: Send + Sync {
    /// Translate `text` into `target_language`
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, ProviderError>;
}

/// How the body is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationMode {
    /// Blocks verbatim, no translation call
    Original,
    /// Translated text only
    Translated,
    /// Each block followed by its translation
    Both,
}

impl TranslationMode {
    /// Whether the mode needs translated output
    pub fn requires_translation(&self) -> bool {
        !matches!(self, Self::Original)
    }
}

impl fmt::Display for TranslationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Original => "original",
            Self::Translated => "translated",
            Self::Both => "both",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for TranslationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "original" | "raw" | "none" => Ok(Self::Original),
            "translated" | "trans" | "translate" => Ok(Self::Translated),
            "both" | "bilingual" => Ok(Self::Both),
            _ => Err(anyhow::anyhow!("Invalid translation mode: {}", s)),
        }
    }
}

/// Shared interrupt flag, checked at chunk boundaries
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every run holding a clone of this flag
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Retry and timeout policy of translation calls
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Language every call translates into
    pub target_language: String,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff before the first retry, doubled for each further retry
    pub backoff_base: Duration,
    /// Bound on a single call
    pub call_timeout: Duration,
}

impl EngineOptions {
    pub fn new(target_language: impl Into<String>) -> Self {
        Self {
            target_language: target_language.into(),
            max_retries: 3,
            backoff_base: Duration::from_millis(1000),
            call_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_retries(mut self, max_retries: u32, backoff_base: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff_base = backoff_base;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

/// Whether a rendered segment holds source or translated text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentRole {
    Original,
    Translated,
}

/// One Markdown block of the output body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedSegment {
    /// Index of the source block
    pub block_index: usize,
    /// Structural tag of the source block
    pub kind: BlockKind,
    pub role: SegmentRole,
    /// Markdown text
    pub text: String,
    /// A translated segment that carries the original text because its chunk failed
    pub substituted: bool,
}

/// Output of a translation run, consumed by the output writers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub mode: TranslationMode,
    pub title: String,
    pub translated_title: Option<String>,
    /// Rendered segments in reading order
    pub body: Vec<RenderedSegment>,
    /// Non-fatal problems, one line each
    pub warnings: Vec<String>,
    /// Units that needed a translation call
    pub chunks_total: usize,
    /// Units left untranslated after all retries
    pub chunks_failed: usize,
}

impl TranslationResult {
    /// Title for display and file naming: translated when available
    pub fn display_title(&self) -> &str {
        self.translated_title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.title)
    }

    /// Body as Markdown, blocks separated by blank lines
    pub fn body_markdown(&self) -> String {
        self.body
            .iter()
            .map(|s| s.text.as_str())
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Whether any chunk fell back to its original text
    pub fn is_partial(&self) -> bool {
        self.chunks_failed > 0
    }
}

/// Wrap the segments of a multi-segment unit in numbered markers
pub fn build_marked_payload(segments: &[&str]) -> String {
    let mut payload = String::new();
    for (i, text) in segments.iter().enumerate() {
        payload.push_str(&format!("<<SEG_{}>>\n{}\n", i + 1, text));
    }
    payload.push_str("<<END>>");
    payload
}

/// Recover `expected` segment translations from a response.
///
/// Markers must appear once each, numbered 1..=expected. A response without
/// any marker is accepted when its blank-line paragraphs match the count.
pub fn parse_marked_response(response: &str, expected: usize) -> Option<Vec<String>> {
    let response = match END_MARKER.find(response) {
        Some(end) => &response[..end.start()],
        None => response,
    };

    let markers: Vec<(usize, usize, usize)> = SEGMENT_MARKER
        .captures_iter(response)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps[1].parse::<usize>().ok()?;
            Some((number, whole.start(), whole.end()))
        })
        .collect();

    if markers.is_empty() {
        let paragraphs: Vec<String> = BLANK_LINES
            .split(response.trim())
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        return (paragraphs.len() == expected).then_some(paragraphs);
    }

    if markers.len() != expected || markers.iter().enumerate().any(|(i, (n, _, _))| *n != i + 1) {
        return None;
    }

    let texts: Vec<String> = markers
        .iter()
        .enumerate()
        .map(|(i, (_, _, content_start))| {
            let content_end = markers.get(i + 1).map_or(response.len(), |(_, start, _)| *start);
            response[*content_start..content_end].trim().to_string()
        })
        .collect();

    if texts.iter().any(|t| t.is_empty()) {
        return None;
    }
    Some(texts)
}

/// Whether `response` is an acceptable answer to `payload`.
///
/// A marked payload needs every segment back; a plain one any non-empty text.
pub fn response_fits_payload(payload: &str, response: &str) -> bool {
    let expected = SEGMENT_MARKER.find_iter(payload).count();
    if expected == 0 {
        return !response.trim().is_empty();
    }
    parse_marked_response(response, expected).is_some()
}

fn attempt_delay(options: &EngineOptions, attempt: u32) -> Duration {
    options.backoff_base * (1u32 << (attempt - 1).min(16))
}

/// Run one call with timeout, output validation and retries
async fn call_with_retry<T, F>(
    translator: &dyn Translate,
    payload: &str,
    options: &EngineOptions,
    cancel: &CancellationFlag,
    label: &str,
    accept: F,
) -> Result<T, TranslationError>
where
    F: Fn(String) -> Option<T>,
{
    let mut attempt = 0u32;
    loop {
        let outcome = match tokio::time::timeout(
            options.call_timeout,
            translator.translate(payload, &options.target_language),
        )
        .await
        {
            Ok(Ok(text)) => accept(text).ok_or_else(|| {
                ProviderError::ParseError(format!("{} response did not match the requested segments", label))
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProviderError::Timeout(format!(
                "{} not translated within {:?}",
                label, options.call_timeout
            ))),
        };

        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !error.is_transient() {
            return Err(TranslationError::Provider(error));
        }
        if attempt >= options.max_retries {
            return Err(TranslationError::ProviderUnavailable(format!(
                "{} failed after {} attempt(s): {}",
                label,
                attempt + 1,
                error
            )));
        }
        if cancel.is_cancelled() {
            return Err(TranslationError::Cancelled);
        }

        attempt += 1;
        let delay = attempt_delay(options, attempt);
        warn!("{} failed ({}), retry {}/{} in {:?}", label, error, attempt, options.max_retries, delay);
        tokio::time::sleep(delay).await;
    }
}

/// Translate the segments of one unit, in segment order
async fn translate_unit(
    unit: &TranslationUnit,
    total: usize,
    translator: &dyn Translate,
    options: &EngineOptions,
    cancel: &CancellationFlag,
) -> Result<Vec<String>, TranslationError> {
    let payloads: Vec<&str> = unit.translatable_segments().map(|s| s.payload()).collect();
    let label = format!("Chunk {}/{}", unit.index + 1, total);

    if let [single] = payloads.as_slice() {
        return call_with_retry(translator, single, options, cancel, &label, |text| {
            let text = text.trim().to_string();
            (!text.is_empty()).then(|| vec![text])
        })
        .await;
    }

    let expected = payloads.len();
    let marked = build_marked_payload(&payloads);
    call_with_retry(translator, &marked, options, cancel, &label, |text| {
        parse_marked_response(&text, expected)
    })
    .await
}

/// Per-segment translations of a plan, `None` where the unit failed
type SegmentTranslations = Vec<Vec<Option<String>>>;

fn reassemble(plan: &ChunkPlan, mode: TranslationMode, translations: &SegmentTranslations) -> Vec<RenderedSegment> {
    struct BlockText {
        kind: BlockKind,
        translatable: bool,
        original: String,
        translated: String,
        substituted: bool,
    }

    let mut blocks: Vec<BlockText> = Vec::with_capacity(plan.block_count);
    for (unit, unit_translations) in plan.units.iter().zip(translations) {
        let mut translated_iter = unit_translations.iter();
        for segment in &unit.segments {
            if blocks.len() <= segment.block_index {
                blocks.push(BlockText {
                    kind: segment.kind,
                    translatable: segment.translatable,
                    original: String::new(),
                    translated: String::new(),
                    substituted: false,
                });
            }
            let Some(block) = blocks.get_mut(segment.block_index) else {
                continue;
            };

            block.original.push_str(&segment.text);
            if !segment.translatable {
                continue;
            }
            match translated_iter.next().and_then(|t| t.as_deref()) {
                Some(text) => block.translated.push_str(text),
                None => {
                    block.translated.push_str(segment.payload());
                    block.substituted = true;
                }
            }
            block.translated.push_str(segment.trailing_separator());
        }
    }

    let mut body = Vec::with_capacity(blocks.len() * 2);
    for (block_index, block) in blocks.into_iter().enumerate() {
        let original = RenderedSegment {
            block_index,
            kind: block.kind,
            role: SegmentRole::Original,
            text: block.kind.render(block.original.trim_end()),
            substituted: false,
        };
        let translated = RenderedSegment {
            block_index,
            kind: block.kind,
            role: SegmentRole::Translated,
            text: block.kind.render(block.translated.trim_end()),
            substituted: block.substituted,
        };

        match (mode, block.translatable) {
            (TranslationMode::Original, _) | (_, false) => body.push(original),
            (TranslationMode::Translated, true) => body.push(translated),
            (TranslationMode::Both, true) => {
                body.push(original);
                body.push(translated);
            }
        }
    }
    body
}

/// Translate a plan and reassemble its body according to `mode`.
///
/// Units are processed strictly in order; `Original` mode never calls the
/// translator. Each translated unit gets its `translated_text` set.
pub async fn translate(
    plan: &mut ChunkPlan,
    mode: TranslationMode,
    translator: &dyn Translate,
    options: &EngineOptions,
    cancel: &CancellationFlag,
) -> Result<TranslationResult, TranslationError> {
    let chunks_total = plan.translatable_units();
    let mut translations: SegmentTranslations = plan
        .units
        .iter()
        .map(|u| vec![None; u.translatable_segments().count()])
        .collect();

    if !mode.requires_translation() {
        return Ok(TranslationResult {
            mode,
            title: plan.title.clone(),
            translated_title: None,
            body: reassemble(plan, mode, &translations),
            warnings: Vec::new(),
            chunks_total,
            chunks_failed: 0,
        });
    }

    if cancel.is_cancelled() {
        return Err(TranslationError::Cancelled);
    }

    let mut warnings = Vec::new();
    let translated_title = if plan.title.trim().is_empty() {
        None
    } else {
        match call_with_retry(translator, plan.title.trim(), options, cancel, "Title", |text| {
            let text = text.trim().to_string();
            (!text.is_empty()).then_some(text)
        })
        .await
        {
            Ok(title) => Some(title),
            Err(TranslationError::Cancelled) => return Err(TranslationError::Cancelled),
            Err(e) => {
                warn!("Title kept untranslated: {}", e);
                warnings.push(format!("Title could not be translated: {}", e));
                None
            }
        }
    };

    info!("Translating {} chunk(s) into {}", chunks_total, options.target_language);
    let unit_count = plan.units.len();
    let mut chunks_failed = 0;
    for (unit, slots) in plan.units.iter_mut().zip(translations.iter_mut()) {
        if !unit.needs_translation() {
            continue;
        }
        if cancel.is_cancelled() {
            return Err(TranslationError::Cancelled);
        }

        match translate_unit(unit, unit_count, translator, options, cancel).await {
            Ok(texts) => {
                debug!("Chunk {}/{} translated ({} chars)", unit.index + 1, unit_count, unit.size_estimate());
                unit.translated_text = Some(texts.join("\n\n"));
                for (slot, text) in slots.iter_mut().zip(texts) {
                    *slot = Some(text);
                }
                info!("Chunk {}/{} done", unit.index + 1, unit_count);
            }
            Err(TranslationError::Cancelled) => return Err(TranslationError::Cancelled),
            Err(e) => {
                chunks_failed += 1;
                warn!("Chunk {}/{} kept in original language: {}", unit.index + 1, unit_count, e);
                warnings.push(format!(
                    "Chunk {} of {} was not translated; original text kept ({})",
                    unit.index + 1,
                    unit_count,
                    e
                ));
            }
        }
    }

    if chunks_total > 0 && chunks_failed == chunks_total {
        return Err(TranslationError::AllChunksFailed { chunks: chunks_total });
    }
    if chunks_failed > 0 {
        warn!("{} of {} chunk(s) left untranslated", chunks_failed, chunks_total);
    }

    Ok(TranslationResult {
        mode,
        title: plan.title.clone(),
        translated_title,
        body: reassemble(plan, mode, &translations),
        warnings,
        chunks_total,
        chunks_failed,
    })
}
