/*!
 * # pagewise
 *
 * Fetch a web page's substantive content, normalize it to structured
 * Markdown and optionally translate it with an LLM, chunk by chunk.
 *
 * ## Features
 *
 * - Cheap HTTP fetch with escalation to a headless Chromium render for
 *   script-only or bot-gated pages
 * - Per-site adapters (Twitter/X, WeChat, Xiaohongshu, Mastodon) trying
 *   official APIs, structured data and DOM heuristics in order
 * - Readability-style extraction with JSON-LD, microdata and Open Graph fallbacks
 * - Budget-bounded chunking with sequential, retried translation and
 *   per-chunk fallback to the original text
 * - Original, translated and bilingual output
 *
 * ## Architecture
 *
 * - `fetch`: lightweight and rendered acquisition
 * - `extract`: pure extraction strategies
 * - `adapters`: site adapter registry and credential store
 * - `translation`: chunk planning, translation engine, provider-backed service
 * - `providers`: Ollama, OpenAI-compatible and Anthropic clients
 * - `pipeline`: run orchestration and mode resolution
 * - `output`: Markdown writer
 * - `app_controller`: wiring from configuration
 * - `errors`: error taxonomy
 */

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

pub mod adapters;
pub mod app_config;
pub mod app_controller;
pub mod document;
pub mod errors;
pub mod extract;
pub mod fetch;
pub mod language_utils;
pub mod output;
pub mod pipeline;
pub mod providers;
pub mod translation;

pub use app_config::Config;
pub use document::{ContentBlock, NormalizedDocument};
pub use errors::{ExtractionError, FetchError, PipelineError, ProviderError, TranslationError};
pub use language_utils::{detect_language, get_language_name, language_codes_match};
pub use pipeline::{Pipeline, PipelineOutput, RunOptions};
pub use translation::{TranslationMode, TranslationService};
