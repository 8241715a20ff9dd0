/*!
 * Translation of normalized documents.
 *
 * - `chunker`: splits a document into budget-bounded translation units
 * - `engine`: translates units in order with retries and reassembles the body per mode
 * - `core`: the provider-backed `Translate` capability
 * - `cache`: in-memory cache used by the service
 */

pub use self::chunker::{ChunkPlan, ChunkSegment, TranslationUnit, estimate_size, plan_chunks};
pub use self::core::TranslationService;
pub use self::engine::{
    CancellationFlag, EngineOptions, RenderedSegment, SegmentRole, Translate, TranslationMode,
    TranslationResult, response_fits_payload, translate,
};

pub mod cache;
pub mod chunker;
pub mod core;
pub mod engine;
