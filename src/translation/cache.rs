/*!
 * In-memory translation cache.
 *
 * Entries are keyed by model, target language and source text, so a page
 * translated twice in the same process only calls the provider once per
 * distinct chunk.
 */

use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    model: String,
    target_language: String,
    source_text: String,
}

impl CacheKey {
    fn new(model: &str, target_language: &str, source_text: &str) -> Self {
        Self {
            model: model.to_string(),
            target_language: target_language.to_string(),
            source_text: source_text.to_string(),
        }
    }
}

/// Hit and miss counters of a cache
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

/// Translation cache shared by the calls of a service
#[derive(Debug)]
pub struct TranslationCache {
    entries: RwLock<HashMap<CacheKey, String>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    enabled: bool,
}

impl TranslationCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            enabled,
        }
    }

    /// Look up a previous translation
    pub fn get(&self, model: &str, target_language: &str, source_text: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let key = CacheKey::new(model, target_language, source_text);
        let found = self.entries.read().get(&key).cloned();
        match found {
            Some(translation) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for '{}' -> {}", truncate_text(source_text, 30), target_language);
                Some(translation)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn store(&self, model: &str, target_language: &str, source_text: &str, translation: &str) {
        if !self.enabled {
            return;
        }
        self.entries
            .write()
            .insert(CacheKey::new(model, target_language, source_text), translation.to_string());
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Shorten text for log lines, on a character boundary
fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
