/*!
 * Extraction strategies.
 *
 * Pure functions from fetched material (HTML, JSON, API payloads) to a
 * `NormalizedDocument`. Nothing in this module touches the network, so
 * running a strategy twice on the same input yields the same document.
 */

use serde::{Deserialize, Serialize};

pub mod html;
pub mod metadata;
pub mod readable;
pub mod structured;

pub use html::{fragment_to_blocks, text_to_blocks};
pub use readable::extract_readable;
pub use structured::{extract_json_ld, extract_microdata, extract_open_graph};

/// CSS selectors steering the DOM heuristic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSet {
    /// Candidate body containers, tried in order before scoring
    pub content: Vec<String>,
    /// Candidate title elements, tried before `og:title` / `<title>`
    pub title: Vec<String>,
}

impl SelectorSet {
    /// Site-specific selectors
    pub fn new<C, T>(content: C, title: T) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            content: content.into_iter().map(Into::into).collect(),
            title: title.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for SelectorSet {
    /// Common article containers
    fn default() -> Self {
        Self::new(
            [
                "article",
                "main",
                "[role='main']",
                ".post-content",
                ".article-content",
                ".entry-content",
                "#content",
                ".content",
            ],
            Vec::<String>::new(),
        )
    }
}
