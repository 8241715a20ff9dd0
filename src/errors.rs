/*!
 * Error types for the pagewise application.
 *
 * This module contains custom error types for each pipeline stage,
 * using the thiserror crate for ergonomic error definitions.
 */

use std::fmt;
use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    ///
    /// Authentication failures and 4xx responses (other than 408/429) are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_)
            | Self::ParseError(_)
            | Self::ConnectionError(_)
            | Self::RateLimitExceeded(_)
            | Self::Timeout(_) => true,
            Self::ApiError { status_code, .. } => {
                *status_code >= 500 || *status_code == 408 || *status_code == 429
            }
            Self::AuthenticationError(_) => false,
        }
    }

    /// Classify a reqwest transport error.
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::ParseError(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }

    /// Classify a non-success HTTP status returned by a provider.
    pub fn from_status(status_code: u16, message: String) -> Self {
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }
}

/// Errors raised while acquiring a page
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Neither the lightweight request nor the render path could reach the page
    #[error("Page unreachable: {0}")]
    Unreachable(String),

    /// A bounded wait expired
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The headless render failed after escalation
    #[error("Blocked: {0}")]
    Blocked(String),
}

/// Errors raised while turning fetched material into a document
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    /// Every strategy of the adapter, and the generic fallback, failed
    #[error("No extraction strategy succeeded (tried: {})", attempted.join(", "))]
    NoStrategySucceeded {
        /// Names of the strategies that were attempted, in order
        attempted: Vec<String>,
    },

    /// The payload could not be decoded
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The adapter needs a stored session that is absent
    #[error("Authentication required for site '{site}'")]
    AuthRequired {
        /// Credential store key of the site
        site: String,
    },

    /// A strategy ran but yielded neither a title nor a body
    #[error("Strategy produced no content: {0}")]
    EmptyContent(String),

    /// A strategy's own acquisition sub-step failed
    #[error("Secondary fetch failed: {0}")]
    Acquisition(#[from] FetchError),
}

/// Errors that can occur during translation
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The provider could not serve a chunk after all retries
    #[error("Translation provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Translation was required but no chunk could be translated
    #[error("All {chunks} chunk(s) failed to translate")]
    AllChunksFailed {
        /// Number of chunks in the plan
        chunks: usize,
    },

    /// The run was interrupted at a chunk boundary
    #[error("Translation cancelled")]
    Cancelled,
}

/// Pipeline stage in which a terminal error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Fetch,
    Extract,
    Translate,
    Output,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetch => "fetch",
            Self::Extract => "extract",
            Self::Translate => "translate",
            Self::Output => "output",
        };
        write!(f, "{}", name)
    }
}

/// The specific error that stopped a pipeline run
#[derive(Error, Debug)]
pub enum PipelineErrorKind {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error("{0}")]
    Output(String),
}

/// Single terminal error reported for a URL
#[derive(Error, Debug)]
#[error("{stage} stage failed for {url}: {kind}")]
pub struct PipelineError {
    /// URL the run was processing
    pub url: String,
    /// Stage that failed
    pub stage: PipelineStage,
    /// Specific error kind
    pub kind: PipelineErrorKind,
}

impl PipelineError {
    /// Create a new pipeline error
    pub fn new(url: &str, stage: PipelineStage, kind: impl Into<PipelineErrorKind>) -> Self {
        Self {
            url: url.to_string(),
            stage,
            kind: kind.into(),
        }
    }
}
