/*!
 * Scripted provider for tests.
 *
 * - `MockProvider::working()` - prefixes every line with `[target]`
 * - `MockProvider::failing()` - always fails with a transient 503
 * - `MockProvider::unauthorized()` - always fails with a permanent 401
 * - `MockProvider::garbled()` - answers without segment markers
 * - `MockProvider::slow(ms)` - sleeps before answering
 *
 * `fail_when_contains` makes otherwise working calls fail for texts
 * containing a needle, either a fixed number of times or forever.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::Provider;
use crate::translation::Translate;

/// Mock request
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub text: String,
    pub target_language: String,
}

/// Mock response
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub text: String,
}

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    Working,
    Failing,
    Unauthorized,
    /// Drops segment markers and blank lines from the answer
    Garbled,
    Slow { delay_ms: u64 },
}

#[derive(Debug)]
struct FailureRule {
    needle: String,
    /// Remaining failures, `None` for permanent
    remaining: Option<usize>,
}

/// Mock provider for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    behavior: MockBehavior,
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<Vec<FailureRule>>>,
}

impl MockProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn unauthorized() -> Self {
        Self::new(MockBehavior::Unauthorized)
    }

    pub fn garbled() -> Self {
        Self::new(MockBehavior::Garbled)
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Fail calls whose text contains `needle`; `times: None` fails forever
    pub fn fail_when_contains(self, needle: impl Into<String>, times: Option<usize>) -> Self {
        self.failures.lock().push(FailureRule {
            needle: needle.into(),
            remaining: times,
        });
        self
    }

    /// Number of calls received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Texts received, in call order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// The text the working mock returns for `text`
    pub fn translated(text: &str, target_language: &str) -> String {
        text.lines()
            .map(|line| {
                let trimmed = line.trim();
                if trimmed.is_empty() || (trimmed.starts_with("<<") && trimmed.ends_with(">>")) {
                    line.to_string()
                } else {
                    format!("[{}] {}", target_language, line)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn scripted_failure(&self, text: &str) -> bool {
        let mut failures = self.failures.lock();
        for rule in failures.iter_mut() {
            if !text.contains(&rule.needle) {
                continue;
            }
            match rule.remaining.as_mut() {
                None => return true,
                Some(0) => {}
                Some(n) => {
                    *n -= 1;
                    return true;
                }
            }
        }
        false
    }
}

#[async_trait]
impl Provider for MockProvider {
    type Request = MockRequest;
    type Response = MockResponse;

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.text.clone());

        if self.scripted_failure(&request.text) {
            return Err(ProviderError::ApiError {
                status_code: 503,
                message: format!("Simulated failure (request #{})", count + 1),
            });
        }

        match self.behavior {
            MockBehavior::Working => Ok(MockResponse {
                text: Self::translated(&request.text, &request.target_language),
            }),
            MockBehavior::Failing => Err(ProviderError::ApiError {
                status_code: 503,
                message: "Simulated provider failure".to_string(),
            }),
            MockBehavior::Unauthorized => Err(ProviderError::AuthenticationError("Invalid API key".to_string())),
            MockBehavior::Garbled => {
                let text = Self::translated(&request.text, &request.target_language)
                    .lines()
                    .filter(|l| !l.trim().is_empty() && !l.trim().starts_with("<<"))
                    .collect::<Vec<_>>()
                    .join(" ");
                Ok(MockResponse { text })
            }
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(MockResponse {
                    text: Self::translated(&request.text, &request.target_language),
                })
            }
        }
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Failing => Err(ProviderError::ConnectionError("Simulated outage".to_string())),
            MockBehavior::Unauthorized => Err(ProviderError::AuthenticationError("Invalid API key".to_string())),
            _ => Ok(()),
        }
    }

    fn extract_text(response: &Self::Response) -> String {
        response.text.clone()
    }
}

#[async_trait]
impl Translate for MockProvider {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, ProviderError> {
        let response = self
            .complete(MockRequest {
                text: text.to_string(),
                target_language: target_language.to_string(),
            })
            .await?;
        Ok(Self::extract_text(&response))
    }
}
