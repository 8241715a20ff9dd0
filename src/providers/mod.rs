/*!
 * LLM provider clients.
 *
 * - Ollama: local server, `/api/generate`
 * - OpenAI: chat completions, also used for LM Studio and other compatible servers
 * - Anthropic: messages API
 *
 * Each client performs a single HTTP call per request; retries and timeouts
 * are owned by the translation engine.
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ProviderError;

/// Common interface of the provider clients
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// The request type for this provider
    type Request: Send + Sync;

    /// The response type for this provider
    type Response: Send + Sync;

    /// Complete a request using this provider
    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError>;

    /// Check that the provider is reachable and accepts our credentials
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Extract the generated text from a response
    fn extract_text(response: &Self::Response) -> String;
}

/// Read a non-success response into a classified error
pub(crate) async fn error_from_response(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
    ProviderError::from_status(status, message)
}

pub mod anthropic;
pub mod mock;
pub mod ollama;
pub mod openai;
