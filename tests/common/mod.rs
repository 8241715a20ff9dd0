/*!
 * Common test utilities for the pagewise test suite
 *
 * Scripted network capabilities and document builders, so pipelines can be
 * exercised without touching the network or launching a browser.
 */

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use pagewise::adapters::{ExtractionContext, MemoryCredentialStore, SiteAdapterRegistry};
use pagewise::document::{ContentBlock, NormalizedDocument};
use pagewise::errors::FetchError;
use pagewise::fetch::{
    FetchSettings, FetchStrategySelector, HttpFetcher, HttpRequest, HttpResponse, PageRenderer, RenderRequest,
    RenderedPage,
};
use pagewise::pipeline::{Pipeline, PipelineSettings};
use pagewise::translation::{EngineOptions, Translate};

/// Route crate logs to the test harness; honours RUST_LOG
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// HTTP capability answering from a script of URL prefixes
#[derive(Default)]
pub struct ScriptedHttp {
    routes: Mutex<Vec<(String, Result<HttpResponse, FetchError>)>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests whose URL starts with `prefix`; earlier routes win
    pub fn route(self, prefix: &str, outcome: Result<HttpResponse, FetchError>) -> Self {
        self.routes.lock().push((prefix.to_string(), outcome));
        self
    }

    /// Answer with a 200 response of the given content type
    pub fn ok(self, prefix: &str, content_type: &str, body: &str) -> Self {
        let response = HttpResponse {
            status: 200,
            body: body.to_string(),
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            final_url: String::new(),
        };
        self.route(prefix, Ok(response))
    }

    pub fn html(self, prefix: &str, body: &str) -> Self {
        self.ok(prefix, "text/html; charset=utf-8", body)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.calls.lock().clone()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|r| r.url.clone()).collect()
    }
}

#[async_trait]
impl HttpFetcher for ScriptedHttp {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        self.calls.lock().push(request.clone());
        self.routes
            .lock()
            .iter()
            .find(|(prefix, _)| request.url.starts_with(prefix.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or_else(|| Err(FetchError::Unreachable(format!("no route for {}", request.url))))
    }
}

/// Render capability returning a fixed DOM snapshot
pub struct ScriptedRenderer {
    outcome: Result<String, FetchError>,
    calls: AtomicUsize,
    last_request: Mutex<Option<RenderRequest>>,
}

impl ScriptedRenderer {
    pub fn returning(dom: &str) -> Self {
        Self {
            outcome: Ok(dom.to_string()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn failing(error: FetchError) -> Self {
        Self {
            outcome: Err(error),
            ..Self::returning("")
        }
    }

    /// Renderer on a machine without a browser binary
    pub fn unavailable() -> Self {
        Self::failing(FetchError::Blocked("Chromium not found".to_string()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<RenderRequest> {
        self.last_request.lock().clone()
    }
}

#[async_trait]
impl PageRenderer for ScriptedRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        self.outcome.clone().map(|dom_snapshot| RenderedPage {
            dom_snapshot,
            final_url: request.url.clone(),
        })
    }
}

/// Settings with a small content floor so short fixtures are accepted
pub fn test_settings() -> FetchSettings {
    let mut settings = FetchSettings::default();
    settings.min_content_length = 200;
    settings.proxy = None;
    settings
}

pub fn selector(http: Arc<ScriptedHttp>, renderer: Arc<ScriptedRenderer>) -> FetchStrategySelector {
    FetchStrategySelector::new(http, renderer, test_settings())
}

pub fn registry(http: Arc<ScriptedHttp>) -> SiteAdapterRegistry {
    let context = ExtractionContext::new(http, Arc::new(MemoryCredentialStore::new()), test_settings());
    SiteAdapterRegistry::with_builtin_sites(context)
}

/// Engine options with millisecond backoff
pub fn fast_engine(target_language: &str) -> EngineOptions {
    EngineOptions::new(target_language).with_retries(3, std::time::Duration::from_millis(1))
}

/// Full pipeline over scripted capabilities
pub fn pipeline(
    http: Arc<ScriptedHttp>,
    renderer: Arc<ScriptedRenderer>,
    translator: Arc<dyn Translate>,
    chunk_budget: usize,
) -> Pipeline {
    let settings = PipelineSettings::new("zh", chunk_budget).with_engine(fast_engine("zh"));
    Pipeline::new(selector(Arc::clone(&http), renderer), registry(http), translator, settings)
}

/// An English article page with the given paragraphs inside `<article>`
pub fn article_html(title: &str, paragraphs: &[&str]) -> String {
    let body = paragraphs
        .iter()
        .map(|p| format!("<p>{}</p>", p))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "<html><head><title>{title}</title><meta name=\"author\" content=\"Jane Doe\"></head>\
         <body><nav><a href=\"/\">Home</a></nav><article><h1>{title}</h1>\n{body}\n</article></body></html>"
    )
}

/// A sentence-rich English paragraph of roughly `len` characters
pub fn english_paragraph(seed: usize, len: usize) -> String {
    let sentence = format!("Paragraph {} explains the topic in plain words, one idea at a time. ", seed);
    sentence.repeat(len / sentence.len() + 1).chars().take(len).collect::<String>().trim().to_string()
}

/// Document with `count` paragraphs of `len` characters each
pub fn long_article(count: usize, len: usize) -> NormalizedDocument {
    NormalizedDocument::from_blocks(
        "Long Article",
        "https://example.com/long",
        (1..=count).map(|i| ContentBlock::paragraph(english_paragraph(i, len))),
    )
}
