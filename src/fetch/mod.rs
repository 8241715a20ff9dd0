/*!
 * Page acquisition.
 *
 * The `FetchStrategySelector` decides per URL whether a lightweight HTTP
 * request is enough or the page has to be rendered by a headless browser.
 * Both capabilities are traits so the selector can be driven by scripted
 * implementations in tests.
 */

use async_trait::async_trait;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::FetchConfig;
use crate::errors::FetchError;

pub mod browser;
pub mod http;

pub use browser::ChromiumRenderer;
pub use http::ReqwestFetcher;

static NOSCRIPT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<noscript\b[^>]*>(.*?)</noscript>").unwrap()
});

static EMPTY_ROOT_ELEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<div\s+[^>]*id\s*=\s*["'](?:root|app|__next|__nuxt|main)["'][^>]*>\s*</div>"#).unwrap()
});

static SCRIPT_OR_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|template)\b[^>]*>.*?</(?:script|style|noscript|template)>").unwrap()
});

static ANY_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<[^>]*>").unwrap()
});

// Visible text below this many characters counts as an empty shell
const SHELL_TEXT_FLOOR: usize = 200;

/// Raw material produced by acquisition, handed by value to extraction
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    /// Response body (HTML, JSON, ...)
    pub raw_body: String,
    /// Content type reported by the server, `text/html` for rendered pages
    pub content_type: String,
    /// Whether the body is a headless-browser DOM snapshot
    pub rendered_via_browser: bool,
    /// URL after redirects
    pub final_url: String,
}

impl FetchResult {
    /// Whether the content type denotes HTML
    pub fn is_html(&self) -> bool {
        let ct = self.content_type.to_ascii_lowercase();
        ct.is_empty() || ct.contains("html")
    }

    /// Whether the content type denotes JSON
    pub fn is_json(&self) -> bool {
        self.content_type.to_ascii_lowercase().contains("json")
    }
}

/// Request issued through the HTTP capability
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub proxy: Option<String>,
    pub timeout: Duration,
}

/// Response of the HTTP capability
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
    pub final_url: String,
}

impl HttpResponse {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Lightweight HTTP GET capability
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError>;
}

/// When a rendered page counts as settled
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaitCondition {
    /// Network idle or the given bound, whichever comes first
    NetworkIdle { max_wait: Duration },
    /// Always wait the full duration
    Fixed(Duration),
}

/// Request issued through the headless render capability
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub proxy: Option<String>,
    pub wait: WaitCondition,
    pub timeout: Duration,
}

/// DOM snapshot returned by the render capability
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub dom_snapshot: String,
    pub final_url: String,
}

/// Headless browser render capability
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, FetchError>;
}

/// Network conditions shared by both acquisition paths
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub user_agent: String,
    pub extra_headers: Vec<(String, String)>,
    pub proxy: Option<String>,
    pub http_timeout: Duration,
    pub render_timeout: Duration,
    pub settle_timeout: Duration,
    pub min_content_length: usize,
}

impl FetchSettings {
    /// Build settings from the configuration; the proxy is resolved here
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            extra_headers: Vec::new(),
            proxy: config.proxy.resolve(),
            http_timeout: config.http_timeout(),
            render_timeout: config.render_timeout(),
            settle_timeout: config.settle_timeout(),
            min_content_length: config.min_content_length,
        }
    }

    /// Builder-style setter for the proxy
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Headers sent on both paths
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("User-Agent".to_string(), self.user_agent.clone()),
            ("Accept-Language".to_string(), "en-US,en;q=0.9,zh-CN;q=0.8".to_string()),
        ];
        headers.extend(self.extra_headers.iter().cloned());
        headers
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// Why the lightweight result was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum EscalationReason {
    /// The request failed before a response arrived
    TransportFailure(String),
    /// Non-2xx status and no body
    EmptyErrorResponse(u16),
    /// Body shorter than the minimum-content threshold
    ShortBody { length: usize, minimum: usize },
    /// Body only makes sense once scripts have run
    ScriptOnly(&'static str),
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportFailure(e) => write!(f, "transport failure ({})", e),
            Self::EmptyErrorResponse(status) => write!(f, "HTTP {} with empty body", status),
            Self::ShortBody { length, minimum } => {
                write!(f, "body of {} bytes is below the {} byte floor", length, minimum)
            }
            Self::ScriptOnly(marker) => write!(f, "JavaScript-only page ({})", marker),
        }
    }
}

fn visible_text_chars(body: &str) -> usize {
    let without_scripts = SCRIPT_OR_STYLE.replace_all(body, " ");
    let visible = ANY_TAG.replace_all(&without_scripts, " ");
    visible.chars().filter(|c| !c.is_whitespace()).count()
}

/// Detect a body that needs script execution to show content.
///
/// A marker only counts when the page shows little text without scripts,
/// so an article carrying a comment widget's `<noscript>` notice passes.
pub fn script_only_marker(body: &str) -> Option<&'static str> {
    let marker = if NOSCRIPT_BLOCK
        .captures_iter(body)
        .any(|c| c.get(1).is_some_and(|m| m.as_str().to_lowercase().contains("javascript")))
    {
        "noscript notice"
    } else if EMPTY_ROOT_ELEMENT.is_match(body) {
        "empty root element"
    } else {
        return None;
    };

    (visible_text_chars(body) < SHELL_TEXT_FLOOR).then_some(marker)
}

/// Evaluate the escalation triggers in order
pub fn escalation_reason(
    outcome: &Result<HttpResponse, FetchError>,
    min_content_length: usize,
) -> Option<EscalationReason> {
    let response = match outcome {
        Ok(response) => response,
        Err(e) => return Some(EscalationReason::TransportFailure(e.to_string())),
    };

    if !response.is_success() && response.body.trim().is_empty() {
        return Some(EscalationReason::EmptyErrorResponse(response.status));
    }

    if response.body.len() < min_content_length {
        return Some(EscalationReason::ShortBody {
            length: response.body.len(),
            minimum: min_content_length,
        });
    }

    script_only_marker(&response.body).map(EscalationReason::ScriptOnly)
}

/// Chooses between the lightweight HTTP path and the headless render path
pub struct FetchStrategySelector {
    http: Arc<dyn HttpFetcher>,
    renderer: Arc<dyn PageRenderer>,
    settings: FetchSettings,
}

impl FetchStrategySelector {
    pub fn new(http: Arc<dyn HttpFetcher>, renderer: Arc<dyn PageRenderer>, settings: FetchSettings) -> Self {
        Self { http, renderer, settings }
    }

    /// Network settings used by both paths
    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// The HTTP capability, shared with strategies that fetch on their own
    pub fn http(&self) -> Arc<dyn HttpFetcher> {
        Arc::clone(&self.http)
    }

    /// Acquire the page at `url`.
    ///
    /// Escalates to the browser at most once. A failed render, including a
    /// browser that cannot be launched, is terminal and reported as `Blocked`.
    pub async fn acquire(&self, url: &str, force_browser: bool) -> Result<FetchResult, FetchError> {
        self.acquire_with(url, force_browser, &self.settings).await
    }

    /// `acquire` with per-run network settings (e.g. a site that bypasses the proxy)
    pub async fn acquire_with(
        &self,
        url: &str,
        force_browser: bool,
        settings: &FetchSettings,
    ) -> Result<FetchResult, FetchError> {
        if force_browser {
            info!("Rendering {} in headless browser (forced)", url);
            return self.render(url, settings).await;
        }

        let request = HttpRequest {
            url: url.to_string(),
            headers: settings.headers(),
            proxy: settings.proxy.clone(),
            timeout: settings.http_timeout,
        };
        let outcome = self.http.get(&request).await;

        let Some(reason) = escalation_reason(&outcome, settings.min_content_length) else {
            // No trigger fired, so the outcome is a response
            let response = outcome?;
            debug!("Lightweight fetch of {} accepted ({} bytes)", url, response.body.len());
            return Ok(Self::lightweight_result(url, response));
        };

        info!("Escalating {} to headless browser: {}", url, reason);
        self.render(url, settings).await
    }

    fn lightweight_result(url: &str, response: HttpResponse) -> FetchResult {
        let content_type = response
            .header("content-type")
            .unwrap_or("text/html")
            .to_string();
        let final_url = if response.final_url.is_empty() {
            url.to_string()
        } else {
            response.final_url
        };

        FetchResult {
            raw_body: response.body,
            content_type,
            rendered_via_browser: false,
            final_url,
        }
    }

    async fn render(&self, url: &str, settings: &FetchSettings) -> Result<FetchResult, FetchError> {
        let request = RenderRequest {
            url: url.to_string(),
            headers: settings.headers(),
            proxy: settings.proxy.clone(),
            wait: WaitCondition::NetworkIdle { max_wait: settings.settle_timeout },
            timeout: settings.render_timeout,
        };

        let page = self.renderer.render(&request).await.map_err(|e| {
            let e = match e {
                FetchError::Unreachable(msg) => FetchError::Blocked(msg),
                other => other,
            };
            warn!("Headless render of {} failed: {}", url, e);
            e
        })?;

        Ok(FetchResult {
            raw_body: page.dom_snapshot,
            content_type: "text/html".to_string(),
            rendered_via_browser: true,
            final_url: if page.final_url.is_empty() { url.to_string() } else { page.final_url },
        })
    }
}
