//! Headless render capability using chromiumoxide.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::{EventLifecycleEvent, SetLifecycleEventsEnabledParams};
use chromiumoxide::Page;
use futures::StreamExt;
use log::debug;
use std::path::PathBuf;
use std::time::Duration;

use super::{PageRenderer, RenderRequest, RenderedPage, WaitCondition};
use crate::errors::FetchError;

/// Find a Chromium or Chrome binary.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("PAGEWISE_CHROME_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Renders pages in a fresh headless Chromium per request.
///
/// A fresh instance is launched so the proxy (a launch flag) matches the
/// lightweight path for every acquisition.
pub struct ChromiumRenderer {
    executable: Option<PathBuf>,
}

impl ChromiumRenderer {
    /// Locate the browser binary; rendering fails with `Blocked` if none is found
    pub fn new() -> Self {
        Self {
            executable: find_chromium(),
        }
    }

    /// Use a specific browser binary
    pub fn with_executable(executable: PathBuf) -> Self {
        Self {
            executable: Some(executable),
        }
    }

    async fn launch(&self, request: &RenderRequest) -> Result<Browser, FetchError> {
        let executable = self
            .executable
            .clone()
            .ok_or_else(|| FetchError::Blocked("Chromium not found (set PAGEWISE_CHROME_PATH)".to_string()))?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");

        if let Some(ua) = header_value(&request.headers, "user-agent") {
            builder = builder.arg(format!("--user-agent={}", ua));
        }
        if let Some(proxy) = &request.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        let config = builder
            .build()
            .map_err(|e| FetchError::Blocked(format!("failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Blocked(format!("failed to launch Chromium: {}", e)))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(browser)
    }

    async fn capture(browser: &Browser, request: &RenderRequest) -> Result<RenderedPage, FetchError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Blocked(format!("failed to open page: {}", e)))?;

        let extra: serde_json::Map<String, serde_json::Value> = request
            .headers
            .iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case("user-agent"))
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        if !extra.is_empty() {
            let params = SetExtraHttpHeadersParams::new(Headers::new(serde_json::Value::Object(extra)));
            page.execute(params)
                .await
                .map_err(|e| FetchError::Blocked(format!("failed to set headers: {}", e)))?;
        }

        // Subscribe before navigating so the main frame's lifecycle is seen from `init`
        let lifecycle = match request.wait {
            WaitCondition::NetworkIdle { .. } => Some(Self::lifecycle_events(&page).await?),
            WaitCondition::Fixed(_) => None,
        };

        page.goto(request.url.as_str())
            .await
            .map_err(|e| FetchError::Blocked(format!("navigation failed: {}", e)))?;

        match (request.wait, lifecycle) {
            (WaitCondition::NetworkIdle { max_wait }, Some((main_frame, mut events))) => {
                let mut tracker = SettleTracker::new(main_frame);
                let settle = async {
                    while let Some(event) = events.next().await {
                        if tracker.observe(event.frame_id.as_ref(), event.loader_id.as_ref(), &event.name) {
                            return true;
                        }
                    }
                    false
                };
                match tokio::time::timeout(max_wait, settle).await {
                    Ok(true) => debug!("{} reached network idle", request.url),
                    Ok(false) => debug!("Lifecycle stream for {} ended before network idle", request.url),
                    Err(_) => debug!("Settle wait for {} hit its {:?} bound", request.url, max_wait),
                }
            }
            (WaitCondition::Fixed(duration), _) => tokio::time::sleep(duration).await,
            (WaitCondition::NetworkIdle { .. }, None) => {}
        }

        let dom_snapshot = page
            .content()
            .await
            .map_err(|e| FetchError::Blocked(format!("failed to capture DOM: {}", e)))?;

        let final_url = page
            .url()
            .await
            .unwrap_or_default()
            .map(|u| u.to_string())
            .unwrap_or_else(|| request.url.clone());

        let _ = page.close().await;

        Ok(RenderedPage { dom_snapshot, final_url })
    }
}

impl ChromiumRenderer {
    async fn lifecycle_events(
        page: &Page,
    ) -> Result<(Option<String>, chromiumoxide::listeners::EventStream<EventLifecycleEvent>), FetchError> {
        page.execute(SetLifecycleEventsEnabledParams::new(true))
            .await
            .map_err(|e| FetchError::Blocked(format!("failed to enable lifecycle events: {}", e)))?;
        let events = page
            .event_listener::<EventLifecycleEvent>()
            .await
            .map_err(|e| FetchError::Blocked(format!("failed to listen for lifecycle events: {}", e)))?;
        let main_frame = page
            .mainframe()
            .await
            .map_err(|e| FetchError::Blocked(format!("failed to resolve main frame: {}", e)))?
            .map(|frame| frame.as_ref().to_string());
        Ok((main_frame, events))
    }
}

/// Follows page lifecycle events until the main frame's current document
/// reports `networkIdle`.
///
/// Each navigation (including redirects) starts a new loader with `init`;
/// idle events from earlier loaders or child frames are ignored.
#[derive(Debug, Default)]
struct SettleTracker {
    main_frame: Option<String>,
    loader: Option<String>,
}

impl SettleTracker {
    fn new(main_frame: Option<String>) -> Self {
        Self { main_frame, loader: None }
    }

    /// Record one event; true once the page has settled
    fn observe(&mut self, frame: &str, loader: &str, name: &str) -> bool {
        if self.main_frame.as_deref().is_some_and(|main| main != frame) {
            return false;
        }
        match name {
            "init" => {
                // Unknown main frame: the first frame to start loading is it
                self.main_frame.get_or_insert_with(|| frame.to_string());
                self.loader = Some(loader.to_string());
                false
            }
            "networkIdle" => self.loader.as_deref() == Some(loader),
            _ => false,
        }
    }
}

impl Default for ChromiumRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, FetchError> {
        let mut browser = self.launch(request).await?;

        // The settle wait is bounded separately; this bounds the whole render
        let outcome = tokio::time::timeout(
            request.timeout + Duration::from_millis(500),
            Self::capture(&browser, request),
        )
        .await;

        let _ = browser.close().await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(format!(
                "render of {} exceeded {:?}",
                request.url, request.timeout
            ))),
        }
    }
}
