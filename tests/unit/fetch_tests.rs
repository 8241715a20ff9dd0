/*!
 * Tests for the fetch strategy selector
 */

use std::sync::Arc;
use std::time::Duration;

use pagewise::errors::FetchError;
use pagewise::fetch::{EscalationReason, HttpResponse, WaitCondition, escalation_reason};

use crate::common::{self, ScriptedHttp, ScriptedRenderer};

const URL: &str = "https://blog.example.com/post";

fn long_page() -> String {
    common::article_html("Post", &[&common::english_paragraph(1, 400)])
}

#[tokio::test]
async fn test_acquire_withLongHtml_shouldStayLightweight() {
    let http = Arc::new(ScriptedHttp::new().html(URL, &long_page()));
    let renderer = Arc::new(ScriptedRenderer::returning("<html></html>"));
    let selector = common::selector(Arc::clone(&http), Arc::clone(&renderer));

    let result = selector.acquire(URL, false).await.unwrap();

    assert!(!result.rendered_via_browser);
    assert_eq!(result.raw_body, long_page());
    assert_eq!(result.final_url, URL);
    assert!(result.is_html());
    assert_eq!(renderer.call_count(), 0);
}

#[tokio::test]
async fn test_acquire_withCommentWidgetNoscript_shouldStayLightweight() {
    let page = long_page().replace(
        "</article>",
        "</article><div id=\"disqus_thread\"></div>\
         <noscript>Please enable JavaScript to view the comments powered by Disqus.</noscript>",
    );
    let http = Arc::new(ScriptedHttp::new().html(URL, &page));
    let renderer = Arc::new(ScriptedRenderer::returning("<html></html>"));
    let selector = common::selector(http, Arc::clone(&renderer));

    let result = selector.acquire(URL, false).await.unwrap();

    assert!(!result.rendered_via_browser);
    assert_eq!(renderer.call_count(), 0);
}

#[tokio::test]
async fn test_acquire_withShortBody_shouldEscalateOnce() {
    let http = Arc::new(ScriptedHttp::new().html(URL, "<html><body>Loading</body></html>"));
    let renderer = Arc::new(ScriptedRenderer::returning(&long_page()));
    let selector = common::selector(Arc::clone(&http), Arc::clone(&renderer));

    let result = selector.acquire(URL, false).await.unwrap();

    assert!(result.rendered_via_browser);
    assert_eq!(result.content_type, "text/html");
    assert_eq!(http.call_count(), 1);
    assert_eq!(renderer.call_count(), 1);
}

#[tokio::test]
async fn test_acquire_withForceBrowser_shouldSkipHttp() {
    let http = Arc::new(ScriptedHttp::new().html(URL, &long_page()));
    let renderer = Arc::new(ScriptedRenderer::returning(&long_page()));
    let selector = common::selector(Arc::clone(&http), Arc::clone(&renderer));

    let result = selector.acquire(URL, true).await.unwrap();

    assert!(result.rendered_via_browser);
    assert_eq!(http.call_count(), 0);
    assert_eq!(renderer.call_count(), 1);
}

#[tokio::test]
async fn test_acquire_withTransportFailure_shouldEscalate() {
    let http = Arc::new(ScriptedHttp::new().route(URL, Err(FetchError::Timeout("slow".to_string()))));
    let renderer = Arc::new(ScriptedRenderer::returning(&long_page()));
    let selector = common::selector(http, Arc::clone(&renderer));

    assert!(selector.acquire(URL, false).await.unwrap().rendered_via_browser);
    assert_eq!(renderer.call_count(), 1);
}

#[tokio::test]
async fn test_acquire_withScriptOnlyPage_shouldEscalate() {
    let shell = format!(
        "<html><head><script src=\"/bundle.js\"></script></head><body>\
         <noscript>You need to enable JavaScript to run this app.</noscript>\
         <div id=\"root\"></div>{}</body></html>",
        " ".repeat(300)
    );
    let http = Arc::new(ScriptedHttp::new().html(URL, &shell));
    let renderer = Arc::new(ScriptedRenderer::returning(&long_page()));
    let selector = common::selector(http, Arc::clone(&renderer));

    assert!(selector.acquire(URL, false).await.unwrap().rendered_via_browser);
}

#[tokio::test]
async fn test_acquire_withoutBrowser_shouldReportBlocked() {
    let http = Arc::new(ScriptedHttp::new().html(URL, "<p>Tiny but real</p>"));
    let renderer = Arc::new(ScriptedRenderer::unavailable());
    let selector = common::selector(http, Arc::clone(&renderer));

    let err = selector.acquire(URL, false).await.unwrap_err();

    assert!(matches!(err, FetchError::Blocked(_)));
    assert_eq!(renderer.call_count(), 1);
}

#[tokio::test]
async fn test_acquire_withoutBrowserAndEmptyErrorResponse_shouldReportBlocked() {
    let response = HttpResponse {
        status: 503,
        ..Default::default()
    };
    let http = Arc::new(ScriptedHttp::new().route(URL, Ok(response)));
    let selector = common::selector(http, Arc::new(ScriptedRenderer::unavailable()));

    let err = selector.acquire(URL, false).await.unwrap_err();
    assert!(matches!(err, FetchError::Blocked(_)));
}

#[tokio::test]
async fn test_acquire_withRenderFailures_shouldMapErrors() {
    let http = Arc::new(ScriptedHttp::new().html(URL, "short"));

    let timeout = common::selector(
        Arc::clone(&http),
        Arc::new(ScriptedRenderer::failing(FetchError::Timeout("render".to_string()))),
    );
    assert!(matches!(timeout.acquire(URL, false).await, Err(FetchError::Timeout(_))));

    let blocked = common::selector(
        http,
        Arc::new(ScriptedRenderer::failing(FetchError::Unreachable("captcha wall".to_string()))),
    );
    assert!(matches!(blocked.acquire(URL, false).await, Err(FetchError::Blocked(_))));
}

#[tokio::test]
async fn test_acquireWith_shouldPassProxyAndSettleTimeToRenderer() {
    let http = Arc::new(ScriptedHttp::new());
    let renderer = Arc::new(ScriptedRenderer::returning(&long_page()));
    let selector = common::selector(http, Arc::clone(&renderer));
    let settings = common::test_settings().with_proxy(Some("http://127.0.0.1:7890".to_string()));

    selector.acquire_with(URL, true, &settings).await.unwrap();

    let request = renderer.last_request().unwrap();
    assert_eq!(request.proxy.as_deref(), Some("http://127.0.0.1:7890"));
    assert_eq!(
        request.wait,
        WaitCondition::NetworkIdle {
            max_wait: settings.settle_timeout
        }
    );
    assert!(request.headers.iter().any(|(k, _)| k == "User-Agent"));
}

#[tokio::test]
async fn test_acquire_shouldSendConfiguredHeadersAndTimeout() {
    let http = Arc::new(ScriptedHttp::new().html(URL, &long_page()));
    let selector = common::selector(Arc::clone(&http), Arc::new(ScriptedRenderer::unavailable()));

    selector.acquire(URL, false).await.unwrap();

    let request = &http.requests()[0];
    assert_eq!(request.timeout, Duration::from_secs(10));
    assert!(request.headers.iter().any(|(k, v)| k == "User-Agent" && v.contains("Mozilla")));
}

#[test]
fn test_escalationReason_withEmptyErrorResponse_shouldNameStatus() {
    let response = HttpResponse {
        status: 403,
        ..Default::default()
    };
    assert_eq!(escalation_reason(&Ok(response), 100), Some(EscalationReason::EmptyErrorResponse(403)));
}
