/*!
 * Tests for site adapter selection and strategy fallthrough
 */

use std::sync::Arc;

use pagewise::adapters::{
    AdapterDescriptor, CredentialStore, ExtractionContext, GENERIC_ADAPTER, MemoryCredentialStore,
    SiteAdapterRegistry, Strategy, StructuredFormat, UrlPattern,
};
use pagewise::document::ContentBlock;
use pagewise::errors::ExtractionError;
use pagewise::fetch::FetchResult;

use crate::common::{self, ScriptedHttp};

fn html_fetch(url: &str, body: &str) -> FetchResult {
    FetchResult {
        raw_body: body.to_string(),
        content_type: "text/html".to_string(),
        rendered_via_browser: false,
        final_url: url.to_string(),
    }
}

fn og_page(title: &str, description: &str) -> String {
    format!(
        "<html><head><meta property=\"og:title\" content=\"{title}\">\
         <meta property=\"og:description\" content=\"{description}\">\
         <meta property=\"og:image\" content=\"/card.png\"></head><body></body></html>"
    )
}

#[test]
fn test_selectAdapter_withKnownSites_shouldPickFirstMatch() {
    let registry = common::registry(Arc::new(ScriptedHttp::new()));

    assert_eq!(registry.select_adapter("https://x.com/someone/status/1").name, "twitter");
    assert_eq!(registry.select_adapter("https://twitter.com/someone/status/1").name, "twitter");
    assert_eq!(registry.select_adapter("https://mp.weixin.qq.com/s/AbCdEf").name, "wechat");
    assert_eq!(
        registry.select_adapter("https://www.xiaohongshu.com/explore/64f0c0ffee").name,
        "xiaohongshu"
    );
    assert_eq!(registry.select_adapter("https://mastodon.social/@alice/1234567").name, "mastodon");
    assert_eq!(registry.select_adapter("https://blog.example.com/post").name, GENERIC_ADAPTER);
}

#[test]
fn test_selectAdapter_withChineseSocialSites_shouldCarryNoTranslatePolicy() {
    let registry = common::registry(Arc::new(ScriptedHttp::new()));

    let wechat = registry.select_adapter("https://mp.weixin.qq.com/s/AbCdEf");
    assert!(wechat.policy.default_no_translate);
    assert!(wechat.policy.default_no_proxy);
    assert!(!registry.select_adapter("https://x.com/a/status/1").policy.default_no_translate);
}

#[test]
fn test_register_withOverlappingPattern_shouldKeepEarlierAdapter() {
    let context = ExtractionContext::new(
        Arc::new(ScriptedHttp::new()),
        Arc::new(MemoryCredentialStore::new()),
        common::test_settings(),
    );
    let mut registry = SiteAdapterRegistry::new(context);
    registry.register(
        AdapterDescriptor::new("first", UrlPattern::new(&[r"^https://docs\.example\.com/"]).unwrap())
            .with_strategy(Strategy::StructuredData(StructuredFormat::JsonLd)),
    );
    registry.register(AdapterDescriptor::new("second", UrlPattern::new(&[r"example\.com"]).unwrap()));

    assert_eq!(registry.select_adapter("https://docs.example.com/a").name, "first");
    assert_eq!(registry.select_adapter("https://www.example.com/a").name, "second");
}

#[tokio::test]
async fn test_extract_withSiteAdapterNamedGeneric_shouldStillFallBackToDomHeuristic() {
    let context = ExtractionContext::new(
        Arc::new(ScriptedHttp::new()),
        Arc::new(MemoryCredentialStore::new()),
        common::test_settings(),
    );
    let mut registry = SiteAdapterRegistry::new(context);
    registry.register(
        AdapterDescriptor::new(GENERIC_ADAPTER, UrlPattern::new(&[r"^https://docs\.example\.com/"]).unwrap())
            .with_strategy(Strategy::StructuredData(StructuredFormat::JsonLd)),
    );
    let url = "https://docs.example.com/guide";
    let descriptor = registry.select_adapter(url);
    assert!(!descriptor.is_generic());
    assert!(AdapterDescriptor::generic().is_generic());

    let page = common::article_html("Guide", &[&common::english_paragraph(1, 300)]);
    let doc = registry.extract(descriptor, &html_fetch(url, &page)).await.unwrap();

    assert_eq!(doc.title, "Guide");
    assert!(!doc.is_empty());
}

#[tokio::test]
async fn test_extract_withLinkOnlyTweet_shouldFallThroughToOpenGraph() {
    let url = "https://x.com/someone/status/1790000000000000000";
    let oembed = r#"{"author_name":"Someone","html":"<blockquote class=\"twitter-tweet\"><p lang=\"zxx\"><a href=\"https://t.co/AbC123\">https://t.co/AbC123</a></p>&mdash; Someone <a href=\"https://twitter.com/someone/status/1\">May 1, 2024</a></blockquote>"}"#;
    let http = Arc::new(ScriptedHttp::new().ok("https://publish.twitter.com/oembed", "application/json", oembed));
    let registry = common::registry(Arc::clone(&http));

    let descriptor = registry.select_adapter(url);
    let fetch = html_fetch(url, &og_page("A long-form article", "Opening lines of the article."));
    let doc = registry.extract(descriptor, &fetch).await.unwrap();

    assert_eq!(doc.title, "A long-form article");
    assert_eq!(doc.blocks()[0], ContentBlock::paragraph("Opening lines of the article."));
    assert_eq!(doc.blocks()[1], ContentBlock::image("https://x.com/card.png", "A long-form article"));
    assert_eq!(doc.metadata.site.as_deref(), Some("twitter"));
    assert!(http.requested_urls()[0].starts_with("https://publish.twitter.com/oembed?url="));
}

#[tokio::test]
async fn test_extract_withTweetText_shouldUseOembed() {
    let url = "https://twitter.com/someone/status/1";
    let oembed = r#"{"author_name":"Someone","html":"<blockquote><p>Shipping the new parser today.</p>&mdash; Someone <a href=\"https://twitter.com/someone/status/1\">May 1, 2024</a></blockquote>"}"#;
    let http = Arc::new(ScriptedHttp::new().ok("https://publish.twitter.com/oembed", "application/json", oembed));
    let registry = common::registry(http);

    let doc = registry
        .extract(registry.select_adapter(url), &html_fetch(url, "<html></html>"))
        .await
        .unwrap();

    assert_eq!(doc.title, "Shipping the new parser today.");
    assert_eq!(doc.metadata.author.as_deref(), Some("Someone"));
    assert_eq!(doc.metadata.published.as_deref(), Some("2024-05-01"));
}

#[tokio::test]
async fn test_extract_withMastodonStatus_shouldProbeInstanceThenFetchStatus() {
    let url = "https://mastodon.social/@alice/1234567";
    let status = r#"{"content":"<p>Hello fediverse, this is a longer post.</p>","spoiler_text":"","created_at":"2024-03-01T10:00:00.000Z","account":{"display_name":"Alice","acct":"alice"},"media_attachments":[{"type":"image","url":"https://files.mastodon.social/a.png","description":"a cat"}],"tags":[{"name":"rust"}]}"#;
    let http = Arc::new(
        ScriptedHttp::new()
            .ok("https://mastodon.social/api/v1/instance", "application/json", r#"{"uri":"mastodon.social"}"#)
            .ok("https://mastodon.social/api/v1/statuses/1234567", "application/json", status),
    );
    let registry = common::registry(Arc::clone(&http));

    let doc = registry
        .extract(registry.select_adapter(url), &html_fetch(url, "<html></html>"))
        .await
        .unwrap();

    assert_eq!(
        http.requested_urls(),
        vec![
            "https://mastodon.social/api/v1/instance".to_string(),
            "https://mastodon.social/api/v1/statuses/1234567".to_string()
        ]
    );
    assert_eq!(doc.blocks()[0], ContentBlock::paragraph("Hello fediverse, this is a longer post."));
    assert_eq!(doc.blocks()[1], ContentBlock::image("https://files.mastodon.social/a.png", "a cat"));
    assert_eq!(doc.metadata.author.as_deref(), Some("Alice"));
    assert_eq!(doc.metadata.tags, vec!["rust".to_string()]);
    assert_eq!(doc.metadata.site.as_deref(), Some("mastodon"));
}

#[tokio::test]
async fn test_extract_withMissingSession_shouldReportAuthRequired() {
    let url = "https://www.xiaohongshu.com/explore/64f0c0ffee";
    let http = Arc::new(ScriptedHttp::new());
    let registry = common::registry(Arc::clone(&http));

    let err = registry
        .extract(registry.select_adapter(url), &html_fetch(url, "<html><body></body></html>"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ExtractionError::AuthRequired {
            site: "xiaohongshu".to_string()
        }
    );
    // The API strategy never issued a request without credentials
    assert_eq!(http.call_count(), 0);
}

#[tokio::test]
async fn test_extract_withStoredSession_shouldSendCookie() {
    let url = "https://www.xiaohongshu.com/explore/64f0c0ffee";
    let page = r#"<html><script>window.__INITIAL_STATE__={"note":{"noteDetailMap":{"64f0c0ffee":{"note":{"title":"周末去爬山","desc":"天气很好 #户外[话题]#","imageList":[{"urlDefault":"https://ci.xiaohongshu.com/a.jpg"}],"tagList":[{"name":"户外"}],"time":1714521600000,"user":{"nickname":"小红"}}}}},"user":undefined}</script></html>"#;
    let http = Arc::new(ScriptedHttp::new().html(url, page));
    let credentials = Arc::new(MemoryCredentialStore::new());
    credentials.put("xiaohongshu", "web_session=abc".to_string());
    let context = ExtractionContext::new(http.clone(), credentials, common::test_settings());
    let registry = SiteAdapterRegistry::with_builtin_sites(context);

    let doc = registry
        .extract(registry.select_adapter(url), &html_fetch(url, "<html></html>"))
        .await
        .unwrap();

    assert_eq!(doc.title, "周末去爬山");
    assert_eq!(doc.metadata.author.as_deref(), Some("小红"));
    let request = &http.requests()[0];
    assert!(request.headers.iter().any(|(k, v)| k == "Cookie" && v == "web_session=abc"));
}

#[tokio::test]
async fn test_extract_withGenericPage_shouldBeIdempotent() {
    let url = "https://blog.example.com/post";
    let html = common::article_html(
        "Readable Post",
        &[
            "The first paragraph has enough words, commas, and length to be counted as content.",
            "The second paragraph continues the article with a few more words and details.",
        ],
    );
    let registry = common::registry(Arc::new(ScriptedHttp::new()));
    let descriptor = registry.select_adapter(url);
    let fetch = html_fetch(url, &html);

    let first = registry.extract(descriptor, &fetch).await.unwrap();
    let second = registry.extract(descriptor, &fetch).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.title, "Readable Post");
    assert_eq!(first.blocks().len(), 2);
    assert_eq!(first.metadata.author.as_deref(), Some("Jane Doe"));
    assert_eq!(first.metadata.site, None);
}

#[tokio::test]
async fn test_extract_withBinaryBody_shouldReportMalformedPayload() {
    let url = "https://blog.example.com/file";
    let fetch = FetchResult {
        raw_body: "%PDF-1.7".to_string(),
        content_type: "application/pdf".to_string(),
        rendered_via_browser: false,
        final_url: url.to_string(),
    };
    let registry = common::registry(Arc::new(ScriptedHttp::new()));

    let err = registry.extract(registry.select_adapter(url), &fetch).await.unwrap_err();
    assert!(matches!(err, ExtractionError::MalformedPayload(_)));
}
