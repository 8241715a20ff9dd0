//! Built-in site adapters and their API strategies.
//!
//! Each API strategy owns its acquisition sub-step: it issues its own
//! requests through the shared HTTP capability instead of reading the
//! primary fetch result.

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{
    AdapterDescriptor, ApiEndpoint, AuthRequirement, ExtractionContext, SitePolicy, Strategy, StructuredFormat,
    UrlPattern, UserAgentProfile,
};
use crate::document::{ContentBlock, DocumentMetadata, NormalizedDocument};
use crate::errors::ExtractionError;
use crate::extract::html::{absolutize, element_text};
use crate::extract::metadata::normalize_date;
use crate::extract::{fragment_to_blocks, text_to_blocks, SelectorSet};
use crate::fetch::FetchSettings;

/// Credential key of the Xiaohongshu session
pub const XIAOHONGSHU_SITE_KEY: &str = "xiaohongshu";

const TITLE_SNIPPET_CHARS: usize = 60;

static MASTODON_STATUS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?://[^/]+)/@[\w.\-]+(?:@[\w.\-]+)?/(\d+)/?(?:[?#].*)?$").unwrap()
});

static INITIAL_STATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)window\.__INITIAL_STATE__\s*=\s*(\{.*?\})\s*;?\s*</script>").unwrap()
});

static TOPIC_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[话题\]#").unwrap()
});

static TCO_ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://t\.co/\w+$").unwrap()
});

/// Replace bare `undefined` values with `null`, leaving string literals untouched
fn undefined_to_null(state: &str) -> String {
    const TOKEN: &str = "undefined";
    let mut out = String::with_capacity(state.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut last_significant = None;
    let mut rest = state;

    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if rest.starts_with(TOKEN)
            && matches!(last_significant, Some(':' | '[' | ','))
            && !rest[TOKEN.len()..].starts_with(|n: char| n.is_alphanumeric() || n == '_' || n == '$')
        {
            out.push_str("null");
            rest = &rest[TOKEN.len()..];
            last_significant = Some('l');
            continue;
        }

        if !c.is_whitespace() {
            last_significant = Some(c);
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn site(name: &str, patterns: &[&str]) -> Option<AdapterDescriptor> {
    UrlPattern::new(patterns)
        .ok()
        .map(|pattern| AdapterDescriptor::new(name, pattern))
}

/// The adapters registered by `SiteAdapterRegistry::with_builtin_sites`, in priority order
pub fn builtin_adapters() -> Vec<AdapterDescriptor> {
    let no_translate_no_proxy = SitePolicy {
        default_no_translate: true,
        default_no_proxy: true,
    };

    let twitter = site(
        "twitter",
        &[r"^https?://(www\.|mobile\.)?twitter\.com/", r"^https?://(www\.)?x\.com/"],
    )
    .map(|d| {
        d.with_strategy(Strategy::OfficialApi {
            endpoint: ApiEndpoint::TwitterOEmbed,
            auth: AuthRequirement::None,
        })
        .with_strategy(Strategy::StructuredData(StructuredFormat::OpenGraph))
        .with_strategy(Strategy::generic_dom())
    });

    let wechat = site(
        "wechat",
        &[r"^https?://mp\.weixin\.qq\.com/s", r"^https?://mp\.weixin\.qq\.com/.*__biz="],
    )
    .map(|d| {
        d.with_strategy(Strategy::DomHeuristic {
            selectors: SelectorSet::new(["#js_content", ".rich_media_content"], ["#activity-name", ".rich_media_title"]),
            user_agent: UserAgentProfile::MobileWeChat,
        })
        .with_strategy(Strategy::StructuredData(StructuredFormat::OpenGraph))
        .with_policy(no_translate_no_proxy)
    });

    let xiaohongshu = site(
        "xiaohongshu",
        &[
            r"^https?://(www\.)?xiaohongshu\.com/explore/",
            r"^https?://(www\.)?xiaohongshu\.com/discovery/item/",
            r"^https?://(www\.)?xiaohongshu\.com/user/profile/",
        ],
    )
    .map(|d| {
        d.with_strategy(Strategy::OfficialApi {
            endpoint: ApiEndpoint::XiaohongshuNote,
            auth: AuthRequirement::Session {
                site_key: XIAOHONGSHU_SITE_KEY.to_string(),
            },
        })
        .with_strategy(Strategy::StructuredData(StructuredFormat::OpenGraph))
        .with_strategy(Strategy::DomHeuristic {
            selectors: SelectorSet::new([".note-content", ".note-desc", ".desc"], ["h1.title", ".note-title", "#detail-title"]),
            user_agent: UserAgentProfile::Default,
        })
        .with_policy(no_translate_no_proxy)
    });

    let mastodon = site("mastodon", &[r"^https?://[^/]+/@[\w.\-]+(?:@[\w.\-]+)?/\d+/?(?:[?#].*)?$"]).map(|d| {
        d.with_strategy(Strategy::OfficialApi {
            endpoint: ApiEndpoint::MastodonStatus,
            auth: AuthRequirement::None,
        })
        .with_strategy(Strategy::StructuredData(StructuredFormat::OpenGraph))
        .with_strategy(Strategy::generic_dom())
    });

    [twitter, wechat, xiaohongshu, mastodon].into_iter().flatten().collect()
}

/// Run an API strategy's own acquisition and parse its payload
pub async fn call_api(
    endpoint: ApiEndpoint,
    context: &ExtractionContext,
    settings: &FetchSettings,
    url: &str,
    session: Option<&str>,
) -> Result<NormalizedDocument, ExtractionError> {
    match endpoint {
        ApiEndpoint::TwitterOEmbed => {
            let api = Url::parse_with_params(
                "https://publish.twitter.com/oembed",
                &[("url", url), ("omit_script", "true"), ("dnt", "true")],
            )
            .map_err(|e| ExtractionError::MalformedPayload(e.to_string()))?;
            info!("Fetching tweet via oEmbed: {}", api);
            let response = context.get(api.as_str(), settings, &[("Accept", "application/json")]).await?;
            parse_oembed(&response.body, url)
        }
        ApiEndpoint::MastodonStatus => {
            let caps = MASTODON_STATUS_URL
                .captures(url)
                .ok_or_else(|| ExtractionError::EmptyContent(format!("{} is not a status URL", url)))?;
            let origin = &caps[1];
            let id = &caps[2];

            let probe = context
                .get(&format!("{}/api/v1/instance", origin), settings, &[("Accept", "application/json")])
                .await?;
            let instance = parse_instance(&probe.body)?;
            debug!("{} is a Mastodon-compatible instance ({})", origin, instance);

            let status = context
                .get(&format!("{}/api/v1/statuses/{}", origin, id), settings, &[("Accept", "application/json")])
                .await?;
            parse_mastodon_status(&status.body, url)
        }
        ApiEndpoint::XiaohongshuNote => {
            let cookie = session.ok_or_else(|| ExtractionError::AuthRequired {
                site: XIAOHONGSHU_SITE_KEY.to_string(),
            })?;
            let response = context
                .get(url, settings, &[("Cookie", cookie), ("Referer", "https://www.xiaohongshu.com/")])
                .await?;
            parse_xiaohongshu_state(&response.body, url)
        }
    }
}

fn malformed(what: &str, e: serde_json::Error) -> ExtractionError {
    ExtractionError::MalformedPayload(format!("{}: {}", what, e))
}

fn snippet(text: &str) -> String {
    let first_line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
    let mut out: String = first_line.chars().take(TITLE_SNIPPET_CHARS).collect();
    if first_line.chars().count() > TITLE_SNIPPET_CHARS {
        out.push('…');
    }
    out
}

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    #[serde(default)]
    html: String,
    #[serde(default)]
    author_name: String,
}

/// Whether oEmbed markup carries nothing but `t.co` links (long-form article posts)
pub fn is_link_only(html: &str) -> bool {
    if html.trim().is_empty() {
        return true;
    }
    let fragment = Html::parse_fragment(html);
    let (Ok(p_sel), Ok(a_sel)) = (Selector::parse("p"), Selector::parse("a")) else {
        return false;
    };
    let Some(p) = fragment.select(&p_sel).next() else {
        return true;
    };

    let text = element_text(&p);
    if TCO_ONLY.is_match(&text) {
        return true;
    }

    let links: Vec<_> = p.select(&a_sel).collect();
    if links.is_empty() {
        return false;
    }
    let all_tco = links
        .iter()
        .all(|a| a.value().attr("href").is_some_and(|h| h.contains("t.co/")));
    let link_text: usize = links.iter().map(|a| element_text(a).chars().count()).sum();
    let own_text = text.chars().filter(|c| !c.is_whitespace()).count();
    all_tco && own_text <= link_text
}

/// Parse a Twitter oEmbed payload; link-only payloads yield an empty document
pub fn parse_oembed(payload: &str, url: &str) -> Result<NormalizedDocument, ExtractionError> {
    let response: OEmbedResponse = serde_json::from_str(payload).map_err(|e| malformed("oEmbed", e))?;

    if is_link_only(&response.html) {
        info!("oEmbed returned a link-only payload for {}", url);
        return Ok(NormalizedDocument::new("", url));
    }

    let fragment = Html::parse_fragment(&response.html);
    let base = Url::parse(url).ok();
    let mut blocks = Vec::new();
    if let Ok(p_sel) = Selector::parse("blockquote p, p") {
        if let Some(p) = fragment.select(&p_sel).next() {
            blocks.extend(fragment_to_blocks(&p.inner_html(), base.as_ref()));
        }
    }

    // The trailing link of the embed carries the date as text
    let published = Selector::parse("blockquote > a").ok().and_then(|sel| {
        fragment
            .select(&sel)
            .last()
            .map(|a| element_text(&a))
            .and_then(|t| NaiveDate::parse_from_str(&t, "%B %d, %Y").ok())
            .map(|d| d.format("%Y-%m-%d").to_string())
    });

    let body_text = blocks.iter().map(|b| b.plain_text()).collect::<Vec<_>>().join("\n");
    let title = match snippet(&body_text) {
        s if s.is_empty() => format!("{} on X", response.author_name),
        s => s,
    };

    let metadata = DocumentMetadata {
        author: Some(response.author_name).filter(|a| !a.is_empty()),
        published,
        ..Default::default()
    };
    Ok(NormalizedDocument::from_blocks(title, url, blocks).with_metadata(metadata))
}

#[derive(Debug, Deserialize, Default)]
struct MastodonInstance {
    uri: Option<String>,
    domain: Option<String>,
    title: Option<String>,
}

fn parse_instance(payload: &str) -> Result<String, ExtractionError> {
    let instance: MastodonInstance = serde_json::from_str(payload).map_err(|e| malformed("instance", e))?;
    instance
        .domain
        .or(instance.uri)
        .or(instance.title)
        .ok_or_else(|| ExtractionError::EmptyContent("discovery endpoint did not describe an instance".to_string()))
}

#[derive(Debug, Deserialize)]
struct MastodonAccount {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    acct: String,
}

#[derive(Debug, Deserialize)]
struct MastodonMedia {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MastodonTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MastodonStatus {
    #[serde(default)]
    content: String,
    #[serde(default)]
    spoiler_text: String,
    #[serde(default)]
    created_at: Option<String>,
    account: MastodonAccount,
    #[serde(default)]
    media_attachments: Vec<MastodonMedia>,
    #[serde(default)]
    tags: Vec<MastodonTag>,
}

/// Parse a `/api/v1/statuses/<id>` payload
pub fn parse_mastodon_status(payload: &str, url: &str) -> Result<NormalizedDocument, ExtractionError> {
    let status: MastodonStatus = serde_json::from_str(payload).map_err(|e| malformed("status", e))?;
    let base = Url::parse(url).ok();

    let mut blocks = fragment_to_blocks(&status.content, base.as_ref());
    for media in &status.media_attachments {
        let Some(media_url) = media.url.as_deref().and_then(|u| absolutize(u, base.as_ref())) else {
            continue;
        };
        let block = match media.kind.as_str() {
            "image" => ContentBlock::image(media_url, media.description.clone().unwrap_or_default()),
            kind => ContentBlock::Embed {
                metadata: [("kind".to_string(), kind.to_string()), ("url".to_string(), media_url)]
                    .into_iter()
                    .collect(),
            },
        };
        blocks.push(block);
    }

    let author = if status.account.display_name.is_empty() {
        status.account.acct.clone()
    } else {
        status.account.display_name.clone()
    };
    let body_text = blocks.iter().map(|b| b.plain_text()).collect::<Vec<_>>().join("\n");
    let title = if !status.spoiler_text.trim().is_empty() {
        status.spoiler_text.trim().to_string()
    } else if !body_text.trim().is_empty() {
        snippet(&body_text)
    } else {
        format!("Post by {}", author)
    };

    let metadata = DocumentMetadata {
        author: Some(author).filter(|a| !a.is_empty()),
        published: status.created_at.as_deref().map(normalize_date),
        tags: status.tags.into_iter().map(|t| t.name).collect(),
        site: None,
    };
    Ok(NormalizedDocument::from_blocks(title, url, blocks).with_metadata(metadata))
}

fn note_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

fn image_url(image: &Value) -> Option<String> {
    ["urlDefault", "url", "urlPre"]
        .iter()
        .find_map(|key| image.get(*key).and_then(|v| v.as_str()))
        .or_else(|| image.pointer("/infoList/0/url").and_then(|v| v.as_str()))
        .map(|u| absolutize(u, None).unwrap_or_else(|| u.to_string()))
}

/// Parse the note embedded in a Xiaohongshu page's initial state
pub fn parse_xiaohongshu_state(html: &str, url: &str) -> Result<NormalizedDocument, ExtractionError> {
    let caps = INITIAL_STATE
        .captures(html)
        .ok_or_else(|| ExtractionError::EmptyContent("page has no embedded note state".to_string()))?;
    let json = undefined_to_null(&caps[1]);
    let state: Value = serde_json::from_str(&json).map_err(|e| malformed("initial state", e))?;

    let details = state
        .pointer("/note/noteDetailMap")
        .and_then(|m| m.as_object())
        .ok_or_else(|| ExtractionError::EmptyContent("initial state has no note details".to_string()))?;
    let detail = note_id(url)
        .and_then(|id| details.get(&id))
        .or_else(|| details.values().next())
        .and_then(|d| d.get("note"))
        .ok_or_else(|| ExtractionError::EmptyContent("note not found in initial state".to_string()))?;

    let field = |key: &str| detail.get(key).and_then(|v| v.as_str()).unwrap_or_default().trim().to_string();

    let title = field("title");
    let description = TOPIC_SUFFIX.replace_all(&field("desc"), "").to_string();
    let mut blocks = text_to_blocks(&description);
    if let Some(images) = detail.get("imageList").and_then(|v| v.as_array()) {
        blocks.extend(
            images
                .iter()
                .filter_map(image_url)
                .map(|u| ContentBlock::image(u, "")),
        );
    }

    let tags = detail
        .get("tagList")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|t| t.get("name").and_then(|n| n.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let published = detail
        .get("time")
        .and_then(|t| t.as_i64())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|d| d.format("%Y-%m-%d").to_string());
    let author = detail
        .pointer("/user/nickname")
        .and_then(|n| n.as_str())
        .map(str::to_string);

    let title = if title.is_empty() { snippet(&description) } else { title };
    let metadata = DocumentMetadata {
        author,
        published,
        tags,
        site: None,
    };
    Ok(NormalizedDocument::from_blocks(title, url, blocks).with_metadata(metadata))
}
