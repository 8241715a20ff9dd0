/*!
 * Site adapter registry.
 *
 * An adapter is an ordered list of extraction strategies bound to a URL
 * pattern. The registry picks the first adapter whose pattern matches,
 * runs its strategies in declared order and returns the first non-empty
 * document. When every strategy fails the generic DOM heuristic is tried
 * once before giving up.
 */

use log::{debug, info, warn};
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::document::NormalizedDocument;
use crate::errors::ExtractionError;
use crate::extract::{self, SelectorSet};
use crate::fetch::{FetchResult, FetchSettings, HttpFetcher, HttpRequest};

pub mod sites;

/// Name of the adapter used for unmatched URLs
pub const GENERIC_ADAPTER: &str = "generic";

/// Open structured-data format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredFormat {
    JsonLd,
    Microdata,
    OpenGraph,
}

/// Official or public API an adapter can call on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiEndpoint {
    /// `publish.twitter.com/oembed`
    TwitterOEmbed,
    /// `/api/v1/statuses/<id>` after probing `/api/v1/instance`
    MastodonStatus,
    /// Note page fetched with the stored session, embedded initial state parsed
    XiaohongshuNote,
}

/// Whether an API strategy needs a stored session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRequirement {
    None,
    Session { site_key: String },
}

/// User-Agent a DOM heuristic fetches with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAgentProfile {
    /// The configured User-Agent; the primary fetch result is reused
    Default,
    /// Mobile WeChat in-app browser
    MobileWeChat,
    /// Any other string
    Custom(String),
}

impl UserAgentProfile {
    /// Header value, `None` for the default profile
    pub fn header_value(&self) -> Option<&str> {
        match self {
            Self::Default => None,
            Self::MobileWeChat => Some(
                "Mozilla/5.0 (iPhone; CPU iPhone OS 15_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile MicroMessenger/8.0.30",
            ),
            Self::Custom(ua) => Some(ua.as_str()),
        }
    }
}

/// One way of turning fetched material into a document
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    OfficialApi {
        endpoint: ApiEndpoint,
        auth: AuthRequirement,
    },
    StructuredData(StructuredFormat),
    DomHeuristic {
        selectors: SelectorSet,
        user_agent: UserAgentProfile,
    },
}

impl Strategy {
    /// DOM heuristic with the common article selectors
    pub fn generic_dom() -> Self {
        Self::DomHeuristic {
            selectors: SelectorSet::default(),
            user_agent: UserAgentProfile::Default,
        }
    }

    /// Short name used in logs and errors
    pub fn name(&self) -> String {
        match self {
            Self::OfficialApi { endpoint, .. } => format!("official-api:{:?}", endpoint),
            Self::StructuredData(format) => format!("structured-data:{:?}", format),
            Self::DomHeuristic { user_agent, .. } => match user_agent {
                UserAgentProfile::Default => "dom-heuristic".to_string(),
                _ => "dom-heuristic(ua)".to_string(),
            },
        }
    }
}

/// Host + path-shape matcher
#[derive(Debug, Clone)]
pub struct UrlPattern {
    patterns: Vec<Regex>,
}

impl UrlPattern {
    /// Compile the given regular expressions; any of them may match
    pub fn new(patterns: &[&str]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Pattern that never matches
    pub fn none() -> Self {
        Self { patterns: Vec::new() }
    }

    pub fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(url))
    }
}

/// Per-site defaults applied when the user gives no explicit choice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SitePolicy {
    pub default_no_translate: bool,
    pub default_no_proxy: bool,
}

/// A site-specific ordered list of extraction strategies
#[derive(Debug, Clone)]
pub struct AdapterDescriptor {
    pub name: String,
    pub url_pattern: UrlPattern,
    pub strategies: Vec<Strategy>,
    pub policy: SitePolicy,
    // Set only on the registry's catch-all adapter
    fallback: bool,
}

impl AdapterDescriptor {
    pub fn new(name: &str, url_pattern: UrlPattern) -> Self {
        Self {
            name: name.to_string(),
            url_pattern,
            strategies: Vec::new(),
            policy: SitePolicy::default(),
            fallback: false,
        }
    }

    /// The fallback adapter: DOM heuristic only
    pub fn generic() -> Self {
        Self {
            fallback: true,
            ..Self::new(GENERIC_ADAPTER, UrlPattern::none()).with_strategy(Strategy::generic_dom())
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_policy(mut self, policy: SitePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether this is the catch-all adapter, whatever a site adapter is named
    pub fn is_generic(&self) -> bool {
        self.fallback
    }
}

/// Stored site sessions, keyed by site
pub trait CredentialStore: Send + Sync {
    fn get(&self, site_key: &str) -> Option<String>;
    fn put(&self, site_key: &str, session: String);
    /// Clear one site, or every site when `site_key` is `None`
    fn clear(&self, site_key: Option<&str>);
}

/// In-memory credential store, seeded from configuration
#[derive(Default)]
pub struct MemoryCredentialStore {
    sessions: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sessions<'a>(sessions: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        let store = Self::new();
        for (site, session) in sessions {
            store.put(site, session.clone());
        }
        store
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, site_key: &str) -> Option<String> {
        self.sessions.read().get(site_key).cloned()
    }

    fn put(&self, site_key: &str, session: String) {
        if !session.trim().is_empty() {
            self.sessions.write().insert(site_key.to_string(), session);
        }
    }

    fn clear(&self, site_key: Option<&str>) {
        let mut sessions = self.sessions.write();
        match site_key {
            Some(key) => {
                sessions.remove(key);
            }
            None => sessions.clear(),
        }
    }
}

/// Capabilities available to strategies that own an acquisition sub-step
#[derive(Clone)]
pub struct ExtractionContext {
    pub http: Arc<dyn HttpFetcher>,
    pub credentials: Arc<dyn CredentialStore>,
    pub settings: FetchSettings,
}

impl ExtractionContext {
    pub fn new(http: Arc<dyn HttpFetcher>, credentials: Arc<dyn CredentialStore>, settings: FetchSettings) -> Self {
        Self { http, credentials, settings }
    }

    /// Issue a secondary GET with the shared network settings
    pub(crate) async fn get(
        &self,
        url: &str,
        settings: &FetchSettings,
        extra_headers: &[(&str, &str)],
    ) -> Result<crate::fetch::HttpResponse, ExtractionError> {
        let mut headers = settings.headers();
        for (name, value) in extra_headers {
            headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
            headers.push((name.to_string(), value.to_string()));
        }
        let request = HttpRequest {
            url: url.to_string(),
            headers,
            proxy: settings.proxy.clone(),
            timeout: settings.http_timeout,
        };
        let response = self.http.get(&request).await?;
        if !response.is_success() {
            return Err(ExtractionError::EmptyContent(format!("{} returned HTTP {}", url, response.status)));
        }
        Ok(response)
    }
}

/// Maps URLs to adapters and runs their strategies
pub struct SiteAdapterRegistry {
    adapters: Vec<AdapterDescriptor>,
    generic: AdapterDescriptor,
    context: ExtractionContext,
}

impl SiteAdapterRegistry {
    /// Registry with only the generic adapter
    pub fn new(context: ExtractionContext) -> Self {
        Self {
            adapters: Vec::new(),
            generic: AdapterDescriptor::generic(),
            context,
        }
    }

    /// Registry with the built-in site adapters
    pub fn with_builtin_sites(context: ExtractionContext) -> Self {
        let mut registry = Self::new(context);
        for descriptor in sites::builtin_adapters() {
            registry.register(descriptor);
        }
        registry
    }

    /// Register an adapter; earlier registrations win on overlapping patterns
    pub fn register(&mut self, descriptor: AdapterDescriptor) {
        debug!("Registered site adapter '{}'", descriptor.name);
        self.adapters.push(descriptor);
    }

    /// Adapter for `url`: first pattern match, else the generic adapter
    pub fn select_adapter(&self, url: &str) -> &AdapterDescriptor {
        self.adapters
            .iter()
            .find(|a| a.url_pattern.matches(url))
            .unwrap_or(&self.generic)
    }

    /// Extract with the registry's default network settings
    pub async fn extract(
        &self,
        descriptor: &AdapterDescriptor,
        fetch: &FetchResult,
    ) -> Result<NormalizedDocument, ExtractionError> {
        self.extract_with(descriptor, fetch, &self.context.settings).await
    }

    /// Run the descriptor's strategies in order, then the generic adapter once
    pub async fn extract_with(
        &self,
        descriptor: &AdapterDescriptor,
        fetch: &FetchResult,
        settings: &FetchSettings,
    ) -> Result<NormalizedDocument, ExtractionError> {
        let mut attempted = Vec::new();
        let mut failures = Vec::new();

        let mut chain: Vec<(&AdapterDescriptor, &Strategy)> =
            descriptor.strategies.iter().map(|s| (descriptor, s)).collect();
        if !descriptor.is_generic() {
            chain.extend(self.generic.strategies.iter().map(|s| (&self.generic, s)));
        }

        for (owner, strategy) in chain {
            if owner.is_generic() && !descriptor.is_generic() {
                info!("All '{}' strategies failed; falling back to generic adapter", descriptor.name);
            }
            attempted.push(format!("{}/{}", owner.name, strategy.name()));

            match self.run_strategy(strategy, fetch, settings).await {
                Ok(doc) if !doc.is_empty() => {
                    debug!("Strategy {} succeeded for {}", strategy.name(), fetch.final_url);
                    let mut doc = doc;
                    if !owner.is_generic() {
                        doc.metadata.site = Some(owner.name.clone());
                    }
                    return Ok(doc);
                }
                Ok(_) => {
                    debug!("Strategy {} produced no content", strategy.name());
                    failures.push(ExtractionError::EmptyContent(strategy.name()));
                }
                Err(e) => {
                    warn!("Strategy {} failed: {}", strategy.name(), e);
                    failures.push(e);
                }
            }
        }

        Err(Self::terminal_error(attempted, failures))
    }

    fn terminal_error(attempted: Vec<String>, failures: Vec<ExtractionError>) -> ExtractionError {
        if let Some(auth) = failures.iter().find(|e| matches!(e, ExtractionError::AuthRequired { .. })) {
            return auth.clone();
        }
        let all_malformed = !failures.is_empty()
            && failures.iter().all(|e| matches!(e, ExtractionError::MalformedPayload(_)));
        if all_malformed {
            return failures[0].clone();
        }
        ExtractionError::NoStrategySucceeded { attempted }
    }

    async fn run_strategy(
        &self,
        strategy: &Strategy,
        fetch: &FetchResult,
        settings: &FetchSettings,
    ) -> Result<NormalizedDocument, ExtractionError> {
        match strategy {
            Strategy::OfficialApi { endpoint, auth } => {
                let session = match auth {
                    AuthRequirement::None => None,
                    AuthRequirement::Session { site_key } => Some(
                        self.context
                            .credentials
                            .get(site_key)
                            .ok_or_else(|| ExtractionError::AuthRequired { site: site_key.clone() })?,
                    ),
                };
                sites::call_api(*endpoint, &self.context, settings, &fetch.final_url, session.as_deref()).await
            }
            Strategy::StructuredData(format) => {
                let html = html_body(fetch)?;
                Ok(match format {
                    StructuredFormat::JsonLd => extract::extract_json_ld(html, &fetch.final_url),
                    StructuredFormat::Microdata => extract::extract_microdata(html, &fetch.final_url),
                    StructuredFormat::OpenGraph => extract::extract_open_graph(html, &fetch.final_url),
                })
            }
            Strategy::DomHeuristic { selectors, user_agent } => match user_agent.header_value() {
                None => Ok(extract::extract_readable(html_body(fetch)?, &fetch.final_url, selectors)),
                Some(ua) => {
                    let response = self
                        .context
                        .get(&fetch.final_url, settings, &[("User-Agent", ua)])
                        .await?;
                    Ok(extract::extract_readable(&response.body, &fetch.final_url, selectors))
                }
            },
        }
    }
}

/// The primary body, when it is something the HTML strategies can read
fn html_body(fetch: &FetchResult) -> Result<&str, ExtractionError> {
    if !fetch.is_html() && !fetch.content_type.to_ascii_lowercase().starts_with("text/") {
        return Err(ExtractionError::MalformedPayload(format!(
            "expected HTML, got '{}'",
            fetch.content_type
        )));
    }
    if fetch.raw_body.contains('\u{FFFD}') && fetch.raw_body.matches('\u{FFFD}').count() * 10 > fetch.raw_body.chars().count() {
        return Err(ExtractionError::MalformedPayload("body is not decodable text".to_string()));
    }
    Ok(&fetch.raw_body)
}
