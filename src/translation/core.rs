/*!
 * Provider-backed translation capability.
 *
 * `TranslationService` turns the configured provider into a `Translate`
 * implementation: it builds the system prompt for the target language,
 * honors the provider's rate limit and serves repeated texts from the
 * cache. Retries and timeouts belong to the engine.
 */

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use url::Url;

use super::cache::TranslationCache;
use super::engine::{Translate, response_fits_payload};
use crate::app_config::{TranslationConfig, TranslationProvider as ConfigTranslationProvider};
use crate::errors::ProviderError;
use crate::language_utils::get_language_name;
use crate::providers::Provider;
use crate::providers::anthropic::{Anthropic, AnthropicRequest};
use crate::providers::ollama::{GenerationRequest, Ollama};
use crate::providers::openai::{OpenAI, OpenAIRequest};

const MARKER_INSTRUCTION: &str = "The input is split into segments introduced by markers such as <<SEG_1>> and closed by <<END>>. Keep every marker unchanged, on its own line and in the same order, and translate only the text between them.";

/// Parse an endpoint string into host and port
pub fn parse_endpoint(endpoint: &str) -> Result<(String, u16)> {
    if endpoint.is_empty() {
        return Err(anyhow!("Endpoint cannot be empty"));
    }

    let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Url::parse(endpoint)?
    } else {
        Url::parse(&format!("http://{}", endpoint))?
    };

    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("Invalid host in endpoint: {}", endpoint))?
        .to_string();

    let port = url.port().unwrap_or(if url.scheme() == "https" { 443 } else { 80 });

    Ok((host, port))
}

/// Output token ceiling for a model
pub fn max_tokens_for_model(model: &str) -> u32 {
    match model {
        "gpt-4" | "gpt-4-0613" => 8192,
        "gpt-4-32k" | "gpt-4-32k-0613" => 32768,
        "gpt-4o" | "gpt-4o-mini" | "gpt-4-turbo" => 4096,
        "gpt-3.5-turbo-16k" => 16384,
        m if m.starts_with("claude-3-5") => 8192,
        m if m.starts_with("claude") => 4096,
        _ => 4096,
    }
}

/// Translation provider implementation variants
#[derive(Debug)]
enum TranslationProviderImpl {
    Ollama { client: Ollama },
    OpenAI { client: OpenAI },
    /// LM Studio local server (OpenAI-compatible)
    LMStudio { client: OpenAI },
    Anthropic { client: Anthropic },
}

/// Minimum spacing between calls derived from a requests-per-minute limit
#[derive(Debug)]
struct Throttle {
    interval: Option<Duration>,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    fn new(requests_per_minute: Option<u32>) -> Self {
        let interval = requests_per_minute
            .filter(|rpm| *rpm > 0)
            .map(|rpm| Duration::from_millis(60_000 / rpm as u64));
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        let Some(interval) = self.interval else {
            return;
        };
        let delay = {
            let mut next_slot = self.next_slot.lock();
            let now = Instant::now();
            let slot = next_slot.map_or(now, |s| s.max(now));
            *next_slot = Some(slot + interval);
            slot - now
        };
        if !delay.is_zero() {
            debug!("Rate limit: waiting {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }
}

/// Translation capability backed by the configured provider
#[derive(Debug)]
pub struct TranslationService {
    provider: TranslationProviderImpl,

    /// Configuration for the translation service
    pub config: TranslationConfig,

    /// Cache of previous translations
    pub cache: TranslationCache,

    throttle: Throttle,
}

impl TranslationService {
    /// Create a new translation service with the given configuration
    pub fn new(config: TranslationConfig) -> Result<Self> {
        let timeout = config.get_timeout();
        let provider = match config.provider {
            ConfigTranslationProvider::Ollama => {
                let (host, port) = parse_endpoint(&config.get_endpoint())?;
                TranslationProviderImpl::Ollama {
                    client: Ollama::new(host, port, timeout)?,
                }
            }
            ConfigTranslationProvider::OpenAI => TranslationProviderImpl::OpenAI {
                client: OpenAI::new(config.get_api_key(), config.get_endpoint(), timeout)?,
            },
            ConfigTranslationProvider::LMStudio => {
                // LM Studio accepts any key
                let api_key = {
                    let k = config.get_api_key();
                    if k.is_empty() { "lm-studio".to_string() } else { k }
                };
                TranslationProviderImpl::LMStudio {
                    client: OpenAI::new(api_key, config.get_endpoint(), timeout)?,
                }
            }
            ConfigTranslationProvider::Anthropic => TranslationProviderImpl::Anthropic {
                client: Anthropic::new(config.get_api_key(), config.get_endpoint(), config.get_model(), timeout)?,
            },
        };

        Ok(Self {
            provider,
            throttle: Throttle::new(config.get_rate_limit()),
            cache: TranslationCache::new(true),
            config,
        })
    }

    /// `provider/model` label recorded in the output front matter
    pub fn translator_label(&self) -> String {
        format!("{}/{}", self.config.provider.to_lowercase_string(), self.config.get_model())
    }

    /// Check that the configured provider answers
    pub async fn test_connection(&self) -> Result<(), ProviderError> {
        match &self.provider {
            TranslationProviderImpl::Ollama { client } => client.test_connection().await,
            TranslationProviderImpl::OpenAI { client } | TranslationProviderImpl::LMStudio { client } => {
                client.test_connection().await
            }
            TranslationProviderImpl::Anthropic { client } => client.test_connection().await,
        }
    }

    /// System prompt for a target language
    pub fn system_prompt(&self, target_language: &str, segmented: bool) -> String {
        let language = get_language_name(target_language).unwrap_or_else(|_| target_language.to_string());
        let prompt = self.config.common.system_prompt.replace("{target_language}", &language);
        if segmented {
            format!("{} {}", prompt, MARKER_INSTRUCTION)
        } else {
            prompt
        }
    }

    async fn complete(&self, system_prompt: &str, text: &str) -> Result<String, ProviderError> {
        let model = self.config.get_model();
        let temperature = self.config.common.temperature;
        let start = Instant::now();

        let translated = match &self.provider {
            TranslationProviderImpl::Ollama { client } => {
                let request = GenerationRequest::new(&model, text)
                    .system(system_prompt)
                    .temperature(temperature);
                Ollama::extract_text(&client.complete(request).await?)
            }
            TranslationProviderImpl::OpenAI { client } | TranslationProviderImpl::LMStudio { client } => {
                let request = OpenAIRequest::new(&model)
                    .add_message("system", system_prompt)
                    .add_message("user", text)
                    .temperature(temperature)
                    .max_tokens(max_tokens_for_model(&model));
                OpenAI::extract_text(&client.complete(request).await?)
            }
            TranslationProviderImpl::Anthropic { client } => {
                let request = AnthropicRequest::new(&model, max_tokens_for_model(&model))
                    .system(system_prompt)
                    .add_message("user", text)
                    .temperature(temperature);
                Anthropic::extract_text(&client.complete(request).await?)
            }
        };

        debug!("{} answered in {:?}", self.translator_label(), start.elapsed());
        Ok(translated)
    }
}

#[async_trait]
impl Translate for TranslationService {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, ProviderError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let model = self.config.get_model();
        if let Some(cached) = self.cache.get(&model, target_language, text) {
            return Ok(cached);
        }

        self.throttle.wait().await;
        let system_prompt = self.system_prompt(target_language, text.contains("<<SEG_"));
        let translated = self.complete(&system_prompt, text).await?;
        if translated.trim().is_empty() {
            return Err(ProviderError::ParseError("Provider returned an empty translation".to_string()));
        }

        // Rejected answers stay out of the cache so a retry reaches the provider
        if response_fits_payload(text, &translated) {
            self.cache.store(&model, target_language, text, &translated);
        } else {
            debug!("Response does not match the requested segments, not cached");
        }
        Ok(translated)
    }
}
