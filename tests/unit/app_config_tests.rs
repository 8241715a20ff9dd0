/*!
 * Tests for application configuration
 */

use anyhow::Result;
use std::time::Duration;

use pagewise::app_config::{Config, LogLevel, ProxyConfig, ProxyMode, TranslationProvider};
use pagewise::translation::TranslationMode;

#[test]
fn test_default_config_shouldHaveSensibleValues() {
    let config = Config::default();

    assert_eq!(config.target_language, "zh");
    assert_eq!(config.output_dir, ".");
    assert_eq!(config.translation.provider, TranslationProvider::Ollama);
    assert_eq!(config.translation.common.chunk_budget_chars, 4000);
    assert_eq!(config.translation.common.retry_count, 3);
    assert_eq!(config.translation.common.default_mode, None);
    assert_eq!(config.fetch.min_content_length, 1000);
    assert_eq!(config.fetch.proxy.mode, ProxyMode::None);
    assert_eq!(config.log_level, LogLevel::Info);
    assert!(config.sessions.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn test_deserialize_withPartialJson_shouldFillDefaults() -> Result<()> {
    let json = r#"{
        "target_language": "fr",
        "translation": {
            "provider": "openai",
            "available_providers": [{"type": "openai", "model": "gpt-4o", "api_key": "sk-test"}],
            "common": {"default_mode": "both", "chunk_budget_chars": 1500}
        },
        "fetch": {"proxy": {"mode": "custom", "custom_url": "http://127.0.0.1:7890"}},
        "sessions": {"xiaohongshu": "web_session=abc"}
    }"#;
    let config: Config = serde_json::from_str(json)?;

    assert_eq!(config.target_language, "fr");
    assert_eq!(config.translation.provider, TranslationProvider::OpenAI);
    assert_eq!(config.translation.get_model(), "gpt-4o");
    assert_eq!(config.translation.get_api_key(), "sk-test");
    assert_eq!(config.translation.get_endpoint(), "https://api.openai.com/v1");
    assert_eq!(config.translation.get_timeout(), Duration::from_secs(60));
    assert_eq!(config.translation.common.default_mode, Some(TranslationMode::Both));
    assert_eq!(config.translation.common.chunk_budget_chars, 1500);
    assert_eq!(config.translation.common.retry_backoff_ms, 1000);
    assert_eq!(config.fetch.proxy.resolve().as_deref(), Some("http://127.0.0.1:7890"));
    assert_eq!(config.fetch.http_timeout_secs, 10);
    assert_eq!(config.sessions.get("xiaohongshu").map(String::as_str), Some("web_session=abc"));
    config.validate()
}

#[test]
fn test_validate_withHostedProviderAndNoKey_shouldFail() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Anthropic;
    assert!(config.validate().is_err());

    config.translation.active_provider_config_mut().api_key = "key".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_withInvalidValues_shouldFail() {
    let mut config = Config::default();
    config.target_language = "xx-invalid".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.target_language = "not-a-language".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.translation.common.chunk_budget_chars = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.fetch.proxy.mode = ProxyMode::Custom;
    assert!(config.validate().is_err());
}

#[test]
fn test_activeProviderConfigMut_withMissingEntry_shouldInsertDefaults() {
    let mut config = Config::default();
    config.translation.available_providers.clear();
    config.translation.provider = TranslationProvider::LMStudio;

    config.translation.active_provider_config_mut().model = "qwen2.5-7b".to_string();

    assert_eq!(config.translation.available_providers.len(), 1);
    assert_eq!(config.translation.get_model(), "qwen2.5-7b");
    assert_eq!(config.translation.get_endpoint(), "http://localhost:1234/v1");
}

#[test]
fn test_proxyConfig_withModes_shouldResolve() {
    assert_eq!(ProxyConfig::direct().resolve(), None);

    let blank_custom = ProxyConfig {
        mode: ProxyMode::Custom,
        custom_url: "  ".to_string(),
    };
    assert_eq!(blank_custom.resolve(), None);

    assert_eq!("system".parse::<ProxyMode>().unwrap(), ProxyMode::System);
    assert_eq!("OFF".parse::<ProxyMode>().unwrap(), ProxyMode::None);
    assert!("socks".parse::<ProxyMode>().is_err());
}

#[test]
fn test_rateLimit_shouldFollowProvider() {
    let mut config = Config::default();
    assert_eq!(config.translation.get_rate_limit(), None);
    config.translation.provider = TranslationProvider::Anthropic;
    assert_eq!(config.translation.get_rate_limit(), Some(45));
}

#[test]
fn test_serialize_roundTrip_shouldPreserveSessions() -> Result<()> {
    let mut config = Config::default();
    config.sessions.insert("xiaohongshu".to_string(), "a=b".to_string());
    let json = serde_json::to_string_pretty(&config)?;
    let restored: Config = serde_json::from_str(&json)?;
    assert_eq!(restored.sessions, config.sessions);
    assert_eq!(restored.translation.available_providers.len(), 4);
    Ok(())
}
