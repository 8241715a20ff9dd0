#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use pagewise::app_config::{self, Config, ProxyConfig, ProxyMode, TranslationProvider};
use pagewise::app_controller::Controller;
use pagewise::pipeline::{ProxyOverride, RunOptions};
use pagewise::translation::{CancellationFlag, TranslationMode};

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Ollama,
    OpenAI,
    Anthropic,
    LMStudio,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// Output language mode
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    /// Translated text only
    Trans,
    /// Original text, no translation
    Raw,
    /// Each paragraph followed by its translation
    Both,
}

impl From<CliMode> for TranslationMode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Trans => TranslationMode::Translated,
            CliMode::Raw => TranslationMode::Original,
            CliMode::Both => TranslationMode::Both,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliProxyMode {
    No,
    System,
    Custom,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate shell completions for pagewise
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Remove stored site sessions from the configuration file
    ClearAuth {
        /// Site key (e.g. xiaohongshu); all sessions when omitted
        site: Option<String>,
    },

    /// Check that the configured translation provider answers
    TestProvider,
}

/// pagewise - fetch, clean up and translate web pages
#[derive(Parser, Debug)]
#[command(name = "pagewise")]
#[command(version)]
#[command(about = "Save a web page as clean Markdown, optionally translated by an LLM")]
#[command(long_about = "pagewise fetches a web page (escalating to headless Chromium when needed), extracts its main content and writes it as Markdown, translated or bilingual.

EXAMPLES:
    pagewise https://example.com/post            # Translate into the configured target language
    pagewise -r https://example.com/post         # Keep the original language
    pagewise -b -t fr https://example.com/post   # Bilingual output, French translation
    pagewise -B https://spa.example.com          # Skip the lightweight fetch, render in Chromium
    pagewise -x custom --set-proxy http://127.0.0.1:7890 https://x.com/user/status/1
    pagewise completions zsh > _pagewise

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file doesn't exist,
    a default one is created. Command line flags override the file; site
    defaults (e.g. no translation for WeChat) apply only when no flag is given.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Page to process
    #[arg(value_name = "URL")]
    url: Option<String>,

    /// Language mode
    #[arg(short = 'L', long = "lang", value_enum)]
    lang: Option<CliMode>,

    /// Shorthand for --lang raw
    #[arg(short = 'r', conflicts_with_all = ["lang", "both"])]
    raw: bool,

    /// Shorthand for --lang both
    #[arg(short = 'b', conflicts_with = "lang")]
    both: bool,

    /// Render in headless Chromium without trying a plain request first
    #[arg(short = 'B', long)]
    force_browser: bool,

    /// Target language code (e.g. 'zh', 'en', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Proxy mode for this run
    #[arg(short = 'x', long = "proxy", value_enum)]
    proxy: Option<CliProxyMode>,

    /// Proxy URL for `--proxy custom`
    #[arg(long, value_name = "URL")]
    set_proxy: Option<String>,

    /// Shorthand for --proxy no
    #[arg(short = 'n', conflicts_with = "proxy")]
    no_proxy: bool,

    /// Directory the Markdown file is written to
    #[arg(short, long)]
    output_dir: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

impl CommandLineOptions {
    fn mode(&self) -> Option<TranslationMode> {
        if let Some(lang) = self.lang {
            Some(lang.into())
        } else if self.raw {
            Some(TranslationMode::Original)
        } else if self.both {
            Some(TranslationMode::Both)
        } else {
            None
        }
    }

    fn proxy_override(&self) -> Result<ProxyOverride> {
        let mode = if self.no_proxy { Some(CliProxyMode::No) } else { self.proxy };
        match (mode, &self.set_proxy) {
            (None, None) => Ok(ProxyOverride::Inherit),
            (Some(CliProxyMode::No), _) => Ok(ProxyOverride::Disabled),
            (Some(CliProxyMode::System), _) => {
                let system = ProxyConfig {
                    mode: ProxyMode::System,
                    custom_url: String::new(),
                };
                Ok(system.resolve().map_or(ProxyOverride::Disabled, ProxyOverride::Use))
            }
            (Some(CliProxyMode::Custom), Some(url)) => Ok(ProxyOverride::Use(url.clone())),
            (Some(CliProxyMode::Custom), None) => Err(anyhow!("--proxy custom requires --set-proxy")),
            (None, Some(_)) => Err(anyhow!("--set-proxy requires --proxy custom")),
        }
    }
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger { level: LevelFilter::Trace }))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour and marker for a level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("\x1B[1;31m", "✖"),
            Level::Warn => ("\x1B[1;33m", "!"),
            Level::Info => ("\x1B[1;32m", "•"),
            Level::Debug => ("\x1B[1;36m", "·"),
            Level::Trace => ("\x1B[1;35m", "…"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.target().starts_with("pagewise")
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (colour, marker) = Self::style_for_level(record.level());
            let _ = writeln!(std::io::stderr(), "{}{} {} {}\x1B[0m", colour, now, marker, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

/// Load the configuration file, creating it with defaults when missing
fn load_or_create_config(config_path: &str) -> Result<Config> {
    if Path::new(config_path).exists() {
        let file = File::open(config_path).context(format!("Failed to open config file: {}", config_path))?;
        let reader = BufReader::new(file);
        return serde_json::from_reader(reader).context(format!("Failed to parse config file: {}", config_path));
    }

    warn!("Config file not found at '{}', creating default config.", config_path);
    let config = Config::default();
    save_config(config_path, &config)?;
    Ok(config)
}

fn save_config(config_path: &str, config: &Config) -> Result<()> {
    let config_json = serde_json::to_string_pretty(config).context("Failed to serialize config to JSON")?;
    std::fs::write(config_path, config_json).context(format!("Failed to write config file: {}", config_path))
}

/// Apply command line overrides on top of the file configuration
fn apply_overrides(config: &mut Config, options: &CommandLineOptions) {
    if let Some(provider) = &options.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        config.translation.active_provider_config_mut().model = model.clone();
    }
    if let Some(target) = &options.target_language {
        config.target_language = target.clone();
    }
    if let Some(output_dir) = &options.output_dir {
        config.output_dir = output_dir.clone();
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
}

fn clear_auth(config_path: &str, mut config: Config, site: Option<&str>) -> Result<()> {
    match site {
        Some(site) if config.sessions.remove(site).is_some() => info!("Removed session for '{}'", site),
        Some(site) => warn!("No stored session for '{}'", site),
        None => {
            info!("Removed {} stored session(s)", config.sessions.len());
            config.sessions.clear();
        }
    }
    save_config(config_path, &config)
}

#[tokio::main]
async fn main() -> Result<()> {
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "pagewise", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = load_or_create_config(&cli.config_path)?;
    apply_overrides(&mut config, &cli);
    log::set_max_level(level_filter(&config.log_level));

    match &cli.command {
        Some(Commands::ClearAuth { site }) => return clear_auth(&cli.config_path, config, site.as_deref()),
        Some(Commands::TestProvider) => {
            Controller::with_config(config)?.test_provider().await?;
            info!("Provider answered");
            return Ok(());
        }
        _ => {}
    }

    let url = cli
        .url
        .clone()
        .ok_or_else(|| anyhow!("URL is required when no subcommand is specified"))?;
    let options = RunOptions {
        mode: cli.mode(),
        force_browser: cli.force_browser,
        proxy: cli.proxy_override()?,
    };

    let controller = Controller::with_config(config)?;

    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping at the next chunk boundary");
            on_interrupt.cancel();
        }
    });

    match controller.run(&url, &options, &cancel).await {
        Ok(path) => {
            info!("Success: {}", path.display());
            Ok(())
        }
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
