use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapters::{ExtractionContext, MemoryCredentialStore, SiteAdapterRegistry};
use crate::app_config::Config;
use crate::errors::{PipelineError, PipelineErrorKind, PipelineStage, TranslationError};
use crate::fetch::browser::ChromiumRenderer;
use crate::fetch::http::ReqwestFetcher;
use crate::fetch::{FetchSettings, FetchStrategySelector, HttpFetcher};
use crate::output::MarkdownWriter;
use crate::pipeline::{Pipeline, PipelineSettings, RunOptions};
use crate::translation::{CancellationFlag, EngineOptions, TranslationService};

// @module: Application controller wiring configuration to the pipeline

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Engine policy derived from the configuration
    pub fn engine_options(&self) -> EngineOptions {
        let common = &self.config.translation.common;
        EngineOptions::new(self.config.target_language.clone())
            .with_retries(common.retry_count, Duration::from_millis(common.retry_backoff_ms))
            .with_call_timeout(self.config.translation.get_timeout())
    }

    /// Pipeline settings derived from the configuration
    pub fn pipeline_settings(&self) -> PipelineSettings {
        let common = &self.config.translation.common;
        PipelineSettings::new(self.config.target_language.clone(), common.chunk_budget_chars)
            .with_default_mode(common.default_mode)
            .with_engine(self.engine_options())
    }

    /// Output directory with a leading `~` expanded to the home directory
    pub fn output_dir(&self) -> PathBuf {
        let configured = self.config.output_dir.trim();
        if let Some(rest) = configured.strip_prefix('~') {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest.trim_start_matches(['/', '\\']));
            }
        }
        PathBuf::from(configured)
    }

    // @creates: Pipeline backed by reqwest, Chromium and the configured provider
    fn build_pipeline(&self, translator: Arc<TranslationService>) -> Pipeline {
        let settings = FetchSettings::from_config(&self.config.fetch);
        let http: Arc<dyn HttpFetcher> = Arc::new(ReqwestFetcher::new());
        let renderer = Arc::new(ChromiumRenderer::new());

        let credentials = Arc::new(MemoryCredentialStore::from_sessions(self.config.sessions.iter()));
        let context = ExtractionContext::new(Arc::clone(&http), credentials, settings.clone());
        let registry = SiteAdapterRegistry::with_builtin_sites(context);
        let selector = FetchStrategySelector::new(http, renderer, settings);

        Pipeline::new(selector, registry, translator, self.pipeline_settings())
    }

    /// Process one URL and write its Markdown file, returning the written path
    pub async fn run(&self, url: &str, options: &RunOptions, cancel: &CancellationFlag) -> Result<PathBuf> {
        let start_time = Instant::now();
        let translator = Arc::new(TranslationService::new(self.config.translation.clone())?);
        let writer = MarkdownWriter::new(self.output_dir()).with_translator(translator.translator_label());
        let pipeline = self.build_pipeline(Arc::clone(&translator));

        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner.set_message(format!("Processing {}", url));

        let outcome = pipeline.run(url, options, cancel).await;
        spinner.finish_and_clear();
        let output = outcome?;

        // A run interrupted after translation leaves nothing on disk
        if cancel.is_cancelled() {
            return Err(PipelineError::new(url, PipelineStage::Output, TranslationError::Cancelled).into());
        }

        let path = writer
            .write(&output)
            .map_err(|e| PipelineError::new(url, PipelineStage::Output, PipelineErrorKind::Output(format!("{:#}", e))))?;

        if output.result.is_partial() {
            warn!(
                "{} of {} chunk(s) kept in the original language",
                output.result.chunks_failed, output.result.chunks_total
            );
        }
        let stats = translator.cache.stats();
        info!(
            "Done in {} (adapter '{}', mode {}, {} cache hit(s))",
            Self::format_duration(start_time.elapsed()),
            output.adapter,
            output.mode(),
            stats.hits
        );

        Ok(path)
    }

    /// Check that the configured translation provider answers
    pub async fn test_provider(&self) -> Result<()> {
        let translator = TranslationService::new(self.config.translation.clone())?;
        translator
            .test_connection()
            .await
            .with_context(|| format!("Provider {} is not reachable", translator.translator_label()))
    }

    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;

        if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
