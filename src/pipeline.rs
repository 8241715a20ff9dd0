/*!
 * Pipeline orchestration.
 *
 * One run takes one URL through acquire → select adapter → extract →
 * translate. The first failing stage ends the run with a single
 * `PipelineError` naming the URL, the stage and the error kind. Partial
 * translation failures are carried as warnings on the output.
 */

use log::{debug, info, warn};
use std::sync::Arc;

use crate::adapters::{SitePolicy, SiteAdapterRegistry};
use crate::document::NormalizedDocument;
use crate::errors::{PipelineError, PipelineStage, TranslationError};
use crate::fetch::{FetchSettings, FetchStrategySelector};
use crate::language_utils::{detect_language, is_target_language};
use crate::translation::{
    CancellationFlag, EngineOptions, Translate, TranslationMode, TranslationResult, plan_chunks, translate,
};

/// Proxy choice made on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ProxyOverride {
    /// Configured proxy, unless the site opts out
    #[default]
    Inherit,
    /// Direct connection
    Disabled,
    /// This proxy, even for sites that opt out
    Use(String),
}

/// Per-run choices of the caller
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Explicit output mode; highest priority
    pub mode: Option<TranslationMode>,
    /// Skip the lightweight fetch
    pub force_browser: bool,
    pub proxy: ProxyOverride,
}

/// What decided the output mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSource {
    UserFlag,
    SiteDefault,
    Config,
    Detected,
}

/// Settings shared by every run of a pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub target_language: String,
    pub chunk_budget: usize,
    pub default_mode: Option<TranslationMode>,
    pub engine: EngineOptions,
}

impl PipelineSettings {
    pub fn new(target_language: impl Into<String>, chunk_budget: usize) -> Self {
        let target_language = target_language.into();
        Self {
            engine: EngineOptions::new(target_language.clone()),
            target_language,
            chunk_budget,
            default_mode: None,
        }
    }

    pub fn with_default_mode(mut self, mode: Option<TranslationMode>) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn with_engine(mut self, engine: EngineOptions) -> Self {
        self.engine = engine;
        self
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Extracted document, with its detected language
    pub document: NormalizedDocument,
    /// Name of the adapter that was selected
    pub adapter: String,
    pub rendered_via_browser: bool,
    pub mode_source: ModeSource,
    /// Rendered body and titles
    pub result: TranslationResult,
}

impl PipelineOutput {
    pub fn mode(&self) -> TranslationMode {
        self.result.mode
    }

    pub fn warnings(&self) -> &[String] {
        &self.result.warnings
    }
}

/// Output mode by precedence: user flag, site default, configuration, detection.
///
/// Detection translates unless the document is already in the target language.
pub fn resolve_mode(
    user_mode: Option<TranslationMode>,
    policy: &SitePolicy,
    config_mode: Option<TranslationMode>,
    detected_language: &str,
    target_language: &str,
) -> (TranslationMode, ModeSource) {
    if let Some(mode) = user_mode {
        return (mode, ModeSource::UserFlag);
    }
    if policy.default_no_translate {
        return (TranslationMode::Original, ModeSource::SiteDefault);
    }
    if let Some(mode) = config_mode {
        return (mode, ModeSource::Config);
    }
    if is_target_language(detected_language, target_language) {
        (TranslationMode::Original, ModeSource::Detected)
    } else {
        (TranslationMode::Translated, ModeSource::Detected)
    }
}

/// Network settings of a run: the CLI wins, then the site's proxy policy
pub fn effective_settings(base: &FetchSettings, policy: &SitePolicy, proxy: &ProxyOverride) -> FetchSettings {
    match proxy {
        ProxyOverride::Use(url) => base.clone().with_proxy(Some(url.clone())),
        ProxyOverride::Disabled => base.clone().with_proxy(None),
        ProxyOverride::Inherit if policy.default_no_proxy && base.proxy.is_some() => {
            info!("Site policy: connecting without proxy");
            base.clone().with_proxy(None)
        }
        ProxyOverride::Inherit => base.clone(),
    }
}

/// Sequences the stages of a run
pub struct Pipeline {
    selector: FetchStrategySelector,
    registry: SiteAdapterRegistry,
    translator: Arc<dyn Translate>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        selector: FetchStrategySelector,
        registry: SiteAdapterRegistry,
        translator: Arc<dyn Translate>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            selector,
            registry,
            translator,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Process one URL
    pub async fn run(
        &self,
        url: &str,
        options: &RunOptions,
        cancel: &CancellationFlag,
    ) -> Result<PipelineOutput, PipelineError> {
        let descriptor = self.registry.select_adapter(url);
        debug!("Adapter '{}' selected for {}", descriptor.name, url);
        let network = effective_settings(self.selector.settings(), &descriptor.policy, &options.proxy);

        let fetched = self
            .selector
            .acquire_with(url, options.force_browser, &network)
            .await
            .map_err(|e| PipelineError::new(url, PipelineStage::Fetch, e))?;

        let mut document = self
            .registry
            .extract_with(descriptor, &fetched, &network)
            .await
            .map_err(|e| PipelineError::new(url, PipelineStage::Extract, e))?;

        let detected = detect_language(&document);
        document.language = Some(detected.clone());

        let (mode, mode_source) = resolve_mode(
            options.mode,
            &descriptor.policy,
            self.settings.default_mode,
            &detected,
            &self.settings.target_language,
        );
        info!(
            "'{}' extracted via '{}' ({} blocks, language {}), mode {} ({:?})",
            document.title,
            descriptor.name,
            document.blocks().len(),
            detected,
            mode,
            mode_source
        );

        if cancel.is_cancelled() {
            return Err(PipelineError::new(url, PipelineStage::Translate, TranslationError::Cancelled));
        }
        let mut plan = plan_chunks(&document, self.settings.chunk_budget);
        let result = translate(&mut plan, mode, self.translator.as_ref(), &self.settings.engine, cancel)
            .await
            .map_err(|e| PipelineError::new(url, PipelineStage::Translate, e))?;

        for warning in &result.warnings {
            warn!("{}", warning);
        }

        Ok(PipelineOutput {
            document,
            adapter: descriptor.name.clone(),
            rendered_via_browser: fetched.rendered_via_browser,
            mode_source,
            result,
        })
    }
}
