//! LLM text completion through `edgequake-llm`.
//!
//! [`ProviderCompleter`] adapts any [`LLMProvider`] to the crate's
//! [`TextCompleter`] seam. A card scan makes exactly one call per run, so
//! there is no retry loop here: a failed call surfaces as
//! [`ScanError::Extraction`] and the upload boundary answers 500.

use crate::config::{LlmSettings, PipelineConfig};
use crate::error::ScanError;
use crate::services::TextCompleter;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// [`TextCompleter`] backed by an `edgequake-llm` provider.
pub struct ProviderCompleter {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl ProviderCompleter {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }

    /// Resolve a provider from settings and the environment.
    pub fn from_settings(settings: &LlmSettings, config: &PipelineConfig) -> Result<Self, ScanError> {
        Ok(Self::new(resolve_provider(settings)?, config))
    }
}

#[async_trait]
impl TextCompleter for ProviderCompleter {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ScanError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ScanError::Extraction(e.to_string()))?;
        debug!(
            "LLM: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ScanError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ScanError::InvalidConfig(format!("LLM provider '{provider_name}' unavailable: {e}"))
    })
}

/// Resolve the LLM provider, most specific first:
///
/// 1. Named provider (`CARDSCAN_LLM_PROVIDER`) with `CARDSCAN_MODEL` or the default model
/// 2. OpenAI whenever `OPENAI_API_KEY` is set
/// 3. Whatever `ProviderFactory::from_env` detects
pub fn resolve_provider(settings: &LlmSettings) -> Result<Arc<dyn LLMProvider>, ScanError> {
    let model = settings.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = settings.provider_name {
        return create_provider(name, model);
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
        ScanError::InvalidConfig(format!(
            "No LLM provider could be auto-detected from environment. \
             Set OPENAI_API_KEY or CARDSCAN_LLM_PROVIDER. Error: {e}"
        ))
    })?;
    Ok(llm_provider)
}
