//! LLM provider and topic classifier implementations for tabtally.
//!
//! All providers implement the `tabtally_core::Provider` trait; the
//! [`TopicClassifier`] turns any of them into a `tabtally_core::Classifier`.

pub mod openai_compat;
pub mod topic_classifier;

pub use openai_compat::{AZURE_API_VERSION, AuthStyle, OpenAiCompatProvider};
pub use topic_classifier::{ClassifierOptions, TopicClassifier};

use std::sync::Arc;
use tabtally_config::ClassifierConfig;
use tabtally_core::error::ProviderError;
use tabtally_core::{Classifier, NoopClassifier, Provider};
use tracing::{info, warn};

/// Build the provider named by the configuration.
///
/// Known names get a preset base URL; any other name requires `api_url`.
pub fn build_provider(config: &ClassifierConfig) -> Result<OpenAiCompatProvider, ProviderError> {
    let api_key = config.api_key.clone().unwrap_or_default();
    let url = config.api_url.as_deref();

    let provider = match (config.provider.as_str(), url) {
        ("openai", None) => OpenAiCompatProvider::openai(api_key),
        ("openrouter", None) => OpenAiCompatProvider::openrouter(api_key),
        ("ollama", url) => OpenAiCompatProvider::ollama(url),
        ("azure", Some(url)) => OpenAiCompatProvider::azure(url, api_key),
        ("azure", None) => Err(ProviderError::NotConfigured(
            "azure provider requires classifier.api_url".into(),
        )),
        (name, Some(url)) => OpenAiCompatProvider::new(name, url, api_key),
        (name, None) => Err(ProviderError::NotConfigured(format!(
            "unknown provider '{name}' and no classifier.api_url set"
        ))),
    }?;

    Ok(match &config.api_version {
        Some(version) => provider.with_api_version(version.clone()),
        None => provider,
    })
}

/// Build the classifier the engine should use.
///
/// Falls back to [`NoopClassifier`] when classification is disabled or no
/// API key is available for a provider that needs one.
pub fn build_classifier(config: &ClassifierConfig) -> Result<Arc<dyn Classifier>, ProviderError> {
    if !config.enabled {
        info!("Classifier disabled, untagged sessions will be labelled Unknown");
        return Ok(Arc::new(NoopClassifier));
    }

    if config.provider != "ollama" && !config.has_api_key() {
        warn!(
            provider = %config.provider,
            "No classifier API key configured, untagged sessions will be labelled Unknown"
        );
        return Ok(Arc::new(NoopClassifier));
    }

    let provider: Arc<dyn Provider> = Arc::new(build_provider(config)?);
    info!(provider = %provider.name(), model = %config.model, "Topic classifier ready");
    Ok(Arc::new(TopicClassifier::new(
        provider,
        ClassifierOptions::from(config),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, url: Option<&str>, key: Option<&str>) -> ClassifierConfig {
        ClassifierConfig {
            provider: provider.into(),
            api_url: url.map(String::from),
            api_key: key.map(String::from),
            ..ClassifierConfig::default()
        }
    }

    #[test]
    fn presets_resolve_base_urls() {
        let p = build_provider(&config("openrouter", None, Some("k"))).unwrap();
        assert!(p.base_url().contains("openrouter.ai"));

        let p = build_provider(&config("ollama", None, None)).unwrap();
        assert!(p.base_url().contains("11434"));
    }

    #[test]
    fn explicit_url_wins_over_preset() {
        let p = build_provider(&config("openai", Some("http://proxy.local/v1"), Some("k"))).unwrap();
        assert_eq!(p.base_url(), "http://proxy.local/v1");
        assert_eq!(p.name(), "openai");
    }

    #[test]
    fn azure_requires_url() {
        assert!(build_provider(&config("azure", None, Some("k"))).is_err());
        assert!(build_provider(&config("azure", Some("https://x.services.ai.azure.com/models"), Some("k"))).is_ok());
    }

    #[test]
    fn configured_api_version_overrides_preset() {
        let mut cfg = config("azure", Some("https://x.services.ai.azure.com/models"), Some("k"));
        let p = build_provider(&cfg).unwrap();
        assert!(format!("{p:?}").contains(AZURE_API_VERSION));

        cfg.api_version = Some("2024-10-21".into());
        let p = build_provider(&cfg).unwrap();
        assert!(format!("{p:?}").contains("2024-10-21"));
    }

    #[test]
    fn unknown_provider_without_url_is_rejected() {
        let err = build_provider(&config("acme", None, Some("k"))).unwrap_err();
        assert!(err.to_string().contains("acme"));
    }

    #[test]
    fn missing_key_falls_back_to_noop() {
        let c = build_classifier(&config("openai", None, None)).unwrap();
        assert_eq!(c.name(), "none");
    }

    #[test]
    fn disabled_classifier_is_noop() {
        let mut cfg = config("openai", None, Some("k"));
        cfg.enabled = false;
        assert_eq!(build_classifier(&cfg).unwrap().name(), "none");
    }

    #[test]
    fn configured_classifier_uses_provider_name() {
        let c = build_classifier(&config("openrouter", None, Some("k"))).unwrap();
        assert_eq!(c.name(), "openrouter");
    }
}
