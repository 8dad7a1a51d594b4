//! Configuration for OpenAI-compatible model endpoints.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use conduit_core::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Default completion token limit.
pub const DEFAULT_MAX_TOKENS: u32 = 4000;

/// Default inactivity timeout: 120 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const COMPLETIONS_PATH: &str = "chat/completions";

/// Connection and sampling settings of one OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct ModelConfig {
    /// Base URL of the API (`.../v1`), or the full `chat/completions` URL.
    #[cfg_attr(
        feature = "config",
        arg(id = "llm_server_url", long = "llm-server-url", env = "LLM_SERVER_URL", default_value = "http://localhost:8000/v1")
    )]
    pub base_url: Url,

    /// Model identifier sent with every request.
    #[cfg_attr(
        feature = "config",
        arg(id = "llm_model", long = "llm-model", env = "LLM_MODEL", default_value = "default")
    )]
    pub model: String,

    /// Bearer token, if the endpoint requires one.
    #[cfg_attr(feature = "config", arg(id = "llm_api_key", long = "llm-api-key", env = "LLM_API_KEY"))]
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Sampling temperature (0.0 to 2.0).
    #[cfg_attr(
        feature = "config",
        arg(id = "llm_temperature", long = "llm-temperature", env = "LLM_TEMPERATURE", default_value_t = DEFAULT_TEMPERATURE)
    )]
    pub temperature: f32,

    /// Maximum number of tokens per completion.
    #[cfg_attr(
        feature = "config",
        arg(id = "llm_max_tokens", long = "llm-max-tokens", env = "LLM_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)
    )]
    pub max_tokens: u32,

    /// Inactivity timeout in seconds: the longest wait to connect or for the
    /// next bytes of the stream. A long answer may stream for longer.
    #[cfg_attr(
        feature = "config",
        arg(id = "llm_timeout", long = "llm-timeout", env = "LLM_TIMEOUT", default_value_t = 120)
    )]
    pub timeout_secs: u64,
}

impl ModelConfig {
    /// Creates a configuration for `base_url` and `model` with default sampling.
    pub fn new(base_url: Url, model: impl Into<String>) -> Self {
        Self {
            base_url,
            model: model.into(),
            api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the inactivity timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Returns the inactivity timeout.
    pub fn timeout(&self) -> Duration {
        if self.timeout_secs == 0 {
            DEFAULT_TIMEOUT
        } else {
            Duration::from_secs(self.timeout_secs)
        }
    }

    /// Returns the `chat/completions` URL.
    pub fn completions_url(&self) -> Result<Url> {
        if self.base_url.path().trim_end_matches('/').ends_with(COMPLETIONS_PATH) {
            return Ok(self.base_url.clone());
        }

        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        base.join(COMPLETIONS_PATH).map_err(|e| {
            Error::configuration()
                .with_message(format!("invalid model url `{}`", self.base_url))
                .with_source(e)
        })
    }

    /// Validates sampling parameters and the URL scheme.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.base_url.scheme(), "http" | "https") {
            return Err(Error::configuration()
                .with_message(format!("model url must use http or https: `{}`", self.base_url)));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::configuration().with_message(format!(
                "temperature {} is invalid. Must be between 0.0 and 2.0.",
                self.temperature
            )));
        }

        if self.max_tokens == 0 {
            return Err(Error::configuration().with_message("max tokens must be at least 1"));
        }

        if self.model.trim().is_empty() {
            return Err(Error::configuration().with_message("model name must not be empty"));
        }

        Ok(())
    }
}

/// Hosted fallback model, used when the primary endpoint is unreachable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct FallbackModelConfig {
    /// API key of the hosted endpoint; the fallback is disabled without it.
    #[cfg_attr(feature = "config", arg(id = "openai_api_key", long = "openai-api-key", env = "OPENAI_API_KEY"))]
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Base URL of the hosted endpoint.
    #[cfg_attr(
        feature = "config",
        arg(id = "openai_base_url", long = "openai-base-url", env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")
    )]
    pub base_url: Option<Url>,

    /// Hosted model identifier.
    #[cfg_attr(
        feature = "config",
        arg(id = "openai_model", long = "openai-model", env = "OPENAI_MODEL", default_value = "gpt-4o")
    )]
    pub model: Option<String>,
}

impl FallbackModelConfig {
    /// Returns the hosted endpoint configuration, if an API key is set.
    ///
    /// Sampling settings are inherited from `primary`.
    pub fn resolve(&self, primary: &ModelConfig) -> Result<Option<ModelConfig>> {
        let Some(api_key) = self.api_key.as_deref().filter(|key| !key.is_empty()) else {
            return Ok(None);
        };

        let base_url = match &self.base_url {
            Some(url) => url.clone(),
            None => Url::parse("https://api.openai.com/v1").map_err(|e| {
                Error::configuration()
                    .with_message("invalid fallback url")
                    .with_source(e)
            })?,
        };

        let config = ModelConfig {
            base_url,
            model: self.model.clone().unwrap_or_else(|| "gpt-4o".to_owned()),
            api_key: Some(api_key.to_owned()),
            ..primary.clone()
        };
        config.validate()?;

        Ok(Some(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> ModelConfig {
        ModelConfig::new(Url::parse(url).unwrap(), "default")
    }

    #[test]
    fn completions_url_from_base() {
        let url = config("http://localhost:8000/v1").completions_url().unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/v1/chat/completions");

        let url = config("http://localhost:8000/v1/").completions_url().unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn completions_url_kept_when_complete() {
        let url = config("http://localhost:8000/v1/chat/completions")
            .completions_url()
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn validates_sampling_parameters() {
        let mut config = config("http://localhost:8000/v1");
        assert!(config.validate().is_ok());

        config.temperature = 2.5;
        assert!(config.validate().is_err());

        config.temperature = 0.1;
        config.max_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn fallback_requires_api_key() {
        let primary = config("http://localhost:8000/v1");
        assert!(FallbackModelConfig::default().resolve(&primary).unwrap().is_none());

        let fallback = FallbackModelConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let resolved = fallback.resolve(&primary).unwrap().unwrap();
        assert_eq!(resolved.model, "gpt-4o");
        assert_eq!(resolved.base_url.as_str(), "https://api.openai.com/v1");
        assert_eq!(resolved.temperature, primary.temperature);
    }
}
