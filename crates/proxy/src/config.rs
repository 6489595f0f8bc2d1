use banter_llm::DEFAULT_MISTRAL_MODEL;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use snafu::{ResultExt, Snafu};

/// Config file read from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "Banter.toml";

/// Environment variable prefix; `BANTER_API_KEY` carries the upstream
/// credential.
const ENV_PREFIX: &str = "BANTER_";

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("failed to load proxy configuration: {source}"))]
    Extract { source: figment::Error },
}

/// Proxy runtime settings, file values overridden by environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub api_key: String,
    /// Upstream base URL; empty means the provider's default.
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub default_model: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_model() -> String {
    DEFAULT_MISTRAL_MODEL.to_string()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            api_key: String::new(),
            base_url: String::new(),
            default_model: default_model(),
        }
    }
}

impl ProxyConfig {
    /// Loads `Banter.toml` merged with `BANTER_`-prefixed environment
    /// variables, environment winning.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(DEFAULT_CONFIG_FILE))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        figment.extract().context(ExtractSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sources_yield_defaults() {
        let config = ProxyConfig::from_figment(Figment::new()).unwrap();
        assert_eq!(config, ProxyConfig::default());
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.default_model, DEFAULT_MISTRAL_MODEL);
    }

    #[test]
    fn toml_values_override_defaults() {
        let figment = Figment::new().merge(Toml::string(
            r#"
            listen_addr = "0.0.0.0:9000"
            api_key = "secret"
            default_model = "mistral-large-latest"
            "#,
        ));

        let config = ProxyConfig::from_figment(figment).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.default_model, "mistral-large-latest");
        assert_eq!(config.base_url, "");
    }
}
