//! Layered configuration: a TOML file merged with `CAPDRIVER_`-prefixed
//! environment variables (nested keys split on `__`, e.g.
//! `CAPDRIVER_SERVICE__USERNAME`).

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{CapdriverError, Result};
use crate::solver::types::Credential;

/// Which solving-service backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    #[default]
    DbcHttp,
    DbcSocket,
    Twocaptcha,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub provider: Provider,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_token: Option<String>,
    /// 2Captcha-style API key.
    pub api_key: Option<String>,
    /// Endpoint override: base URL for the HTTP backends, host for the
    /// socket backend.
    pub endpoint: Option<String>,
    /// Decode deadline override, in seconds.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Upload byte budget; defaults to the provider's own limit.
    pub byte_budget: Option<usize>,
    pub reduce_step: f64,
    /// Oracle retries per screenshot.
    pub retry_times: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            byte_budget: None,
            reduce_step: 0.125,
            retry_times: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    pub all_resolve_retries: u32,
    pub error_retries: u32,
    pub max_transitions: u32,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            all_resolve_retries: 15,
            error_retries: 3,
            max_transitions: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppiumConfig {
    pub server_url: String,
    /// Existing session to attach to; `solve` requires it.
    pub session_id: Option<String>,
}

impl Default for AppiumConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:4723".to_string(),
            session_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub resolver: ResolverConfig,
    pub walker: WalkerConfig,
    pub appium: AppiumConfig,
}

impl Config {
    /// Load from the default config file location and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from an explicit file (when given), the default location
    /// otherwise, with environment variables layered on top.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        match path {
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => {
                if let Some(default) = Self::default_path() {
                    figment = figment.merge(Toml::file(default));
                }
            }
        }

        figment
            .merge(Env::prefixed("CAPDRIVER_").split("__"))
            .extract()
            .map_err(|err| CapdriverError::Config(err.to_string()))
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("capdriver").join("config.toml"))
    }

    /// The credential the configured provider needs. Exactly one form must
    /// be supplied.
    pub fn credential(&self) -> Result<Credential> {
        let service = &self.service;

        if service.provider == Provider::Twocaptcha {
            return service
                .api_key
                .clone()
                .map(Credential::ApiKey)
                .ok_or_else(|| {
                    CapdriverError::Config("service.api_key is required for twocaptcha".into())
                });
        }

        let userpass = service.username.is_some() && service.password.is_some();
        match (&service.auth_token, userpass) {
            (Some(_), true) => Err(CapdriverError::Config(
                "supply either service.auth_token or username/password, not both".into(),
            )),
            (Some(token), false) => Ok(Credential::AuthToken(token.clone())),
            (None, true) => Ok(Credential::UserPass {
                username: service.username.clone().unwrap_or_default(),
                password: service.password.clone().unwrap_or_default(),
            }),
            (None, false) => Err(CapdriverError::Config(
                "missing credentials: set service.auth_token or username/password".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.service.provider, Provider::DbcHttp);
        assert_eq!(config.resolver.reduce_step, 0.125);
        assert_eq!(config.walker.all_resolve_retries, 15);
    }

    #[test]
    fn credential_requires_exactly_one_form() {
        let mut config = Config::default();
        assert!(matches!(
            config.credential(),
            Err(CapdriverError::Config(_))
        ));

        config.service.auth_token = Some("token".into());
        assert!(matches!(
            config.credential(),
            Ok(Credential::AuthToken(_))
        ));

        config.service.username = Some("user".into());
        config.service.password = Some("pass".into());
        assert!(matches!(
            config.credential(),
            Err(CapdriverError::Config(_))
        ));

        config.service.auth_token = None;
        assert!(matches!(
            config.credential(),
            Ok(Credential::UserPass { .. })
        ));
    }

    #[test]
    fn twocaptcha_wants_an_api_key() {
        let mut config = Config::default();
        config.service.provider = Provider::Twocaptcha;
        assert!(config.credential().is_err());

        config.service.api_key = Some("key".into());
        assert!(matches!(config.credential(), Ok(Credential::ApiKey(_))));
    }
}
