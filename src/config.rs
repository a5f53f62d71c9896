use std::str::FromStr;
use std::time::Duration;

use figment::providers::Env;
use figment::Figment;
use http::Uri;
use serde::{Deserialize, Serialize};

use crate::classify::AuthPaths;
use crate::error::ConfigError;

/// Environment variables are read as `AUTHCLIENT_<FIELD>`, e.g. `AUTHCLIENT_REFRESH_PATH`.
pub const ENV_PREFIX: &str = "AUTHCLIENT_";

fn default_tenant_key() -> String {
    "CompanyId".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    /// Required. A 401 from this path ends the session instead of triggering another refresh.
    #[serde(default)]
    pub refresh_path: String,
    #[serde(default)]
    pub login_path: String,
    #[serde(default)]
    pub third_party_auth_path: String,
    #[serde(default)]
    pub forgot_password_path: String,
    #[serde(default)]
    pub verify_code_path: String,
    #[serde(default)]
    pub reset_password_path: String,
    /// Query parameter or body field that carries the selected company.
    #[serde(default = "default_tenant_key")]
    pub tenant_key: String,
    /// Upper bound on the refresh call. Unbounded when unset.
    #[serde(default)]
    pub refresh_timeout_ms: Option<u64>,
    /// Skip a session-expired notification while another one is still running.
    #[serde(default)]
    pub dedupe_session_expiry: bool,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, refresh_path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_path: refresh_path.into(),
            login_path: String::new(),
            third_party_auth_path: String::new(),
            forgot_password_path: String::new(),
            verify_code_path: String::new(),
            reset_password_path: String::new(),
            tenant_key: default_tenant_key(),
            refresh_timeout_ms: None,
            dedupe_session_expiry: false,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_figment(Figment::new().merge(Env::prefixed(ENV_PREFIX)))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_path.trim().is_empty() {
            return Err(ConfigError::MissingRefreshPath);
        }
        self.parsed_base_url()?;
        Ok(())
    }

    pub fn refresh_timeout(&self) -> Option<Duration> {
        self.refresh_timeout_ms.map(Duration::from_millis)
    }

    fn parsed_base_url(&self) -> Result<Uri, ConfigError> {
        let invalid = || ConfigError::InvalidBaseUrl(self.base_url.clone());
        let uri = Uri::from_str(&self.base_url).map_err(|_| invalid())?;
        if uri.scheme().is_none() || uri.host().is_none() {
            return Err(invalid());
        }
        Ok(uri)
    }

    pub(crate) fn base_url_trimmed(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Endpoint paths resolved against the path of the base URL, ready to compare with request paths.
    pub fn auth_paths(&self) -> Result<AuthPaths, ConfigError> {
        let base = self.parsed_base_url()?;
        let base_path = base.path().trim_end_matches('/');
        let excluded = [
            &self.login_path,
            &self.third_party_auth_path,
            &self.forgot_password_path,
            &self.verify_code_path,
            &self.reset_password_path,
        ];
        Ok(AuthPaths::new(base_path, &self.refresh_path, excluded.into_iter().map(String::as_str)))
    }

    pub fn refresh_url(&self) -> Result<Uri, ConfigError> {
        let url = format!("{}{}", self.base_url_trimmed(), with_leading_slash(&self.refresh_path));
        Uri::from_str(&url).map_err(|_| ConfigError::InvalidBaseUrl(url))
    }
}

pub(crate) fn with_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
