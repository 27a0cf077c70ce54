//! Datasource instance settings.
//!
//! The host hands each datasource instance a JSON document:
//!
//! ```json
//! { "apiUrl": "https://api.astarte.example.com", "realm": "test", "token": "<jwt>" }
//! ```
//!
//! AppEngine and Realm Management are reached below `apiUrl` unless
//! `appEngineUrl` / `realmManagementUrl` override them (local deployments
//! usually expose each service on its own port).

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceSettings {
    pub api_url: String,
    pub realm: String,
    #[serde(default)]
    pub token: String,
    #[serde(default, rename = "appEngineUrl")]
    pub appengine_url: Option<String>,
    #[serde(default)]
    pub realm_management_url: Option<String>,
}

// Token stays out of logs.
impl std::fmt::Debug for DatasourceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasourceSettings")
            .field("api_url", &self.api_url)
            .field("realm", &self.realm)
            .field("token", &"<redacted>")
            .field("appengine_url", &self.appengine_url)
            .field("realm_management_url", &self.realm_management_url)
            .finish()
    }
}

impl DatasourceSettings {
    pub fn new(
        api_url: impl Into<String>,
        realm: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            realm: realm.into(),
            token: token.into(),
            appengine_url: None,
            realm_management_url: None,
        }
    }

    /// Parses the instance JSON. Does not validate; see [`Self::validate`].
    pub fn from_json(json: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(json)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.realm.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "realm must not be empty".to_string(),
            });
        }
        parse_base_url("apiUrl", &self.api_url)?;
        if let Some(url) = &self.appengine_url {
            parse_base_url("appEngineUrl", url)?;
        }
        if let Some(url) = &self.realm_management_url {
            parse_base_url("realmManagementUrl", url)?;
        }
        Ok(())
    }

    /// Base URL of the AppEngine API, without trailing slash.
    pub fn appengine_base(&self) -> String {
        service_base(&self.api_url, self.appengine_url.as_deref(), "appengine")
    }

    /// Base URL of the Realm Management API, without trailing slash.
    pub fn realm_management_base(&self) -> String {
        service_base(
            &self.api_url,
            self.realm_management_url.as_deref(),
            "realmmanagement",
        )
    }
}

fn parse_base_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        message: format!("{field} '{raw}' is not a valid URL: {e}"),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid {
            message: format!("{field} has unsupported scheme '{other}'"),
        }),
    }
}

fn service_base(api_url: &str, explicit: Option<&str>, service: &str) -> String {
    match explicit {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => format!("{}/{}", api_url.trim_end_matches('/'), service),
    }
}
