/*!
GENIEACS SOURCE - Récupération des ONT via l'API NBI

RÔLE :
`GET {base}/devices?projection=...` avec authentification basique. La projection se
limite aux paramètres lus par le normalizer, pour garder des réponses légères sur un
gros parc.

FONCTIONNEMENT :
- `try_fetch()` remonte l'erreur typée (`SourceError`)
- `fetch()` n'échoue jamais : toute erreur est loggée et donne un lot vide,
  que le moniteur traite comme "rien à faire ce cycle"
*/

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use crate::models::RawRecord;
use crate::normalizer::projection;

/// Source of raw device telemetry.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch the current batch. An empty batch means "no data", including on failure.
    async fn fetch(&self) -> Vec<RawRecord>;
}

/// Errors that can occur when querying GenieACS.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The configured base URL is not usable.
    #[error("Invalid GenieACS URL: {0}")]
    InvalidUrl(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Non-success status code.
    #[error("GenieACS returned status {0}")]
    Status(StatusCode),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(StatusCode),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// Body was not the expected device array.
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if err.is_connect() {
            SourceError::Connection(err.to_string())
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Http(err.to_string())
        }
    }
}

/// GenieACS NBI client.
#[derive(Debug, Clone)]
pub struct GenieAcsSource {
    client: Client,
    devices_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl GenieAcsSource {
    /// Create a new builder for configuring the source.
    pub fn builder() -> GenieAcsSourceBuilder {
        GenieAcsSourceBuilder::default()
    }

    /// Full devices URL, projection included.
    pub fn devices_url(&self) -> &Url {
        &self.devices_url
    }

    /// Like [`DataSource::fetch`], but surfaces the error.
    pub async fn try_fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
        let mut request = self.client.get(self.devices_url.clone());
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::Auth(status));
        }
        if !status.is_success() {
            return Err(SourceError::Status(status));
        }

        let body: Value = response.json().await?;
        match body {
            Value::Array(devices) => Ok(devices),
            other => Err(SourceError::Parse(format!(
                "expected a JSON array of devices, got {}",
                json_kind(&other)
            ))),
        }
    }
}

#[async_trait]
impl DataSource for GenieAcsSource {
    async fn fetch(&self) -> Vec<RawRecord> {
        match self.try_fetch().await {
            Ok(devices) => {
                debug!(count = devices.len(), "fetched devices from GenieACS");
                devices
            }
            Err(e) => {
                error!(error = %e, "failed to fetch devices from GenieACS");
                Vec::new()
            }
        }
    }
}

/// Builder for [`GenieAcsSource`].
#[derive(Debug, Default)]
pub struct GenieAcsSourceBuilder {
    endpoint: Option<String>,
    username: Option<String>,
    password: Option<String>,
    timeout: Option<Duration>,
}

impl GenieAcsSourceBuilder {
    /// Set the NBI endpoint (e.g., "http://localhost:7557").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the username and password for basic auth. An empty username disables auth.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into()).filter(|u| !u.is_empty());
        self.password = Some(password.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the source.
    pub fn build(self) -> Result<GenieAcsSource, SourceError> {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(10));
        let client = Client::builder().timeout(timeout).build()?;

        let endpoint = self
            .endpoint
            .unwrap_or_else(|| "http://localhost:7557".to_string());
        let devices_url = devices_url(&endpoint)?;

        Ok(GenieAcsSource {
            client,
            devices_url,
            username: self.username,
            password: self.password,
        })
    }
}

fn devices_url(endpoint: &str) -> Result<Url, SourceError> {
    let base = format!("{}/devices", endpoint.trim_end_matches('/'));
    let mut url = Url::parse(&base).map_err(|e| SourceError::InvalidUrl(format!("{endpoint}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(SourceError::InvalidUrl(endpoint.to_string()));
    }
    url.query_pairs_mut()
        .append_pair("projection", &projection().join(","));
    Ok(url)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
