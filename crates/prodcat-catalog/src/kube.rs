//! Catalog record store backed by a Kubernetes ConfigMap.
//!
//! Talks to the API server directly over HTTPS:
//!
//! - read: `GET /api/v1/namespaces/{ns}/configmaps/{name}`
//! - conditional write: `PATCH` with a JSON merge patch carrying
//!   `metadata.resourceVersion`, which the API server rejects with `409` when
//!   stale
//!
//! Transient server errors (`500`, `502`, `503`, `504`) and connection
//! failures are retried at the transport level with exponential backoff,
//! independently of the reconcile loop's conflict retries.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use prodcat_core::error::{Error, Result};
use prodcat_core::store::{RecordData, RecordKey, RecordStore, VersionedRecord, WriteResult};

use crate::error::CatalogError;

/// Directory holding the pod's service account credentials.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Overrides the API server URL.
pub const API_URL_ENV: &str = "KUBERNETES_API_URL";

/// Overrides the bearer token.
pub const TOKEN_ENV: &str = "KUBERNETES_TOKEN";

const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How to reach the Kubernetes API server.
#[derive(Clone, Default)]
pub struct KubeConfig {
    /// Base URL of the API server, e.g. `https://10.0.0.1:443`.
    pub api_url: String,
    /// Bearer token, if any.
    pub token: Option<String>,
    /// PEM-encoded CA bundle to trust in addition to the system roots.
    pub ca_cert_pem: Option<Vec<u8>>,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
}

impl std::fmt::Debug for KubeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeConfig")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("ca_cert_pem", &self.ca_cert_pem.as_ref().map(Vec::len))
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

impl KubeConfig {
    /// Creates a config for an API server URL with no credentials.
    #[must_use]
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Builds the in-cluster config from the process environment and the
    /// mounted service account.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API server cannot be located or
    /// the credentials cannot be read.
    pub fn in_cluster() -> crate::Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok(), Path::new(SERVICE_ACCOUNT_DIR))
    }

    /// Builds the config from a variable lookup and a service account
    /// directory.
    ///
    /// [`API_URL_ENV`] and [`TOKEN_ENV`] take precedence over the service
    /// host/port variables and the mounted token. Missing service account
    /// files are skipped.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API server cannot be located or
    /// a present credential file cannot be read.
    pub fn from_env_with<F>(lookup: F, service_account_dir: &Path) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = match non_empty(API_URL_ENV) {
            Some(url) => url,
            None => {
                let host = non_empty(SERVICE_HOST_ENV).ok_or_else(|| {
                    CatalogError::configuration(format!(
                        "unable to load kubernetes configuration: neither {API_URL_ENV} nor {SERVICE_HOST_ENV} is set"
                    ))
                })?;
                let port = non_empty(SERVICE_PORT_ENV).unwrap_or_else(|| "443".to_string());
                if host.contains(':') {
                    format!("https://[{host}]:{port}")
                } else {
                    format!("https://{host}:{port}")
                }
            }
        };

        let token = match non_empty(TOKEN_ENV) {
            Some(token) => Some(token),
            None => read_optional(&service_account_dir.join("token"))?
                .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string()),
        };
        let ca_cert_pem = read_optional(&service_account_dir.join("ca.crt"))?;

        Ok(Self {
            api_url,
            token,
            ca_cert_pem,
            accept_invalid_certs: false,
        })
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets whether to skip TLS certificate verification.
    #[must_use]
    pub const fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }
}

fn read_optional(path: &Path) -> crate::Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CatalogError::configuration(format!(
            "unable to read {}: {e}",
            path.display()
        ))),
    }
}

/// Transport-level retry policy for transient API server failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first request.
    pub max_retries: u32,
    /// Base delay, doubled on each retry.
    pub backoff_factor: Duration,
    /// Upper bound on a single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 100,
            backoff_factor: Duration::from_millis(300),
            max_backoff: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_factor: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (starting at 1).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.backoff_factor
            .saturating_mul(2_u32.saturating_pow(exponent))
            .min(self.max_backoff)
    }

    /// Returns true for statuses worth retrying.
    #[must_use]
    pub fn is_retryable(status: StatusCode) -> bool {
        matches!(status.as_u16(), 500 | 502 | 503 | 504)
    }
}

#[derive(Debug, Deserialize)]
struct ConfigMap {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    data: Option<RecordData>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct ObjectMeta {
    #[serde(rename = "resourceVersion", default)]
    resource_version: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConfigMapPatch<'a> {
    metadata: ObjectMeta,
    data: &'a RecordData,
}

impl ConfigMap {
    fn into_record(self) -> Result<VersionedRecord> {
        let resource_version = self
            .metadata
            .resource_version
            .ok_or_else(|| Error::storage("ConfigMap response has no metadata.resourceVersion"))?;
        Ok(VersionedRecord {
            data: self.data.unwrap_or_default(),
            resource_version,
        })
    }
}

/// [`RecordStore`] over the Kubernetes ConfigMap API.
#[derive(Debug, Clone)]
pub struct ConfigMapStore {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl ConfigMapStore {
    /// Creates a store from a cluster config.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the CA bundle is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: KubeConfig) -> crate::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.accept_invalid_certs);

        if let Some(pem) = &config.ca_cert_pem {
            let cert = reqwest::Certificate::from_pem(pem).map_err(|e| {
                CatalogError::configuration(format!("invalid cluster CA certificate: {e}"))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build().map_err(|e| {
            CatalogError::configuration(format!("failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token,
            retry: RetryPolicy::default(),
        })
    }

    /// Replaces the transport retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, key: &RecordKey) -> String {
        format!(
            "{}/api/v1/namespaces/{}/configmaps/{}",
            self.api_url, key.namespace, key.name
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends a request, retrying transient failures per the retry policy.
    async fn send<F>(&self, make_request: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut retry = 0;
        loop {
            let outcome = self.authorize(make_request()).send().await;
            let retryable = match &outcome {
                Ok(response) => RetryPolicy::is_retryable(response.status()),
                Err(e) => !e.is_builder(),
            };

            if retryable && retry < self.retry.max_retries {
                retry += 1;
                let delay = self.retry.backoff(retry);
                match &outcome {
                    Ok(response) => tracing::warn!(status = %response.status(), retry, "transient API server error, retrying"),
                    Err(e) => tracing::warn!(error = %e, retry, "API server request failed, retrying"),
                }
                tokio::time::sleep(delay).await;
                continue;
            }

            return outcome
                .map_err(|e| Error::storage_with_source("kubernetes API request failed", e));
        }
    }
}

async fn unexpected_status(action: &str, key: &RecordKey, response: Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Error::storage(format!("error {action} {key} ConfigMap (status={status}): {body}"))
}

#[async_trait]
impl RecordStore for ConfigMapStore {
    async fn read(&self, key: &RecordKey) -> Result<VersionedRecord> {
        let url = self.url(key);
        let response = self.send(|| self.client.get(&url)).await?;

        match response.status() {
            status if status.is_success() => {
                let config_map: ConfigMap = response.json().await.map_err(|e| {
                    Error::storage_with_source(format!("invalid {key} ConfigMap response"), e)
                })?;
                config_map.into_record()
            }
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("ConfigMap not found: {key}"))),
            _ => Err(unexpected_status("reading", key, response).await),
        }
    }

    async fn write_if(
        &self,
        key: &RecordKey,
        resource_version: &str,
        data: RecordData,
    ) -> Result<WriteResult> {
        let url = self.url(key);
        let body = serde_json::to_vec(&ConfigMapPatch {
            metadata: ObjectMeta {
                resource_version: Some(resource_version.to_string()),
            },
            data: &data,
        })
        .map_err(Error::serialization)?;

        let response = self
            .send(|| {
                self.client
                    .patch(&url)
                    .header(reqwest::header::CONTENT_TYPE, "application/merge-patch+json")
                    .body(body.clone())
            })
            .await?;

        match response.status() {
            status if status.is_success() => {
                let config_map: ConfigMap = response.json().await.map_err(|e| {
                    Error::storage_with_source(format!("invalid {key} ConfigMap response"), e)
                })?;
                let record = config_map.into_record()?;
                Ok(WriteResult::Success {
                    resource_version: record.resource_version,
                })
            }
            StatusCode::CONFLICT => Ok(WriteResult::Conflict {
                current_version: None,
            }),
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("ConfigMap not found: {key}"))),
            _ => Err(unexpected_status("updating", key, response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(300));
        assert_eq!(policy.backoff(2), Duration::from_millis(600));
        assert_eq!(policy.backoff(4), Duration::from_millis(2400));
        assert_eq!(policy.backoff(100), Duration::from_secs(120));
    }

    #[test]
    fn retryable_statuses() {
        assert!(RetryPolicy::is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(RetryPolicy::is_retryable(StatusCode::GATEWAY_TIMEOUT));
        assert!(!RetryPolicy::is_retryable(StatusCode::CONFLICT));
        assert!(!RetryPolicy::is_retryable(StatusCode::NOT_IMPLEMENTED));
    }

    #[test]
    fn in_cluster_config_from_service_env() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("token"), "abc123\n").expect("token");

        let env = HashMap::from([
            (SERVICE_HOST_ENV, "10.96.0.1"),
            (SERVICE_PORT_ENV, "443"),
        ]);
        let config = KubeConfig::from_env_with(
            |key| env.get(key).map(ToString::to_string),
            dir.path(),
        )
        .expect("config");

        assert_eq!(config.api_url, "https://10.96.0.1:443");
        assert_eq!(config.token.as_deref(), Some("abc123"));
        assert!(config.ca_cert_pem.is_none());
        assert!(!format!("{config:?}").contains("abc123"));
    }

    #[test]
    fn overrides_take_precedence() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("token"), "mounted").expect("token");

        let env = HashMap::from([
            (API_URL_ENV, "http://127.0.0.1:8001"),
            (TOKEN_ENV, "override"),
            (SERVICE_HOST_ENV, "10.96.0.1"),
        ]);
        let config = KubeConfig::from_env_with(
            |key| env.get(key).map(ToString::to_string),
            dir.path(),
        )
        .expect("config");
        assert_eq!(config.api_url, "http://127.0.0.1:8001");
        assert_eq!(config.token.as_deref(), Some("override"));
    }

    #[test]
    fn ipv6_service_host_is_bracketed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = KubeConfig::from_env_with(
            |key| (key == SERVICE_HOST_ENV).then(|| "fd00::1".to_string()),
            dir.path(),
        )
        .expect("config");
        assert_eq!(config.api_url, "https://[fd00::1]:443");
    }

    #[test]
    fn missing_api_server_is_configuration_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = KubeConfig::from_env_with(|_| None, dir.path()).expect_err("no server");
        assert!(err.is_configuration());
    }

    #[test]
    fn config_map_url_layout() {
        let store = ConfigMapStore::new(KubeConfig::new("http://localhost:8001/")).expect("store");
        assert_eq!(
            store.url(&RecordKey::default()),
            "http://localhost:8001/api/v1/namespaces/services/configmaps/cray-product-catalog"
        );
    }

    #[test]
    fn config_map_without_data_reads_empty() {
        let config_map: ConfigMap =
            serde_json::from_str(r#"{"metadata": {"resourceVersion": "42"}}"#).expect("json");
        let record = config_map.into_record().expect("record");
        assert!(record.data.is_empty());
        assert_eq!(record.resource_version, "42");
    }
}
