//! reqwest-backed entity endpoints and reachability probe.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{EntityEndpoint, RemoteError};
use crate::error::{Error, Result};
use crate::models::EntityType;
use crate::util::{compact_text, is_http_url, normalize_text_option};

const PROBE_TIMEOUT_SECS: u64 = 4;

/// REST collection for one entity type.
///
/// `create` POSTs the payload to the collection URL; `update` PUTs it and
/// `delete` DELETEs at `{collection}/{payload.id}`.
#[derive(Clone)]
pub struct HttpEntityEndpoint {
    collection_url: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpEntityEndpoint {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpEntityEndpoint")
            .field("collection_url", &self.collection_url)
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl HttpEntityEndpoint {
    pub fn new(collection_url: impl Into<String>, client: reqwest::Client) -> Result<Self> {
        Ok(Self {
            collection_url: normalize_base_url(collection_url.into())?,
            bearer_token: None,
            client,
        })
    }

    /// Endpoint at `{base_url}/{entity}s`, e.g. `/inspections`
    pub fn for_entity(
        base_url: &str,
        entity_type: &EntityType,
        client: reqwest::Client,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url.to_string())?;
        Self::new(format!("{base_url}/{entity_type}s"), client)
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = normalize_text_option(token);
        self
    }

    pub fn collection_url(&self) -> &str {
        &self.collection_url
    }

    fn record_url(&self, payload: &Value) -> std::result::Result<String, RemoteError> {
        let id = match payload.get("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(RemoteError::permanent(
                    "payload has no 'id' to address the record",
                ))
            }
        };
        Ok(format!(
            "{}/{}",
            self.collection_url,
            urlencoding::encode(&id)
        ))
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> std::result::Result<(), RemoteError> {
        let mut request = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::from_status(
            status.as_u16(),
            parse_api_error(status, &body),
        ))
    }
}

#[async_trait]
impl EntityEndpoint for HttpEntityEndpoint {
    async fn create(&self, payload: &Value) -> std::result::Result<(), RemoteError> {
        self.send(Method::POST, &self.collection_url, Some(payload))
            .await
    }

    async fn update(&self, payload: &Value) -> std::result::Result<(), RemoteError> {
        let url = self.record_url(payload)?;
        self.send(Method::PUT, &url, Some(payload)).await
    }

    async fn delete(&self, payload: &Value) -> std::result::Result<(), RemoteError> {
        let url = self.record_url(payload)?;
        self.send(Method::DELETE, &url, None).await
    }
}

/// Checks whether the remote service answers at all.
#[derive(Clone)]
pub struct HttpConnectivityProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpConnectivityProbe {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            url: normalize_base_url(url.into())?,
            client,
        })
    }

    /// Any HTTP response counts as reachable; transport errors do not.
    pub async fn probe(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(_) => true,
            Err(error) => {
                tracing::debug!("Connectivity probe to {} failed: {error}", self.url);
                false
            }
        }
    }
}

fn classify_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_builder() {
        RemoteError::permanent(format!("invalid request: {error}"))
    } else {
        RemoteError::transient(format!("request failed: {error}"))
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("API URL must not be empty".to_string()))?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "API URL must include http:// or https://".to_string(),
        ))
    }
}
