//! REST client for the remote store.
//!
//! GET/POST `/api/{collection}`, PATCH/DELETE `/api/{collection}/{id}` and
//! POST `/api/transactions/bulk-update`. Every response is wrapped in an
//! [`ApiEnvelope`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ledgerline_core::sync::{BulkRename, EntityFamily, RemoteStore};
use ledgerline_core::{Error, Result};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::auth::SessionProvider;
use crate::error::RemoteApiError;
use crate::types::ApiEnvelope;

/// Environment variable holding the remote API base URL.
pub const API_URL_ENV: &str = "LEDGERLINE_API_URL";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

type ApiResult<T> = std::result::Result<T, RemoteApiError>;

/// Base URL from `LEDGERLINE_API_URL`, trimmed of trailing slashes.
pub fn api_base_url() -> Result<String> {
    std::env::var(API_URL_ENV)
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            Error::Config(format!(
                "{API_URL_ENV} not configured. Remote store operations are disabled."
            ))
        })
}

/// URL path segment of an entity family's collection.
pub fn collection_path(family: EntityFamily) -> &'static str {
    match family {
        EntityFamily::Transaction => "transactions",
        EntityFamily::Category => "categories",
        EntityFamily::PaymentMethod => "payment-methods",
    }
}

#[derive(Clone)]
pub struct RemoteApiClient {
    client: reqwest::Client,
    base_url: String,
    session: Arc<dyn SessionProvider>,
}

impl RemoteApiClient {
    /// Create a new client.
    ///
    /// * `base_url` - e.g. "https://api.ledgerline.app"; trailing slashes are dropped
    pub fn new(base_url: &str, session: Arc<dyn SessionProvider>) -> Result<Self> {
        Self::with_timeout(base_url, session, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: &str,
        session: Arc<dyn SessionProvider>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    /// Client for the URL in `LEDGERLINE_API_URL`.
    pub fn from_env(session: Arc<dyn SessionProvider>) -> Result<Self> {
        Self::new(&api_base_url()?, session)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn collection_url(&self, family: EntityFamily) -> String {
        format!("{}/api/{}", self.base_url, collection_path(family))
    }

    pub fn record_url(&self, family: EntityFamily, id: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(family),
            urlencoding::encode(id)
        )
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[RemoteApi] Response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[RemoteApi] Response error ({}): {}", status, preview);
    }

    async fn headers(&self) -> ApiResult<HeaderMap> {
        let token = self
            .session
            .access_token()
            .await
            .ok_or_else(|| RemoteApiError::auth("No active session. Please sign in first."))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| RemoteApiError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);
        Ok(headers)
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> ApiResult<Option<T>> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);
        decode_envelope(status.as_u16(), &body)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> ApiResult<Option<T>> {
        let response = request.headers(self.headers().await?).send().await?;
        Self::parse_response(response).await
    }

    async fn send_for_record(&self, request: reqwest::RequestBuilder) -> ApiResult<Value> {
        self.send::<Value>(request)
            .await?
            .ok_or_else(|| RemoteApiError::InvalidResponse("response carried no record".into()))
    }
}

/// Decodes an enveloped response body.
pub(crate) fn decode_envelope<T: DeserializeOwned>(
    status: u16,
    body: &str,
) -> ApiResult<Option<T>> {
    let envelope = serde_json::from_str::<ApiEnvelope<T>>(body);

    if !(200..300).contains(&status) {
        let message = match envelope {
            Ok(ApiEnvelope {
                error: Some(message),
                ..
            }) => message,
            _ => format!("Request failed: {}", body),
        };
        return Err(RemoteApiError::api(status, message));
    }

    let envelope = envelope?;
    if !envelope.success {
        return Err(RemoteApiError::Rejected(
            envelope
                .error
                .unwrap_or_else(|| "request was not successful".to_string()),
        ));
    }
    Ok(envelope.data)
}

#[async_trait]
impl RemoteStore for RemoteApiClient {
    async fn list(&self, family: EntityFamily) -> Result<Vec<Value>> {
        let url = self.collection_url(family);
        debug!("[RemoteApi] GET {}", url);
        let records = self
            .send::<Vec<Value>>(self.client.get(&url))
            .await?
            .unwrap_or_default();
        Ok(records)
    }

    async fn create(&self, family: EntityFamily, payload: Value) -> Result<Value> {
        let url = self.collection_url(family);
        debug!("[RemoteApi] POST {}", url);
        Ok(self.send_for_record(self.client.post(&url).json(&payload)).await?)
    }

    async fn update(&self, family: EntityFamily, id: &str, payload: Value) -> Result<Value> {
        let url = self.record_url(family, id);
        debug!("[RemoteApi] PATCH {}", url);
        Ok(self.send_for_record(self.client.patch(&url).json(&payload)).await?)
    }

    async fn delete(&self, family: EntityFamily, id: &str) -> Result<()> {
        let url = self.record_url(family, id);
        debug!("[RemoteApi] DELETE {}", url);
        self.send::<Value>(self.client.delete(&url)).await?;
        Ok(())
    }

    async fn bulk_update(&self, family: EntityFamily, rename: &BulkRename) -> Result<()> {
        if family != EntityFamily::Transaction {
            return Err(Error::remote_rejected(format!(
                "bulk update is not supported for {}",
                family.as_str()
            )));
        }
        let url = format!("{}/bulk-update", self.collection_url(family));
        debug!("[RemoteApi] POST {}", url);
        self.send::<Value>(self.client.post(&url).json(rename)).await?;
        Ok(())
    }
}
