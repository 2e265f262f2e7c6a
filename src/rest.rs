//! Minimal client for the hosted backend's row-oriented REST API.

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::BackendConfig;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned status {status}")]
    Status { status: u16, details: Value },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Downstream body (if any) worth echoing back to the caller.
    pub fn details(&self) -> Option<&Value> {
        match self {
            BackendError::Status { details, .. } if !details.is_null() => Some(details),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
    anon_key: Option<String>,
}

impl RestClient {
    pub fn new(cfg: &BackendConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: cfg.url.trim_end_matches('/').to_string(),
            service_key: cfg.service_key.clone(),
            anon_key: cfg.anon_key.clone(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", self.anon_key.as_deref().unwrap_or(&self.service_key))
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", self.service_key))
    }

    /// `GET /rest/v1/{table}?{query}`; `query` is already URL-encoded.
    pub async fn select<T: DeserializeOwned>(&self, table: &str, query: &str) -> Result<Vec<T>, BackendError> {
        let url = format!("{}?{}", self.table_url(table), query);
        let resp = self.request(Method::GET, &url).send().await?;
        let body = Self::read(resp).await?;
        serde_json::from_value(body).map_err(|e| BackendError::Decode(format!("{table}: {e}")))
    }

    /// Insert one row and return whatever representation the backend sends back.
    pub async fn insert<B: Serialize + ?Sized>(&self, table: &str, row: &B) -> Result<Value, BackendError> {
        let resp = self
            .request(Method::POST, &self.table_url(table))
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;
        Self::read(resp).await
    }

    async fn read(resp: Response) -> Result<Value, BackendError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        let body = serde_json::from_slice::<Value>(&bytes).unwrap_or(Value::Null);
        if !status.is_success() {
            tracing::error!(status = status.as_u16(), details = %body, "backend request failed");
            return Err(BackendError::Status { status: status.as_u16(), details: body });
        }
        Ok(body)
    }
}

/// `column=eq.value` with the value percent-encoded.
pub fn eq_filter(column: &str, value: &str) -> String {
    format!("{column}=eq.{}", urlencoding::encode(value))
}
