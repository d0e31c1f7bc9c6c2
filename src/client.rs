//! HTTP client for the remote segmentation service.
//!
//! Configuration is via [`Config`](crate::config::Config):
//! - `MATSEG_URL` - Base URL (default: `http://localhost:8000/api/v1`)
//! - `MATSEG_API_KEY` - Bearer token (optional for local services)

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::Config;
use crate::models::*;

/// Default URL for a local development service.
pub const DEFAULT_URL: &str = "http://localhost:8000/api/v1";

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: API key required or invalid")]
    Unauthorized,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// The remote contract the core depends on.
///
/// [`SegmentationClient`] is the HTTP implementation; tests substitute
/// scripted services to control response ordering.
#[async_trait]
pub trait SegmentationService: Send + Sync {
    /// `POST /session/init` with the image as multipart field `file`.
    async fn init_session(
        &self,
        file_name: &str,
        image: Vec<u8>,
    ) -> Result<SessionInitResponse, ClientError>;

    /// `POST /analyze/text`.
    async fn analyze_text(
        &self,
        request: &TextAnalysisRequest,
    ) -> Result<AnalysisResponse, ClientError>;

    /// `POST /analyze/interact`.
    async fn refine(
        &self,
        request: &InteractionRequest,
    ) -> Result<RefinementResponse, ClientError>;

    /// Turn a service-relative path (like an `image_url`) into an absolute URL.
    fn resolve_url(&self, path: &str) -> String {
        path.to_string()
    }
}

/// HTTP client for the segmentation service.
#[derive(Debug, Clone)]
pub struct SegmentationClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl SegmentationClient {
    /// Create client from environment variables.
    pub fn from_env() -> Self {
        Self::from_config(&Config::from_env())
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.base_url.clone(), config.api_key.clone())
    }

    /// Create with explicit configuration.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request with optional auth header.
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, &url);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    /// Handle response, converting HTTP errors to ClientError.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            match status {
                StatusCode::NOT_FOUND => Err(ClientError::NotFound(body)),
                StatusCode::BAD_REQUEST => Err(ClientError::BadRequest(body)),
                StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
                _ => Err(ClientError::Server(format!("{}: {}", status, body))),
            }
        }
    }

    /// Scheme and authority of the base URL, e.g. `http://localhost:8000`.
    fn origin(&self) -> &str {
        let after_scheme = self.base_url.find("://").map(|i| i + 3).unwrap_or(0);
        match self.base_url[after_scheme..].find('/') {
            Some(i) => &self.base_url[..after_scheme + i],
            None => &self.base_url,
        }
    }
}

#[async_trait]
impl SegmentationService for SegmentationClient {
    async fn init_session(
        &self,
        file_name: &str,
        image: Vec<u8>,
    ) -> Result<SessionInitResponse, ClientError> {
        let part = Part::bytes(image).file_name(file_name.to_string());
        let form = Form::new().part("file", part);

        let response = self
            .request(reqwest::Method::POST, "/session/init")
            .multipart(form)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn analyze_text(
        &self,
        request: &TextAnalysisRequest,
    ) -> Result<AnalysisResponse, ClientError> {
        let response = self
            .request(reqwest::Method::POST, "/analyze/text")
            .json(request)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn refine(
        &self,
        request: &InteractionRequest,
    ) -> Result<RefinementResponse, ClientError> {
        let response = self
            .request(reqwest::Method::POST, "/analyze/interact")
            .json(request)
            .send()
            .await?;
        self.handle_response(response).await
    }

    fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.origin(), path.trim_start_matches('/'))
    }
}
