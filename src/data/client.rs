//! HTTP client for the static category data host
//!
//! Fetches `{base_url}/{category}.json` and parses it into a [`CategoryPayload`].

use chrono::Utc;
use reqwest::{header, Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info};

use super::CategoryPayload;
use crate::config::LoaderConfig;

/// Errors that can occur when loading category data
///
/// Cloneable so a single failure can be handed to every caller that was
/// waiting on the same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The request could not be sent, or it timed out
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status
    #[error("HTTP {status}: {reason}")]
    HttpStatus {
        /// Numeric status code
        status: u16,
        /// Canonical reason phrase, if known
        reason: String,
    },

    /// The body was not valid JSON or did not match the expected shape
    #[error("Failed to parse category data: {0}")]
    Parse(String),

    /// Every category failed to load
    #[error("No category data could be loaded")]
    NothingLoaded,

    /// The loader configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for LoadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LoadError::Network(format!("request timed out: {}", err))
        } else {
            LoadError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        LoadError::Parse(err.to_string())
    }
}

/// Client for fetching raw category documents
#[derive(Debug, Clone)]
pub struct CategoryClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Base URL of the data host, without a trailing slash
    base_url: String,
    /// Whether to append a `?v=<millis>` query to defeat intermediate caches
    cache_bust: bool,
}

impl CategoryClient {
    /// Creates a client from the loader configuration
    ///
    /// The configured request timeout applies to the whole request, so a
    /// stalled host surfaces as [`LoadError::Network`] instead of hanging.
    pub fn new(config: &LoaderConfig) -> Result<Self, LoadError> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LoadError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self::with_client(http_client, config))
    }

    /// Creates a client around an existing reqwest client
    pub fn with_client(http_client: Client, config: &LoaderConfig) -> Self {
        Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache_bust: config.cache_bust,
        }
    }

    /// Returns the document URL for a category
    pub fn category_url(&self, category: &str) -> String {
        format!("{}/{}.json", self.base_url, category)
    }

    /// Fetches and parses one category document
    ///
    /// # Returns
    /// * `Ok(CategoryPayload)` - The raw (not yet enhanced) document
    /// * `Err(LoadError)` - On network failure, non-success status, or a body
    ///   that is not a payload containing `category` at the top level
    pub async fn fetch_category(&self, category: &str) -> Result<CategoryPayload, LoadError> {
        let url = self.category_url(category);
        info!(category, url = %url, "fetching category");

        let mut request = self
            .http_client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .header(header::CACHE_CONTROL, "no-cache");
        if self.cache_bust {
            request = request.query(&[("v", Utc::now().timestamp_millis())]);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(category, %status, "received response");

        if !status.is_success() {
            return Err(status_error(status));
        }

        let text = response.text().await?;
        parse_payload(category, &text)
    }
}

fn status_error(status: StatusCode) -> LoadError {
    LoadError::HttpStatus {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
    }
}

/// Parses a category document, checking it is keyed by the requested category
pub fn parse_payload(category: &str, text: &str) -> Result<CategoryPayload, LoadError> {
    let payload: CategoryPayload = serde_json::from_str(text)?;

    if !payload.contains_key(category) {
        return Err(LoadError::Parse(format!(
            "document has no top-level '{}' key",
            category
        )));
    }

    Ok(payload)
}
