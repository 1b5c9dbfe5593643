//! Loader configuration
//!
//! Collects the knobs the loader needs (data host, cache lifetime, content
//! format version, request timeout) along with their defaults.

use std::time::Duration;

use chrono::Duration as TtlDuration;

use crate::data::{LoadError, DEFAULT_CATEGORIES};

/// Default location of the category JSON documents (a local static server)
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/data";

/// Content format version; bumping it invalidates every cached category
pub const DEFAULT_FORMAT_VERSION: &str = "1.2.0";

/// Name of the persisted cache record
pub const DEFAULT_CACHE_NAMESPACE: &str = "quizfetch_v1_data";

/// Default cache lifetime in hours (7 days)
pub const DEFAULT_TTL_HOURS: u64 = 7 * 24;

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for a [`CategoryLoader`](crate::loader::CategoryLoader)
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Base URL of the data host; documents live at `{base_url}/{id}.json`
    pub base_url: String,
    /// How long a cached category stays fresh
    pub cache_ttl: TtlDuration,
    /// Version string mixed into every cache key
    pub format_version: String,
    /// Upper bound on a single fetch, including the body download
    pub request_timeout: Duration,
    /// Record name under which the cache is persisted
    pub cache_namespace: String,
    /// Append a `?v=<millis>` query to every fetch
    pub cache_bust: bool,
    /// Categories fetched by `load_all_categories`, in order
    pub categories: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_ttl: TtlDuration::hours(DEFAULT_TTL_HOURS as i64),
            format_version: DEFAULT_FORMAT_VERSION.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cache_namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            cache_bust: true,
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl LoaderConfig {
    /// Sets the data host base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the cache lifetime
    pub fn with_cache_ttl(mut self, ttl: TtlDuration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the content format version
    pub fn with_format_version(mut self, version: impl Into<String>) -> Self {
        self.format_version = version.into();
        self
    }

    /// Sets the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the persisted cache record name
    pub fn with_cache_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cache_namespace = namespace.into();
        self
    }

    /// Enables or disables the cache-busting query parameter
    pub fn with_cache_bust(mut self, enabled: bool) -> Self {
        self.cache_bust = enabled;
        self
    }

    /// Replaces the category list used by `load_all_categories`
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Checks the configuration is usable
    ///
    /// # Returns
    /// * `Ok(())` if the base URL and category list are non-empty
    /// * `Err(LoadError::InvalidConfig)` otherwise
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.base_url.trim().is_empty() {
            return Err(LoadError::InvalidConfig("base URL is empty".to_string()));
        }
        if self.categories.is_empty() {
            return Err(LoadError::InvalidConfig(
                "category list is empty".to_string(),
            ));
        }
        if self.categories.iter().any(|c| c.trim().is_empty()) {
            return Err(LoadError::InvalidConfig(
                "category list contains an empty name".to_string(),
            ));
        }
        Ok(())
    }
}
