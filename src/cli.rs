//! Command-line interface parsing for quizfetch
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! a [`LoaderConfig`] and a persistent store for the cache.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as TtlDuration;
use clap::{ArgAction, Parser, Subcommand};
use thiserror::Error;
use tracing::warn;

use crate::cache::{FileStore, KeyValueStore, MemoryStore};
use crate::config::{
    LoaderConfig, DEFAULT_BASE_URL, DEFAULT_FORMAT_VERSION, DEFAULT_TIMEOUT_SECS,
    DEFAULT_TTL_HOURS,
};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The category name cannot be used as a document name
    #[error("Invalid category: '{0}'. Use letters, digits, '-' or '_'")]
    InvalidCategory(String),

    /// A zero request timeout would fail every fetch
    #[error("Timeout must be at least 1 second")]
    ZeroTimeout,

    /// The TTL does not fit in a duration
    #[error("TTL of {0} hours is out of range")]
    TtlOutOfRange(u64),
}

/// quizfetch - Fetch, enhance and cache quiz category data
#[derive(Parser, Debug)]
#[command(name = "quizfetch")]
#[command(about = "Fetch, enhance and cache quiz category data")]
#[command(version)]
pub struct Cli {
    /// Base URL of the data host; documents are fetched from {base_url}/{category}.json
    #[arg(long, env = "QUIZFETCH_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub base_url: String,

    /// How long fetched categories stay cached, in hours
    #[arg(long, env = "QUIZFETCH_TTL_HOURS", default_value_t = DEFAULT_TTL_HOURS, global = true)]
    pub ttl_hours: u64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    pub timeout_secs: u64,

    /// Content format version; changing it ignores everything cached under another version
    #[arg(long, default_value = DEFAULT_FORMAT_VERSION, global = true)]
    pub format_version: String,

    /// Directory for the persisted cache (defaults to the platform cache directory)
    #[arg(long, env = "QUIZFETCH_CACHE_DIR", value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Keep the cache in memory only
    #[arg(long, global = true)]
    pub no_persist: bool,

    /// Do not append the cache-busting `v` query parameter
    #[arg(long, global = true)]
    pub no_cache_bust: bool,

    /// Comma-separated categories loaded by `all`
    #[arg(long, value_delimiter = ',', value_name = "LIST", global = true)]
    pub categories: Option<Vec<String>>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Load one category and print it as JSON
    Fetch {
        /// Category to load, e.g. "math"
        category: String,
    },
    /// Load every configured category and print the merged result as JSON
    All,
    /// Remove all cached data
    ClearCache,
    /// Expand inline markup in a piece of text and print the result
    Enhance {
        /// Text containing fractions, [img:...] or [arabic:...] tags
        text: String,
    },
}

/// Checks a category name is safe to use as a document name.
///
/// # Returns
/// * `Ok(String)` with the trimmed name
/// * `Err(CliError::InvalidCategory)` if it is empty or contains other characters
pub fn parse_category_arg(s: &str) -> Result<String, CliError> {
    let name = s.trim();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(name.to_string())
    } else {
        Err(CliError::InvalidCategory(s.to_string()))
    }
}

impl Cli {
    /// Builds the loader configuration from the parsed arguments.
    ///
    /// # Returns
    /// * `Ok(LoaderConfig)` with defaults overridden by the given flags
    /// * `Err(CliError)` if a category name or the timeout is invalid
    pub fn loader_config(&self) -> Result<LoaderConfig, CliError> {
        if self.timeout_secs == 0 {
            return Err(CliError::ZeroTimeout);
        }

        let ttl = i64::try_from(self.ttl_hours)
            .ok()
            .and_then(TtlDuration::try_hours)
            .ok_or(CliError::TtlOutOfRange(self.ttl_hours))?;

        let mut config = LoaderConfig::default()
            .with_base_url(self.base_url.clone())
            .with_cache_ttl(ttl)
            .with_request_timeout(Duration::from_secs(self.timeout_secs))
            .with_format_version(self.format_version.clone())
            .with_cache_bust(!self.no_cache_bust);

        if let Some(categories) = &self.categories {
            let categories = categories
                .iter()
                .map(|c| parse_category_arg(c))
                .collect::<Result<Vec<_>, _>>()?;
            config = config.with_categories(categories);
        }

        Ok(config)
    }

    /// Picks the persistent medium for the cache.
    ///
    /// Falls back to an in-memory store when no cache directory can be found.
    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        if self.no_persist {
            return Arc::new(MemoryStore::new());
        }
        if let Some(dir) = &self.cache_dir {
            return Arc::new(FileStore::with_dir(dir.clone()));
        }
        match FileStore::new() {
            Some(store) => Arc::new(store),
            None => {
                warn!("no cache directory available, caching in memory only");
                Arc::new(MemoryStore::new())
            }
        }
    }

    /// Default tracing filter for the requested verbosity
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}
