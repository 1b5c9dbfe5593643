//! Core data models for quiz category content
//!
//! This module contains the types fetched from the remote data host: topics,
//! question/answer pairs and the per-category payload that wraps them.

pub mod client;

pub use client::{CategoryClient, LoadError};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Categories known to the quiz application, in display order
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "agama", "indo", "english", "ipa", "math", "seni", "geo", "sejarah", "dunia", "others",
    "random",
];

/// A fetched category document, keyed by category ID at the top level
pub type CategoryPayload = BTreeMap<String, Vec<Topic>>;

/// A text field that may carry inline markup
///
/// Documents are hand-written, so a field expected to hold text occasionally
/// holds a number or `null`. Those values are kept as-is rather than rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Markup {
    /// Text that goes through the content enhancer
    Text(String),
    /// Any non-string JSON value, passed through untouched
    Raw(serde_json::Value),
}

impl Markup {
    /// Returns the text content, if this is a string field
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Markup::Text(text) => Some(text),
            Markup::Raw(_) => None,
        }
    }
}

impl Default for Markup {
    fn default() -> Self {
        Markup::Raw(serde_json::Value::Null)
    }
}

impl From<&str> for Markup {
    fn from(text: &str) -> Self {
        Markup::Text(text.to_string())
    }
}

/// A single quiz question and its answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    /// Question text
    #[serde(default)]
    pub q: Markup,
    /// Answer text
    #[serde(default)]
    pub a: Markup,
}

/// One learning unit: a title, a summary and its quiz questions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    /// Human-readable title
    pub title: String,
    /// Summary shown before the quiz
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Markup>,
    /// Ordered quiz questions
    #[serde(default)]
    pub questions: Vec<QaPair>,
    /// Any other fields the document carries, preserved verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
