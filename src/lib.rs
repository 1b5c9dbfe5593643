//! quizfetch library
//!
//! Loads quiz category documents from a static JSON host, expands their inline
//! markup, and caches the result with per-entry expiry. Concurrent loads of
//! the same category share a single request.

pub mod cache;
pub mod cli;
pub mod config;
pub mod content;
pub mod data;
pub mod loader;

pub use loader::{CategoryCollection, CategoryLoader, LoadObserver};
