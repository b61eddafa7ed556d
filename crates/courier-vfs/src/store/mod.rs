//! Object store abstraction.
//!
//! The filesystem only needs two calls from a store: a metadata fetch by
//! exact key and a prefix/delimiter listing. Everything else about the store
//! (credentials, retries, endpoints) belongs to the implementation.

mod memory;
mod s3;

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use s3::{S3Settings, S3Store};

/// Object store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Request to the store failed.
    #[error("network error: {message}")]
    Network { message: String },

    /// Client could not be configured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Create a Network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a Configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Object store result type.
pub type StoreResult<T> = Result<T, StoreError>;

/// Metadata returned by a direct fetch of one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Content length in bytes.
    pub size: u64,
    /// Last modification time, when the store reports one.
    pub last_modified: Option<SystemTime>,
}

/// One object returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<SystemTime>,
}

/// Parameters of a single listing request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListRequest<'a> {
    /// Only keys starting with this prefix are returned.
    pub prefix: &'a str,
    /// Keys containing the delimiter after the prefix are folded into
    /// common prefixes.
    pub delimiter: Option<&'a str>,
    /// Token from the previous page's `next_continuation_token`.
    pub continuation_token: Option<&'a str>,
    /// Upper bound on entries per page; the store's default when `None`.
    pub max_keys: Option<i32>,
}

impl<'a> ListRequest<'a> {
    /// Listing of every key under `prefix`.
    pub fn prefix(prefix: &'a str) -> Self {
        Self {
            prefix,
            ..Default::default()
        }
    }

    /// Listing of one hierarchy level under `prefix`.
    pub fn delimited(prefix: &'a str, delimiter: &'a str) -> Self {
        Self {
            prefix,
            delimiter: Some(delimiter),
            ..Default::default()
        }
    }

    pub fn with_continuation(mut self, token: Option<&'a str>) -> Self {
        self.continuation_token = token;
        self
    }

    pub fn with_max_keys(mut self, max_keys: i32) -> Self {
        self.max_keys = Some(max_keys);
        self
    }
}

/// One page of listing results.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    /// Present when more results are available.
    pub next_continuation_token: Option<String>,
}

impl ListPage {
    /// Number of keys and common prefixes on this page.
    pub fn key_count(&self) -> usize {
        self.objects.len() + self.common_prefixes.len()
    }
}

/// Store operations consumed by the filesystem.
///
/// Implementations must be safe to share between sessions; the filesystem
/// adds no locking around them.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch metadata for the object at exactly `key`.
    ///
    /// Returns `Ok(None)` when no such object exists.
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<Option<ObjectMeta>>;

    /// Fetch one page of a prefix/delimiter listing.
    async fn list_objects(&self, bucket: &str, request: &ListRequest<'_>) -> StoreResult<ListPage>;
}

/// Store handle shared by every filesystem bound to it.
pub type SharedStore = Arc<dyn ObjectStore>;
