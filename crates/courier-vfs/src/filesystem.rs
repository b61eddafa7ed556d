//! Filesystem handle bound to one bucket.

use std::fmt;
use std::sync::Arc;

use crate::attr::AttributeView;
use crate::error::{VfsError, VfsResult};
use crate::path::{SEPARATOR, VfsPath};
use crate::provider::FsProvider;

struct FsInner {
    provider: Arc<FsProvider>,
    bucket: String,
}

/// A bucket exposed as a hierarchical filesystem.
///
/// Cheap to clone; clones share identity. Paths made by one handle (or its
/// clones) never compare equal to paths made by another handle, even for
/// the same bucket.
#[derive(Clone)]
pub struct BucketFs {
    inner: Arc<FsInner>,
}

impl BucketFs {
    pub(crate) fn new(provider: Arc<FsProvider>, bucket: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(FsInner {
                provider,
                bucket: bucket.into(),
            }),
        }
    }

    /// Provider that resolves paths of this filesystem against the store.
    pub fn provider(&self) -> &FsProvider {
        &self.inner.provider
    }

    /// Name of the bound bucket.
    pub fn bucket(&self) -> &str {
        &self.inner.bucket
    }

    /// True if both handles are the same filesystem instance.
    pub fn same_as(&self, other: &BucketFs) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stable identity for hashing and ordering.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Name separator, always `/`.
    pub fn separator(&self) -> &'static str {
        "/"
    }

    /// The `basic` and `posix` views.
    pub fn supported_attribute_views(&self) -> &'static [AttributeView] {
        &AttributeView::ALL
    }

    /// The store needs no teardown, so the filesystem never closes.
    pub fn is_open(&self) -> bool {
        true
    }

    pub fn is_read_only(&self) -> bool {
        false
    }

    /// The root directory `/`.
    pub fn root(&self) -> VfsPath {
        VfsPath::new(self.clone(), SEPARATOR.to_string())
    }

    /// Join `first` and `more` with the separator. No I/O.
    pub fn path(&self, first: &str, more: &[&str]) -> VfsPath {
        let mut path = String::from(first);
        for segment in more {
            path.push(SEPARATOR);
            path.push_str(segment);
        }
        VfsPath::new(self.clone(), path)
    }

    /// Change notification is not available for object stores.
    pub fn watch(&self, _path: &VfsPath) -> VfsResult<()> {
        Err(VfsError::unsupported("file watching"))
    }
}

impl fmt::Debug for BucketFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketFs")
            .field("scheme", &self.inner.provider.scheme())
            .field("bucket", &self.inner.bucket)
            .finish()
    }
}
