//! Per-session filesystem construction.

use std::sync::Arc;

use crate::error::VfsResult;
use crate::filesystem::BucketFs;
use crate::path::VfsPath;
use crate::provider::FsProvider;

/// Binds sessions to the configured bucket.
#[derive(Clone)]
pub struct FileSystemFactory {
    provider: Arc<FsProvider>,
    locator: String,
}

impl FileSystemFactory {
    /// `locator` is validated on every [`create_filesystem`](Self::create_filesystem),
    /// use [`FileSystemFactory::checked`] to fail early.
    pub fn new(provider: Arc<FsProvider>, locator: impl Into<String>) -> Self {
        Self {
            provider,
            locator: locator.into(),
        }
    }

    /// Like [`new`](Self::new), but rejects a bad locator up front.
    pub fn checked(provider: Arc<FsProvider>, locator: impl Into<String>) -> VfsResult<Self> {
        let factory = Self::new(provider, locator);
        factory.provider.new_filesystem(&factory.locator)?;
        Ok(factory)
    }

    /// The configured bucket locator.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// A fresh filesystem for one session.
    pub fn create_filesystem(&self, username: &str) -> VfsResult<BucketFs> {
        let fs = self.provider.new_filesystem(&self.locator)?;
        tracing::info!(user = username, bucket = fs.bucket(), "bound session filesystem");
        Ok(fs)
    }

    /// Every user starts at the bucket root.
    pub fn user_home_dir(&self, fs: &BucketFs) -> VfsPath {
        fs.root()
    }
}
