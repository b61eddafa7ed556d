//! Resolves bucket paths against the object store.
//!
//! There are no directory objects: a path is a directory when some key
//! lives underneath it, and a file when an object exists at exactly its key.
//! When both hold, the direct fetch wins and the path is a file.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use serde_json::Value;
use url::Url;

use crate::attr::{AttributeView, FileAttr, FileType};
use crate::error::{VfsError, VfsResult};
use crate::filesystem::BucketFs;
use crate::path::{SEPARATOR, VfsPath};
use crate::store::{ListRequest, ObjectMeta, SharedStore};

/// URL scheme served by [`FsProvider`].
pub const SCHEME: &str = "s3";

/// One child returned by [`FsProvider::list_children`].
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    /// Absolute path of the child.
    pub path: VfsPath,
    /// `Directory` for common prefixes, `File` for objects.
    pub kind: FileType,
    /// Object size from the listing; zero for directories.
    pub size: u64,
    /// Object timestamp from the listing; `None` for directories.
    pub modified: Option<SystemTime>,
}

impl DirEntry {
    /// Last name element of the child.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string())
            .unwrap_or_default()
    }

    /// Attributes derivable from the listing alone.
    pub fn attributes(&self) -> FileAttr {
        let key = self.path.to_string();
        match self.kind {
            FileType::Directory => FileAttr::directory(key),
            FileType::File => {
                let meta = ObjectMeta {
                    size: self.size,
                    last_modified: self.modified,
                };
                let mut attr = FileAttr::synthesize(Some(&meta), key);
                // Listed objects are files even when the listing has no timestamp.
                attr.kind = FileType::File;
                attr
            }
        }
    }
}

/// Filesystem provider bound to one object-store client.
///
/// Every call goes to the store; nothing is cached, so results are as fresh
/// as the store's own consistency allows.
pub struct FsProvider {
    store: SharedStore,
}

impl FsProvider {
    /// Create a provider. Filesystems keep a reference back to it, so it
    /// lives behind an `Arc`.
    pub fn new(store: SharedStore) -> Arc<Self> {
        Arc::new(Self { store })
    }

    /// URL scheme of bucket locators.
    pub fn scheme(&self) -> &'static str {
        SCHEME
    }

    /// Bind a filesystem to the bucket named by `locator` (`s3://<bucket>`).
    pub fn new_filesystem(self: &Arc<Self>, locator: &str) -> VfsResult<BucketFs> {
        let url = Url::parse(locator)
            .map_err(|e| VfsError::invalid_argument(format!("bad bucket locator {locator}: {e}")))?;
        if url.scheme() != SCHEME {
            return Err(VfsError::invalid_argument(format!(
                "invalid scheme '{}', {SCHEME} is the only supported scheme",
                url.scheme()
            )));
        }
        let bucket = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| VfsError::invalid_argument(format!("no bucket in locator {locator}")))?;

        Ok(BucketFs::new(Arc::clone(self), bucket))
    }

    fn check_owner(&self, path: &VfsPath) -> VfsResult<()> {
        if std::ptr::eq(path.filesystem().provider(), self) {
            Ok(())
        } else {
            Err(VfsError::invalid_argument(format!(
                "{path} belongs to another provider"
            )))
        }
    }

    /// Children of `dir`: one directory per common prefix, one file per
    /// object. Order is the store's; nothing is de-duplicated.
    ///
    /// All pages are fetched before returning.
    pub async fn list_children(&self, dir: &VfsPath) -> VfsResult<Vec<DirEntry>> {
        self.check_owner(dir)?;
        let fs = dir.filesystem();
        let prefix = dir.to_prefix_key();
        let delimiter = SEPARATOR.to_string();
        tracing::debug!(bucket = fs.bucket(), prefix = %prefix, "listing directory");

        let mut entries = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let request = ListRequest::delimited(&prefix, &delimiter).with_continuation(token.as_deref());
            let page = self.store.list_objects(fs.bucket(), &request).await?;

            for common_prefix in &page.common_prefixes {
                let key = common_prefix.strip_suffix(SEPARATOR).unwrap_or(common_prefix);
                entries.push(DirEntry {
                    path: fs.root().resolve_str(key),
                    kind: FileType::Directory,
                    size: 0,
                    modified: None,
                });
            }
            for object in &page.objects {
                // The directory's own marker object is not a child.
                if object.key == prefix {
                    continue;
                }
                entries.push(DirEntry {
                    path: fs.root().resolve_str(&object.key),
                    kind: FileType::File,
                    size: object.size,
                    modified: object.last_modified,
                });
            }

            match page.next_continuation_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(entries)
    }

    /// True if at least one key lives under `prefix`.
    async fn has_children(&self, bucket: &str, prefix: &str) -> VfsResult<bool> {
        let request = ListRequest::prefix(prefix).with_max_keys(1);
        let page = self.store.list_objects(bucket, &request).await?;
        Ok(page.key_count() > 0)
    }

    /// Attributes of `path`: file attributes from a direct fetch, else
    /// directory attributes if any key lives underneath.
    pub async fn attributes_of(&self, path: &VfsPath) -> VfsResult<FileAttr> {
        self.check_owner(path)?;
        let bucket = path.filesystem().bucket();
        let key = path.to_object_key();
        if key.is_empty() {
            return Ok(FileAttr::directory(path.to_string()));
        }

        tracing::debug!(bucket, key = %key, "fetching attributes");
        if let Some(meta) = self.store.head_object(bucket, &key).await? {
            return Ok(FileAttr::synthesize(Some(&meta), path.to_string()));
        }
        if self.has_children(bucket, &path.to_prefix_key()).await? {
            return Ok(FileAttr::directory(path.to_string()));
        }
        Err(VfsError::not_found(path.to_string()))
    }

    /// Succeeds iff `path` is an object or has keys underneath it.
    ///
    /// Permission bits are never consulted.
    pub async fn check_exists(&self, path: &VfsPath) -> VfsResult<()> {
        self.check_owner(path)?;
        let bucket = path.filesystem().bucket();
        let key = path.to_object_key();
        if key.is_empty() {
            return Ok(());
        }
        if self.store.head_object(bucket, &key).await?.is_some() {
            return Ok(());
        }
        if self.has_children(bucket, &path.to_prefix_key()).await? {
            return Ok(());
        }
        Err(VfsError::not_found(path.to_string()))
    }

    /// Named attributes in the form `[view:]name,name` or `[view:]*`.
    ///
    /// The view defaults to `basic`.
    pub async fn read_attributes(
        &self,
        path: &VfsPath,
        attributes: &str,
    ) -> VfsResult<BTreeMap<String, Value>> {
        let (view, names) = match attributes.split_once(':') {
            Some((view, names)) => {
                let view: AttributeView = view
                    .parse()
                    .map_err(|_| VfsError::unsupported("attribute view"))?;
                (view, names)
            }
            None => (AttributeView::Basic, attributes),
        };
        let names: Vec<&str> = names.split(',').map(str::trim).collect();
        let attr = self.attributes_of(path).await?;
        attr.to_map(view, &names)
    }

    /// Attributes are derived from the store and cannot be written.
    pub fn set_attribute(&self, _path: &VfsPath, _attribute: &str, _value: Value) -> VfsResult<()> {
        Err(VfsError::unsupported("setting attributes"))
    }

    /// Ownership is fixed to `nobody`.
    pub fn set_owner(&self, _path: &VfsPath, _owner: &str) -> VfsResult<()> {
        Err(VfsError::unsupported("changing ownership"))
    }

    /// Permissions are fixed to `rw-rw-rw-`.
    pub fn set_permissions(&self, _path: &VfsPath, _perm: u32) -> VfsResult<()> {
        Err(VfsError::unsupported("changing permissions"))
    }

    pub fn create_symlink(&self, _link: &VfsPath, _target: &VfsPath) -> VfsResult<()> {
        Err(VfsError::unsupported("symbolic links"))
    }
}
