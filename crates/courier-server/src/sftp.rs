//! Per-session file-transfer operations over a bucket filesystem.
//!
//! One `SftpSession` per subsystem channel. Directory handles live in the
//! session's own table; nothing is shared between sessions.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use courier_vfs::{BucketFs, FileAttr, VfsError, VfsPath, VfsResult};

use crate::constants::READDIR_BATCH_SIZE;

/// One name returned by [`SftpSession::readdir`].
#[derive(Debug, Clone)]
pub struct NameEntry {
    pub filename: String,
    /// `ls -l` style line.
    pub longname: String,
    pub attrs: FileAttr,
}

impl NameEntry {
    fn new(filename: impl Into<String>, attrs: FileAttr) -> Self {
        let filename = filename.into();
        let longname = long_name(&filename, &attrs, SystemTime::now());
        Self {
            filename,
            longname,
            attrs,
        }
    }
}

/// Listing captured at opendir time, handed out in batches.
struct DirHandle {
    path: VfsPath,
    pending: VecDeque<NameEntry>,
}

pub struct SftpSession {
    username: String,
    fs: BucketFs,
    home: VfsPath,
    handles: HashMap<String, DirHandle>,
    next_handle: u64,
}

impl SftpSession {
    pub fn new(fs: BucketFs, home: VfsPath, username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            fs,
            home,
            handles: HashMap::new(),
            next_handle: 0,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn filesystem(&self) -> &BucketFs {
        &self.fs
    }

    /// Number of open directory handles.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn resolve(&self, path: &str) -> VfsPath {
        self.home.resolve_str(path).normalize()
    }

    /// Canonical absolute form of `path`, relative paths taken from home.
    pub fn realpath(&self, path: &str) -> String {
        self.resolve(path).to_string()
    }

    pub async fn stat(&self, path: &str) -> VfsResult<FileAttr> {
        let path = self.resolve(path);
        self.fs.provider().attributes_of(&path).await
    }

    /// Same as [`stat`](Self::stat); there are no links to not follow.
    pub async fn lstat(&self, path: &str) -> VfsResult<FileAttr> {
        self.stat(path).await
    }

    /// List `path` and return a handle to read the listing from.
    pub async fn opendir(&mut self, path: &str) -> VfsResult<String> {
        let dir = self.resolve(path);
        let provider = self.fs.provider();
        let attrs = provider.attributes_of(&dir).await?;
        if !attrs.is_dir() {
            return Err(VfsError::not_a_directory(dir.to_string()));
        }

        let children = provider.list_children(&dir).await?;
        let mut pending = VecDeque::with_capacity(children.len() + 2);
        pending.push_back(NameEntry::new(".", attrs));
        let parent = dir.parent().unwrap_or_else(|| dir.clone());
        pending.push_back(NameEntry::new("..", FileAttr::directory(parent.to_string())));
        for child in &children {
            pending.push_back(NameEntry::new(child.name(), child.attributes()));
        }

        let handle = format!("{:08x}", self.next_handle);
        self.next_handle += 1;
        tracing::debug!(user = %self.username, %handle, path = %dir, entries = children.len(), "opendir");
        self.handles.insert(handle.clone(), DirHandle { path: dir, pending });
        Ok(handle)
    }

    /// Attributes of the directory behind an open handle.
    pub async fn fstat(&self, handle: &str) -> VfsResult<FileAttr> {
        let dir = self
            .handles
            .get(handle)
            .ok_or_else(|| VfsError::invalid_handle(handle))?;
        self.fs.provider().attributes_of(&dir.path).await
    }

    /// Next batch of names, or `None` once the listing is exhausted.
    pub fn readdir(&mut self, handle: &str) -> VfsResult<Option<Vec<NameEntry>>> {
        let dir = self
            .handles
            .get_mut(handle)
            .ok_or_else(|| VfsError::invalid_handle(handle))?;
        if dir.pending.is_empty() {
            return Ok(None);
        }
        let count = dir.pending.len().min(READDIR_BATCH_SIZE);
        Ok(Some(dir.pending.drain(..count).collect()))
    }

    pub fn close(&mut self, handle: &str) -> VfsResult<()> {
        match self.handles.remove(handle) {
            Some(dir) => {
                tracing::debug!(user = %self.username, %handle, path = %dir.path, "closed");
                Ok(())
            }
            None => Err(VfsError::invalid_handle(handle)),
        }
    }

    // File content and namespace changes are not available.

    pub fn open(&mut self, _path: &str) -> VfsResult<String> {
        Err(VfsError::unsupported("opening files"))
    }

    pub fn mkdir(&mut self, _path: &str) -> VfsResult<()> {
        Err(VfsError::unsupported("creating directories"))
    }

    pub fn remove(&mut self, _path: &str) -> VfsResult<()> {
        Err(VfsError::unsupported("removing files"))
    }

    pub fn rename(&mut self, _from: &str, _to: &str) -> VfsResult<()> {
        Err(VfsError::unsupported("rename"))
    }

    /// Attributes are fixed; any change is refused.
    pub fn setstat(&mut self, path: &str, perm: u32) -> VfsResult<()> {
        let path = self.resolve(path);
        self.fs.provider().set_permissions(&path, perm)
    }

    pub fn symlink(&mut self, link: &str, target: &str) -> VfsResult<()> {
        let (link, target) = (self.resolve(link), self.resolve(target));
        self.fs.provider().create_symlink(&link, &target)
    }

    pub fn readlink(&self, _path: &str) -> VfsResult<String> {
        Err(VfsError::unsupported("symbolic links"))
    }
}

const SIX_MONTHS: Duration = Duration::from_secs(182 * 24 * 60 * 60);

/// `drw-rw-rw-   1 nobody   nobody          0 Jan  1  1970 name`
///
/// Like `ls -l`, entries older than six months (or in the future) show the
/// year instead of the time of day.
pub fn long_name(name: &str, attrs: &FileAttr, now: SystemTime) -> String {
    let mtime: DateTime<Utc> = attrs.mtime.into();
    let recent = now
        .duration_since(attrs.mtime)
        .map(|age| age < SIX_MONTHS)
        .unwrap_or(false);
    let date = if recent {
        mtime.format("%b %e %H:%M")
    } else {
        mtime.format("%b %e  %Y")
    };
    format!(
        "{} {:>3} {:<8} {:<8} {:>8} {} {}",
        attrs.mode_string(),
        1,
        attrs.owner,
        attrs.group,
        attrs.size,
        date,
        name
    )
}
