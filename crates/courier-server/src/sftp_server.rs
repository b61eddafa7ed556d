//! SFTP wire protocol for a [`SftpSession`].
//!
//! `russh-sftp` decodes the packets on the channel stream; each request is
//! handed to the session and its result encoded back as a reply or a status.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use courier_vfs::{FileAttr, VfsError, VfsResult};
use russh_sftp::protocol::{
    Attrs, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};

use crate::sftp::{NameEntry, SftpSession};

/// Status code sent back for a failed filesystem call.
pub fn status_code(error: &VfsError) -> StatusCode {
    match error {
        VfsError::NotFound(_) => StatusCode::NoSuchFile,
        VfsError::Unsupported(_) => StatusCode::OpUnsupported,
        VfsError::InvalidArgument(_) | VfsError::IndexOutOfRange(_) => StatusCode::BadMessage,
        VfsError::NotADirectory(_)
        | VfsError::InvalidHandle(_)
        | VfsError::Store(_)
        | VfsError::Io(_) => StatusCode::Failure,
    }
}

/// Protocol attributes for `attrs`. Owner names have no numeric ids, so
/// uid and gid are left out.
pub fn file_attributes(attrs: &FileAttr) -> FileAttributes {
    FileAttributes {
        size: Some(attrs.size),
        permissions: Some(attrs.mode()),
        atime: Some(protocol_time(attrs.atime)),
        mtime: Some(protocol_time(attrs.mtime)),
        ..Default::default()
    }
}

fn protocol_time(time: SystemTime) -> u32 {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    u32::try_from(secs).unwrap_or(u32::MAX)
}

fn to_file(entry: NameEntry) -> File {
    File {
        attrs: file_attributes(&entry.attrs),
        filename: entry.filename,
        longname: entry.longname,
    }
}

fn ok(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

/// Serves one subsystem channel.
pub struct SftpHandler {
    session: SftpSession,
}

impl SftpHandler {
    pub fn new(session: SftpSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SftpSession {
        &self.session
    }

    fn reply<T>(&self, op: &str, result: VfsResult<T>) -> Result<T, StatusCode> {
        result.map_err(|e| {
            tracing::debug!(user = self.session.username(), op, error = %e, "sftp request failed");
            status_code(&e)
        })
    }
}

impl Drop for SftpHandler {
    fn drop(&mut self) {
        tracing::info!(user = self.session.username(), "sftp session ended");
    }
}

impl russh_sftp::server::Handler for SftpHandler {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        tracing::debug!(user = self.session.username(), version, "sftp init");
        Ok(Version::new())
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let real = self.session.realpath(&path);
        Ok(Name {
            id,
            files: vec![File {
                filename: real.clone(),
                longname: real,
                attrs: FileAttributes::default(),
            }],
        })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let result = self.session.stat(&path).await;
        let attrs = self.reply("stat", result)?;
        Ok(Attrs {
            id,
            attrs: file_attributes(&attrs),
        })
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let result = self.session.lstat(&path).await;
        let attrs = self.reply("lstat", result)?;
        Ok(Attrs {
            id,
            attrs: file_attributes(&attrs),
        })
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let result = self.session.fstat(&handle).await;
        let attrs = self.reply("fstat", result)?;
        Ok(Attrs {
            id,
            attrs: file_attributes(&attrs),
        })
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let result = self.session.opendir(&path).await;
        let handle = self.reply("opendir", result)?;
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let result = self.session.readdir(&handle);
        match self.reply("readdir", result)? {
            Some(batch) => Ok(Name {
                id,
                files: batch.into_iter().map(to_file).collect(),
            }),
            None => Err(StatusCode::Eof),
        }
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        let result = self.session.close(&handle);
        self.reply("close", result)?;
        Ok(ok(id))
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        _pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let result = self.session.open(&filename);
        let handle = self.reply("open", result)?;
        Ok(Handle { id, handle })
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let result = self.session.mkdir(&path);
        self.reply("mkdir", result)?;
        Ok(ok(id))
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        let result = self.session.remove(&filename);
        self.reply("remove", result)?;
        Ok(ok(id))
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        let result = self.session.rename(&oldpath, &newpath);
        self.reply("rename", result)?;
        Ok(ok(id))
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let perm = attrs.permissions.unwrap_or(courier_vfs::DEFAULT_PERMISSIONS) & 0o777;
        let result = self.session.setstat(&path, perm);
        self.reply("setstat", result)?;
        Ok(ok(id))
    }

    async fn symlink(
        &mut self,
        id: u32,
        linkpath: String,
        targetpath: String,
    ) -> Result<Status, Self::Error> {
        let result = self.session.symlink(&linkpath, &targetpath);
        self.reply("symlink", result)?;
        Ok(ok(id))
    }

    async fn readlink(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let result = self.session.readlink(&path);
        let target = self.reply("readlink", result)?;
        Ok(Name {
            id,
            files: vec![File {
                filename: target.clone(),
                longname: target,
                attrs: FileAttributes::default(),
            }],
        })
    }
}
