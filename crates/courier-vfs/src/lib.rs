//! # courier-vfs
//!
//! A bucket in an object store seen as a hierarchical filesystem.
//!
//! Key components:
//!
//! - [`VfsPath`] - Path algebra over `/`-separated strings, no I/O
//! - [`FileAttr`] - Attribute records synthesized from object metadata
//! - [`BucketFs`] - Handle binding one bucket; manufactures paths
//! - [`FsProvider`] - Listing, attribute and existence queries against the store
//! - [`ObjectStore`] - The two store calls everything above is built on
//!
//! ## Design Decisions
//!
//! - **Directories are positional**: a path is a directory when keys exist
//!   under its prefix and no object exists at its exact key.
//! - **No caching**: every query goes to the store.
//! - **Eager listings**: all pages are collected before a listing returns.

mod attr;
mod error;
mod factory;
mod filesystem;
mod path;
mod provider;
pub mod store;

pub use attr::{
    AttributeView, DEFAULT_PERMISSIONS, DEFAULT_PRINCIPAL, FileAttr, FileType, permission_string,
};
pub use error::{VfsError, VfsResult};
pub use factory::FileSystemFactory;
pub use filesystem::BucketFs;
pub use path::{SEPARATOR, VfsPath};
pub use provider::{DirEntry, FsProvider, SCHEME};
pub use store::{
    ListPage, ListRequest, MemoryStore, ObjectMeta, ObjectStore, ObjectSummary, S3Settings,
    S3Store, SharedStore, StoreError, StoreResult,
};
