//! Courier server library
//!
//! SSH front end that serves an object-store bucket as a filesystem.

pub mod auth;
pub mod auth_db;
pub mod config;
pub mod constants;
pub mod sftp;
pub mod sftp_server;
pub mod ssh;

pub use auth::{AuthDecision, CredentialStore, KeyAuthenticator, RejectReason};
pub use auth_db::{AuthDb, AuthDbError, StoredKey, User};
pub use config::{ConfigError, ServerConfig};
pub use sftp::{NameEntry, SftpSession};
pub use sftp_server::SftpHandler;
pub use ssh::{ServerContext, SshServer, SshServerConfig, load_or_generate_host_key};
