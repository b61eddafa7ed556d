//! Server configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

pub use courier_vfs::{DEFAULT_PERMISSIONS, DEFAULT_PRINCIPAL};

/// Default SSH port for the courier server.
pub const DEFAULT_SSH_PORT: u16 = 2200;

/// Default bind address (all interfaces).
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// SSH authentication rejection delay (prevents timing attacks).
pub const SSH_AUTH_REJECTION_DELAY: Duration = Duration::from_secs(1);

/// Maximum number of names returned by one readdir call.
pub const READDIR_BATCH_SIZE: usize = 100;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "COURIER_CONFIG";

/// SFTP subsystem name.
pub const SFTP_SUBSYSTEM: &str = "sftp";
