//! Server configuration, loaded from a TOML file.
//!
//! ```toml
//! [ssh]
//! bind = "0.0.0.0"
//! port = 2200
//! host_key = "~/.local/share/courier/host_ed25519"
//!
//! [auth]
//! database = "~/.local/share/courier/auth.db"
//!
//! [s3]
//! bucket = "s3://uploads"
//! region = "us-east-1"
//! endpoint = "http://localhost:9000"
//! access_key_id = "minio"
//! secret_access_key = "minio123"
//! ```
//!
//! Every field is optional; only `s3.bucket` is needed to serve.

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use courier_vfs::{S3Settings, SCHEME};
use serde::Deserialize;
use thiserror::Error;

use crate::auth_db::AuthDb;
use crate::constants::{CONFIG_ENV_VAR, DEFAULT_BIND_ADDRESS, DEFAULT_SSH_PORT};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ssh: SshSettings,
    pub auth: AuthSettings,
    pub s3: BucketSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub bind: String,
    pub port: u16,
    /// Generated on first start if missing.
    pub host_key: PathBuf,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_SSH_PORT,
            host_key: data_dir().join("host_ed25519"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub database: PathBuf,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            database: AuthDb::default_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BucketSettings {
    /// `s3://<bucket>` locator.
    pub bucket: Option<String>,
    #[serde(flatten)]
    pub client: S3Settings,
}

impl ServerConfig {
    /// Load from `path`, else from `$COURIER_CONFIG`, else from the default
    /// location. A missing default file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

        let config = match explicit {
            Some(path) => {
                let path = expand_tilde(&path);
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
                tracing::debug!(path = %path.display(), "loaded config");
                Self::from_toml(&text)?
            }
            None => {
                let path = Self::default_path();
                match std::fs::read_to_string(&path) {
                    Ok(text) => Self::from_toml(&text)?,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
                    Err(source) => return Err(ConfigError::Io { path, source }),
                }
            }
        };
        Ok(config)
    }

    /// Parse, expand `~` in paths, and validate.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let mut config: ServerConfig = toml::from_str(text)?;
        config.ssh.host_key = expand_tilde(&config.ssh.host_key);
        config.auth.database = expand_tilde(&config.auth.database);
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/courier/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("courier")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.s3
            .client
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if let Some(bucket) = &self.s3.bucket {
            let prefix = format!("{SCHEME}://");
            if !bucket.starts_with(&prefix) || bucket.len() == prefix.len() {
                return Err(ConfigError::Invalid(format!(
                    "bucket must look like {prefix}<name>, got {bucket}"
                )));
            }
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .ssh
            .bind
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("bad bind address {}", self.ssh.bind)))?;
        Ok(SocketAddr::new(ip, self.ssh.port))
    }

    /// The configured bucket locator, required to serve.
    pub fn bucket_locator(&self) -> Result<&str, ConfigError> {
        self.s3
            .bucket
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("no [s3] bucket configured".into()))
    }
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("courier")
}

fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&text).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config.ssh.port, 2200);
        assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:2200");
        assert!(config.s3.bucket.is_none());
        assert!(config.bucket_locator().is_err());
    }

    #[test]
    fn test_full_config() {
        let config = ServerConfig::from_toml(
            r#"
            [ssh]
            bind = "127.0.0.1"
            port = 2022
            host_key = "/etc/courier/host_key"

            [auth]
            database = "/var/lib/courier/auth.db"

            [s3]
            bucket = "s3://uploads"
            region = "us-east-1"
            endpoint = "http://localhost:9000"
            access_key_id = "minio"
            secret_access_key = "minio123"
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:2022");
        assert_eq!(config.ssh.host_key, PathBuf::from("/etc/courier/host_key"));
        assert_eq!(config.auth.database, PathBuf::from("/var/lib/courier/auth.db"));
        assert_eq!(config.bucket_locator().unwrap(), "s3://uploads");
        assert_eq!(config.s3.client.region.as_deref(), Some("us-east-1"));
        assert_eq!(config.s3.client.endpoint.as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn test_endpoint_requires_region() {
        let result = ServerConfig::from_toml(
            r#"
            [s3]
            bucket = "s3://uploads"
            endpoint = "http://localhost:9000"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bucket_scheme_is_checked() {
        let result = ServerConfig::from_toml("[s3]\nbucket = \"gs://uploads\"");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        let result = ServerConfig::from_toml("[s3]\nbucket = \"s3://\"");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_tilde_is_expanded() {
        let config = ServerConfig::from_toml("[auth]\ndatabase = \"~/courier/auth.db\"").unwrap();
        assert!(!config.auth.database.to_string_lossy().starts_with('~'));
        assert!(config.auth.database.ends_with("courier/auth.db"));
    }

    #[test]
    fn test_bad_toml() {
        let result = ServerConfig::from_toml("[ssh\nport = 1");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.toml");
        std::fs::write(&path, "[ssh]\nport = 2300\n").unwrap();
        let config = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.ssh.port, 2300);

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            ServerConfig::load(Some(&missing)),
            Err(ConfigError::Io { .. })
        ));
    }
}
