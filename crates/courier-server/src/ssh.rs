//! SSH server for courier
//!
//! Accepts SSH connections, authenticates them by public key and serves
//! SFTP over a freshly bound bucket filesystem on each `sftp` subsystem
//! channel.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use courier_vfs::FileSystemFactory;
use russh::keys::ssh_key::{self, LineEnding};
use russh::keys::{Algorithm, PrivateKey};
use russh::server::{self, Auth, Msg, Server as _, Session};
use russh::{Channel, ChannelId};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::auth::{AuthDecision, KeyAuthenticator};
use crate::constants::{SFTP_SUBSYSTEM, SSH_AUTH_REJECTION_DELAY};
use crate::sftp::SftpSession;
use crate::sftp_server::SftpHandler;

#[derive(Debug, Error)]
pub enum HostKeyError {
    #[error("failed to create {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("host key {path}: {source}")]
    Key {
        path: String,
        #[source]
        source: ssh_key::Error,
    },
}

/// Read the host key at `path`, generating and saving an Ed25519 key if
/// the file does not exist yet.
pub fn load_or_generate_host_key(path: &Path) -> Result<PrivateKey, HostKeyError> {
    let display = path.display().to_string();
    if path.exists() {
        return PrivateKey::read_openssh_file(path).map_err(|source| HostKeyError::Key {
            path: display,
            source,
        });
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| HostKeyError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    let key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519).map_err(|source| {
        HostKeyError::Key {
            path: display.clone(),
            source,
        }
    })?;
    key.write_openssh_file(path, LineEnding::LF)
        .map_err(|source| HostKeyError::Key {
            path: display.clone(),
            source,
        })?;
    tracing::info!(path = %path.display(), "generated new host key");
    Ok(key)
}

/// SSH server configuration
#[derive(Clone)]
pub struct SshServerConfig {
    pub bind_addr: SocketAddr,
    pub host_key: PrivateKey,
}

impl SshServerConfig {
    /// Create config with an ephemeral key (for testing)
    pub fn ephemeral(port: u16) -> Result<Self, ssh_key::Error> {
        let host_key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)?;
        Ok(Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], port)),
            host_key,
        })
    }
}

/// Long-lived clients shared by every connection.
#[derive(Clone)]
pub struct ServerContext {
    pub authenticator: Arc<KeyAuthenticator>,
    pub factory: Arc<FileSystemFactory>,
}

/// SSH server
pub struct SshServer {
    config: SshServerConfig,
    context: ServerContext,
}

impl SshServer {
    pub fn new(config: SshServerConfig, context: ServerContext) -> Self {
        Self { config, context }
    }

    /// Run the SSH server
    pub async fn run(&self) -> Result<(), std::io::Error> {
        let config = russh::server::Config {
            auth_rejection_time: SSH_AUTH_REJECTION_DELAY,
            auth_rejection_time_initial: Some(std::time::Duration::from_secs(0)),
            keys: vec![self.config.host_key.clone()],
            ..Default::default()
        };

        tracing::info!(
            addr = %self.config.bind_addr,
            bucket = self.context.factory.locator(),
            "starting SSH server"
        );

        let mut server = Server {
            context: self.context.clone(),
        };
        let socket = TcpListener::bind(self.config.bind_addr).await?;

        server
            .run_on_socket(Arc::new(config), &socket)
            .await
            .map_err(std::io::Error::other)
    }
}

/// Server factory - creates handlers for each connection
struct Server {
    context: ServerContext,
}

impl server::Server for Server {
    type Handler = ConnectionHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
        tracing::debug!(peer = ?peer_addr, "new connection");
        ConnectionHandler::new(self.context.clone(), peer_addr)
    }

    fn handle_session_error(&mut self, error: <Self::Handler as server::Handler>::Error) {
        tracing::error!("session error: {:?}", error);
    }
}

/// Handler for a single SSH connection
struct ConnectionHandler {
    context: ServerContext,
    peer: Option<SocketAddr>,
    username: Option<String>,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl ConnectionHandler {
    fn new(context: ServerContext, peer: Option<SocketAddr>) -> Self {
        Self {
            context,
            peer,
            username: None,
            channels: HashMap::new(),
        }
    }

    /// Bind a bucket filesystem for `user` to a new session.
    fn bind_sftp(&self, channel: ChannelId, user: &str) -> Option<SftpSession> {
        let factory = &self.context.factory;
        match factory.create_filesystem(user) {
            Ok(fs) => {
                let home = factory.user_home_dir(&fs);
                tracing::info!(user, %channel, home = %home, "sftp session bound");
                Some(SftpSession::new(fs, home, user))
            }
            Err(e) => {
                tracing::error!(user, error = %e, "failed to bind filesystem");
                None
            }
        }
    }
}

impl server::Handler for ConnectionHandler {
    type Error = russh::Error;

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &ssh_key::PublicKey,
    ) -> Result<Auth, Self::Error> {
        tracing::debug!(user, peer = ?self.peer, "auth attempt");
        let authenticator = Arc::clone(&self.context.authenticator);
        let username = user.to_string();
        let key = public_key.clone();
        let decision = tokio::task::spawn_blocking(move || authenticator.authenticate(&username, &key))
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "authentication task failed");
                AuthDecision::Reject(crate::auth::RejectReason::StoreFailure)
            });

        match decision {
            AuthDecision::Accept => {
                self.username = Some(user.to_string());
                Ok(Auth::Accept)
            }
            AuthDecision::Reject(_) => Ok(Auth::Reject {
                proceed_with_methods: None,
                partial_success: false,
            }),
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        tracing::debug!("channel {} opened", channel.id());
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let Some(user) = self.username.clone() else {
            session.channel_failure(channel)?;
            return Ok(());
        };
        if name != SFTP_SUBSYSTEM {
            tracing::debug!(user = %user, subsystem = name, "unknown subsystem");
            session.channel_failure(channel)?;
            return Ok(());
        }

        let Some(open) = self.channels.remove(&channel) else {
            tracing::warn!(user = %user, %channel, "subsystem request on unknown channel");
            session.channel_failure(channel)?;
            return Ok(());
        };
        let Some(sftp) = self.bind_sftp(channel, &user) else {
            session.channel_failure(channel)?;
            return Ok(());
        };

        session.channel_success(channel)?;
        tokio::spawn(russh_sftp::server::run(open.into_stream(), SftpHandler::new(sftp)));
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("channel {} closed", channel);
        self.channels.remove(&channel);
        Ok(())
    }
}
