//! Courier server binary
//!
//! SSH file-transfer server backed by an object-store bucket.
//!
//! ## Usage
//!
//! ```bash
//! # Run the server (default)
//! courier-server [--config FILE] [serve --port PORT]
//!
//! # User and key management
//! courier-server add-user <name>
//! courier-server add-key <name> <pubkey-file> [--create]
//! courier-server import <name> <authorized_keys_file>
//! courier-server list-users
//! courier-server list-keys <name>
//! courier-server remove-user <name>
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use courier_server::auth::parse_authorized_key;
use courier_server::{
    AuthDb, KeyAuthenticator, ServerConfig, ServerContext, SshServer, SshServerConfig,
    load_or_generate_host_key,
};
use courier_vfs::{FileSystemFactory, FsProvider, S3Store};
use parking_lot::Mutex;
use russh::keys::ssh_key::HashAlg;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// SSH file-transfer server for object-store buckets.
#[derive(Parser, Debug)]
#[command(name = "courier-server")]
#[command(about = "Serve an object-store bucket over SSH")]
struct Cli {
    /// Config file (default: $COURIER_CONFIG, then the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the SSH server (default)
    Serve {
        /// Override the configured SSH port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create a user
    AddUser { username: String },
    /// Remove a user and all their keys
    RemoveUser { username: String },
    /// List all users
    ListUsers,
    /// Add a public key file for a user
    AddKey {
        username: String,
        file: PathBuf,
        /// Create the user if it does not exist
        #[arg(long)]
        create: bool,
    },
    /// List a user's keys
    ListKeys { username: String },
    /// Import keys from an authorized_keys file
    Import { username: String, file: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match ServerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => run_server(config, port).await,
        Command::AddUser { username } => cmd_add_user(&config, &username),
        Command::RemoveUser { username } => cmd_remove_user(&config, &username),
        Command::ListUsers => cmd_list_users(&config),
        Command::AddKey {
            username,
            file,
            create,
        } => cmd_add_key(&config, &username, &file, create),
        Command::ListKeys { username } => cmd_list_keys(&config, &username),
        Command::Import { username, file } => cmd_import(&config, &username, &file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(mut config: ServerConfig, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.ssh.port = port;
    }
    let locator = config.bucket_locator()?.to_string();

    let store = S3Store::from_settings(&config.s3.client)
        .await
        .context("failed to build object store client")?;
    let provider = FsProvider::new(Arc::new(store));
    let factory = FileSystemFactory::checked(provider, locator)?;

    let db = open_db(&config)?;
    let authenticator = KeyAuthenticator::new(Arc::new(Mutex::new(db)));

    let host_key = load_or_generate_host_key(&config.ssh.host_key)?;
    let ssh_config = SshServerConfig {
        bind_addr: config.bind_addr()?,
        host_key,
    };
    let context = ServerContext {
        authenticator: Arc::new(authenticator),
        factory: Arc::new(factory),
    };

    SshServer::new(ssh_config, context)
        .run()
        .await
        .context("server error")
}

fn open_db(config: &ServerConfig) -> Result<AuthDb> {
    let path = &config.auth.database;
    AuthDb::open(path).with_context(|| format!("failed to open auth database {}", path.display()))
}

fn cmd_add_user(config: &ServerConfig, username: &str) -> Result<()> {
    let db = open_db(config)?;
    let user = db.add_user(username)?;
    println!("Added user '{}' (id {})", user.username, user.id);
    Ok(())
}

fn cmd_remove_user(config: &ServerConfig, username: &str) -> Result<()> {
    let db = open_db(config)?;
    let Some(user) = db.get_user_by_name(username)? else {
        bail!("user not found: {username}");
    };
    let key_count = db.list_keys(user.id)?.len();
    db.remove_user(username)?;
    println!("Removed user '{username}' and {key_count} key(s)");
    Ok(())
}

fn cmd_list_users(config: &ServerConfig) -> Result<()> {
    let db = open_db(config)?;
    let users = db.list_users()?;
    if users.is_empty() {
        println!("No users found. Add one with: courier-server add-user <name>");
        return Ok(());
    }

    println!("{:<24} {:>5}", "USERNAME", "KEYS");
    println!("{}", "-".repeat(30));
    for user in users {
        let keys = db.list_keys(user.id)?.len();
        println!("{:<24} {:>5}", user.username, keys);
    }
    Ok(())
}

fn cmd_add_key(config: &ServerConfig, username: &str, file: &Path, create: bool) -> Result<()> {
    let path: PathBuf = shellexpand::tilde(&file.to_string_lossy()).as_ref().into();
    let line = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let line = line.trim();
    let key = parse_authorized_key(line).context("failed to parse public key")?;

    let db = open_db(config)?;
    let user = match db.get_user_by_name(username)? {
        Some(user) => user,
        None if create => db.add_user(username)?,
        None => bail!("user not found: {username} (use --create to add it)"),
    };
    db.add_key(user.id, line)?;
    println!("Added key for '{}':", user.username);
    println!("  Fingerprint: {}", key.fingerprint(HashAlg::Sha256));
    Ok(())
}

fn cmd_list_keys(config: &ServerConfig, username: &str) -> Result<()> {
    let db = open_db(config)?;
    let Some(user) = db.get_user_by_name(username)? else {
        bail!("user not found: {username}");
    };

    println!("Keys for {}:", user.username);
    for stored in db.list_keys(user.id)? {
        match parse_authorized_key(&stored.ssh_key) {
            Ok(key) => {
                println!("  {} {}", key.algorithm(), key.fingerprint(HashAlg::Sha256));
                if !key.comment().is_empty() {
                    println!("    Comment: {}", key.comment());
                }
            }
            // An entry like this makes every login for the user fail.
            Err(e) => println!("  [unparsable entry #{}] {e}", stored.id),
        }
    }
    Ok(())
}

fn cmd_import(config: &ServerConfig, username: &str, file: &Path) -> Result<()> {
    let path: PathBuf = shellexpand::tilde(&file.to_string_lossy()).as_ref().into();
    let db = open_db(config)?;
    let user = match db.get_user_by_name(username)? {
        Some(user) => user,
        None => db.add_user(username)?,
    };
    let count = db.import_authorized_keys(user.id, &path)?;
    println!("Imported {} key(s) from {} for '{}'", count, path.display(), user.username);
    Ok(())
}
