//! Public-key authentication against the credential store.
//!
//! One decision per (username, presented key). Every failure path ends in a
//! reject; the reason is kept for logs and tests but never sent to the
//! client.

use std::sync::Arc;

use parking_lot::Mutex;
use russh::keys::ssh_key::{self, HashAlg, PublicKey, authorized_keys::Entry};
use strum::Display;

use crate::auth_db::{AuthDb, AuthDbError, User};

/// Read side of the credential store used by [`KeyAuthenticator`].
pub trait CredentialStore: Send + Sync {
    /// Look up a user by unique name.
    fn user_by_name(&self, username: &str) -> Result<Option<User>, AuthDbError>;

    /// Stored authorized_keys entries of a user, in stored order.
    fn keys_for_user(&self, user_id: i64) -> Result<Vec<String>, AuthDbError>;
}

impl CredentialStore for Mutex<AuthDb> {
    fn user_by_name(&self, username: &str) -> Result<Option<User>, AuthDbError> {
        self.lock().get_user_by_name(username)
    }

    fn keys_for_user(&self, user_id: i64) -> Result<Vec<String>, AuthDbError> {
        let keys = self.lock().list_keys(user_id)?;
        Ok(keys.into_iter().map(|k| k.ssh_key).collect())
    }
}

/// Why a login was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RejectReason {
    UnknownUser,
    NoKeys,
    /// A stored entry failed to parse. Scanning stops at the first one.
    UnparsableKey,
    NoMatch,
    /// The credential store could not be queried.
    StoreFailure,
}

/// Outcome of one authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Accept,
    Reject(RejectReason),
}

impl AuthDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AuthDecision::Accept)
    }
}

/// Parse one authorized_keys line (options prefix and comment allowed).
pub fn parse_authorized_key(line: &str) -> Result<PublicKey, ssh_key::Error> {
    let entry: Entry = line.trim().parse()?;
    Ok(entry.public_key().clone())
}

/// Decides public-key logins. Holds no per-call state.
pub struct KeyAuthenticator {
    store: Arc<dyn CredentialStore>,
}

impl KeyAuthenticator {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Accept iff `key` equals one of the user's stored keys.
    ///
    /// Stored entries are checked in order. An entry that does not parse
    /// rejects the attempt outright, even if a later entry would match.
    /// Comments and options on stored entries are ignored.
    ///
    /// Blocks on the credential store; call from a blocking context.
    pub fn authenticate(&self, username: &str, key: &PublicKey) -> AuthDecision {
        let decision = self.decide(username, key);
        match decision {
            AuthDecision::Accept => tracing::info!(user = username, "public key accepted"),
            AuthDecision::Reject(reason) => {
                tracing::info!(user = username, %reason, "public key rejected")
            }
        }
        decision
    }

    fn decide(&self, username: &str, key: &PublicKey) -> AuthDecision {
        tracing::debug!(
            user = username,
            fingerprint = %key.fingerprint(HashAlg::Sha256),
            "authenticating"
        );

        let user = match self.store.user_by_name(username) {
            Ok(Some(user)) => user,
            Ok(None) => return AuthDecision::Reject(RejectReason::UnknownUser),
            Err(e) => {
                tracing::error!(user = username, error = %e, "credential lookup failed");
                return AuthDecision::Reject(RejectReason::StoreFailure);
            }
        };

        let entries = match self.store.keys_for_user(user.id) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(user = username, error = %e, "key lookup failed");
                return AuthDecision::Reject(RejectReason::StoreFailure);
            }
        };
        if entries.is_empty() {
            return AuthDecision::Reject(RejectReason::NoKeys);
        }

        for (index, entry) in entries.iter().enumerate() {
            let stored = match parse_authorized_key(entry) {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::warn!(user = username, index, error = %e, "unparsable stored key");
                    return AuthDecision::Reject(RejectReason::UnparsableKey);
                }
            };
            if stored.key_data() == key.key_data() {
                return AuthDecision::Accept;
            }
        }

        AuthDecision::Reject(RejectReason::NoMatch)
    }
}
