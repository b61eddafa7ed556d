//! SQLite store for users and their authorized SSH keys.
//!
//! Keys are kept verbatim in authorized_keys format (options prefix and
//! comment included) and handed back in insertion order.

use std::io;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use crate::auth::parse_authorized_key;

/// Credential store errors.
#[derive(Debug, Error)]
pub enum AuthDbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("user already exists: {0}")]
    UserExists(String),

    #[error("no such user: {0}")]
    NoSuchUser(String),

    /// Entry that does not parse as an authorized_keys line.
    #[error("invalid key on line {line}: {message}")]
    InvalidKey { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type AuthDbResult<T> = Result<T, AuthDbError>;

/// A user allowed to log in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: i64,
}

/// One stored authorized_keys entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKey {
    pub id: i64,
    pub user_id: i64,
    pub ssh_key: String,
    pub created_at: i64,
}

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    created_at INTEGER DEFAULT (unixepoch())
);

CREATE TABLE IF NOT EXISTS ssh_keys (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    ssh_key TEXT NOT NULL,
    created_at INTEGER DEFAULT (unixepoch())
);
CREATE INDEX IF NOT EXISTS idx_ssh_keys_user ON ssh_keys(user_id, id);
"#;

/// Database handle for user credentials.
pub struct AuthDb {
    conn: Connection,
}

impl AuthDb {
    /// Open or create a database at the given path, creating parent
    /// directories as needed.
    pub fn open<P: AsRef<Path>>(path: P) -> AuthDbResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> AuthDbResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// `<data dir>/courier/auth.db`, falling back to the working directory.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("courier")
            .join("auth.db")
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub fn add_user(&self, username: &str) -> AuthDbResult<User> {
        if self.get_user_by_name(username)?.is_some() {
            return Err(AuthDbError::UserExists(username.to_string()));
        }
        self.conn
            .execute("INSERT INTO users (username) VALUES (?1)", params![username])?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?
            .ok_or_else(|| AuthDbError::NoSuchUser(username.to_string()))
    }

    /// Remove a user and all of their keys. Returns false if there was no
    /// such user.
    pub fn remove_user(&self, username: &str) -> AuthDbResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM ssh_keys WHERE user_id IN (SELECT id FROM users WHERE username = ?1)",
            params![username],
        )?;
        let removed = tx.execute("DELETE FROM users WHERE username = ?1", params![username])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn get_user(&self, id: i64) -> AuthDbResult<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, created_at FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Look up a user by their unique name.
    pub fn get_user_by_name(&self, username: &str) -> AuthDbResult<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, created_at FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> AuthDbResult<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, username, created_at FROM users ORDER BY username")?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    // =========================================================================
    // Keys
    // =========================================================================

    /// Store one authorized_keys entry for `user_id`. The text is stored as
    /// given (trimmed); it is not validated here.
    pub fn add_key(&self, user_id: i64, ssh_key: &str) -> AuthDbResult<i64> {
        if self.get_user(user_id)?.is_none() {
            return Err(AuthDbError::NoSuchUser(user_id.to_string()));
        }
        self.conn.execute(
            "INSERT INTO ssh_keys (user_id, ssh_key) VALUES (?1, ?2)",
            params![user_id, ssh_key.trim()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Keys of `user_id` in insertion order.
    pub fn list_keys(&self, user_id: i64) -> AuthDbResult<Vec<StoredKey>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, ssh_key, created_at FROM ssh_keys
             WHERE user_id = ?1 ORDER BY id",
        )?;
        let keys = stmt
            .query_map(params![user_id], |row| {
                Ok(StoredKey {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    ssh_key: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Import every entry of an authorized_keys file for `user_id`.
    ///
    /// Blank lines and `#` comments are skipped. The whole file is
    /// validated before anything is stored, so a bad line imports nothing.
    pub fn import_authorized_keys(&self, user_id: i64, path: &Path) -> AuthDbResult<usize> {
        let content = std::fs::read_to_string(path)?;
        let mut entries = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            parse_authorized_key(line).map_err(|e| AuthDbError::InvalidKey {
                line: index + 1,
                message: e.to_string(),
            })?;
            entries.push(line);
        }

        if self.get_user(user_id)?.is_none() {
            return Err(AuthDbError::NoSuchUser(user_id.to_string()));
        }
        let tx = self.conn.unchecked_transaction()?;
        for entry in &entries {
            tx.execute(
                "INSERT INTO ssh_keys (user_id, ssh_key) VALUES (?1, ?2)",
                params![user_id, entry],
            )?;
        }
        tx.commit()?;

        tracing::info!(user_id, count = entries.len(), path = %path.display(), "imported keys");
        Ok(entries.len())
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        created_at: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use russh::keys::{Algorithm, PrivateKey};

    fn key_line() -> String {
        PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
            .unwrap()
            .public_key()
            .to_openssh()
            .unwrap()
    }

    #[test]
    fn test_user_crud() {
        let db = AuthDb::in_memory().unwrap();
        let alice = db.add_user("alice").unwrap();
        assert_eq!(alice.username, "alice");

        assert!(matches!(db.add_user("alice"), Err(AuthDbError::UserExists(_))));

        db.add_user("bob").unwrap();
        let names: Vec<_> = db.list_users().unwrap().into_iter().map(|u| u.username).collect();
        assert_eq!(names, vec!["alice", "bob"]);

        assert_eq!(db.get_user_by_name("alice").unwrap(), Some(alice));
        assert!(db.get_user_by_name("carol").unwrap().is_none());
    }

    #[test]
    fn test_keys_in_insertion_order() {
        let (key_a, key_b) = (key_line(), key_line());
        let db = AuthDb::in_memory().unwrap();
        let user = db.add_user("alice").unwrap();
        db.add_key(user.id, &key_b).unwrap();
        db.add_key(user.id, &format!("  {key_a}\n")).unwrap();

        let keys = db.list_keys(user.id).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].ssh_key, key_b);
        assert_eq!(keys[1].ssh_key, key_a);
        assert!(keys[0].id < keys[1].id);
    }

    #[test]
    fn test_add_key_requires_user() {
        let db = AuthDb::in_memory().unwrap();
        assert!(matches!(db.add_key(42, &key_line()), Err(AuthDbError::NoSuchUser(_))));
    }

    #[test]
    fn test_remove_user_removes_keys() {
        let db = AuthDb::in_memory().unwrap();
        let user = db.add_user("alice").unwrap();
        db.add_key(user.id, &key_line()).unwrap();

        assert!(db.remove_user("alice").unwrap());
        assert!(!db.remove_user("alice").unwrap());
        assert!(db.list_keys(user.id).unwrap().is_empty());
    }

    #[test]
    fn test_import_authorized_keys() {
        let (key_a, key_b) = (key_line(), key_line());
        let db = AuthDb::in_memory().unwrap();
        let user = db.add_user("alice").unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# laptop").unwrap();
        writeln!(file, "{key_a} alice@laptop").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "no-pty {key_b}").unwrap();

        let count = db.import_authorized_keys(user.id, file.path()).unwrap();
        assert_eq!(count, 2);
        let keys = db.list_keys(user.id).unwrap();
        assert_eq!(keys[1].ssh_key, format!("no-pty {key_b}"));
    }

    #[test]
    fn test_import_rejects_bad_lines() {
        let db = AuthDb::in_memory().unwrap();
        let user = db.add_user("alice").unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", key_line()).unwrap();
        writeln!(file, "ssh-ed25519 not-base64").unwrap();

        let err = db.import_authorized_keys(user.id, file.path()).unwrap_err();
        assert!(matches!(err, AuthDbError::InvalidKey { line: 2, .. }));
        assert!(db.list_keys(user.id).unwrap().is_empty());
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("auth.db");
        {
            let db = AuthDb::open(&path).unwrap();
            db.add_user("alice").unwrap();
        }
        let db = AuthDb::open(&path).unwrap();
        assert!(db.get_user_by_name("alice").unwrap().is_some());
    }
}
