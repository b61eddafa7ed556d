//! End-to-end: credentials on disk, public-key decision, then a bound
//! session browsing an in-memory bucket, directly and through an SFTP client.

use std::io::Write;
use std::sync::Arc;

use courier_server::{
    AuthDb, AuthDecision, KeyAuthenticator, RejectReason, SftpHandler, SftpSession,
};
use courier_vfs::{FileSystemFactory, FsProvider, MemoryStore};
use parking_lot::Mutex;
use russh::keys::{Algorithm, PrivateKey, ssh_key::PublicKey};

fn keypair() -> PublicKey {
    PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
        .unwrap()
        .public_key()
        .clone()
}

#[test]
fn imported_keys_authenticate() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("auth.db");
    let (laptop, desktop, stranger) = (keypair(), keypair(), keypair());

    let keys_path = dir.path().join("authorized_keys");
    let mut file = std::fs::File::create(&keys_path).unwrap();
    writeln!(file, "# alice's machines").unwrap();
    writeln!(file, "{} laptop", laptop.to_openssh().unwrap()).unwrap();
    writeln!(file, "{} desktop", desktop.to_openssh().unwrap()).unwrap();
    drop(file);

    {
        let db = AuthDb::open(&db_path).unwrap();
        let alice = db.add_user("alice").unwrap();
        assert_eq!(db.import_authorized_keys(alice.id, &keys_path).unwrap(), 2);
    }

    let db = AuthDb::open(&db_path).unwrap();
    let auth = KeyAuthenticator::new(Arc::new(Mutex::new(db)));
    assert_eq!(auth.authenticate("alice", &laptop), AuthDecision::Accept);
    assert_eq!(auth.authenticate("alice", &desktop), AuthDecision::Accept);
    assert_eq!(
        auth.authenticate("alice", &stranger),
        AuthDecision::Reject(RejectReason::NoMatch)
    );
    assert_eq!(
        auth.authenticate("mallory", &laptop),
        AuthDecision::Reject(RejectReason::UnknownUser)
    );
}

#[tokio::test]
async fn session_browses_bucket() {
    let store = Arc::new(MemoryStore::new());
    store.put("shared", "reports/2024/q1.csv", "a,b\n1,2\n").unwrap();
    store.put("shared", "reports/2024/q2.csv", "a,b\n").unwrap();
    store.put("shared", "reports/summary.txt", "ok").unwrap();

    let factory = FileSystemFactory::checked(FsProvider::new(store.clone()), "s3://shared").unwrap();
    let fs = factory.create_filesystem("alice").unwrap();
    let home = factory.user_home_dir(&fs);
    let mut session = SftpSession::new(fs, home, "alice");

    assert_eq!(session.realpath("reports/2024/.."), "/reports");

    let handle = session.opendir("/reports").await.unwrap();
    let batch = session.readdir(&handle).unwrap().unwrap();
    let mut names: Vec<_> = batch.iter().map(|e| e.filename.clone()).collect();
    names.sort();
    assert_eq!(names, vec![".", "..", "2024", "summary.txt"]);
    assert!(session.readdir(&handle).unwrap().is_none());
    session.close(&handle).unwrap();

    let q1 = session.stat("/reports/2024/q1.csv").await.unwrap();
    assert!(q1.is_file());
    assert_eq!(q1.size, 8);
    assert!(session.stat("/reports/2024").await.unwrap().is_dir());

    // Objects written after the listing show up on the next one.
    store.put("shared", "reports/late.txt", "late").unwrap();
    let handle = session.opendir("/reports").await.unwrap();
    let batch = session.readdir(&handle).unwrap().unwrap();
    assert!(batch.iter().any(|e| e.filename == "late.txt"));
}

#[tokio::test]
async fn sftp_client_browses_bucket() {
    let store = Arc::new(MemoryStore::new());
    store.put("shared", "reports/2024/q1.csv", "a,b\n1,2\n").unwrap();
    store.put("shared", "reports/summary.txt", "ok").unwrap();

    let factory = FileSystemFactory::checked(FsProvider::new(store.clone()), "s3://shared").unwrap();
    let fs = factory.create_filesystem("alice").unwrap();
    let home = factory.user_home_dir(&fs);
    let handler = SftpHandler::new(SftpSession::new(fs, home, "alice"));

    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(russh_sftp::server::run(server_io, handler));
    let sftp = russh_sftp::client::SftpSession::new(client_io).await.unwrap();

    assert_eq!(sftp.canonicalize("reports/2024/..").await.unwrap(), "/reports");

    let mut names: Vec<_> = sftp
        .read_dir("/reports")
        .await
        .unwrap()
        .map(|entry| entry.file_name())
        .filter(|name| name != "." && name != "..")
        .collect();
    names.sort();
    assert_eq!(names, vec!["2024", "summary.txt"]);

    let q1 = sftp.metadata("/reports/2024/q1.csv").await.unwrap();
    assert_eq!(q1.size, Some(8));
    assert!(sftp.metadata("/reports/nope").await.is_err());
    assert!(sftp.create_dir("/reports/new").await.is_err());
}
