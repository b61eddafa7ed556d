//! File attributes synthesized from object-store metadata.
//!
//! The store tracks only a size and a modification time per object, so most
//! of a POSIX attribute record is fixed: owner and group are `nobody`,
//! permissions are read/write for everyone, nothing is a symlink.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use strum::{Display, EnumString};

use crate::error::{VfsError, VfsResult};
use crate::store::ObjectMeta;

/// Owner and group name reported for every entry.
pub const DEFAULT_PRINCIPAL: &str = "nobody";

/// `rw-rw-rw-`: no execute, no setuid/setgid/sticky.
pub const DEFAULT_PERMISSIONS: u32 = 0o666;

const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// Attribute views the filesystem can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AttributeView {
    Basic,
    Posix,
}

impl AttributeView {
    /// Every supported view.
    pub const ALL: [AttributeView; 2] = [AttributeView::Basic, AttributeView::Posix];

    fn attribute_names(&self) -> &'static [&'static str] {
        const BASIC: &[&str] = &[
            "lastModifiedTime",
            "lastAccessTime",
            "creationTime",
            "size",
            "isRegularFile",
            "isDirectory",
            "isSymbolicLink",
            "isOther",
            "fileKey",
        ];
        const POSIX: &[&str] = &[
            "lastModifiedTime",
            "lastAccessTime",
            "creationTime",
            "size",
            "isRegularFile",
            "isDirectory",
            "isSymbolicLink",
            "isOther",
            "fileKey",
            "owner",
            "group",
            "permissions",
        ];
        match self {
            AttributeView::Basic => BASIC,
            AttributeView::Posix => POSIX,
        }
    }
}

/// Attribute record for one path.
///
/// Derived per request and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttr {
    /// Size in bytes.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Last modification time; the epoch for directories.
    pub mtime: SystemTime,
    /// Last access time. Not tracked, always the epoch.
    pub atime: SystemTime,
    /// Creation time. Not tracked separately, equals `mtime`.
    pub ctime: SystemTime,
    /// Unix permission bits.
    pub perm: u32,
    pub owner: String,
    pub group: String,
    /// Path the attributes were derived for.
    pub file_key: String,
}

impl FileAttr {
    /// Build attributes from a metadata fetch, or from its absence.
    ///
    /// An entry is a directory iff it has no modification time of its own,
    /// so missing metadata and metadata without a timestamp both yield a
    /// directory.
    pub fn synthesize(meta: Option<&ObjectMeta>, file_key: impl Into<String>) -> Self {
        let size = meta.map(|m| m.size).unwrap_or(0);
        let modified = meta.and_then(|m| m.last_modified);
        let kind = if modified.is_some() {
            FileType::File
        } else {
            FileType::Directory
        };
        let mtime = modified.unwrap_or(UNIX_EPOCH);

        Self {
            size,
            kind,
            mtime,
            atime: UNIX_EPOCH,
            ctime: mtime,
            perm: DEFAULT_PERMISSIONS,
            owner: DEFAULT_PRINCIPAL.to_string(),
            group: DEFAULT_PRINCIPAL.to_string(),
            file_key: file_key.into(),
        }
    }

    /// Attributes of a synthetic directory.
    pub fn directory(file_key: impl Into<String>) -> Self {
        Self::synthesize(None, file_key)
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Symbolic links do not exist in an object store.
    pub fn is_symlink(&self) -> bool {
        false
    }

    /// Type and permission bits as in `st_mode`.
    pub fn mode(&self) -> u32 {
        let kind = match self.kind {
            FileType::File => S_IFREG,
            FileType::Directory => S_IFDIR,
        };
        kind | self.perm
    }

    /// `ls -l` style mode string, e.g. `drw-rw-rw-`.
    pub fn mode_string(&self) -> String {
        let mut out = String::with_capacity(10);
        out.push(if self.is_dir() { 'd' } else { '-' });
        out.push_str(&permission_string(self.perm));
        out
    }

    /// Seconds since the epoch of the modification time.
    pub fn mtime_secs(&self) -> u64 {
        epoch_secs(self.mtime)
    }

    /// Named attribute values for `view`, restricted to `names` (`*` for all).
    pub fn to_map(&self, view: AttributeView, names: &[&str]) -> VfsResult<BTreeMap<String, Value>> {
        let all = view.attribute_names();
        let wanted: Vec<&str> = if names.contains(&"*") {
            all.to_vec()
        } else {
            names.to_vec()
        };

        let mut map = BTreeMap::new();
        for name in wanted {
            if !all.contains(&name) {
                return Err(VfsError::invalid_argument(format!(
                    "'{name}' is not a {view} attribute"
                )));
            }
            let value = match name {
                "lastModifiedTime" => json!(epoch_millis(self.mtime)),
                "lastAccessTime" => json!(epoch_millis(self.atime)),
                "creationTime" => json!(epoch_millis(self.ctime)),
                "size" => json!(self.size),
                "isRegularFile" => json!(self.is_file()),
                "isDirectory" => json!(self.is_dir()),
                "isSymbolicLink" => json!(false),
                "isOther" => json!(false),
                "fileKey" => json!(self.file_key),
                "owner" => json!(self.owner),
                "group" => json!(self.group),
                "permissions" => json!(permission_string(self.perm)),
                _ => Value::Null,
            };
            map.insert(name.to_string(), value);
        }
        Ok(map)
    }
}

/// `rwxrwxrwx` rendering of the low nine permission bits.
pub fn permission_string(perm: u32) -> String {
    const FLAGS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    FLAGS
        .iter()
        .map(|&(bit, c)| if perm & bit != 0 { c } else { '-' })
        .collect()
}

fn epoch_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn epoch_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn meta(size: u64, secs: u64) -> ObjectMeta {
        ObjectMeta {
            size,
            last_modified: Some(UNIX_EPOCH + Duration::from_secs(secs)),
        }
    }

    #[test]
    fn test_file_from_metadata() {
        let attr = FileAttr::synthesize(Some(&meta(42, 1_000)), "a/b");
        assert!(attr.is_file());
        assert_eq!(attr.size, 42);
        assert_eq!(attr.mtime_secs(), 1_000);
        assert_eq!(attr.ctime, attr.mtime);
        assert_eq!(attr.atime, UNIX_EPOCH);
        assert_eq!(attr.owner, "nobody");
        assert_eq!(attr.group, "nobody");
        assert!(!attr.is_symlink());
    }

    #[test]
    fn test_directory_from_absence() {
        let attr = FileAttr::synthesize(None, "a");
        assert!(attr.is_dir());
        assert_eq!(attr.size, 0);
        assert_eq!(attr.mtime, UNIX_EPOCH);
    }

    #[test]
    fn test_missing_timestamp_means_directory() {
        let meta = ObjectMeta {
            size: 7,
            last_modified: None,
        };
        let attr = FileAttr::synthesize(Some(&meta), "a");
        assert!(attr.is_dir());
        assert_eq!(attr.size, 7);
    }

    #[test]
    fn test_fixed_permissions() {
        let attr = FileAttr::directory("");
        assert_eq!(attr.perm, 0o666);
        assert_eq!(attr.mode(), 0o040666);
        assert_eq!(attr.mode_string(), "drw-rw-rw-");

        let file = FileAttr::synthesize(Some(&meta(1, 1)), "f");
        assert_eq!(file.mode(), 0o100666);
        assert_eq!(file.mode_string(), "-rw-rw-rw-");
    }

    #[test]
    fn test_view_names() {
        assert_eq!("basic".parse::<AttributeView>().unwrap(), AttributeView::Basic);
        assert_eq!("posix".parse::<AttributeView>().unwrap(), AttributeView::Posix);
        assert!("acl".parse::<AttributeView>().is_err());
        assert_eq!(AttributeView::Posix.to_string(), "posix");
    }

    #[test]
    fn test_attribute_map() {
        let attr = FileAttr::synthesize(Some(&meta(5, 2)), "k");
        let map = attr.to_map(AttributeView::Basic, &["*"]).unwrap();
        assert_eq!(map["size"], json!(5));
        assert_eq!(map["lastModifiedTime"], json!(2_000));
        assert_eq!(map["isRegularFile"], json!(true));
        assert!(!map.contains_key("owner"));

        let map = attr.to_map(AttributeView::Posix, &["owner", "permissions"]).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["owner"], json!("nobody"));
        assert_eq!(map["permissions"], json!("rw-rw-rw-"));

        assert!(attr.to_map(AttributeView::Basic, &["owner"]).is_err());
    }
}
