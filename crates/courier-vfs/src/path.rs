//! Slash-separated paths bound to a bucket filesystem.
//!
//! A [`VfsPath`] is a plain string plus the filesystem that made it. All of
//! the algebra here is pure string manipulation; nothing touches the store.
//!
//! Name elements follow the usual rules:
//!
//! - `/` has zero elements, `""` has exactly one (the empty name).
//! - A single trailing separator does not add an element.
//! - `.` and `..` are ordinary names everywhere except [`VfsPath::normalize`]
//!   and the derived object keys.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{VfsError, VfsResult};
use crate::filesystem::BucketFs;

/// Path separator, both for paths and for object-store delimiters.
pub const SEPARATOR: char = '/';

const ROOT: &str = "/";

/// Split a path string into its name elements.
fn elements(path: &str) -> Vec<&str> {
    if path.is_empty() {
        return vec![""];
    }
    let rest = path.strip_prefix(SEPARATOR).unwrap_or(path);
    let rest = rest.strip_suffix(SEPARATOR).unwrap_or(rest);
    if rest.is_empty() {
        return Vec::new();
    }
    rest.split(SEPARATOR).collect()
}

/// Append `tail` to `base` with exactly one separator between them.
fn join(base: &str, tail: &str) -> String {
    if base.is_empty() {
        tail.to_string()
    } else if base.ends_with(SEPARATOR) {
        format!("{base}{tail}")
    } else {
        format!("{base}{SEPARATOR}{tail}")
    }
}

/// An immutable path on a [`BucketFs`].
///
/// Equality and hashing are structural over (filesystem identity, path
/// string): two paths with the same text on different filesystems are not
/// equal, and never match each other in `starts_with`/`ends_with`.
#[derive(Clone)]
pub struct VfsPath {
    fs: BucketFs,
    path: String,
}

impl VfsPath {
    pub(crate) fn new(fs: BucketFs, path: impl Into<String>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    fn with_path(&self, path: impl Into<String>) -> Self {
        Self::new(self.fs.clone(), path)
    }

    fn root_path(&self) -> Self {
        self.with_path(ROOT)
    }

    /// The filesystem that created this path.
    pub fn filesystem(&self) -> &BucketFs {
        &self.fs
    }

    /// The raw path string.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// True iff the path begins with the separator.
    pub fn is_absolute(&self) -> bool {
        self.path.starts_with(SEPARATOR)
    }

    /// True for an absolute path with no name elements.
    pub fn is_root(&self) -> bool {
        self.is_absolute() && self.name_count() == 0
    }

    /// True for the empty path `""`.
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// The root component, or `None` for a relative path.
    pub fn root(&self) -> Option<VfsPath> {
        self.is_absolute().then(|| self.root_path())
    }

    /// The name element farthest from the root.
    pub fn file_name(&self) -> Option<VfsPath> {
        elements(&self.path)
            .last()
            .map(|name| self.with_path(*name))
    }

    /// Everything up to the last separator.
    ///
    /// `.` and `..` are not interpreted: the parent of `/a/../c` is `/a/..`.
    pub fn parent(&self) -> Option<VfsPath> {
        if self.is_root() {
            return None;
        }
        let trimmed = self.path.strip_suffix(SEPARATOR).unwrap_or(&self.path);
        match trimmed.rfind(SEPARATOR) {
            None => None,
            Some(0) => Some(self.root_path()),
            Some(offset) => Some(self.with_path(&trimmed[..offset])),
        }
    }

    /// Number of name elements.
    pub fn name_count(&self) -> usize {
        elements(&self.path).len()
    }

    /// Name element at `index`, closest to the root first.
    pub fn name(&self, index: usize) -> VfsResult<VfsPath> {
        let names = elements(&self.path);
        if names.is_empty() {
            return Err(VfsError::index_out_of_range("path has zero elements"));
        }
        names
            .get(index)
            .map(|name| self.with_path(*name))
            .ok_or_else(|| {
                VfsError::index_out_of_range(format!(
                    "index {index} with {} name elements",
                    names.len()
                ))
            })
    }

    /// Iterate over the name elements as single-element relative paths.
    pub fn names(&self) -> impl Iterator<Item = VfsPath> + '_ {
        elements(&self.path)
            .into_iter()
            .map(move |name| self.with_path(name))
    }

    /// Relative path made of the name elements in `[begin, end)`.
    pub fn subpath(&self, begin: usize, end: usize) -> VfsResult<VfsPath> {
        let names = elements(&self.path);
        let count = names.len();
        if count == 0 {
            return Err(VfsError::index_out_of_range("path has zero elements"));
        }
        if begin >= count {
            return Err(VfsError::index_out_of_range(format!(
                "begin index {begin} with {count} name elements"
            )));
        }
        if end > count {
            return Err(VfsError::index_out_of_range(format!(
                "end index {end} with {count} name elements"
            )));
        }
        if end <= begin {
            return Err(VfsError::index_out_of_range(format!(
                "end index {end} not after begin index {begin}"
            )));
        }
        Ok(self.with_path(names[begin..end].join(ROOT)))
    }

    /// True if `other`'s name elements are a prefix of this path's and both
    /// agree on having a root.
    pub fn starts_with(&self, other: &VfsPath) -> bool {
        if !self.fs.same_as(&other.fs) || self.is_absolute() != other.is_absolute() {
            return false;
        }
        let mine = elements(&self.path);
        let theirs = elements(&other.path);
        theirs.len() <= mine.len() && mine[..theirs.len()] == theirs[..]
    }

    /// [`starts_with`](Self::starts_with) against a path string on this filesystem.
    pub fn starts_with_str(&self, other: &str) -> bool {
        self.starts_with(&self.with_path(other))
    }

    /// True if `other`'s name elements are a suffix of this path's.
    ///
    /// A rooted `other` only matches an absolute path.
    pub fn ends_with(&self, other: &VfsPath) -> bool {
        if !self.fs.same_as(&other.fs) || (other.is_absolute() && !self.is_absolute()) {
            return false;
        }
        let mine = elements(&self.path);
        let theirs = elements(&other.path);
        theirs.len() <= mine.len() && mine[mine.len() - theirs.len()..] == theirs[..]
    }

    /// [`ends_with`](Self::ends_with) against a path string on this filesystem.
    pub fn ends_with_str(&self, other: &str) -> bool {
        self.ends_with(&self.with_path(other))
    }

    /// Remove redundant `.` and `name/..` elements.
    ///
    /// Leading `..` survive on relative paths; on absolute paths they are
    /// dropped because nothing sits above the root. Empty names from doubled
    /// separators are dropped as well.
    pub fn normalize(&self) -> VfsPath {
        if self.is_empty() {
            return self.clone();
        }
        let absolute = self.is_absolute();
        let mut kept: Vec<&str> = Vec::new();
        for name in elements(&self.path) {
            match name {
                "" | "." => {}
                ".." => match kept.last() {
                    Some(&top) if top != ".." => {
                        kept.pop();
                    }
                    _ if absolute => {}
                    _ => kept.push(".."),
                },
                name => kept.push(name),
            }
        }
        let joined = kept.join(ROOT);
        if absolute {
            self.with_path(format!("{ROOT}{joined}"))
        } else {
            self.with_path(joined)
        }
    }

    /// Resolve `other` against this path.
    ///
    /// An absolute `other` is returned as is; an empty `other` returns this
    /// path; otherwise the two are joined.
    pub fn resolve(&self, other: &VfsPath) -> VfsResult<VfsPath> {
        if !self.fs.same_as(&other.fs) {
            return Err(VfsError::invalid_argument(format!(
                "cannot resolve {} from another filesystem",
                other.path
            )));
        }
        if other.is_absolute() {
            return Ok(other.clone());
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        Ok(self.with_path(join(&self.path, &other.path)))
    }

    /// [`resolve`](Self::resolve) a path string on this filesystem.
    pub fn resolve_str(&self, other: &str) -> VfsPath {
        let other = self.with_path(other);
        if other.is_absolute() {
            other
        } else if other.is_empty() {
            self.clone()
        } else {
            self.with_path(join(&self.path, &other.path))
        }
    }

    /// Shortest relative path that resolves against this path to `other`
    /// (in normalized form).
    pub fn relativize(&self, other: &VfsPath) -> VfsResult<VfsPath> {
        if !self.fs.same_as(&other.fs) {
            return Err(VfsError::invalid_argument(format!(
                "cannot relativize {} from another filesystem",
                other.path
            )));
        }
        if self.is_absolute() != other.is_absolute() {
            return Err(VfsError::invalid_argument(format!(
                "cannot relativize {} against {}: only one has a root",
                other.path, self.path
            )));
        }
        if self == other {
            return Ok(self.with_path(""));
        }

        let base = self.normalize();
        let target = other.normalize();
        let base_names = normalized_names(&base.path);
        let target_names = normalized_names(&target.path);

        let common = base_names
            .iter()
            .zip(&target_names)
            .take_while(|(a, b)| a == b)
            .count();

        let parts: Vec<&str> = std::iter::repeat_n("..", base_names.len() - common)
            .chain(target_names[common..].iter().copied())
            .collect();
        Ok(self.with_path(parts.join(ROOT)))
    }

    /// This path resolved against the root.
    pub fn to_absolute_path(&self) -> VfsPath {
        if self.is_absolute() {
            self.clone()
        } else {
            self.with_path(join(ROOT, &self.path))
        }
    }

    /// Object-store key for this path: normalized, rooted, with the leading
    /// separator stripped. The root maps to `""`.
    pub fn to_object_key(&self) -> String {
        self.to_absolute_path()
            .normalize()
            .path
            .trim_start_matches(SEPARATOR)
            .to_string()
    }

    /// Key prefix that lists this path's children: the object key plus a
    /// trailing separator, or `""` for the root.
    pub fn to_prefix_key(&self) -> String {
        let key = self.to_object_key();
        if key.is_empty() {
            key
        } else {
            format!("{key}{SEPARATOR}")
        }
    }
}

/// Names of an already-normalized path; the empty path has none.
fn normalized_names(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        elements(path)
    }
}

impl PartialEq for VfsPath {
    fn eq(&self, other: &Self) -> bool {
        self.fs.same_as(&other.fs) && self.path == other.path
    }
}

impl Eq for VfsPath {}

impl Hash for VfsPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fs.identity().hash(state);
        self.path.hash(state);
    }
}

/// Lexicographic by path string; filesystem identity breaks ties so the
/// ordering agrees with equality.
impl Ord for VfsPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path
            .cmp(&other.path)
            .then_with(|| self.fs.identity().cmp(&other.fs.identity()))
    }
}

impl PartialOrd for VfsPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl fmt::Debug for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VfsPath")
            .field("bucket", &self.fs.bucket())
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FsProvider;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn fs() -> BucketFs {
        FsProvider::new(Arc::new(MemoryStore::new()))
            .new_filesystem("s3://bucket")
            .unwrap()
    }

    #[test]
    fn test_path_belongs_to_filesystem() {
        let fs = fs();
        let path = fs.path("test", &[]);
        assert!(path.filesystem().same_as(&fs));
    }

    #[test]
    fn test_is_absolute() {
        let fs = fs();
        assert!(fs.path("/absolute/path", &[]).is_absolute());
        assert!(!fs.path("relative/path", &[]).is_absolute());
    }

    #[test]
    fn test_root() {
        let fs = fs();
        assert_eq!(fs.path("/absolute/path", &[]).root(), Some(fs.path("/", &[])));
        assert_eq!(fs.path("relative/path", &[]).root(), None);
    }

    #[test]
    fn test_file_name() {
        let fs = fs();
        assert_eq!(fs.path("/a", &[]).file_name(), Some(fs.path("a", &[])));
        assert_eq!(fs.path("/a/b/c", &[]).file_name(), Some(fs.path("c", &[])));
        assert_eq!(fs.path("a/b/c", &[]).file_name(), Some(fs.path("c", &[])));
        assert_eq!(fs.path("a", &[]).file_name(), Some(fs.path("a", &[])));
        assert_eq!(fs.path("/", &[]).file_name(), None);
    }

    #[test]
    fn test_parent() {
        let fs = fs();
        assert_eq!(fs.path("/a/b/c", &[]).parent(), Some(fs.path("/a/b", &[])));
        assert_eq!(fs.path("a/b/c", &[]).parent(), Some(fs.path("a/b", &[])));
        assert_eq!(fs.path("/a", &[]).parent(), Some(fs.path("/", &[])));
        assert_eq!(fs.path("/a/b/", &[]).parent(), Some(fs.path("/a", &[])));
        assert_eq!(fs.path("/", &[]).parent(), None);
        assert_eq!(fs.path("", &[]).parent(), None);
        assert_eq!(fs.path("a", &[]).parent(), None);
    }

    #[test]
    fn test_parent_does_not_interpret_special_names() {
        let fs = fs();
        assert_eq!(fs.path("/a/../c", &[]).parent(), Some(fs.path("/a/..", &[])));
        assert_eq!(fs.path("a/./b", &[]).parent(), Some(fs.path("a/.", &[])));
    }

    #[test]
    fn test_name_count() {
        let fs = fs();
        assert_eq!(fs.path("/", &[]).name_count(), 0);
        assert_eq!(fs.path("", &[]).name_count(), 1);
        assert_eq!(fs.path("/a/b/c", &[]).name_count(), 3);
        assert_eq!(fs.path("/a/b/c/", &[]).name_count(), 3);
        assert_eq!(fs.path("a/b/c", &[]).name_count(), 3);
        assert_eq!(fs.path("a/b/c/", &[]).name_count(), 3);
    }

    #[test]
    fn test_name() {
        let fs = fs();
        let path = fs.path("/a/b/c", &[]);
        assert_eq!(path.name(0).unwrap(), fs.path("a", &[]));
        assert_eq!(path.name(1).unwrap(), fs.path("b", &[]));
        assert_eq!(path.name(2).unwrap(), fs.path("c", &[]));
        assert_eq!(fs.path("a/b/c", &[]).name(2).unwrap(), fs.path("c", &[]));
    }

    #[test]
    fn test_name_out_of_range() {
        let fs = fs();
        let path = fs.path("/a", &[]);
        assert!(matches!(path.name(1), Err(VfsError::IndexOutOfRange(_))));
        assert!(matches!(
            path.name(path.name_count()),
            Err(VfsError::IndexOutOfRange(_))
        ));
        assert!(matches!(
            fs.path("/", &[]).name(0),
            Err(VfsError::IndexOutOfRange(_))
        ));
    }

    #[test]
    fn test_names_iterator() {
        let fs = fs();
        let names: Vec<String> = fs
            .path("/a/b/c", &[])
            .names()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_subpath() {
        let fs = fs();
        let path = fs.path("/a/b/c/d", &[]);
        assert_eq!(path.subpath(1, 4).unwrap(), fs.path("b/c/d", &[]));
        assert_eq!(path.subpath(0, 1).unwrap(), fs.path("a", &[]));
        assert!(!path.subpath(0, 2).unwrap().is_absolute());
    }

    #[test]
    fn test_subpath_invalid_ranges() {
        let fs = fs();
        let one = fs.path("/a", &[]);
        assert!(one.subpath(1, 2).is_err());
        assert!(one.subpath(0, 2).is_err());
        assert!(fs.path("/a/b/c", &[]).subpath(2, 1).is_err());
        assert!(fs.path("/a/b/c", &[]).subpath(1, 1).is_err());
        assert!(fs.path("/", &[]).subpath(0, 1).is_err());
    }

    #[test]
    fn test_starts_with() {
        let fs = fs();
        assert!(fs.path("/a/b/c", &[]).starts_with_str("/a/b/c"));
        assert!(!fs.path("/a/b/c", &[]).starts_with_str("/b/c"));
        assert!(!fs.path("a/b/c", &[]).starts_with_str("/a/b/c"));
        assert!(fs.path("/a/b/c/d/e", &[]).starts_with_str("/a/b/c"));
        assert!(fs.path("a/b/c/d/e", &[]).starts_with_str("a/b/c"));
        assert!(fs.path("/a/b", &[]).starts_with_str("/"));
        assert!(!fs.path("/ab/c", &[]).starts_with_str("/a"));
    }

    #[test]
    fn test_ends_with() {
        let fs = fs();
        assert!(fs.path("/a/b/c", &[]).ends_with_str("/a/b/c"));
        assert!(!fs.path("a/b/c", &[]).ends_with_str("a/b"));
        assert!(fs.path("f/e/a/b/c", &[]).ends_with_str("a/b/c"));
        assert!(fs.path("/e/a/b/c/d", &[]).ends_with_str("a/b/c/d"));
        assert!(fs.path("/e/a/b/c/d", &[]).ends_with_str("/a/b/c/d"));
        assert!(fs.path("/e/a/b/c/d", &[]).ends_with_str("/c/d"));
        assert!(!fs.path("e/a/b/c/d", &[]).ends_with_str("/a/b/c/d"));
        assert!(!fs.path("/e/a/b/c/d", &[]).ends_with_str("/a/b/c"));
        assert!(!fs.path("a/b/c", &[]).ends_with_str("/b/c"));
        assert!(!fs.path("/a/bc", &[]).ends_with_str("c"));
    }

    #[test]
    fn test_foreign_paths_never_match() {
        let fs_a = fs();
        let fs_b = fs();
        let a = fs_a.path("/a/b", &[]);
        let b = fs_b.path("/a/b", &[]);
        assert_ne!(a, b);
        assert!(!a.starts_with(&b));
        assert!(!a.ends_with(&b));
        assert!(matches!(a.resolve(&b), Err(VfsError::InvalidArgument(_))));
        assert!(matches!(a.relativize(&b), Err(VfsError::InvalidArgument(_))));
    }

    #[test]
    fn test_normalize() {
        let fs = fs();
        let cases = [
            ("/a/b/c", "/a/b/c"),
            ("/a/b/.", "/a/b"),
            ("/a/b/..", "/a"),
            ("/a/./b/../c", "/a/c"),
            ("/..", "/"),
            ("/../a", "/a"),
            ("a/b/../..", ""),
            ("./.", ""),
            ("../a", "../a"),
            ("../../a/..", "../.."),
            ("a//b/", "a/b"),
            ("", ""),
            ("/", "/"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                fs.path(input, &[]).normalize(),
                fs.path(expected, &[]),
                "normalize({input:?})"
            );
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let fs = fs();
        for input in ["/a/./b/../../..", "../a/./../b", "a/b/c/../../..", "/x//y/.", ""] {
            let once = fs.path(input, &[]).normalize();
            assert_eq!(once.normalize(), once, "normalize({input:?})");
        }
    }

    #[test]
    fn test_resolve() {
        let fs = fs();
        let path = fs.path("/a/b/c", &[]);
        assert_eq!(path.resolve_str("d"), fs.path("/a/b/c/d", &[]));
        assert_eq!(path.resolve_str(""), path);
        assert_eq!(path.resolve_str("/d"), fs.path("/d", &[]));
        assert_eq!(fs.path("/", &[]).resolve_str("a"), fs.path("/a", &[]));
        assert_eq!(fs.path("", &[]).resolve_str("a"), fs.path("a", &[]));

        let other = fs.path("/x", &[]);
        assert_eq!(path.resolve(&other).unwrap(), other);
        assert_eq!(path.resolve(&fs.path("", &[])).unwrap(), path);
    }

    #[test]
    fn test_relativize() {
        let fs = fs();
        let cases = [
            ("/a/b/c", "/a/b/c", ""),
            ("/a/b", "/a/b/c/d", "c/d"),
            ("/a/b", "/a/x", "../x"),
            ("/a/b/c", "/a", "../.."),
            ("/", "/a/b", "a/b"),
            ("a/b", "a/c/d", "../c/d"),
            ("/a/./b", "/a/b", ""),
        ];
        for (base, other, expected) in cases {
            assert_eq!(
                fs.path(base, &[]).relativize(&fs.path(other, &[])).unwrap(),
                fs.path(expected, &[]),
                "{base:?}.relativize({other:?})"
            );
        }
    }

    #[test]
    fn test_relativize_requires_matching_roots() {
        let fs = fs();
        let result = fs.path("/a", &[]).relativize(&fs.path("a", &[]));
        assert!(matches!(result, Err(VfsError::InvalidArgument(_))));
    }

    #[test]
    fn test_relativize_inverts_resolve() {
        let fs = fs();
        for base in ["/a/b", "/", "a/b", "/a/../b"] {
            for q in ["c", "c/d", "../x", ""] {
                let p = fs.path(base, &[]);
                let q = fs.path(q, &[]);
                if p.is_absolute() && p.normalize().name_count() == 0 && q.as_str().starts_with("..") {
                    continue;
                }
                assert_eq!(
                    p.relativize(&p.resolve(&q).unwrap()).unwrap(),
                    q,
                    "{p}.relativize({p}.resolve({q}))"
                );
            }
        }
    }

    #[test]
    fn test_ordering() {
        let fs = fs();
        let a = fs.path("/a", &[]);
        let b = fs.path("/b", &[]);
        assert_eq!(a.cmp(&b), Ordering::Less);
        assert_eq!(b.cmp(&a), Ordering::Greater);
        assert_eq!(a.cmp(&fs.path("/a", &[])), Ordering::Equal);

        let other_fs = self::fs();
        let foreign = other_fs.path("/a", &[]);
        assert_ne!(a.cmp(&foreign), Ordering::Equal);
        assert_eq!(a.cmp(&foreign), foreign.cmp(&a).reverse());
    }

    #[test]
    fn test_object_keys() {
        let fs = fs();
        assert_eq!(fs.path("/a/b", &[]).to_object_key(), "a/b");
        assert_eq!(fs.path("/a/./b/", &[]).to_object_key(), "a/b");
        assert_eq!(fs.path("/./a", &[]).to_object_key(), "a");
        assert_eq!(fs.path("a/b", &[]).to_object_key(), "a/b");
        assert_eq!(fs.path("/", &[]).to_object_key(), "");
        assert_eq!(fs.path("/../a", &[]).to_object_key(), "a");
    }

    #[test]
    fn test_prefix_keys() {
        let fs = fs();
        assert_eq!(fs.path("/dir", &[]).to_prefix_key(), "dir/");
        assert_eq!(fs.path("/dir/", &[]).to_prefix_key(), "dir/");
        assert_eq!(fs.path("/", &[]).to_prefix_key(), "");
        assert_eq!(fs.path("", &[]).to_prefix_key(), "");
    }

    #[test]
    fn test_to_absolute_path() {
        let fs = fs();
        assert_eq!(fs.path("a/b", &[]).to_absolute_path(), fs.path("/a/b", &[]));
        assert_eq!(fs.path("", &[]).to_absolute_path(), fs.path("/", &[]));
        assert_eq!(fs.path("/a", &[]).to_absolute_path(), fs.path("/a", &[]));
    }

    #[test]
    fn test_hash_matches_equality() {
        use std::collections::HashSet;
        let fs = fs();
        let mut set = HashSet::new();
        set.insert(fs.path("/a", &[]));
        assert!(set.contains(&fs.path("/a", &[])));
        assert!(!set.contains(&fs.path("/a/", &[])));
    }
}
