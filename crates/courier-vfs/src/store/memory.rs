//! In-memory object store.
//!
//! Mirrors the listing semantics of S3: keys are sorted, common prefixes
//! fold everything up to and including the delimiter, and pages are cut by
//! a key budget with an opaque continuation token.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::RwLock;
use std::time::SystemTime;

use super::{ListPage, ListRequest, ObjectMeta, ObjectStore, ObjectSummary, StoreError, StoreResult};

/// Default page size, same as S3.
const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: Option<SystemTime>,
}

/// In-memory object store.
///
/// Thread-safe via internal `RwLock`. All data is lost when dropped.
#[derive(Debug)]
pub struct MemoryStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Cap every listing page at `page_size` entries.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Store an object stamped with the current time.
    pub fn put(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) -> StoreResult<()> {
        self.put_with_time(bucket, key, data, Some(SystemTime::now()))
    }

    /// Store an object with an explicit modification time.
    pub fn put_with_time(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Vec<u8>>,
        last_modified: Option<SystemTime>,
    ) -> StoreResult<()> {
        let mut buckets = self
            .buckets
            .write()
            .map_err(|_| StoreError::Other("lock poisoned".into()))?;
        buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data: data.into(),
                last_modified,
            },
        );
        Ok(())
    }

    /// Remove an object; missing keys are ignored.
    pub fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let mut buckets = self
            .buckets
            .write()
            .map_err(|_| StoreError::Other("lock poisoned".into()))?;
        if let Some(objects) = buckets.get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }

    /// Common prefix `key` folds into, if any.
    fn common_prefix<'k>(key: &'k str, prefix: &str, delimiter: Option<&str>) -> Option<&'k str> {
        let delimiter = delimiter.filter(|d| !d.is_empty())?;
        let rest = &key[prefix.len()..];
        rest.find(delimiter)
            .map(|idx| &key[..prefix.len() + idx + delimiter.len()])
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<Option<ObjectMeta>> {
        let buckets = self
            .buckets
            .read()
            .map_err(|_| StoreError::Other("lock poisoned".into()))?;

        Ok(buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|obj| ObjectMeta {
                size: obj.data.len() as u64,
                last_modified: obj.last_modified,
            }))
    }

    async fn list_objects(&self, bucket: &str, request: &ListRequest<'_>) -> StoreResult<ListPage> {
        let buckets = self
            .buckets
            .read()
            .map_err(|_| StoreError::Other("lock poisoned".into()))?;

        let mut page = ListPage::default();
        let Some(objects) = buckets.get(bucket) else {
            return Ok(page);
        };

        let budget = request
            .max_keys
            .map(|n| n.max(1) as usize)
            .unwrap_or(self.page_size)
            .min(self.page_size);

        // A page boundary may fall inside a common prefix; skip the rest of it.
        let resumed_prefix = request
            .continuation_token
            .filter(|token| token.starts_with(request.prefix))
            .and_then(|token| Self::common_prefix(token, request.prefix, request.delimiter));

        let lower = match request.continuation_token {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Included(request.prefix.to_string()),
        };

        let mut last_key: Option<&str> = None;
        for (key, obj) in objects.range((lower, Bound::Unbounded)) {
            if !key.starts_with(request.prefix) {
                if key.as_str() > request.prefix {
                    break;
                }
                continue;
            }
            if resumed_prefix.is_some_and(|cp| key.starts_with(cp)) {
                continue;
            }

            match Self::common_prefix(key, request.prefix, request.delimiter) {
                Some(cp) => {
                    if page.common_prefixes.last().map(String::as_str) == Some(cp) {
                        last_key = Some(key);
                        continue;
                    }
                    if page.key_count() == budget {
                        page.next_continuation_token = last_key.map(str::to_string);
                        break;
                    }
                    page.common_prefixes.push(cp.to_string());
                }
                None => {
                    if page.key_count() == budget {
                        page.next_continuation_token = last_key.map(str::to_string);
                        break;
                    }
                    page.objects.push(ObjectSummary {
                        key: key.clone(),
                        size: obj.data.len() as u64,
                        last_modified: obj.last_modified,
                    });
                }
            }
            last_key = Some(key);
        }

        Ok(page)
    }
}
