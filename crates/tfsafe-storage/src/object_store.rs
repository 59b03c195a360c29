//! Object-store contract and the in-process implementation.
//!
//! An object has a key, an opaque body, and a string-keyed metadata
//! side-channel. The wire protocols of real stores are out of scope; the
//! remote tier consumes this trait and [`MemoryObjectStore`] implements it
//! in-process with operation counters and injectable failures for tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use tfsafe_core::{TfSafeError, TfSafeResult};

/// Metadata and size reported by a `head` call.
#[derive(Debug, Clone)]
pub struct ObjectAttrs {
    /// The metadata side-channel stored with the object.
    pub metadata: BTreeMap<String, String>,
    /// Body length in bytes.
    pub size: u64,
}

/// One entry of a `list` call.
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    /// Full object key.
    pub key: String,
    /// Body length in bytes.
    pub size: u64,
}

/// Receipt for one uploaded part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    /// 1-based part number.
    pub part_number: u32,
    /// Store-assigned tag identifying the part.
    pub tag: String,
}

/// Contract over the object-store operations the remote tier needs.
pub trait ObjectStore: Send + Sync {
    /// Writes an object in one call.
    fn put(
        &self,
        key: &str,
        data: &[u8],
        metadata: &BTreeMap<String, String>,
    ) -> TfSafeResult<()>;

    /// Reads an object's body and metadata.
    fn get(&self, key: &str) -> TfSafeResult<(Vec<u8>, BTreeMap<String, String>)>;

    /// Reads an object's attributes; `None` when the key does not exist.
    fn head(&self, key: &str) -> TfSafeResult<Option<ObjectAttrs>>;

    /// Deletes an object; deleting an absent key succeeds.
    fn delete(&self, key: &str) -> TfSafeResult<()>;

    /// Lists objects under `prefix`.
    fn list(&self, prefix: &str) -> TfSafeResult<Vec<ObjectSummary>>;

    /// Starts a multipart upload, returning its id.
    fn create_multipart(
        &self,
        key: &str,
        metadata: &BTreeMap<String, String>,
    ) -> TfSafeResult<String>;

    /// Uploads one part of a multipart upload.
    fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> TfSafeResult<UploadedPart>;

    /// Completes a multipart upload from the collected part receipts.
    fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> TfSafeResult<()>;

    /// Abandons a multipart upload, discarding uploaded parts.
    fn abort_multipart(&self, key: &str, upload_id: &str) -> TfSafeResult<()>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<T> {
    fn put(&self, key: &str, data: &[u8], metadata: &BTreeMap<String, String>) -> TfSafeResult<()> {
        (**self).put(key, data, metadata)
    }

    fn get(&self, key: &str) -> TfSafeResult<(Vec<u8>, BTreeMap<String, String>)> {
        (**self).get(key)
    }

    fn head(&self, key: &str) -> TfSafeResult<Option<ObjectAttrs>> {
        (**self).head(key)
    }

    fn delete(&self, key: &str) -> TfSafeResult<()> {
        (**self).delete(key)
    }

    fn list(&self, prefix: &str) -> TfSafeResult<Vec<ObjectSummary>> {
        (**self).list(prefix)
    }

    fn create_multipart(
        &self,
        key: &str,
        metadata: &BTreeMap<String, String>,
    ) -> TfSafeResult<String> {
        (**self).create_multipart(key, metadata)
    }

    fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> TfSafeResult<UploadedPart> {
        (**self).upload_part(key, upload_id, part_number, data)
    }

    fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> TfSafeResult<()> {
        (**self).complete_multipart(key, upload_id, parts)
    }

    fn abort_multipart(&self, key: &str, upload_id: &str) -> TfSafeResult<()> {
        (**self).abort_multipart(key, upload_id)
    }
}

/// Operation counters for [`MemoryObjectStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreStats {
    /// Single-call object writes.
    pub puts: u64,
    /// Object reads.
    pub gets: u64,
    /// Attribute reads.
    pub heads: u64,
    /// Deletions.
    pub deletes: u64,
    /// List calls.
    pub lists: u64,
    /// Multipart uploads started.
    pub multipart_creates: u64,
    /// Parts uploaded.
    pub parts_uploaded: u64,
    /// Multipart uploads completed.
    pub multipart_completes: u64,
    /// Multipart uploads aborted.
    pub multipart_aborts: u64,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    metadata: BTreeMap<String, String>,
}

#[derive(Debug)]
struct PendingUpload {
    key: String,
    metadata: BTreeMap<String, String>,
    parts: BTreeMap<u32, Vec<u8>>,
}

/// In-process object store with failure injection.
///
/// `fail_next(op, n)` makes the next `n` calls of `op` return a transient
/// storage error, which is how the retry and degraded-mode paths are
/// exercised without a network.
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    uploads: Mutex<HashMap<String, PendingUpload>>,
    stats: Mutex<MemoryStoreStats>,
    failures: Mutex<HashMap<String, VecDeque<String>>>,
    next_upload_id: Mutex<u64>,
}

impl MemoryObjectStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            uploads: Mutex::new(HashMap::new()),
            stats: Mutex::new(MemoryStoreStats::default()),
            failures: Mutex::new(HashMap::new()),
            next_upload_id: Mutex::new(1),
        }
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> MemoryStoreStats {
        self.stats.lock().unwrap().clone()
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Number of multipart uploads started but neither completed nor aborted.
    pub fn pending_upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    /// Raw body of a stored object, for assertions.
    pub fn object_body(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).map(|o| o.data.clone())
    }

    /// Overwrites a stored object's body, bypassing metadata. Used by tests
    /// to simulate corruption behind the tier's back.
    pub fn corrupt_object(&self, key: &str, data: Vec<u8>) {
        if let Some(obj) = self.objects.lock().unwrap().get_mut(key) {
            obj.data = data;
        }
    }

    /// Drops one metadata key from a stored object.
    pub fn strip_metadata(&self, key: &str, meta_key: &str) {
        if let Some(obj) = self.objects.lock().unwrap().get_mut(key) {
            obj.metadata.remove(meta_key);
        }
    }

    /// Queues `count` transient failures for operation `op`
    /// (`put`, `get`, `head`, `delete`, `list`, `create_multipart`,
    /// `upload_part`, `complete_multipart`).
    pub fn fail_next(&self, op: &str, count: usize) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(op.to_string()).or_default();
        for _ in 0..count {
            queue.push_back(format!("injected {op} failure"));
        }
    }

    fn take_failure(&self, op: &str) -> TfSafeResult<()> {
        let mut failures = self.failures.lock().unwrap();
        if let Some(queue) = failures.get_mut(op) {
            if let Some(reason) = queue.pop_front() {
                return Err(TfSafeError::StorageIo {
                    operation: op.to_string(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(
        &self,
        key: &str,
        data: &[u8],
        metadata: &BTreeMap<String, String>,
    ) -> TfSafeResult<()> {
        self.stats.lock().unwrap().puts += 1;
        self.take_failure("put")?;
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> TfSafeResult<(Vec<u8>, BTreeMap<String, String>)> {
        self.stats.lock().unwrap().gets += 1;
        self.take_failure("get")?;
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|o| (o.data.clone(), o.metadata.clone()))
            .ok_or_else(|| TfSafeError::NotFound {
                id: key.to_string(),
            })
    }

    fn head(&self, key: &str) -> TfSafeResult<Option<ObjectAttrs>> {
        self.stats.lock().unwrap().heads += 1;
        self.take_failure("head")?;
        Ok(self.objects.lock().unwrap().get(key).map(|o| ObjectAttrs {
            metadata: o.metadata.clone(),
            size: o.data.len() as u64,
        }))
    }

    fn delete(&self, key: &str) -> TfSafeResult<()> {
        self.stats.lock().unwrap().deletes += 1;
        self.take_failure("delete")?;
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> TfSafeResult<Vec<ObjectSummary>> {
        self.stats.lock().unwrap().lists += 1;
        self.take_failure("list")?;
        let mut entries: Vec<ObjectSummary> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectSummary {
                key: key.clone(),
                size: obj.data.len() as u64,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    fn create_multipart(
        &self,
        key: &str,
        metadata: &BTreeMap<String, String>,
    ) -> TfSafeResult<String> {
        self.stats.lock().unwrap().multipart_creates += 1;
        self.take_failure("create_multipart")?;
        let mut next = self.next_upload_id.lock().unwrap();
        let upload_id = format!("upload-{}", *next);
        *next += 1;
        self.uploads.lock().unwrap().insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                metadata: metadata.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> TfSafeResult<UploadedPart> {
        self.stats.lock().unwrap().parts_uploaded += 1;
        self.take_failure("upload_part")?;
        let mut uploads = self.uploads.lock().unwrap();
        let upload = uploads.get_mut(upload_id).ok_or_else(|| TfSafeError::StorageIo {
            operation: "upload_part".to_string(),
            reason: format!("unknown upload id {upload_id} for {key}"),
        })?;
        upload.parts.insert(part_number, data.to_vec());
        Ok(UploadedPart {
            part_number,
            tag: format!("tag-{upload_id}-{part_number}"),
        })
    }

    fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> TfSafeResult<()> {
        self.stats.lock().unwrap().multipart_completes += 1;
        self.take_failure("complete_multipart")?;
        let mut uploads = self.uploads.lock().unwrap();
        let upload = uploads.remove(upload_id).ok_or_else(|| TfSafeError::StorageIo {
            operation: "complete_multipart".to_string(),
            reason: format!("unknown upload id {upload_id} for {key}"),
        })?;

        let mut body = Vec::new();
        for part in parts {
            let data = upload.parts.get(&part.part_number).ok_or_else(|| {
                TfSafeError::StorageIo {
                    operation: "complete_multipart".to_string(),
                    reason: format!("missing part {} for {key}", part.part_number),
                }
            })?;
            body.extend_from_slice(data);
        }

        self.objects.lock().unwrap().insert(
            upload.key,
            StoredObject {
                data: body,
                metadata: upload.metadata,
            },
        );
        Ok(())
    }

    fn abort_multipart(&self, _key: &str, upload_id: &str) -> TfSafeResult<()> {
        self.stats.lock().unwrap().multipart_aborts += 1;
        self.uploads.lock().unwrap().remove(upload_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_put_get_head_delete_cycle() {
        let store = MemoryObjectStore::new();
        let metadata = meta(&[("tf-safe-id", "x")]);

        store.put("pre/x.bak", b"body", &metadata).unwrap();
        let (data, got_meta) = store.get("pre/x.bak").unwrap();
        assert_eq!(data, b"body");
        assert_eq!(got_meta.get("tf-safe-id").unwrap(), "x");

        let attrs = store.head("pre/x.bak").unwrap().unwrap();
        assert_eq!(attrs.size, 4);

        store.delete("pre/x.bak").unwrap();
        assert!(store.head("pre/x.bak").unwrap().is_none());
        assert!(matches!(
            store.get("pre/x.bak"),
            Err(TfSafeError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_filters_by_prefix() {
        let store = MemoryObjectStore::new();
        let metadata = BTreeMap::new();
        store.put("a/1.bak", b"1", &metadata).unwrap();
        store.put("a/2.bak", b"2", &metadata).unwrap();
        store.put("b/3.bak", b"3", &metadata).unwrap();

        let entries = store.list("a/").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "a/1.bak");
    }

    #[test]
    fn test_multipart_assembles_parts_in_order() {
        let store = MemoryObjectStore::new();
        let metadata = meta(&[("tf-safe-id", "big")]);

        let upload_id = store.create_multipart("big.bak", &metadata).unwrap();
        let p1 = store.upload_part("big.bak", &upload_id, 1, b"hello ").unwrap();
        let p2 = store.upload_part("big.bak", &upload_id, 2, b"world").unwrap();
        store
            .complete_multipart("big.bak", &upload_id, &[p1, p2])
            .unwrap();

        let (data, got_meta) = store.get("big.bak").unwrap();
        assert_eq!(data, b"hello world");
        assert_eq!(got_meta.get("tf-safe-id").unwrap(), "big");
        assert_eq!(store.pending_upload_count(), 0);
    }

    #[test]
    fn test_abort_discards_upload() {
        let store = MemoryObjectStore::new();
        let upload_id = store
            .create_multipart("big.bak", &BTreeMap::new())
            .unwrap();
        store.upload_part("big.bak", &upload_id, 1, b"part").unwrap();
        store.abort_multipart("big.bak", &upload_id).unwrap();

        assert_eq!(store.pending_upload_count(), 0);
        assert!(store.head("big.bak").unwrap().is_none());
    }

    #[test]
    fn test_failure_injection_is_consumed_in_order() {
        let store = MemoryObjectStore::new();
        store.fail_next("put", 2);

        assert!(store.put("k", b"v", &BTreeMap::new()).is_err());
        assert!(store.put("k", b"v", &BTreeMap::new()).is_err());
        assert!(store.put("k", b"v", &BTreeMap::new()).is_ok());
        assert_eq!(store.stats().puts, 3);
    }
}
