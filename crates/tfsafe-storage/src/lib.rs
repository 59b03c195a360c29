#![warn(missing_docs)]

//! tf-safe storage tiers.
//!
//! Two backends implement the [`StorageBackend`] contract: a local directory
//! tier with sidecar metadata and a JSON catalog, and a remote tier layered
//! over an [`ObjectStore`] contract with retry, multipart upload, and a
//! metadata side-channel on each object. Object-store wire protocols are out
//! of scope; [`MemoryObjectStore`] is the in-process implementation used by
//! tests and local development.

pub mod backend;
pub mod factory;
pub mod local;
pub mod object_store;
pub mod remote;

pub use backend::StorageBackend;
pub use factory::{create_local, create_object_store, create_remote};
pub use local::LocalStorage;
pub use object_store::{
    MemoryObjectStore, MemoryStoreStats, ObjectAttrs, ObjectStore, ObjectSummary, UploadedPart,
};
pub use remote::{retry_delay, RemoteStorage, MAX_ATTEMPTS, METADATA_PREFIX, MULTIPART_THRESHOLD};
