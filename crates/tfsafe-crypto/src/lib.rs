#![warn(missing_docs)]

//! tf-safe encryption providers.
//!
//! A provider wraps the backup payload before it reaches a storage tier and
//! unwraps it on restore. Three variants exist: AES-256-GCM keyed directly or
//! derived from a passphrase, an envelope over a remote key-management
//! service, and a no-op pass-through. The factory selects one from the
//! configuration descriptor; the engines only ever see the
//! [`EncryptionProvider`] contract.

pub mod aes;
pub mod factory;
pub mod kms;
pub mod noop;
pub mod provider;

pub use aes::AesProvider;
pub use factory::{create_provider, extract_region_from_key_id, DEFAULT_KMS_REGION};
pub use kms::{KmsClient, KmsKeyDescriptor, KmsProvider, MemoryKmsClient};
pub use noop::NoopProvider;
pub use provider::{EncryptionProvider, KeyInfo};
