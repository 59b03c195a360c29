//! Backup and restore round trips against the assembled engine.

#![cfg(test)]

use std::fs;
use std::sync::Arc;

use tfsafe_core::{sha256_hex, Cancellation, RestoreOptions, TfSafeError};
use tfsafe_crypto::{AesProvider, EncryptionProvider};
use tfsafe_engine::RestoreEngine;

use crate::harness::{next_second, TestEnv, SCENARIO_STATE};

#[test]
fn test_create_and_validate_scenario() {
    let env = TestEnv::new();
    let engine = env.engine();
    let cancel = Cancellation::none();

    let record = env.backup(&engine, "");

    assert!(record.id.starts_with("terraform.tfstate."));
    assert!(
        tfsafe_core::parse_backup_id(&record.id).is_some(),
        "identifier must carry an RFC3339 instant: {}",
        record.id
    );
    assert_eq!(record.size, SCENARIO_STATE.len() as u64);
    assert_eq!(record.checksum, sha256_hex(SCENARIO_STATE));
    assert_eq!(record.checksum.len(), 64);
    assert!(record
        .checksum
        .chars()
        .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_eq!(record.storage_type, "local");
    assert!(!record.encrypted);

    engine.validate_backup(&cancel, &record.id).unwrap();

    let listed = engine.list_backups(&cancel).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, record.id);
}

#[test]
fn test_tampering_detected_scenario() {
    let env = TestEnv::new();
    let engine = env.engine();
    let cancel = Cancellation::none();

    let record = env.backup(&engine, "");

    // One extra byte on the stored payload.
    let payload_path = env.backup_payload_path(&record.id);
    let mut bytes = fs::read(&payload_path).unwrap();
    bytes.push(0x00);
    fs::write(&payload_path, &bytes).unwrap();

    let err = engine.validate_backup(&cancel, &record.id).unwrap_err();
    assert!(matches!(err, TfSafeError::StorageCorrupted { .. }));

    let err = engine.retrieve_backup(&cancel, &record.id).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains(&record.checksum), "expected fingerprint in: {msg}");
    assert!(msg.contains(&sha256_hex(&bytes)), "actual fingerprint in: {msg}");
}

#[test]
fn test_restore_with_checkpoint_scenario() {
    let env = TestEnv::new();
    let engine = env.engine();
    let cancel = Cancellation::none();

    let p1 = SCENARIO_STATE;
    let s1 = env.backup(&engine, "before the change");

    next_second();
    let p2 = br#"{"version":4,"terraform_version":"1.0.0","serial":2}"#;
    env.write_state(p2);

    let restore = RestoreEngine::new(&engine);
    restore
        .restore(
            &cancel,
            &RestoreOptions {
                backup_id: s1.id.clone(),
                target_path: env.state_path.clone(),
                create_checkpoint: true,
                force: true,
            },
        )
        .unwrap();

    // The artifact equals P1 again.
    assert_eq!(fs::read(&env.state_path).unwrap(), p1);

    // A new snapshot S2 holds P2 and is described as a pre-restore backup.
    let listed = engine.list_backups(&cancel).unwrap();
    assert_eq!(listed.len(), 2);
    let s2 = listed.iter().find(|r| r.id != s1.id).expect("checkpoint");
    assert!(s2.description.starts_with("Pre-restore backup"));

    let (wrapped, record) = engine.retrieve_backup(&cancel, &s2.id).unwrap();
    assert_eq!(engine.unwrap_payload(&wrapped, &record).unwrap(), p2);
}

#[test]
fn test_serialized_callers_get_distinct_identifiers() {
    let env = TestEnv::new();
    let engine = env.engine();

    let first = env.backup(&engine, "");
    next_second();
    let second = env.backup(&engine, "");

    assert_ne!(first.id, second.id);
    assert!(first.id < second.id, "identifiers sort with creation time");
}

#[test]
fn test_encrypted_backup_round_trip() {
    let env = TestEnv::new();
    let mut provider = AesProvider::from_passphrase("integration passphrase").unwrap();
    provider.initialize().unwrap();
    let engine = env.engine_with(Arc::new(provider));
    let cancel = Cancellation::none();

    let record = env.backup(&engine, "encrypted");
    assert!(record.encrypted);

    // The fingerprint covers the ciphertext, not the plaintext.
    assert_ne!(record.checksum, sha256_hex(SCENARIO_STATE));
    let stored = fs::read(env.backup_payload_path(&record.id)).unwrap();
    assert_eq!(record.checksum, sha256_hex(&stored));
    assert_ne!(stored, SCENARIO_STATE);

    engine.validate_backup(&cancel, &record.id).unwrap();

    // Restore decrypts back to the original artifact.
    next_second();
    env.write_state(b"{}");
    let restore = RestoreEngine::new(&engine);
    restore
        .restore(
            &cancel,
            &RestoreOptions {
                backup_id: record.id.clone(),
                target_path: env.state_path.clone(),
                create_checkpoint: false,
                force: true,
            },
        )
        .unwrap();
    assert_eq!(fs::read(&env.state_path).unwrap(), SCENARIO_STATE);
}

#[test]
fn test_restored_file_is_replaced_atomically_in_place() {
    // The restored bytes land under the target's own directory via rename,
    // so a reader never observes a partial state file.
    let env = TestEnv::new();
    let engine = env.engine();
    let record = env.backup(&engine, "");

    env.write_state(b"{\"version\":4}");
    let restore = RestoreEngine::new(&engine);
    restore
        .restore(
            &Cancellation::none(),
            &RestoreOptions {
                backup_id: record.id,
                target_path: env.state_path.clone(),
                create_checkpoint: false,
                force: true,
            },
        )
        .unwrap();

    assert_eq!(fs::read(&env.state_path).unwrap(), SCENARIO_STATE);
    // No temp residue next to the state file.
    let residue: Vec<_> = fs::read_dir(env.dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".tmp"))
        .collect();
    assert!(residue.is_empty(), "leftover temp files: {residue:?}");
}
