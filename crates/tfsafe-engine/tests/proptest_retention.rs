//! Property-based tests for the retention planner.
//!
//! The invariant under test: for every input list and configuration, the
//! deletion set never brings a tier's surviving count below the floor, never
//! deletes anything the count target would retain, and never marks an entry
//! twice.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use tfsafe_core::{backup_id_at, BackupRecord, RetentionConfig};
use tfsafe_engine::{RetentionPlanner, RETENTION_FLOOR};

fn record_aged(age_hours: i64) -> BackupRecord {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let ts = now - Duration::hours(age_hours);
    BackupRecord {
        id: backup_id_at(ts),
        timestamp: ts,
        size: 1,
        checksum: "0".repeat(64),
        storage_type: "local".to_string(),
        encrypted: false,
        file_path: String::new(),
        description: String::new(),
    }
}

/// Distinct ages so identifiers stay unique.
fn any_ages() -> impl Strategy<Value = Vec<i64>> {
    proptest::collection::btree_set(1i64..2000, 0..40)
        .prop_map(|set| set.into_iter().collect())
}

proptest! {
    /// Survivors never drop below the floor, whatever the configuration.
    #[test]
    fn prop_floor_always_holds(
        ages in any_ages(),
        local_count in 0usize..30,
        max_age_days in 0u32..60,
    ) {
        let records: Vec<BackupRecord> = ages.iter().map(|&h| record_aged(h)).collect();
        let planner = RetentionPlanner::new(RetentionConfig {
            local_count,
            remote_count: 1,
            max_age_days,
        });

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let marked = planner.plan_local(&records, now);

        if records.len() <= RETENTION_FLOOR {
            prop_assert!(marked.is_empty());
        } else {
            prop_assert!(records.len() - marked.len() >= RETENTION_FLOOR);
        }
    }

    /// A target above the input size deletes nothing through the count policy.
    #[test]
    fn prop_large_target_deletes_nothing(ages in any_ages()) {
        let records: Vec<BackupRecord> = ages.iter().map(|&h| record_aged(h)).collect();
        let planner = RetentionPlanner::new(RetentionConfig {
            local_count: records.len() + 1,
            remote_count: 1,
            max_age_days: 0,
        });

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        prop_assert!(planner.plan_local(&records, now).is_empty());
    }

    /// The deletion set holds no duplicates and only known identifiers.
    #[test]
    fn prop_marked_ids_are_unique_members(
        ages in any_ages(),
        local_count in 0usize..30,
        max_age_days in 0u32..60,
    ) {
        let records: Vec<BackupRecord> = ages.iter().map(|&h| record_aged(h)).collect();
        let planner = RetentionPlanner::new(RetentionConfig {
            local_count,
            remote_count: 1,
            max_age_days,
        });

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let marked = planner.plan_local(&records, now);

        let mut ids: Vec<&str> = marked.iter().map(|r| r.id.as_str()).collect();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), before);
        for id in ids {
            prop_assert!(records.iter().any(|r| r.id == id));
        }
    }

    /// The newest `floor` backups survive every plan.
    #[test]
    fn prop_newest_floor_survive(
        ages in any_ages(),
        local_count in 0usize..30,
        max_age_days in 0u32..60,
    ) {
        let records: Vec<BackupRecord> = ages.iter().map(|&h| record_aged(h)).collect();
        let planner = RetentionPlanner::new(RetentionConfig {
            local_count,
            remote_count: 1,
            max_age_days,
        });

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let marked = planner.plan_local(&records, now);

        let mut sorted = records.clone();
        sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        for newest in sorted.iter().take(RETENTION_FLOOR) {
            prop_assert!(
                !marked.iter().any(|m| m.id == newest.id),
                "newest backup {} was marked for deletion",
                newest.id
            );
        }
    }
}
