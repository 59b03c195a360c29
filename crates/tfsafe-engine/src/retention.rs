//! Retention planning: count and age policies under a global floor.
//!
//! The planner only computes deletion sets; the backup engine performs the
//! deletions through the tier's `delete`. Planning is idempotent and may be
//! replayed safely. A global floor of 3 applies independently of
//! configuration: no plan ever leaves an enabled tier with fewer survivors.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use tfsafe_core::{BackupRecord, RetentionConfig};

/// Minimum number of backups a tier keeps, regardless of configuration.
pub const RETENTION_FLOOR: usize = 3;

/// Computes deletion sets for one tier at a time.
#[derive(Debug, Clone)]
pub struct RetentionPlanner {
    config: RetentionConfig,
}

impl RetentionPlanner {
    /// Planner over the merged retention configuration.
    pub fn new(config: RetentionConfig) -> Self {
        Self { config }
    }

    /// Deletion set for the local tier.
    pub fn plan_local(&self, records: &[BackupRecord], now: DateTime<Utc>) -> Vec<BackupRecord> {
        self.plan(records, self.config.local_count, "local", now)
    }

    /// Deletion set for the remote tier.
    pub fn plan_remote(&self, records: &[BackupRecord], now: DateTime<Utc>) -> Vec<BackupRecord> {
        self.plan(records, self.config.remote_count, "remote", now)
    }

    fn plan(
        &self,
        records: &[BackupRecord],
        target: usize,
        tier: &str,
        now: DateTime<Utc>,
    ) -> Vec<BackupRecord> {
        if records.len() <= RETENTION_FLOOR {
            debug!(
                tier,
                count = records.len(),
                floor = RETENTION_FLOOR,
                "at or below floor, retaining all"
            );
            return Vec::new();
        }

        // Newest first; identifiers break instant ties deterministically.
        let mut sorted = records.to_vec();
        tfsafe_core::record::sort_newest_first(&mut sorted);

        let mut marked: Vec<BackupRecord> = Vec::new();
        let is_marked =
            |marked: &[BackupRecord], id: &str| marked.iter().any(|r| r.id == id);

        // Count policy.
        if target > RETENTION_FLOOR && sorted.len() > target {
            for record in &sorted[target..] {
                if sorted.len() - marked.len() > RETENTION_FLOOR {
                    debug!(tier, id = %record.id, "marked by count policy");
                    marked.push(record.clone());
                }
            }
        }

        // Age policy, idempotent with the count policy. Oldest candidates go
        // first so that hitting the floor mid-pass keeps the newest backups.
        if self.config.max_age_days > 0 {
            let max_age = Duration::hours(24) * self.config.max_age_days as i32;
            for record in sorted.iter().rev() {
                if record.age(now) > max_age
                    && !is_marked(&marked, &record.id)
                    && sorted.len() - marked.len() > RETENTION_FLOOR
                {
                    debug!(tier, id = %record.id, "marked by age policy");
                    marked.push(record.clone());
                }
            }
        }

        // Floor backstop: shrink the deletion set, oldest-first, until the
        // survivors are back at the floor.
        if sorted.len() - marked.len() < RETENTION_FLOOR {
            marked.sort_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.id.cmp(&b.id))
            });
            let deficit = RETENTION_FLOOR - (sorted.len() - marked.len());
            if deficit >= marked.len() {
                info!(tier, "no deletion is safe under the retention floor");
                marked.clear();
            } else {
                marked.drain(..deficit);
            }
        }

        info!(
            tier,
            total = records.len(),
            marked = marked.len(),
            surviving = records.len() - marked.len(),
            "retention plan computed"
        );
        marked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tfsafe_core::backup_id_at;

    fn record_aged(now: DateTime<Utc>, age: Duration) -> BackupRecord {
        let ts = now - age;
        BackupRecord {
            id: backup_id_at(ts),
            timestamp: ts,
            size: 100,
            checksum: "c".repeat(64),
            storage_type: "local".to_string(),
            encrypted: false,
            file_path: String::new(),
            description: String::new(),
        }
    }

    fn planner(local_count: usize, max_age_days: u32) -> RetentionPlanner {
        RetentionPlanner::new(RetentionConfig {
            local_count,
            remote_count: 50,
            max_age_days,
        })
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_at_or_below_floor_retains_all() {
        let now = now();
        let records: Vec<_> = (1..=3)
            .map(|h| record_aged(now, Duration::hours(h)))
            .collect();
        assert!(planner(3, 0).plan_local(&records, now).is_empty());
    }

    #[test]
    fn test_count_policy_six_hourly_backups_target_four() {
        // Six backups at t-6h .. t-1h with target 4: exactly t-6h and t-5h go.
        let now = now();
        let records: Vec<_> = (1..=6)
            .map(|h| record_aged(now, Duration::hours(h)))
            .collect();

        let marked = planner(4, 0).plan_local(&records, now);
        let ids: Vec<String> = marked.iter().map(|r| r.id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                record_aged(now, Duration::hours(5)).id,
                record_aged(now, Duration::hours(6)).id,
            ]
        );

        let survivors: Vec<String> = records
            .iter()
            .filter(|r| !marked.iter().any(|m| m.id == r.id))
            .map(|r| r.id.clone())
            .collect();
        assert_eq!(survivors.len(), 4);
        for h in 1..=4 {
            assert!(survivors.contains(&record_aged(now, Duration::hours(h)).id));
        }
    }

    #[test]
    fn test_age_policy_fixture() {
        // Ages {10d, 8d, 5d, 2d, 1h}, target 10, max age 7d: 10d and 8d go.
        let now = now();
        let records = vec![
            record_aged(now, Duration::days(10)),
            record_aged(now, Duration::days(8)),
            record_aged(now, Duration::days(5)),
            record_aged(now, Duration::days(2)),
            record_aged(now, Duration::hours(1)),
        ];

        let marked = planner(10, 7).plan_local(&records, now);
        let mut ids: Vec<String> = marked.iter().map(|r| r.id.clone()).collect();
        ids.sort();
        let mut expected = vec![
            record_aged(now, Duration::days(10)).id,
            record_aged(now, Duration::days(8)).id,
        ];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_target_above_count_deletes_nothing() {
        let now = now();
        let records: Vec<_> = (1..=5)
            .map(|h| record_aged(now, Duration::hours(h)))
            .collect();
        assert!(planner(10, 0).plan_local(&records, now).is_empty());
    }

    #[test]
    fn test_age_policy_respects_floor() {
        // Everything is ancient, but the floor keeps three.
        let now = now();
        let records: Vec<_> = (1..=5)
            .map(|d| record_aged(now, Duration::days(30 + d)))
            .collect();

        let marked = planner(10, 7).plan_local(&records, now);
        assert_eq!(marked.len(), 2);
        assert_eq!(records.len() - marked.len(), RETENTION_FLOOR);
    }

    #[test]
    fn test_zero_max_age_disables_age_policy() {
        let now = now();
        let records: Vec<_> = (1..=4)
            .map(|d| record_aged(now, Duration::days(300 * d)))
            .collect();
        assert!(planner(10, 0).plan_local(&records, now).is_empty());
    }

    #[test]
    fn test_combined_policies_never_mark_twice() {
        // Old enough that the age policy would re-mark what the count policy
        // already marked; the plan still holds each id at most once and the
        // floor holds.
        let now = now();
        let records: Vec<_> = (1..=6)
            .map(|d| record_aged(now, Duration::days(10 + d)))
            .collect();

        let marked = planner(4, 7).plan_local(&records, now);
        let mut ids: Vec<_> = marked.iter().map(|r| r.id.clone()).collect();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), before);
        assert_eq!(records.len() - marked.len(), RETENTION_FLOOR);
    }

    #[test]
    fn test_remote_plan_uses_remote_target() {
        let now = now();
        let records: Vec<_> = (1..=8)
            .map(|h| record_aged(now, Duration::hours(h)))
            .collect();
        let planner = RetentionPlanner::new(RetentionConfig {
            local_count: 4,
            remote_count: 6,
            max_age_days: 0,
        });

        assert_eq!(planner.plan_local(&records, now).len(), 4);
        assert_eq!(planner.plan_remote(&records, now).len(), 2);
    }

    #[test]
    fn test_plan_is_idempotent_over_survivors() {
        let now = now();
        let records: Vec<_> = (1..=6)
            .map(|h| record_aged(now, Duration::hours(h)))
            .collect();
        let planner = planner(4, 0);

        let marked = planner.plan_local(&records, now);
        let survivors: Vec<_> = records
            .iter()
            .filter(|r| !marked.iter().any(|m| m.id == r.id))
            .cloned()
            .collect();

        assert!(planner.plan_local(&survivors, now).is_empty());
    }
}
