//! Age-based partition for pruning the password collection.

use crate::crypto::Cleartext;
use crate::records::time_created;

const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;

/// Outcome of splitting fetched records around an age cutoff.
#[derive(Debug, Default)]
pub struct AgePartition {
    pub keep: Vec<Cleartext>,
    pub remove: Vec<Cleartext>,
}

/// Cutoff in epoch millis: `max_age_hours` before `now_millis`.
pub fn age_cutoff(now_millis: i64, max_age_hours: u64) -> i64 {
    let window = i64::try_from(max_age_hours)
        .unwrap_or(i64::MAX)
        .saturating_mul(MILLIS_PER_HOUR);
    now_millis.saturating_sub(window)
}

/// Split records by `timeCreated` against `cutoff`.
///
/// Rules:
/// 1. `timeCreated < cutoff` is kept.
/// 2. `timeCreated >= cutoff` is removed.
/// 3. No readable `timeCreated` is kept.
pub fn partition_by_age(records: Vec<Cleartext>, cutoff: i64) -> AgePartition {
    let mut partition = AgePartition::default();
    for record in records {
        match time_created(&record) {
            Some(created) if created >= cutoff => partition.remove.push(record),
            _ => partition.keep.push(record),
        }
    }
    partition
}
