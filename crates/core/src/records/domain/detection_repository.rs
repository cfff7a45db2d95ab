use std::collections::HashMap;

use chrono::{DateTime, Local, Utc};
use thiserror::Error;

use super::detection_record::{DetectionRecord, NewDetectionRecord, RecordId};

#[derive(Error, Debug)]
pub enum RecordStoreError {
    #[error("record store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("record store unavailable")]
    Unavailable,
}

/// Persistence for detection records.
///
/// Implementations never fail loudly: an unreachable store degrades reads
/// to empty results and writes to `None`/`false`, logging a warning.
pub trait DetectionRepository: Send + Sync {
    fn insert(&self, record: NewDetectionRecord) -> Option<RecordId>;

    fn mark_alert_sent(&self, id: RecordId) -> bool;

    /// Verified detections per species for one user.
    fn species_counts(&self, user_id: &str) -> HashMap<String, usize>;

    /// Newest first.
    fn recent(&self, user_id: &str, limit: usize) -> Vec<DetectionRecord>;

    fn total_verified(&self, user_id: &str) -> usize;

    /// Verified detections since local midnight, newest first.
    fn detections_today(&self, user_id: &str) -> Vec<DetectionRecord>;

    fn get(&self, id: RecordId) -> Option<DetectionRecord>;

    /// True when a record was removed.
    fn delete(&self, id: RecordId) -> bool;
}

pub fn count_species<'a>(
    records: impl IntoIterator<Item = &'a DetectionRecord>,
    user_id: &str,
) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for r in records {
        if r.record.user_id == user_id && r.is_verified() {
            *counts.entry(r.record.species.clone()).or_insert(0) += 1;
        }
    }
    counts
}

pub fn newest_first<'a>(
    records: impl IntoIterator<Item = &'a DetectionRecord>,
    user_id: &str,
    limit: usize,
) -> Vec<DetectionRecord> {
    let mut mine: Vec<DetectionRecord> = records
        .into_iter()
        .filter(|r| r.record.user_id == user_id)
        .cloned()
        .collect();
    mine.sort_by(|a, b| {
        b.record
            .timestamp
            .cmp(&a.record.timestamp)
            .then(b.id.cmp(&a.id))
    });
    mine.truncate(limit);
    mine
}

/// Verified records of `user_id` at or after `since`, newest first.
pub fn verified_since<'a>(
    records: impl IntoIterator<Item = &'a DetectionRecord>,
    user_id: &str,
    since: DateTime<Utc>,
) -> Vec<DetectionRecord> {
    let recent: Vec<&DetectionRecord> = records
        .into_iter()
        .filter(|r| r.is_verified() && r.record.timestamp >= since)
        .collect();
    newest_first(recent, user_id, usize::MAX)
}

/// Start of the current local day.
pub fn local_midnight() -> DateTime<Utc> {
    let midnight = Local::now().date_naive().and_time(chrono::NaiveTime::MIN);
    midnight
        .and_local_timezone(Local)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::domain::detection_record::{
        DetectionSource, NewDetectionRecord, VerificationStatus,
    };
    use chrono::{Duration, TimeZone};

    fn record(id: RecordId, user: &str, at: DateTime<Utc>, status: VerificationStatus) -> DetectionRecord {
        let mut r = NewDetectionRecord::verified(user, "Tiger", 0.8, 0.6, None, DetectionSource::Webcam);
        r.timestamp = at;
        r.verification_status = status;
        r.with_id(id)
    }

    #[test]
    fn test_verified_since_filters_and_orders() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let records = vec![
            record(1, "a", start - Duration::minutes(1), VerificationStatus::Verified),
            record(2, "a", start, VerificationStatus::Verified),
            record(3, "a", start + Duration::hours(3), VerificationStatus::Verified),
            record(4, "a", start + Duration::hours(4), VerificationStatus::Rejected),
            record(5, "b", start + Duration::hours(5), VerificationStatus::Verified),
        ];

        let ids: Vec<_> = verified_since(&records, "a", start).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_local_midnight_is_within_last_day() {
        let now = Utc::now();
        let midnight = local_midnight();
        assert!(midnight <= now);
        assert!(now - midnight <= Duration::hours(25));
    }
}
