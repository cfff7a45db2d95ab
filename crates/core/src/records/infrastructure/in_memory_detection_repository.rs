use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::records::domain::detection_record::{DetectionRecord, NewDetectionRecord, RecordId};
use crate::records::domain::detection_repository::{
    count_species, local_midnight, newest_first, verified_since, DetectionRepository,
};

/// Process-local record store.
///
/// `set_available(false)` simulates a lost connection: every call then
/// takes the degraded path.
pub struct InMemoryDetectionRepository {
    records: Mutex<Vec<DetectionRecord>>,
    available: AtomicBool,
}

impl InMemoryDetectionRepository {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<DetectionRecord> {
        self.with_records(|r| r.to_vec()).unwrap_or_default()
    }

    fn with_records<T>(&self, f: impl FnOnce(&mut Vec<DetectionRecord>) -> T) -> Option<T> {
        if !self.available.load(Ordering::SeqCst) {
            log::warn!("Record store unavailable");
            return None;
        }
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Some(f(&mut records))
    }
}

impl Default for InMemoryDetectionRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionRepository for InMemoryDetectionRepository {
    fn insert(&self, record: NewDetectionRecord) -> Option<RecordId> {
        self.with_records(|records| {
            let id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
            records.push(record.with_id(id));
            id
        })
    }

    fn mark_alert_sent(&self, id: RecordId) -> bool {
        self.with_records(|records| match records.iter_mut().find(|r| r.id == id) {
            Some(r) => {
                r.record.alert_sent = true;
                true
            }
            None => false,
        })
        .unwrap_or(false)
    }

    fn species_counts(&self, user_id: &str) -> HashMap<String, usize> {
        self.with_records(|records| count_species(records.iter(), user_id))
            .unwrap_or_default()
    }

    fn recent(&self, user_id: &str, limit: usize) -> Vec<DetectionRecord> {
        self.with_records(|records| newest_first(records.iter(), user_id, limit))
            .unwrap_or_default()
    }

    fn total_verified(&self, user_id: &str) -> usize {
        self.species_counts(user_id).values().sum()
    }

    fn detections_today(&self, user_id: &str) -> Vec<DetectionRecord> {
        let since = local_midnight();
        self.with_records(|records| verified_since(records.iter(), user_id, since))
            .unwrap_or_default()
    }

    fn get(&self, id: RecordId) -> Option<DetectionRecord> {
        self.with_records(|records| records.iter().find(|r| r.id == id).cloned())
            .flatten()
    }

    fn delete(&self, id: RecordId) -> bool {
        self.with_records(|records| {
            let before = records.len();
            records.retain(|r| r.id != id);
            records.len() != before
        })
        .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::domain::detection_record::{DetectionSource, VerificationStatus};
    use chrono::{Duration, Utc};

    fn verified(user: &str, species: &str) -> NewDetectionRecord {
        NewDetectionRecord::verified(user, species, 0.8, 0.6, None, DetectionSource::Upload)
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let repo = InMemoryDetectionRepository::new();
        assert_eq!(repo.insert(verified("a", "Tiger")), Some(1));
        assert_eq!(repo.insert(verified("a", "Bear")), Some(2));
    }

    #[test]
    fn test_species_counts_only_verified_for_user() {
        let repo = InMemoryDetectionRepository::new();
        repo.insert(verified("a", "Tiger"));
        repo.insert(verified("a", "Tiger"));
        repo.insert(verified("a", "Bear"));
        repo.insert(verified("b", "Tiger"));
        let mut rejected = verified("a", "Leopard");
        rejected.verification_status = VerificationStatus::Rejected;
        repo.insert(rejected);

        let counts = repo.species_counts("a");
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["Tiger"], 2);
        assert_eq!(counts["Bear"], 1);
        assert_eq!(repo.total_verified("a"), 3);
    }

    #[test]
    fn test_mark_alert_sent() {
        let repo = InMemoryDetectionRepository::new();
        let id = repo.insert(verified("a", "Tiger")).unwrap();
        assert!(repo.mark_alert_sent(id));
        assert!(!repo.mark_alert_sent(99));
        assert!(repo.all()[0].record.alert_sent);
    }

    #[test]
    fn test_recent_is_newest_first_and_limited() {
        let repo = InMemoryDetectionRepository::new();
        let now = Utc::now();
        for (i, species) in ["Tiger", "Bear", "Leopard"].iter().enumerate() {
            let mut r = verified("a", species);
            r.timestamp = now + Duration::seconds(i as i64);
            repo.insert(r);
        }
        let recent = repo.recent("a", 2);
        let species: Vec<_> = recent.iter().map(|r| r.record.species.as_str()).collect();
        assert_eq!(species, vec!["Leopard", "Bear"]);
    }

    #[test]
    fn test_get_and_delete() {
        let repo = InMemoryDetectionRepository::new();
        let tiger = repo.insert(verified("a", "Tiger")).unwrap();
        let bear = repo.insert(verified("a", "Bear")).unwrap();

        assert_eq!(repo.get(bear).unwrap().record.species, "Bear");
        assert!(repo.delete(tiger));
        assert!(!repo.delete(tiger));
        assert!(repo.get(tiger).is_none());
        assert_eq!(repo.total_verified("a"), 1);
    }

    #[test]
    fn test_detections_today_skips_yesterday() {
        let repo = InMemoryDetectionRepository::new();
        let mut old = verified("a", "Tiger");
        old.timestamp = local_midnight() - Duration::minutes(1);
        repo.insert(old);
        repo.insert(verified("a", "Bear"));
        let mut rejected = verified("a", "Leopard");
        rejected.verification_status = VerificationStatus::Rejected;
        repo.insert(rejected);

        let today = repo.detections_today("a");
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].record.species, "Bear");
    }

    #[test]
    fn test_unavailable_store_degrades() {
        let repo = InMemoryDetectionRepository::new();
        let id = repo.insert(verified("a", "Tiger")).unwrap();
        repo.set_available(false);

        assert_eq!(repo.insert(verified("a", "Bear")), None);
        assert!(!repo.mark_alert_sent(id));
        assert!(repo.species_counts("a").is_empty());
        assert!(repo.recent("a", 10).is_empty());
        assert_eq!(repo.total_verified("a"), 0);
        assert!(repo.detections_today("a").is_empty());
        assert!(repo.get(id).is_none());
        assert!(!repo.delete(id));
    }
}
