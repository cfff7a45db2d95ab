use std::sync::Arc;

use chrono::Local;

use crate::alerts::alert_dispatcher::{AlertDispatcher, DispatchOutcome};
use crate::alerts::domain::alert::Alert;
use crate::detection::domain::detection_set::{best_per_label, first_with_label};
use crate::records::domain::detection_record::{DetectionSource, NewDetectionRecord};
use crate::records::domain::detection_repository::DetectionRepository;
use crate::shared::species::ClassLabel;
use crate::verification::domain::verification_result::VerificationResult;

/// One species confirmed by a verified result.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfirmedSpecies {
    pub label: ClassLabel,
    pub confidence_layer1: f64,
    pub confidence_layer2: f64,
}

/// Species present in layer 2, each at its highest layer-2 confidence.
///
/// The layer-1 confidence comes from the first layer-1 detection of the
/// same species, or repeats the layer-2 value when layer 1 never saw it.
pub fn confirmed_species(result: &VerificationResult) -> Vec<ConfirmedSpecies> {
    if !result.is_verified() {
        return Vec::new();
    }
    best_per_label(result.layer2_detections())
        .into_iter()
        .map(|best| ConfirmedSpecies {
            label: best.label,
            confidence_layer1: first_with_label(result.layer1_detections(), best.label)
                .map_or(best.confidence, |d| d.confidence),
            confidence_layer2: best.confidence,
        })
        .collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordingOutcome {
    pub records_saved: usize,
    pub alerts_queued: usize,
}

/// Persists verified species and raises alerts for them.
pub struct DetectionRecorder {
    records: Arc<dyn DetectionRepository>,
    alerts: Arc<AlertDispatcher>,
    user_id: String,
    recipient: String,
    location: String,
}

impl DetectionRecorder {
    pub fn new(
        records: Arc<dyn DetectionRepository>,
        alerts: Arc<AlertDispatcher>,
        user_id: impl Into<String>,
        recipient: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            records,
            alerts,
            user_id: user_id.into(),
            recipient: recipient.into(),
            location: location.into(),
        }
    }

    /// One record per confirmed species. An alert is attempted only for
    /// records the store accepted; the record is flagged when it was queued.
    pub fn record(&self, result: &VerificationResult, source: DetectionSource) -> RecordingOutcome {
        let mut outcome = RecordingOutcome::default();
        let snapshot = result.snapshot_path().map(|p| p.to_path_buf());

        for species in confirmed_species(result) {
            let name = species.label.to_string();
            let record = NewDetectionRecord::verified(
                self.user_id.clone(),
                name.clone(),
                species.confidence_layer1,
                species.confidence_layer2,
                snapshot.clone(),
                source,
            );
            let Some(id) = self.records.insert(record) else {
                continue;
            };
            outcome.records_saved += 1;

            let alert = Alert {
                species: name,
                confidence_layer1: species.confidence_layer1,
                confidence_layer2: species.confidence_layer2,
                snapshot_path: snapshot.clone(),
                recipient: self.recipient.clone(),
                location: self.location.clone(),
                source,
                detected_at: Local::now(),
            };
            if self.alerts.send_if_ready(alert) == DispatchOutcome::Queued {
                outcome.alerts_queued += 1;
                self.records.mark_alert_sent(id);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::domain::alert_sink::{AlertError, AlertSink};
    use crate::records::infrastructure::in_memory_detection_repository::InMemoryDetectionRepository;
    use crate::shared::detection::{BoundingBox, Detection};
    use crate::shared::species::Species;
    use crate::verification::domain::verification_result::{BestDetection, RejectionReason};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    // --- Stubs ---

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<Alert>>,
    }

    impl AlertSink for RecordingSink {
        fn deliver(&self, alert: &Alert) -> Result<(), AlertError> {
            self.delivered.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    fn det(class_id: u32, confidence: f64) -> Detection {
        Detection::new(class_id, confidence, BoundingBox::new(0, 0, 20, 20).unwrap())
    }

    fn verified(layer1: Vec<Detection>, layer2: Vec<Detection>) -> VerificationResult {
        let best = BestDetection {
            species: layer1[0].label,
            confidence_layer1: layer1[0].confidence,
            confidence_layer2: layer2[0].confidence,
            bbox_layer1: layer1[0].bbox,
            bbox_layer2: layer2[0].bbox,
        };
        VerificationResult::verified(layer1, layer2, PathBuf::from("snapshots/v.jpg"), best)
    }

    #[test]
    fn test_confirmed_species_groups_layer2() {
        let result = verified(
            vec![det(3, 0.9), det(0, 0.7), det(3, 0.95)],
            vec![det(3, 0.5), det(3, 0.8), det(2, 0.45)],
        );
        let confirmed = confirmed_species(&result);
        assert_eq!(
            confirmed,
            vec![
                ConfirmedSpecies {
                    label: ClassLabel::Known(Species::Tiger),
                    confidence_layer1: 0.9,
                    confidence_layer2: 0.8,
                },
                ConfirmedSpecies {
                    label: ClassLabel::Known(Species::Leopard),
                    confidence_layer1: 0.45,
                    confidence_layer2: 0.45,
                },
            ]
        );
    }

    #[test]
    fn test_rejected_result_confirms_nothing() {
        let result = VerificationResult::rejected(
            vec![det(3, 0.9)],
            vec![det(0, 0.5)],
            RejectionReason::NoLayer2Detection,
        );
        assert!(confirmed_species(&result).is_empty());
    }

    #[test]
    fn test_record_saves_and_alerts() {
        let repo = Arc::new(InMemoryDetectionRepository::new());
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Arc::new(AlertDispatcher::new(sink.clone(), Duration::from_secs(5)));
        let recorder = DetectionRecorder::new(repo.clone(), dispatcher.clone(), "u1", "ranger", "camp");

        let result = verified(vec![det(1, 0.6)], vec![det(1, 0.5), det(0, 0.41)]);
        let outcome = recorder.record(&result, DetectionSource::Upload);
        dispatcher.flush();

        assert_eq!(outcome, RecordingOutcome { records_saved: 2, alerts_queued: 2 });
        let saved = repo.all();
        assert!(saved.iter().all(|r| r.record.alert_sent));
        assert!(saved.iter().all(|r| r.record.source == DetectionSource::Upload));
        assert_eq!(saved[0].record.snapshot_path, Some(PathBuf::from("snapshots/v.jpg")));
        assert_eq!(sink.delivered.lock().unwrap().len(), 2);

        // Same species again inside the cooldown: saved, not alerted.
        let outcome = recorder.record(&result, DetectionSource::Upload);
        assert_eq!(outcome, RecordingOutcome { records_saved: 2, alerts_queued: 0 });
        assert!(!repo.all()[2].record.alert_sent);
    }

    #[test]
    fn test_unavailable_store_skips_alerts() {
        let repo = Arc::new(InMemoryDetectionRepository::new());
        repo.set_available(false);
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Arc::new(AlertDispatcher::new(sink.clone(), Duration::from_secs(5)));
        let recorder = DetectionRecorder::new(repo, dispatcher.clone(), "u1", "ranger", "camp");

        let outcome = recorder.record(&verified(vec![det(0, 0.9)], vec![det(0, 0.8)]), DetectionSource::Webcam);
        dispatcher.flush();
        assert_eq!(outcome, RecordingOutcome::default());
        assert!(sink.delivered.lock().unwrap().is_empty());
    }
}
