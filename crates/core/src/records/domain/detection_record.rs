use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type RecordId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Verified,
    Rejected,
}

/// Where the detected image came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Webcam,
    Upload,
}

impl DetectionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionSource::Webcam => "webcam",
            DetectionSource::Upload => "upload",
        }
    }
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record before the store has assigned it an id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewDetectionRecord {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub species: String,
    pub confidence_layer1: f64,
    pub confidence_layer2: f64,
    pub snapshot_path: Option<PathBuf>,
    pub verification_status: VerificationStatus,
    pub alert_sent: bool,
    pub source: DetectionSource,
}

impl NewDetectionRecord {
    /// A verified, not-yet-alerted record stamped with the current time.
    pub fn verified(
        user_id: impl Into<String>,
        species: impl Into<String>,
        confidence_layer1: f64,
        confidence_layer2: f64,
        snapshot_path: Option<PathBuf>,
        source: DetectionSource,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp: Utc::now(),
            species: species.into(),
            confidence_layer1,
            confidence_layer2,
            snapshot_path,
            verification_status: VerificationStatus::Verified,
            alert_sent: false,
            source,
        }
    }

    pub fn with_id(self, id: RecordId) -> DetectionRecord {
        DetectionRecord { id, record: self }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: RecordId,
    #[serde(flatten)]
    pub record: NewDetectionRecord,
}

impl DetectionRecord {
    pub fn is_verified(&self) -> bool {
        self.record.verification_status == VerificationStatus::Verified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_flat_with_lowercase_enums() {
        let record = NewDetectionRecord::verified(
            "ranger",
            "Tiger",
            0.8,
            0.6,
            Some(PathBuf::from("snapshots/a.jpg")),
            DetectionSource::Webcam,
        )
        .with_id(7);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["species"], "Tiger");
        assert_eq!(value["verification_status"], "verified");
        assert_eq!(value["source"], "webcam");
        assert_eq!(value["alert_sent"], false);

        let back: DetectionRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
