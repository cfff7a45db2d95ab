use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::records::domain::detection_record::DetectionSource;
use crate::shared::species::{Species, UNKNOWN_EMOJI};

/// A verified sighting to notify a recipient about.
#[derive(Clone, Debug, PartialEq)]
pub struct Alert {
    pub species: String,
    pub confidence_layer1: f64,
    pub confidence_layer2: f64,
    pub snapshot_path: Option<PathBuf>,
    pub recipient: String,
    pub location: String,
    pub source: DetectionSource,
    pub detected_at: DateTime<Local>,
}

/// Rendered notification text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

impl Alert {
    /// Cooldowns are tracked per species and recipient.
    pub fn cooldown_key(&self) -> (String, String) {
        (self.species.clone(), self.recipient.clone())
    }

    pub fn summary(&self) -> AlertMessage {
        let emoji = self
            .species
            .parse::<Species>()
            .map(Species::emoji)
            .unwrap_or(UNKNOWN_EMOJI);
        let subject = format!("🚨 Wild Vision Alert - {} Detected!", self.species);
        let mut body = format!(
            "{emoji} A {species} has been detected by the Wild Vision detection system!\n\n",
            species = self.species
        );
        body.push_str(&format!("Species: {emoji} {}\n", self.species));
        body.push_str(&format!(
            "Layer 1 Confidence: {:.1}%\n",
            self.confidence_layer1 * 100.0
        ));
        body.push_str(&format!(
            "Layer 2 Confidence: {:.1}%\n",
            self.confidence_layer2 * 100.0
        ));
        body.push_str(&format!(
            "Detection Time: {}\n",
            self.detected_at.format("%Y-%m-%d %H:%M:%S")
        ));
        body.push_str(&format!("Location: {}\n", self.location));
        body.push_str(&format!("Source: {}\n", title_case(self.source.as_str())));
        if let Some(path) = &self.snapshot_path {
            body.push_str(&format!("Snapshot: {}\n", path.display()));
        }
        AlertMessage { subject, body }
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
