//! Pure helpers over detection lists.
use std::collections::{BTreeMap, HashSet};

use crate::shared::detection::Detection;
use crate::shared::species::{ClassLabel, Species};

/// Highest-confidence detection; the first one wins on ties.
pub fn highest_confidence(detections: &[Detection]) -> Option<&Detection> {
    detections.iter().fold(None, |best, det| match best {
        Some(b) if b.confidence >= det.confidence => Some(b),
        _ => Some(det),
    })
}

/// Number of detections per label.
pub fn summarize(detections: &[Detection]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for det in detections {
        *counts.entry(det.label.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Keeps only detections of the given species. Unknown classes never match.
pub fn filter_by_species(detections: &[Detection], allowed: &HashSet<Species>) -> Vec<Detection> {
    detections
        .iter()
        .filter(|d| d.label.species().is_some_and(|s| allowed.contains(&s)))
        .cloned()
        .collect()
}

/// Best detection per label, in first-seen order.
pub fn best_per_label(detections: &[Detection]) -> Vec<&Detection> {
    let mut best: Vec<&Detection> = Vec::new();
    for det in detections {
        match best.iter_mut().find(|b| b.label == det.label) {
            Some(slot) if det.confidence > slot.confidence => *slot = det,
            Some(_) => {}
            None => best.push(det),
        }
    }
    best
}

/// First detection carrying `label`.
pub fn first_with_label(detections: &[Detection], label: ClassLabel) -> Option<&Detection> {
    detections.iter().find(|d| d.label == label)
}
