use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::records::domain::detection_record::{DetectionRecord, NewDetectionRecord, RecordId};
use crate::records::domain::detection_repository::{
    count_species, local_midnight, newest_first, verified_since, DetectionRepository,
    RecordStoreError,
};

/// One line of the store. Lines this version cannot parse are kept as
/// written so a rewrite never drops them.
enum StoredLine {
    Record(DetectionRecord),
    Unparsed(String),
}

impl StoredLine {
    /// Id claimed by the line, if any; unparsed lines still reserve theirs.
    fn id(&self) -> Option<RecordId> {
        match self {
            StoredLine::Record(r) => Some(r.id),
            StoredLine::Unparsed(raw) => serde_json::from_str::<serde_json::Value>(raw)
                .ok()
                .and_then(|v| v.get("id").and_then(serde_json::Value::as_u64)),
        }
    }
}

/// Records stored one JSON object per line.
///
/// Inserts append. Updates rewrite the whole file to a sibling temp file
/// and rename it over the original, so a crash never leaves a torn file.
pub struct JsonLinesDetectionRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesDetectionRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_insert(&self, record: NewDetectionRecord) -> Result<RecordId, RecordStoreError> {
        let _guard = self.write_lock.lock().map_err(|_| RecordStoreError::Unavailable)?;
        let id = self.read_lines()?.iter().filter_map(StoredLine::id).max().unwrap_or(0) + 1;
        let line = serde_json::to_string(&record.with_id(id))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(id)
    }

    pub fn try_mark_alert_sent(&self, id: RecordId) -> Result<bool, RecordStoreError> {
        let _guard = self.write_lock.lock().map_err(|_| RecordStoreError::Unavailable)?;
        let mut lines = self.read_lines()?;
        let found = lines.iter_mut().find_map(|line| match line {
            StoredLine::Record(r) if r.id == id => Some(r),
            _ => None,
        });
        let Some(record) = found else {
            return Ok(false);
        };
        record.record.alert_sent = true;
        self.rewrite(&lines)?;
        Ok(true)
    }

    pub fn try_delete(&self, id: RecordId) -> Result<bool, RecordStoreError> {
        let _guard = self.write_lock.lock().map_err(|_| RecordStoreError::Unavailable)?;
        let mut lines = self.read_lines()?;
        let before = lines.len();
        lines.retain(|line| !matches!(line, StoredLine::Record(r) if r.id == id));
        if lines.len() == before {
            return Ok(false);
        }
        self.rewrite(&lines)?;
        Ok(true)
    }

    /// All readable records. A missing file is an empty store; lines that
    /// do not parse are skipped.
    pub fn load(&self) -> Result<Vec<DetectionRecord>, RecordStoreError> {
        Ok(self
            .read_lines()?
            .into_iter()
            .filter_map(|line| match line {
                StoredLine::Record(r) => Some(r),
                StoredLine::Unparsed(_) => None,
            })
            .collect())
    }

    fn read_lines(&self) -> Result<Vec<StoredLine>, RecordStoreError> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut lines = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DetectionRecord>(&line) {
                Ok(r) => lines.push(StoredLine::Record(r)),
                Err(e) => {
                    log::warn!(
                        "Skipping malformed record at {}:{}: {e}",
                        self.path.display(),
                        line_no + 1
                    );
                    lines.push(StoredLine::Unparsed(line));
                }
            }
        }
        Ok(lines)
    }

    fn rewrite(&self, lines: &[StoredLine]) -> Result<(), RecordStoreError> {
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut out = BufWriter::new(fs::File::create(&tmp)?);
            for line in lines {
                match line {
                    StoredLine::Record(r) => serde_json::to_writer(&mut out, r)?,
                    StoredLine::Unparsed(raw) => out.write_all(raw.as_bytes())?,
                }
                out.write_all(b"\n")?;
            }
            out.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn read_or_empty(&self) -> Vec<DetectionRecord> {
        self.load().unwrap_or_else(|e| {
            log::warn!("Record store read failed: {e}");
            Vec::new()
        })
    }
}

impl DetectionRepository for JsonLinesDetectionRepository {
    fn insert(&self, record: NewDetectionRecord) -> Option<RecordId> {
        self.try_insert(record)
            .map_err(|e| log::warn!("Could not save detection record: {e}"))
            .ok()
    }

    fn mark_alert_sent(&self, id: RecordId) -> bool {
        self.try_mark_alert_sent(id).unwrap_or_else(|e| {
            log::warn!("Could not update record {id}: {e}");
            false
        })
    }

    fn species_counts(&self, user_id: &str) -> HashMap<String, usize> {
        count_species(self.read_or_empty().iter(), user_id)
    }

    fn recent(&self, user_id: &str, limit: usize) -> Vec<DetectionRecord> {
        newest_first(self.read_or_empty().iter(), user_id, limit)
    }

    fn total_verified(&self, user_id: &str) -> usize {
        self.species_counts(user_id).values().sum()
    }

    fn detections_today(&self, user_id: &str) -> Vec<DetectionRecord> {
        verified_since(self.read_or_empty().iter(), user_id, local_midnight())
    }

    fn get(&self, id: RecordId) -> Option<DetectionRecord> {
        self.read_or_empty().into_iter().find(|r| r.id == id)
    }

    fn delete(&self, id: RecordId) -> bool {
        self.try_delete(id).unwrap_or_else(|e| {
            log::warn!("Could not delete record {id}: {e}");
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::domain::detection_record::DetectionSource;
    use tempfile::TempDir;

    fn verified(species: &str) -> NewDetectionRecord {
        NewDetectionRecord::verified(
            "ranger",
            species,
            0.81,
            0.64,
            Some(PathBuf::from("snapshots/x.jpg")),
            DetectionSource::Webcam,
        )
    }

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let repo = JsonLinesDetectionRepository::new(tmp.path().join("none.jsonl"));
        assert!(repo.species_counts("ranger").is_empty());
        assert_eq!(repo.total_verified("ranger"), 0);
    }

    #[test]
    fn test_records_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db").join("detections.jsonl");
        let id = {
            let repo = JsonLinesDetectionRepository::new(&path);
            repo.insert(verified("Tiger")).unwrap();
            repo.insert(verified("Tiger")).unwrap()
        };
        assert_eq!(id, 2);

        let repo = JsonLinesDetectionRepository::new(&path);
        assert_eq!(repo.insert(verified("Bear")), Some(3));
        let counts = repo.species_counts("ranger");
        assert_eq!(counts["Tiger"], 2);
        assert_eq!(counts["Bear"], 1);
        assert_eq!(repo.recent("ranger", 10).len(), 3);
    }

    #[test]
    fn test_mark_alert_sent_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("detections.jsonl");
        let repo = JsonLinesDetectionRepository::new(&path);
        let first = repo.insert(verified("Leopard")).unwrap();
        let second = repo.insert(verified("Tiger")).unwrap();

        assert!(repo.mark_alert_sent(second));
        assert!(!repo.mark_alert_sent(42));

        let reopened = JsonLinesDetectionRepository::new(&path).load().unwrap();
        let flag = |id| reopened.iter().find(|r| r.id == id).unwrap().record.alert_sent;
        assert!(!flag(first));
        assert!(flag(second));
        assert!(!path.with_extension("jsonl.tmp").exists());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("detections.jsonl");
        let repo = JsonLinesDetectionRepository::new(&path);
        repo.insert(verified("Tiger")).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();

        assert_eq!(repo.load().unwrap().len(), 1);
        assert_eq!(repo.insert(verified("Bear")), Some(2));
    }

    #[test]
    fn test_update_keeps_unreadable_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("detections.jsonl");
        let repo = JsonLinesDetectionRepository::new(&path);
        let id = repo.insert(verified("Tiger")).unwrap();
        let foreign = r#"{"id": 99, "future_field": true}"#;
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{foreign}").unwrap();

        assert!(repo.mark_alert_sent(id));

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], foreign);
        assert!(repo.load().unwrap()[0].record.alert_sent);
        // The unreadable line still reserves its id.
        assert_eq!(repo.insert(verified("Bear")), Some(100));
    }

    #[test]
    fn test_get_delete_and_today() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("detections.jsonl");
        let repo = JsonLinesDetectionRepository::new(&path);
        let mut old = verified("Leopard");
        old.timestamp = local_midnight() - chrono::Duration::hours(1);
        let old_id = repo.insert(old).unwrap();
        let tiger = repo.insert(verified("Tiger")).unwrap();

        let today = repo.detections_today("ranger");
        assert_eq!(today.iter().map(|r| r.id).collect::<Vec<_>>(), vec![tiger]);
        assert_eq!(repo.get(old_id).unwrap().record.species, "Leopard");

        assert!(repo.delete(old_id));
        assert!(!repo.delete(old_id));
        let reopened = JsonLinesDetectionRepository::new(&path);
        assert!(reopened.get(old_id).is_none());
        assert_eq!(reopened.get(tiger).unwrap().record.species, "Tiger");
    }

    #[test]
    fn test_unwritable_location_degrades() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let repo = JsonLinesDetectionRepository::new(blocker.join("detections.jsonl"));

        assert_eq!(repo.insert(verified("Tiger")), None);
        assert!(repo.species_counts("ranger").is_empty());
        assert!(repo.recent("ranger", 5).is_empty());
        assert!(repo.detections_today("ranger").is_empty());
        assert!(!repo.delete(1));
    }
}
