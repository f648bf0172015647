//! Enrollment registry: owns the enrolled face encodings.
//!
//! Records are kept in insertion order. Every accessor hands out copies;
//! nothing outside this module ever holds a reference into the registry.
//!
//! On disk the registry is a JSON object mapping each user id to
//! `{"encoding": <base64 of f64 little-endian bytes>, "shape": [128], "dtype": "float64"}`.

use crate::types::{EnrollmentRecord, FaceEncoding, ENCODING_DIM};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

const PERSISTED_DTYPE: &str = "float64";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("invalid enrollment: {0}")]
    Invalid(String),
    #[error("user {0} is already enrolled")]
    AlreadyExists(String),
    #[error("registry file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("registry file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// Persisted form of one record.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEncoding {
    encoding: String,
    #[serde(default)]
    shape: Vec<usize>,
    #[serde(default)]
    dtype: String,
}

/// Outcome of [`EnrollmentRegistry::load`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
    /// False when the file did not exist (first run).
    pub file_found: bool,
}

/// Thread-safe store of enrolled faces.
#[derive(Default)]
pub struct EnrollmentRegistry {
    records: RwLock<Vec<EnrollmentRecord>>,
    /// Serializes file writes so an older snapshot never overwrites a newer one.
    persist_lock: Mutex<()>,
}

impl EnrollmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new user. Duplicate ids are rejected, never overwritten.
    pub fn enroll(&self, user_id: &str, encoding: FaceEncoding) -> Result<(), RegistryError> {
        if user_id.is_empty() {
            return Err(RegistryError::Invalid("user id must not be empty".into()));
        }

        let mut records = self.records.write();
        if records.iter().any(|r| r.user_id == user_id) {
            tracing::warn!(user_id, "user already enrolled, rejecting");
            return Err(RegistryError::AlreadyExists(user_id.to_string()));
        }
        records.push(EnrollmentRecord {
            user_id: user_id.to_string(),
            encoding,
        });
        tracing::info!(user_id, total = records.len(), "enrolled face");
        Ok(())
    }

    pub fn lookup(&self, user_id: &str) -> Option<FaceEncoding> {
        self.records
            .read()
            .iter()
            .find(|r| r.user_id == user_id)
            .map(|r| r.encoding.clone())
    }

    /// Enrolled user ids in insertion order.
    pub fn list(&self) -> Vec<String> {
        self.records.read().iter().map(|r| r.user_id.clone()).collect()
    }

    pub fn remove(&self, user_id: &str) -> bool {
        let mut records = self.records.write();
        match records.iter().position(|r| r.user_id == user_id) {
            Some(idx) => {
                records.remove(idx);
                tracing::info!(user_id, "removed enrolled face");
                true
            }
            None => {
                tracing::warn!(user_id, "attempted to remove unknown user");
                false
            }
        }
    }

    /// Deep copy of every record, in insertion order, for bulk matching.
    pub fn snapshot(&self) -> Vec<EnrollmentRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }

    /// Enroll `user_id` and write the registry to `path` as one step.
    ///
    /// If the write fails the record is removed again before any other
    /// writer can run, so the file never holds an enrollment the caller
    /// was told failed.
    pub fn enroll_persisted(
        &self,
        user_id: &str,
        encoding: FaceEncoding,
        path: &Path,
    ) -> Result<(), RegistryError> {
        let _guard = self.persist_lock.lock();
        self.enroll(user_id, encoding)?;
        if let Err(e) = self.write_file(path) {
            tracing::warn!(user_id, error = %e, "persist failed, rolling back enrollment");
            self.remove(user_id);
            return Err(e);
        }
        Ok(())
    }

    /// Write the registry to `path` (temp file + rename).
    pub fn persist(&self, path: &Path) -> Result<(), RegistryError> {
        let _guard = self.persist_lock.lock();
        self.write_file(path)
    }

    /// Caller holds `persist_lock`.
    fn write_file(&self, path: &Path) -> Result<(), RegistryError> {
        let mut doc = serde_json::Map::new();
        for record in self.snapshot() {
            let stored = StoredEncoding {
                encoding: BASE64.encode(record.encoding.to_le_bytes()),
                shape: vec![ENCODING_DIM],
                dtype: PERSISTED_DTYPE.to_string(),
            };
            doc.insert(record.user_id, serde_json::to_value(stored)?);
        }

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let tmp = path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, &doc)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;

        tracing::info!(path = %path.display(), records = doc.len(), "saved enrollment database");
        Ok(())
    }

    /// Replace the registry contents with the records stored at `path`.
    ///
    /// A missing file is not an error. Individual records that cannot be
    /// decoded are skipped with a warning; the rest still load.
    pub fn load(&self, path: &Path) -> Result<LoadReport, RegistryError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no enrollment database found");
            self.clear();
            return Ok(LoadReport::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let doc: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw)?;

        let mut report = LoadReport { file_found: true, ..LoadReport::default() };
        let mut loaded = Vec::with_capacity(doc.len());

        for (user_id, value) in doc {
            match decode_record(&user_id, value) {
                Ok(encoding) => loaded.push(EnrollmentRecord { user_id, encoding }),
                Err(reason) => {
                    tracing::warn!(user_id, %reason, "skipping corrupt enrollment record");
                    report.skipped += 1;
                }
            }
        }

        report.loaded = loaded.len();
        *self.records.write() = loaded;

        tracing::info!(
            path = %path.display(),
            loaded = report.loaded,
            skipped = report.skipped,
            "loaded enrollment database"
        );
        Ok(report)
    }
}

fn decode_record(user_id: &str, value: serde_json::Value) -> Result<FaceEncoding, String> {
    if user_id.is_empty() {
        return Err("empty user id".into());
    }
    let stored: StoredEncoding =
        serde_json::from_value(value).map_err(|e| format!("bad record layout: {e}"))?;
    if !stored.dtype.is_empty() && stored.dtype != PERSISTED_DTYPE {
        return Err(format!("unsupported dtype {}", stored.dtype));
    }
    let bytes = BASE64
        .decode(stored.encoding.as_bytes())
        .map_err(|e| format!("bad base64: {e}"))?;
    if bytes.len() % 8 != 0 {
        return Err(format!("byte length {} is not a multiple of 8", bytes.len()));
    }
    let values: Vec<f64> = bytes
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect();
    FaceEncoding::new(values).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoding(seed: f64) -> FaceEncoding {
        FaceEncoding::new((0..ENCODING_DIM).map(|i| seed + i as f64 * 0.001).collect()).unwrap()
    }

    #[test]
    fn test_enroll_then_lookup() {
        let reg = EnrollmentRegistry::new();
        reg.enroll("alice", encoding(0.1)).unwrap();
        assert_eq!(reg.lookup("alice"), Some(encoding(0.1)));
        assert_eq!(reg.lookup("bob"), None);
    }

    #[test]
    fn test_duplicate_enroll_rejected_and_original_kept() {
        let reg = EnrollmentRegistry::new();
        reg.enroll("alice", encoding(0.1)).unwrap();
        let err = reg.enroll("alice", encoding(0.9)).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(ref id) if id == "alice"));
        assert_eq!(reg.lookup("alice"), Some(encoding(0.1)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_enroll_rejects_empty_id() {
        let reg = EnrollmentRegistry::new();
        assert!(matches!(
            reg.enroll("", encoding(0.1)),
            Err(RegistryError::Invalid(_))
        ));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_enroll_persisted_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.json");
        let reg = EnrollmentRegistry::new();
        reg.enroll_persisted("alice", encoding(0.1), &path).unwrap();

        let reloaded = EnrollmentRegistry::new();
        reloaded.load(&path).unwrap();
        assert_eq!(reloaded.list(), vec!["alice"]);
    }

    #[test]
    fn test_enroll_persisted_rolls_back_on_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("faces.json");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let bad = blocker.join("faces.json");

        let reg = EnrollmentRegistry::new();
        reg.enroll_persisted("alice", encoding(0.1), &good).unwrap();
        let err = reg.enroll_persisted("bob", encoding(0.2), &bad).unwrap_err();
        assert!(matches!(err, RegistryError::Io(_)));
        assert_eq!(reg.list(), vec!["alice"]);

        // A later write must not resurrect the failed enrollment.
        reg.persist(&good).unwrap();
        let reloaded = EnrollmentRegistry::new();
        reloaded.load(&good).unwrap();
        assert_eq!(reloaded.list(), vec!["alice"]);
    }

    #[test]
    fn test_enroll_persisted_duplicate_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.json");
        let reg = EnrollmentRegistry::new();
        reg.enroll_persisted("alice", encoding(0.1), &path).unwrap();
        let err = reg.enroll_persisted("alice", encoding(0.9), &path).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));
        assert_eq!(reg.lookup("alice"), Some(encoding(0.1)));
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let reg = EnrollmentRegistry::new();
        for name in ["zoe", "adam", "mia"] {
            reg.enroll(name, encoding(0.2)).unwrap();
        }
        assert_eq!(reg.list(), vec!["zoe", "adam", "mia"]);
        assert!(reg.remove("adam"));
        assert!(!reg.remove("adam"));
        assert_eq!(reg.list(), vec!["zoe", "mia"]);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let reg = EnrollmentRegistry::new();
        reg.enroll("alice", encoding(0.1)).unwrap();
        let snap = reg.snapshot();
        reg.remove("alice");
        reg.enroll("bob", encoding(0.3)).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].user_id, "alice");
        assert_eq!(snap[0].encoding, encoding(0.1));
    }

    #[test]
    fn test_persist_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("enrolled_faces.json");

        let reg = EnrollmentRegistry::new();
        reg.enroll("alice", encoding(0.1)).unwrap();
        reg.enroll("bob", encoding(-0.4)).unwrap();
        reg.persist(&path).unwrap();

        let restored = EnrollmentRegistry::new();
        let report = restored.load(&path).unwrap();
        assert_eq!(report, LoadReport { loaded: 2, skipped: 0, file_found: true });
        assert_eq!(restored.list(), vec!["alice", "bob"]);
        assert_eq!(restored.lookup("alice"), Some(encoding(0.1)));
        assert_eq!(restored.lookup("bob"), Some(encoding(-0.4)));
    }

    #[test]
    fn test_persisted_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.json");
        let reg = EnrollmentRegistry::new();
        reg.enroll("alice", encoding(0.1)).unwrap();
        reg.persist(&path).unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["alice"]["shape"], serde_json::json!([128]));
        assert_eq!(doc["alice"]["dtype"], "float64");
        let bytes = BASE64.decode(doc["alice"]["encoding"].as_str().unwrap()).unwrap();
        assert_eq!(bytes.len(), 128 * 8);
    }

    #[test]
    fn test_load_skips_corrupt_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.json");

        let good = BASE64.encode(encoding(0.5).to_le_bytes());
        let hundred_bytes = BASE64.encode([0u8; 100]);
        let short_vector = BASE64.encode([0u8; 64 * 8]);
        let doc = serde_json::json!({
            "alice": { "encoding": good, "shape": [128], "dtype": "float64" },
            "broken": { "encoding": hundred_bytes, "shape": [12], "dtype": "float64" },
            "short": { "encoding": short_vector, "shape": [64], "dtype": "float64" },
            "garbage": { "encoding": "***not base64***" },
            "not_an_object": 42,
        });
        std::fs::write(&path, doc.to_string()).unwrap();

        let reg = EnrollmentRegistry::new();
        let report = reg.load(&path).unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.skipped, 4);
        assert_eq!(reg.list(), vec!["alice"]);
        assert_eq!(reg.lookup("alice"), Some(encoding(0.5)));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reg = EnrollmentRegistry::new();
        reg.enroll("stale", encoding(0.1)).unwrap();
        let report = reg.load(&dir.path().join("absent.json")).unwrap();
        assert!(!report.file_found);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.json");
        std::fs::write(&path, "{ not json").unwrap();
        let reg = EnrollmentRegistry::new();
        assert!(matches!(reg.load(&path), Err(RegistryError::Format(_))));
    }
}
