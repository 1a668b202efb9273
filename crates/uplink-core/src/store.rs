//! Persisted state: named field mappings and the run history file.
//!
//! Both stores are single JSON files rewritten whole. Writes go through
//! a temp file in the same directory followed by a rename, so a reader
//! never observes a half-written file. Single-run-at-a-time makes the
//! read-modify-write cycle safe; concurrent writers would need an
//! exclusive lock around it.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;

use crate::error::UplinkError;
use crate::mapping::{FieldMapping, DEFAULT_MAPPING_NAME};
use crate::models::RunHistoryEntry;

/// Maximum number of history entries retained, newest first.
pub const HISTORY_CAP: usize = 100;

fn write_atomic(path: &Path, value: &impl Serialize) -> io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
        None => tempfile::NamedTempFile::new_in(".")?,
    };
    let body = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    tmp.write_all(&body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(io::Error::other),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MappingFile {
    configurations: Vec<FieldMapping>,
}

/// Named field-mapping configurations on disk, plus the built-in
/// `default` mapping which is always available and never deletable.
#[derive(Debug, Clone)]
pub struct MappingStore {
    path: PathBuf,
}

impl MappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_file(&self) -> Result<MappingFile, UplinkError> {
        read_json::<MappingFile>(&self.path)
            .map(Option::unwrap_or_default)
            .map_err(|e| {
                UplinkError::Configuration(format!(
                    "cannot read mapping store {}: {}",
                    self.path.display(),
                    e
                ))
            })
    }

    fn write_file(&self, file: &MappingFile) -> Result<(), UplinkError> {
        write_atomic(&self.path, file).map_err(|e| {
            UplinkError::Configuration(format!(
                "cannot write mapping store {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Load a mapping by name. `default` resolves to the built-in
    /// mapping without touching the file.
    pub fn load(&self, name: &str) -> Result<FieldMapping, UplinkError> {
        if name == DEFAULT_MAPPING_NAME {
            return Ok(FieldMapping::default_mapping());
        }
        self.read_file()?
            .configurations
            .into_iter()
            .find(|mapping| mapping.name == name)
            .ok_or_else(|| UplinkError::Configuration(format!("no mapping named '{}'", name)))
    }

    /// Save a mapping under its name. Idempotent: saving the same name
    /// again replaces the stored configuration.
    pub fn save(&self, mapping: &FieldMapping) -> Result<(), UplinkError> {
        if mapping.name == DEFAULT_MAPPING_NAME {
            return Err(UplinkError::Configuration(
                "the 'default' mapping is built in and cannot be overwritten".to_string(),
            ));
        }
        mapping.ensure_valid()?;

        let mut file = self.read_file()?;
        match file
            .configurations
            .iter_mut()
            .find(|existing| existing.name == mapping.name)
        {
            Some(existing) => *existing = mapping.clone(),
            None => file.configurations.push(mapping.clone()),
        }
        self.write_file(&file)
    }

    pub fn delete(&self, name: &str) -> Result<(), UplinkError> {
        if name == DEFAULT_MAPPING_NAME {
            return Err(UplinkError::Configuration(
                "the 'default' mapping cannot be deleted".to_string(),
            ));
        }
        let mut file = self.read_file()?;
        let before = file.configurations.len();
        file.configurations.retain(|mapping| mapping.name != name);
        if file.configurations.len() == before {
            return Err(UplinkError::Configuration(format!(
                "no mapping named '{}'",
                name
            )));
        }
        self.write_file(&file)
    }

    /// All available names, the built-in default first.
    pub fn list(&self) -> Result<Vec<String>, UplinkError> {
        let mut names = vec![DEFAULT_MAPPING_NAME.to_string()];
        names.extend(
            self.read_file()?
                .configurations
                .into_iter()
                .map(|mapping| mapping.name),
        );
        Ok(names)
    }
}

/// Append-only run history, newest first, capped at [`HISTORY_CAP`].
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Full history, newest first. A missing or corrupt file reads as
    /// empty; the audit trail must never block a run.
    pub fn load(&self) -> Vec<RunHistoryEntry> {
        match read_json::<Vec<RunHistoryEntry>>(&self.path) {
            Ok(Some(entries)) => entries,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "history file unreadable, starting empty");
                Vec::new()
            }
        }
    }

    /// Prepend one entry and truncate to the cap.
    pub fn append(&self, entry: RunHistoryEntry) -> io::Result<()> {
        let mut entries = self.load();
        entries.insert(0, entry);
        entries.truncate(HISTORY_CAP);
        write_atomic(&self.path, &entries)
    }

    /// The `limit` most recent entries.
    pub fn recent(&self, limit: usize) -> Vec<RunHistoryEntry> {
        let mut entries = self.load();
        entries.truncate(limit);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RunSource, RunStatus};

    fn temp_store() -> (tempfile::TempDir, MappingStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MappingStore::new(dir.path().join("mappings.json"));
        (dir, store)
    }

    fn custom_mapping(name: &str) -> FieldMapping {
        let mut mapping = FieldMapping::default_mapping();
        mapping.name = name.to_string();
        mapping.table = "pos_export".to_string();
        mapping
    }

    #[test]
    fn test_default_mapping_always_available() {
        let (_dir, store) = temp_store();
        let mapping = store.load("default").unwrap();
        assert_eq!(mapping.table, "retail_data");
        assert_eq!(store.list().unwrap(), vec!["default".to_string()]);
    }

    #[test]
    fn test_save_load_round_trip() {
        let (_dir, store) = temp_store();
        store.save(&custom_mapping("pos")).unwrap();
        let loaded = store.load("pos").unwrap();
        assert_eq!(loaded.table, "pos_export");
        assert_eq!(loaded.fields, FieldMapping::default_mapping().fields);
    }

    #[test]
    fn test_save_is_idempotent_upsert() {
        let (_dir, store) = temp_store();
        store.save(&custom_mapping("pos")).unwrap();
        let mut updated = custom_mapping("pos");
        updated.fields.retain(|pair| pair.api != "packageName");
        store.save(&updated).unwrap();

        assert_eq!(store.list().unwrap().len(), 2);
        assert_eq!(store.load("pos").unwrap().fields.len(), 21);
    }

    #[test]
    fn test_save_rejects_invalid_mapping() {
        let (_dir, store) = temp_store();
        let mut broken = custom_mapping("broken");
        broken.fields.retain(|pair| pair.api != "dataValue");
        assert!(store.save(&broken).is_err());
    }

    #[test]
    fn test_default_cannot_be_deleted_or_overwritten() {
        let (_dir, store) = temp_store();
        assert!(store.delete("default").is_err());
        assert!(store.save(&FieldMapping::default_mapping()).is_err());
    }

    #[test]
    fn test_delete_unknown_mapping_errors() {
        let (_dir, store) = temp_store();
        assert!(store.delete("ghost").is_err());
    }

    #[test]
    fn test_load_unknown_mapping_errors() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.load("ghost"),
            Err(UplinkError::Configuration(_))
        ));
    }

    fn entry(message: &str) -> RunHistoryEntry {
        RunHistoryEntry::new(RunStatus::Success, 4, message, None, RunSource::Manual)
    }

    #[test]
    fn test_history_newest_first_and_capped() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));

        for i in 0..(HISTORY_CAP + 5) {
            store.append(entry(&format!("run {}", i))).unwrap();
        }

        let entries = store.load();
        assert_eq!(entries.len(), HISTORY_CAP);
        assert_eq!(entries[0].message, format!("run {}", HISTORY_CAP + 4));
        assert_eq!(entries.last().unwrap().message, "run 5");
    }

    #[test]
    fn test_history_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("absent.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_history_corrupt_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, b"{not json").unwrap();
        let store = HistoryStore::new(&path);
        assert!(store.load().is_empty());

        // And the next append recovers the file.
        store.append(entry("after corruption")).unwrap();
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn test_history_recent_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        for i in 0..10 {
            store.append(entry(&format!("run {}", i))).unwrap();
        }
        assert_eq!(store.recent(3).len(), 3);
        assert_eq!(store.recent(3)[0].message, "run 9");
    }
}
