//! JSON file stores: per-source event lists, the manual-edit overlay, the
//! blacklist and the canonical list.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::identity::identity_key;
use crate::models::{Blacklist, Event, Source};
use crate::utils;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("invalid json in {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A store's records that passed validation, plus what was skipped.
#[derive(Debug, Default)]
pub struct LoadedEvents {
    pub events: Vec<Event>,
    pub rejected: Vec<String>,
}

/// Raw JSON records. A missing file is an empty store.
pub fn load_records(path: &Path) -> Result<Vec<Value>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&contents).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Validates each record on its own; one bad record never hides the rest.
pub fn load_events(path: &Path) -> Result<LoadedEvents, StoreError> {
    let mut loaded = LoadedEvents::default();
    for (index, record) in load_records(path)?.into_iter().enumerate() {
        match serde_json::from_value::<Event>(record) {
            Ok(event) => loaded.events.push(event),
            Err(err) => loaded.rejected.push(format!("record {index}: {err}")),
        }
    }
    Ok(loaded)
}

/// Per-source read used by the merge: failures contribute nothing and are logged.
pub fn load_events_or_empty(path: &Path, label: &str) -> Vec<Event> {
    match load_events(path) {
        Ok(loaded) => {
            for reason in &loaded.rejected {
                tracing::warn!("{label}: skipped invalid {reason}");
            }
            tracing::info!("loaded {} {label} events", loaded.events.len());
            loaded.events
        }
        Err(err) => {
            tracing::warn!("{label}: {err}; continuing without it");
            Vec::new()
        }
    }
}

/// Appends to a per-source store without touching the records already in it.
pub fn append_events(path: &Path, new_events: &[Event]) -> Result<usize, StoreError> {
    let mut records = load_records(path)?;
    for event in new_events {
        let value = serde_json::to_value(event).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        records.push(value);
    }
    write_json(path, &records)?;
    Ok(records.len())
}

pub fn write_events(path: &Path, events: &[Event]) -> Result<(), StoreError> {
    write_json(path, &events)
}

/// Pretty-printed, written to a sibling temp file and renamed into place.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    utils::ensure_parent(path);
    let mut contents = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    contents.push('\n');

    let staging = path.with_extension("json.tmp");
    fs::write(&staging, contents).map_err(|source| StoreError::Write {
        path: staging.clone(),
        source,
    })?;
    fs::rename(&staging, path).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_blacklist(path: &Path) -> Result<Blacklist, StoreError> {
    let keys = load_records(path)?
        .into_iter()
        .filter_map(|value| value.as_str().map(str::to_string))
        .collect();
    Ok(keys)
}

pub fn write_blacklist(path: &Path, blacklist: &Blacklist) -> Result<(), StoreError> {
    write_json(path, blacklist)
}

/// Operator corrections keyed by identity key, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualEdits {
    entries: Vec<(String, Event)>,
}

impl ManualEdits {
    /// Records without a key are dropped; a repeated key keeps the later record.
    pub fn from_events(events: Vec<Event>) -> Self {
        let mut edits = ManualEdits::default();
        for mut event in events {
            event.source = Source::ManualEdit;
            match identity_key(&event) {
                Some(key) => edits.upsert(key, event),
                None => tracing::warn!("manual edit without title or date ignored"),
            }
        }
        edits
    }

    pub fn get(&self, key: &str) -> Option<&Event> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, event)| event)
    }

    pub fn upsert(&mut self, key: String, event: Event) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = event,
            None => self.entries.push((key, event)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Event> {
        let position = self.entries.iter().position(|(existing, _)| existing == key)?;
        Some(self.entries.remove(position).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn events(&self) -> Vec<Event> {
        self.entries.iter().map(|(_, event)| event.clone()).collect()
    }
}

pub fn load_manual_edits(path: &Path) -> Result<ManualEdits, StoreError> {
    let loaded = load_events(path)?;
    for reason in &loaded.rejected {
        tracing::warn!("manual edits: skipped invalid {reason}");
    }
    Ok(ManualEdits::from_events(loaded.events))
}

pub fn write_manual_edits(path: &Path, edits: &ManualEdits) -> Result<(), StoreError> {
    write_events(path, &edits.events())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventDate;
    use tempfile::TempDir;

    fn csv_event(title: &str, datetime: &str) -> Event {
        Event::new(title, EventDate::parse(datetime), Source::Csv)
    }

    #[test]
    fn missing_store_is_empty() {
        let dir = TempDir::new().expect("tempdir");
        let loaded = load_events(&dir.path().join("absent.json")).expect("load");
        assert!(loaded.events.is_empty());
        assert!(loaded.rejected.is_empty());
    }

    #[test]
    fn invalid_records_are_rejected_individually() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("csv_events.json");
        fs::write(
            &path,
            r#"[
                {"title": "Kitka MTB", "datetime": "2025-08-02 08:00", "source": "csv"},
                {"title": "Mystery", "datetime": "2025-08-03 08:00", "source": "seed"},
                "not an event"
            ]"#,
        )
        .expect("write store");

        let loaded = load_events(&path).expect("load");
        assert_eq!(loaded.events.len(), 1);
        assert_eq!(loaded.rejected.len(), 2);
    }

    #[test]
    fn corrupt_store_contributes_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("bikeland_events.json");
        fs::write(&path, "{ truncated").expect("write store");

        assert!(load_events(&path).is_err());
        assert!(load_events_or_empty(&path, "bikeland").is_empty());
    }

    #[test]
    fn append_leaves_existing_records_untouched() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("csv_events.json");
        let legacy = r#"[{"title": "Legacy", "datetime": "2025-01-01 08:00", "source": "csv", "custom": 1}]"#;
        fs::write(&path, legacy).expect("write store");

        let total = append_events(&path, &[csv_event("Kitka MTB", "2025-08-02 08:00")])
            .expect("append");
        assert_eq!(total, 2);

        let records = load_records(&path).expect("reload");
        assert_eq!(records[0]["custom"], 1);
        assert_eq!(records[1]["title"], "Kitka MTB");
        assert!(!dir.path().join("csv_events.json.tmp").exists());
    }

    #[test]
    fn blacklist_round_trip_is_sorted() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("event_blacklist.json");
        let blacklist: Blacklist = ["b_2025-01-02".to_string(), "a_2025-01-01".to_string()]
            .into_iter()
            .collect();
        write_blacklist(&path, &blacklist).expect("write");

        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.find("a_2025").unwrap() < raw.find("b_2025").unwrap());
        assert_eq!(load_blacklist(&path).expect("load"), blacklist);
    }

    #[test]
    fn manual_edits_are_keyed_and_tagged() {
        let first = csv_event("Tahko MTB", "2025-07-12 08:00");
        let mut second = csv_event("Tahko MTB", "2025-07-12 10:00");
        second.organizer = "JYPS".to_string();

        let edits = ManualEdits::from_events(vec![first, second]);
        assert_eq!(edits.len(), 1);
        let kept = edits.get("Tahko MTB_2025-07-12").expect("keyed edit");
        assert_eq!(kept.organizer, "JYPS");
        assert_eq!(kept.source, Source::ManualEdit);
    }
}
