//! Append-only progress journal: one JSON object per line, flushed and
//! fsynced before the write returns, so a crash mid-run never loses or
//! corrupts the last entry. Grounded on `utils/progress_jsonl.py`'s
//! `JsonlProgress`.

use dxl_core::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Journal entry status, mirroring §6's `status` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalStatus {
    Processing,
    Done,
    Skipped,
    Error,
}

/// One line of the progress journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub ts: String,
    pub db: String,
    pub unid: String,
    pub status: JournalStatus,
    #[serde(rename = "try")]
    pub try_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out: Option<String>,
}

/// Clip applied to `err` before it's written, per §6.
const ERR_MAX_LEN: usize = 400;

/// Appends [`JournalEntry`] lines to a single file.
pub struct JournalWriter {
    path: PathBuf,
}

impl JournalWriter {
    /// # Errors
    /// Returns an error if the journal's parent directory can't be created.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Appends one entry, flushing and fsyncing before returning.
    ///
    /// # Errors
    /// Returns an error on I/O failure or serialization failure.
    pub fn append(&self, db: &str, unid: &str, status: JournalStatus, try_count: u32, err: Option<&str>, out: Option<&str>) -> Result<()> {
        let entry = JournalEntry {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            db: db.to_string(),
            unid: unid.to_string(),
            status,
            try_count,
            err: err.map(|e| e.chars().take(ERR_MAX_LEN).collect()),
            out: out.map(str::to_string),
        };
        let line = serde_json::to_string(&entry)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }
}

/// Replayed state for one `(db, unid)` key: the entry with the highest
/// `try` count, ties broken by later-line-wins (the journal is append-only
/// and totally ordered, so "later line" means "later in iteration order").
pub type JournalState = JournalEntry;

/// Reads a journal file (if it exists) into a `(db, unid) -> JournalState`
/// map, keeping the highest-`try` entry per key.
///
/// # Errors
/// Returns an error on I/O failure reading the file (a missing file is not
/// an error: it yields an empty map).
pub fn read_journal(path: &Path) -> Result<HashMap<(String, String), JournalState>> {
    let mut state = HashMap::new();
    if !path.exists() {
        return Ok(state);
    }
    let file = std::fs::File::open(path)?;
    for line in BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<JournalEntry>(trimmed) else {
            log::warn!("skipping malformed journal line: {trimmed}");
            continue;
        };
        let key = (entry.db.clone(), entry.unid.clone());
        match state.get(&key) {
            Some(existing) if existing.try_count > entry.try_count => {}
            _ => {
                state.insert(key, entry);
            }
        }
    }
    Ok(state)
}

/// Given every `(db, unid)` pair known to the manifest runner, yields the
/// ones still worth attempting along with their current `try` count:
/// never-seen pairs at `try = 0`, and `error` pairs below `retry_max`.
/// `done`/`skipped` pairs are omitted.
pub fn remaining(state: &HashMap<(String, String), JournalState>, pairs: &[(String, String)], retry_max: u32) -> Vec<(String, String, u32)> {
    pairs
        .iter()
        .filter_map(|(db, unid)| {
            let key = (db.clone(), unid.clone());
            match state.get(&key) {
                None => Some((db.clone(), unid.clone(), 0)),
                Some(entry) => match entry.status {
                    JournalStatus::Done | JournalStatus::Skipped => None,
                    JournalStatus::Error if entry.try_count >= retry_max => None,
                    JournalStatus::Error | JournalStatus::Processing => Some((db.clone(), unid.clone(), entry.try_count)),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appends_and_replays_a_single_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.jsonl");
        let writer = JournalWriter::new(&path).unwrap();
        writer.append("Db", "UNID1", JournalStatus::Done, 1, None, Some("/out/Db")).unwrap();

        let state = read_journal(&path).unwrap();
        let entry = state.get(&("Db".to_string(), "UNID1".to_string())).unwrap();
        assert_eq!(entry.status, JournalStatus::Done);
        assert_eq!(entry.try_count, 1);
    }

    #[test]
    fn keeps_highest_try_count_per_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.jsonl");
        let writer = JournalWriter::new(&path).unwrap();
        writer.append("Db", "UNID1", JournalStatus::Error, 1, Some("boom"), None).unwrap();
        writer.append("Db", "UNID1", JournalStatus::Done, 2, None, Some("/out")).unwrap();

        let state = read_journal(&path).unwrap();
        let entry = &state[&("Db".to_string(), "UNID1".to_string())];
        assert_eq!(entry.try_count, 2);
        assert_eq!(entry.status, JournalStatus::Done);
    }

    #[test]
    fn remaining_skips_done_and_exhausted_errors() {
        let mut state = HashMap::new();
        state.insert(
            ("Db".to_string(), "A".to_string()),
            JournalEntry { ts: String::new(), db: "Db".to_string(), unid: "A".to_string(), status: JournalStatus::Done, try_count: 1, err: None, out: None },
        );
        state.insert(
            ("Db".to_string(), "B".to_string()),
            JournalEntry { ts: String::new(), db: "Db".to_string(), unid: "B".to_string(), status: JournalStatus::Error, try_count: 3, err: None, out: None },
        );
        let pairs = vec![("Db".to_string(), "A".to_string()), ("Db".to_string(), "B".to_string()), ("Db".to_string(), "C".to_string())];
        let remaining = remaining(&state, &pairs, 3);
        let unids: Vec<&str> = remaining.iter().map(|(_, u, _)| u.as_str()).collect();
        assert_eq!(unids, vec!["C"]);
    }

    #[test]
    fn missing_journal_file_yields_empty_state() {
        let dir = tempdir().unwrap();
        let state = read_journal(&dir.path().join("nope.jsonl")).unwrap();
        assert!(state.is_empty());
    }
}
