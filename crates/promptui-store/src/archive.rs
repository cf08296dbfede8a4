// ABOUTME: Append-only JSONL archive of rendered prompts, one record per successful page render.
// ABOUTME: Supports ordered replay, latest-per-URL lookup, and repair of a truncated trailing line.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use promptui_browser::SnapshotSink;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

pub const ARCHIVE_FILE: &str = "snapshots.jsonl";

/// Errors that can occur during archive operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One archived prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub snapshot_id: Ulid,
    pub url: String,
    pub prompt: String,
    pub saved_at: DateTime<Utc>,
}

impl SnapshotRecord {
    pub fn new(url: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            snapshot_id: Ulid::new(),
            url: url.into(),
            prompt: prompt.into(),
            saved_at: Utc::now(),
        }
    }
}

/// Archive stored as `snapshots.jsonl` inside a directory.
pub struct SnapshotStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl SnapshotStore {
    /// Open (or create) the archive in `dir`, creating the directory if needed.
    pub fn open(dir: &Path) -> Result<Self, SnapshotError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(ARCHIVE_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::debug!("opened snapshot archive at {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one record as a JSON line and fsync it.
    pub fn append(&self, record: &SnapshotRecord) -> Result<(), SnapshotError> {
        let json = serde_json::to_string(record)?;
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(file, "{}", json)?;
        file.sync_all()?;
        Ok(())
    }

    /// Every record in write order. Blank lines are skipped; a malformed
    /// line is an error (see [`SnapshotStore::repair`]).
    pub fn replay(&self) -> Result<Vec<SnapshotRecord>, SnapshotError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    /// The most recent record saved for `url`.
    pub fn latest_for(&self, url: &str) -> Result<Option<SnapshotRecord>, SnapshotError> {
        Ok(self.replay()?.into_iter().rev().find(|r| r.url == url))
    }

    /// Drop lines that do not parse as records, rewriting the file through a
    /// temp file and rename. Returns the number of records kept.
    pub fn repair(&self) -> Result<usize, SnapshotError> {
        // Hold the append handle so no write lands between read and rename.
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);

        let reader = BufReader::new(File::open(&self.path)?);
        let mut kept = Vec::new();
        let mut dropped = 0usize;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if serde_json::from_str::<SnapshotRecord>(&line).is_ok() {
                kept.push(line);
            } else {
                dropped += 1;
            }
        }

        let tmp_path = self.path.with_extension("jsonl.tmp");
        let mut tmp = File::create(&tmp_path)?;
        for line in &kept {
            writeln!(tmp, "{}", line)?;
        }
        tmp.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;

        *file = OpenOptions::new().append(true).open(&self.path)?;
        if dropped > 0 {
            tracing::warn!(
                "dropped {} unreadable lines from {}",
                dropped,
                self.path.display()
            );
        }
        Ok(kept.len())
    }
}

#[async_trait]
impl SnapshotSink for SnapshotStore {
    async fn save_snapshot(&self, url: &str, prompt: &str) -> anyhow::Result<()> {
        let record = SnapshotRecord::new(url, prompt);
        self.append(&record)?;
        tracing::debug!("archived snapshot {} for {}", record.snapshot_id, url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn append_and_replay_keep_order() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();

        store.append(&SnapshotRecord::new("prompt:///a", "# A\n")).unwrap();
        store.append(&SnapshotRecord::new("prompt:///b", "# B\n")).unwrap();

        let records = store.replay().unwrap();
        let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["prompt:///a", "prompt:///b"]);
        assert_eq!(records[1].prompt, "# B\n");
    }

    #[test]
    fn open_creates_nested_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("home").join("archive");
        let store = SnapshotStore::open(&nested).unwrap();
        assert!(store.path().ends_with(ARCHIVE_FILE));
        assert!(store.replay().unwrap().is_empty());
    }

    #[test]
    fn latest_for_picks_most_recent_entry_of_url() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        store.append(&SnapshotRecord::new("prompt:///a", "first")).unwrap();
        store.append(&SnapshotRecord::new("prompt:///b", "other")).unwrap();
        store.append(&SnapshotRecord::new("prompt:///a", "second")).unwrap();

        let latest = store.latest_for("prompt:///a").unwrap().unwrap();
        assert_eq!(latest.prompt, "second");
        assert!(store.latest_for("prompt:///c").unwrap().is_none());
    }

    #[test]
    fn records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = SnapshotStore::open(dir.path()).unwrap();
            store.append(&SnapshotRecord::new("prompt:///", "home")).unwrap();
        }
        let reopened = SnapshotStore::open(dir.path()).unwrap();
        assert_eq!(reopened.replay().unwrap().len(), 1);
    }

    #[test]
    fn repair_drops_partial_trailing_line() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        store.append(&SnapshotRecord::new("prompt:///a", "a")).unwrap();
        store.append(&SnapshotRecord::new("prompt:///b", "b")).unwrap();

        let mut raw = OpenOptions::new().append(true).open(store.path()).unwrap();
        write!(raw, r#"{{"snapshot_id":"01J","url":"prompt:///c","prom"#).unwrap();
        drop(raw);
        assert!(store.replay().is_err());

        assert_eq!(store.repair().unwrap(), 2);
        assert_eq!(store.replay().unwrap().len(), 2);

        store.append(&SnapshotRecord::new("prompt:///d", "d")).unwrap();
        let urls: Vec<String> = store.replay().unwrap().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["prompt:///a", "prompt:///b", "prompt:///d"]);
    }

    #[tokio::test]
    async fn store_archives_session_renders() {
        use promptui_browser::{Browser, Route, Session};
        use promptui_core::{Component, el};

        let dir = TempDir::new().unwrap();
        let store = Arc::new(SnapshotStore::open(dir.path()).unwrap());
        let browser = Arc::new(Browser::new([Route::new(
            "/inbox",
            Component::new("Inbox", |_, _| Ok(el("h2").child("Inbox").into())),
        )]));

        let mut session = Session::new(browser).with_sink(store.clone());
        session.navigate("/inbox", vec![]).await.unwrap();

        let latest = store.latest_for("prompt:///inbox").unwrap().unwrap();
        assert_eq!(latest.prompt, "## Inbox\n");
    }
}
