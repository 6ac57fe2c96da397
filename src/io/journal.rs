//! Append-only notification journal, one JSONL file per UTC day.
//!
//! Each record is serialised to a single line and written with one
//! `write_all`, so a reader tailing the file never sees half a record.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::channel::{Channel, ChannelId, ChannelResult};
use crate::core::errors::ChannelError;
use crate::core::message::Alert;

const FILE_PREFIX: &str = "notifications-";
const FILE_SUFFIX: &str = ".jsonl";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Delivered,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JournalRecord {
    pub timestamp: DateTime<Utc>,
    pub channel: String,
    pub message: String,
    pub status: RecordStatus,
    pub detail: String,
}

impl JournalRecord {
    pub fn from_result(result: &ChannelResult, message: &str, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at,
            channel: result.channel.to_string(),
            message: message.to_string(),
            status: if result.success {
                RecordStatus::Delivered
            } else {
                RecordStatus::Failed
            },
            detail: result.detail.clone(),
        }
    }
}

pub struct Journal {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl Journal {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create journal dir {}", dir.display()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn day_path(&self, day: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", FILE_PREFIX, day.format("%Y-%m-%d"), FILE_SUFFIX))
    }

    pub fn append(&self, record: &JournalRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let path = self.day_path(record.timestamp.date_naive());
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Day files currently on disk, oldest first.
    fn days(&self) -> Result<Vec<(NaiveDate, PathBuf)>> {
        let mut days = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(day) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(FILE_PREFIX))
                .and_then(|n| n.strip_suffix(FILE_SUFFIX))
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            else {
                continue;
            };
            days.push((day, path));
        }
        days.sort_by_key(|(day, _)| *day);
        Ok(days)
    }

    /// Records from every day in `from..=to`, merged, newest first.
    pub fn query(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<JournalRecord>> {
        if from > to {
            bail!("Invalid range: {} is after {}", from, to);
        }
        let mut records = Vec::new();
        for (_, path) in self.days()?.into_iter().filter(|(day, _)| *day >= from && *day <= to) {
            let raw = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            for line in raw.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<JournalRecord>(line) {
                    Ok(record) => records.push(record),
                    Err(e) => eprintln!("⚠️ Skipping malformed journal line in {}: {}", path.display(), e),
                }
            }
        }
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    /// The last `days` calendar days including today. A window reaching past
    /// the calendar's start covers everything.
    pub fn recent(&self, days: u32) -> Result<Vec<JournalRecord>> {
        let today = Utc::now().date_naive();
        let from = today
            .checked_sub_signed(ChronoDuration::days(i64::from(days.max(1)) - 1))
            .unwrap_or(NaiveDate::MIN);
        self.query(from, today)
    }

    /// Deletes day files older than `retention_days` before `today`. A
    /// retention longer than the calendar keeps everything.
    pub fn prune(&self, retention_days: u32, today: NaiveDate) -> Result<usize> {
        let Some(cutoff) = today.checked_sub_signed(ChronoDuration::days(i64::from(retention_days))) else {
            return Ok(0);
        };
        let mut removed = 0;
        for (day, path) in self.days()? {
            if day < cutoff {
                fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Appends on the blocking pool, for callers on the async runtime.
    pub async fn append_all(self: &Arc<Self>, records: Vec<JournalRecord>) -> Result<()> {
        let journal = self.clone();
        tokio::task::spawn_blocking(move || records.iter().try_for_each(|r| journal.append(r)))
            .await
            .context("Journal write task failed")?
    }

    /// `query` on the blocking pool.
    pub async fn query_async(self: &Arc<Self>, from: NaiveDate, to: NaiveDate) -> Result<Vec<JournalRecord>> {
        let journal = self.clone();
        tokio::task::spawn_blocking(move || journal.query(from, to))
            .await
            .context("Journal read task failed")?
    }
}

/// Delivery channel that only writes to the journal. Succeeds when the
/// write does.
pub struct LogChannel {
    journal: Arc<Journal>,
}

impl LogChannel {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self { journal }
    }
}

#[async_trait]
impl Channel for LogChannel {
    fn id(&self) -> ChannelId {
        ChannelId::Log
    }

    async fn send(&self, alert: &Alert) -> Result<String, ChannelError> {
        let record = JournalRecord {
            timestamp: Utc::now(),
            channel: ChannelId::Log.to_string(),
            message: alert.text.clone(),
            status: RecordStatus::Delivered,
            detail: format!("request {}", alert.request_id),
        };
        self.journal
            .append_all(vec![record])
            .await
            .map_err(|e| ChannelError::Transport(format!("journal write failed: {:#}", e)))?;
        Ok(format!("logged to {}", self.journal.dir().display()))
    }

    fn journals_downstream(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(day: u32, hour: u32, detail: &str) -> JournalRecord {
        JournalRecord {
            timestamp: Utc.with_ymd_and_hms(2026, 5, day, hour, 0, 0).unwrap(),
            channel: "telegram".to_string(),
            message: "💧 *Patient Request: WATER*".to_string(),
            status: RecordStatus::Delivered,
            detail: detail.to_string(),
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, day).unwrap()
    }

    #[test]
    fn test_grouped_by_day_and_merged_newest_first() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let journal = Journal::open(dir.path())?;
        journal.append(&record(1, 8, "a"))?;
        journal.append(&record(2, 9, "b"))?;
        journal.append(&record(1, 20, "c"))?;
        journal.append(&record(4, 1, "d"))?;

        assert!(dir.path().join("notifications-2026-05-01.jsonl").exists());
        assert!(dir.path().join("notifications-2026-05-02.jsonl").exists());

        let details: Vec<String> = journal.query(date(1), date(2))?.into_iter().map(|r| r.detail).collect();
        assert_eq!(details, ["b", "c", "a"]);

        assert_eq!(journal.query(date(3), date(3))?.len(), 0);
        assert!(journal.query(date(4), date(1)).is_err());
        Ok(())
    }

    #[test]
    fn test_malformed_lines_are_skipped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let journal = Journal::open(dir.path())?;
        journal.append(&record(1, 8, "ok"))?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join("notifications-2026-05-01.jsonl"))?;
        file.write_all(b"{not json\n")?;

        assert_eq!(journal.query(date(1), date(1))?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_prune_keeps_retention_window() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let journal = Journal::open(dir.path())?;
        journal.append(&record(1, 8, "old"))?;
        journal.append(&record(9, 8, "new"))?;
        fs::write(dir.path().join("unrelated.txt"), "keep me")?;

        assert_eq!(journal.prune(5, date(10))?, 1);
        assert_eq!(journal.query(date(1), date(10))?.len(), 1);
        assert!(dir.path().join("unrelated.txt").exists());
        Ok(())
    }

    #[test]
    fn test_huge_windows_do_not_overflow() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let journal = Journal::open(dir.path())?;
        journal.append(&record(1, 8, "kept"))?;

        assert_eq!(journal.recent(u32::MAX)?.len(), 1);
        assert_eq!(journal.prune(u32::MAX, date(10))?, 0);
        assert_eq!(journal.query(date(1), date(1))?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_async_append_and_query() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let journal = Arc::new(Journal::open(dir.path())?);
        journal.append_all(vec![record(2, 8, "x"), record(2, 9, "y")]).await?;
        let details: Vec<String> = journal
            .query_async(date(2), date(2))
            .await?
            .into_iter()
            .map(|r| r.detail)
            .collect();
        assert_eq!(details, ["y", "x"]);
        Ok(())
    }
}
