use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

use viva_core::{Answer, Evaluation, FollowUpQuestion, Interview, Question, StoreError};

/// One record inside a committed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JournalWrite {
    Interview(Interview),
    Question(Question),
    FollowUp(FollowUpQuestion),
    Answer(Answer),
    Evaluation(Evaluation),
}

/// One committed transaction, applied all-or-nothing on replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalBatch {
    pub batch_id: Uuid,
    pub committed_at: DateTime<Utc>,
    pub writes: Vec<JournalWrite>,
}

impl JournalBatch {
    pub fn new(writes: Vec<JournalWrite>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            committed_at: Utc::now(),
            writes,
        }
    }
}

/// Append-only JSONL journal of committed batches.
///
/// Appends flush and fsync before returning so a committed batch survives a
/// process crash immediately afterwards.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Derive a sibling path by appending `suffix` to the full filename.
    fn sibling(&self, suffix: &str) -> PathBuf {
        let filename = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "journal.jsonl".to_string());
        self.path.with_file_name(format!("{filename}{suffix}"))
    }

    pub async fn append(&self, batch: &JournalBatch) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| StoreError::Journal(err.to_string()))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|err| StoreError::Journal(err.to_string()))?;
        let line =
            serde_json::to_string(batch).map_err(|err| StoreError::Journal(err.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|err| StoreError::Journal(err.to_string()))?;
        file.write_all(b"\n")
            .await
            .map_err(|err| StoreError::Journal(err.to_string()))?;
        file.flush()
            .await
            .map_err(|err| StoreError::Journal(err.to_string()))?;
        file.sync_all()
            .await
            .map_err(|err| StoreError::Journal(err.to_string()))?;
        Ok(())
    }

    /// Atomically replace the journal with the given batches.
    ///
    /// Crash-safety guarantee: the new content is written to a `.tmp`
    /// sibling file, fsync'd, then renamed over the original.  A crash at
    /// any point before the rename leaves the original file untouched; a
    /// crash after the rename leaves a consistent new file.  The `.tmp`
    /// file is cleaned up on any error path.
    pub async fn rewrite(&self, batches: &[JournalBatch]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| StoreError::Journal(err.to_string()))?;
        }

        let tmp_path = self.sibling(".tmp");
        let write_result: Result<(), StoreError> = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .await
                .map_err(|err| StoreError::Journal(err.to_string()))?;
            for batch in batches {
                let line = serde_json::to_string(batch)
                    .map_err(|err| StoreError::Journal(err.to_string()))?;
                file.write_all(line.as_bytes())
                    .await
                    .map_err(|err| StoreError::Journal(err.to_string()))?;
                file.write_all(b"\n")
                    .await
                    .map_err(|err| StoreError::Journal(err.to_string()))?;
            }
            file.flush()
                .await
                .map_err(|err| StoreError::Journal(err.to_string()))?;
            file.sync_all()
                .await
                .map_err(|err| StoreError::Journal(err.to_string()))?;
            Ok(())
        }
        .await;

        if let Err(err) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err);
        }

        // Atomic rename: if this returns Ok the new file is fully
        // consistent.
        if let Err(err) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::Journal(err.to_string()));
        }

        Ok(())
    }

    /// Copy the live journal to a `.bak` sibling file.
    ///
    /// Called before a rewrite so a consistent pre-rewrite snapshot is
    /// available even if the process crashes mid-rewrite.  If the journal
    /// does not exist yet the call is a no-op.
    pub fn backup(&self) -> Result<(), StoreError> {
        if !self.path.exists() {
            return Ok(());
        }

        let bak_path = self.sibling(".bak");
        fs::copy(&self.path, &bak_path).map_err(|err| StoreError::Journal(err.to_string()))?;
        Ok(())
    }

    /// Read every intact batch.  A torn trailing line (crash mid-append) is
    /// skipped with a warning rather than poisoning startup.
    pub fn load(&self) -> Result<Vec<JournalBatch>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|err| StoreError::Journal(err.to_string()))?;
        let reader = BufReader::new(file);

        let mut batches = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|err| StoreError::Journal(err.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalBatch>(&line) {
                Ok(batch) => batches.push(batch),
                Err(err) => {
                    warn!(line = line_no + 1, %err, "skipping unreadable journal line");
                }
            }
        }
        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join("journal.jsonl"));

        let interview = Interview::new(Uuid::new_v4());
        let batch = JournalBatch::new(vec![JournalWrite::Interview(interview.clone())]);
        journal.append(&batch).await.unwrap();

        let loaded = journal.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].batch_id, batch.batch_id);
        match &loaded[0].writes[0] {
            JournalWrite::Interview(stored) => assert_eq!(stored.id, interview.id),
            other => panic!("unexpected write {other:?}"),
        }
    }

    #[tokio::test]
    async fn torn_trailing_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let journal = Journal::new(&path);

        let batch = JournalBatch::new(vec![]);
        journal.append(&batch).await.unwrap();
        // Simulate a crash mid-append.
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{\"batch_id\":\"tru");
        std::fs::write(&path, raw).unwrap();

        let loaded = journal.load().unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn missing_file_loads_empty() {
        let journal = Journal::new("/nonexistent/viva/journal.jsonl");
        assert!(journal.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rewrite_replaces_the_journal_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let journal = Journal::new(&path);

        journal.append(&JournalBatch::new(vec![])).await.unwrap();
        journal.append(&JournalBatch::new(vec![])).await.unwrap();
        assert_eq!(journal.load().unwrap().len(), 2);

        let replacement = JournalBatch::new(vec![JournalWrite::Interview(Interview::new(
            Uuid::new_v4(),
        ))]);
        journal.rewrite(std::slice::from_ref(&replacement)).await.unwrap();

        let loaded = journal.load().unwrap();
        assert_eq!(loaded.len(), 1, "old batches are gone");
        assert_eq!(loaded[0].batch_id, replacement.batch_id);
        assert!(!path.with_file_name("journal.jsonl.tmp").exists(), "no tmp residue");
    }

    #[tokio::test]
    async fn a_stray_tmp_file_never_shadows_the_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let journal = Journal::new(&path);

        let batch = JournalBatch::new(vec![]);
        journal.append(&batch).await.unwrap();
        // Simulate a crash between writing the tmp file and the rename.
        std::fs::write(path.with_file_name("journal.jsonl.tmp"), "half-written").unwrap();

        let loaded = journal.load().unwrap();
        assert_eq!(loaded.len(), 1, "original journal is untouched");
        assert_eq!(loaded[0].batch_id, batch.batch_id);
    }

    #[tokio::test]
    async fn backup_snapshots_the_live_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let journal = Journal::new(&path);

        // No journal yet: a no-op, not an error.
        journal.backup().unwrap();
        assert!(!path.with_file_name("journal.jsonl.bak").exists());

        journal.append(&JournalBatch::new(vec![])).await.unwrap();
        journal.backup().unwrap();
        let bak = path.with_file_name("journal.jsonl.bak");
        assert!(bak.exists());
        assert_eq!(
            std::fs::read_to_string(&bak).unwrap(),
            std::fs::read_to_string(&path).unwrap(),
        );
    }
}
