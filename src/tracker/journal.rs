//! Snapshot journal: rollback on failed mutations and a bounded undo log.
//!
//! Every mutation captures the affected job (with all of its process rows)
//! before writing. A mutation that fails part-way restores that snapshot.
//! A mutation that succeeds can be recorded in the [`UndoLog`], and undoing
//! it writes the snapshot back. Undo is a snapshot restore, never an inverse
//! state-machine transition.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::models::JobWithProcesses;
use super::store::RecordStore;
use crate::errors::{TrackerError, TrackerResult};

/// Result of a successful mutation plus the state it replaced.
#[derive(Debug, Clone)]
pub struct Mutation<T> {
    pub value: T,
    pub job_key: String,
    /// The job as it was before the mutation; `None` if it did not exist.
    pub previous: Option<JobWithProcesses>,
}

/// Run `f` against the store; if it fails, put the job back the way it was.
pub fn guarded<T>(
    store: &mut dyn RecordStore,
    job_key: &str,
    f: impl FnOnce(&mut dyn RecordStore) -> TrackerResult<T>,
) -> TrackerResult<Mutation<T>> {
    let previous = store.job_with_processes(job_key)?;
    match f(store) {
        Ok(value) => Ok(Mutation {
            value,
            job_key: job_key.to_string(),
            previous,
        }),
        Err(err) => {
            tracing::warn!(job = %job_key, error = %err, "mutation failed, restoring snapshot");
            if let Err(restore_err) = restore(store, job_key, previous.as_ref()) {
                tracing::error!(job = %job_key, error = %restore_err, "snapshot restore failed");
            }
            Err(err)
        }
    }
}

/// Write `snapshot` back, or remove the job when there was none.
pub fn restore(
    store: &mut dyn RecordStore,
    job_key: &str,
    snapshot: Option<&JobWithProcesses>,
) -> TrackerResult<()> {
    match snapshot {
        Some(snapshot) => store.replace_job(snapshot)?,
        None => {
            store.delete_job(job_key)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoEntry {
    pub token: Uuid,
    pub label: String,
    pub job_key: String,
    #[serde(skip)]
    pub previous: Option<JobWithProcesses>,
    pub recorded_at: DateTime<Utc>,
}

/// Bounded log of undoable mutations, oldest evicted first.
#[derive(Debug)]
pub struct UndoLog {
    entries: VecDeque<UndoEntry>,
    capacity: usize,
}

impl UndoLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a successful mutation and return the token that undoes it.
    pub fn record<T>(&mut self, label: &str, mutation: &Mutation<T>, now: DateTime<Utc>) -> Uuid {
        let token = Uuid::new_v4();
        if self.capacity == 0 {
            return token;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(UndoEntry {
            token,
            label: label.to_string(),
            job_key: mutation.job_key.clone(),
            previous: mutation.previous.clone(),
            recorded_at: now,
        });
        token
    }

    /// Remove and return the entry for `token`.
    pub fn take(&mut self, token: &Uuid) -> TrackerResult<UndoEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| e.token == *token)
            .ok_or_else(|| TrackerError::UndoEntryNotFound {
                token: token.to_string(),
            })?;
        self.entries
            .remove(index)
            .ok_or_else(|| TrackerError::Internal("undo log index out of range".into()))
    }

    /// Return an entry whose undo could not be applied.
    pub fn put_back(&mut self, entry: UndoEntry) {
        self.entries.push_back(entry);
    }

    /// Entries that can still be undone, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &UndoEntry> {
        self.entries.iter().rev()
    }
}

/// Apply an undo entry against the store.
pub fn apply_undo(store: &mut dyn RecordStore, entry: &UndoEntry) -> TrackerResult<()> {
    tracing::info!(job = %entry.job_key, label = %entry.label, "undoing mutation");
    restore(store, &entry.job_key, entry.previous.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::lifecycle::tests::{job_data, t0};
    use crate::tracker::lifecycle::{create_job, delete_job};
    use crate::tracker::models::{JobProcess, ProcessStatus};
    use crate::tracker::store::MemoryStore;

    #[test]
    fn test_guarded_restores_on_failure() {
        let mut store = MemoryStore::new();
        create_job(&mut store, job_data("job-1"), t0()).unwrap();
        let before = store.job_with_processes("job-1").unwrap().unwrap();

        let result: TrackerResult<Mutation<()>> = guarded(&mut store, "job-1", |store| {
            let mut row = store.job_processes_for("job-1")?.remove(2);
            row.status = ProcessStatus::Rejected;
            store.update_job_process(&row)?;
            Err(TrackerError::Store(anyhow::anyhow!("connection reset")))
        });

        assert!(result.unwrap_err().is_transient());
        assert_eq!(store.job_with_processes("job-1").unwrap().unwrap(), before);
    }

    #[test]
    fn test_guarded_removes_partially_created_job() {
        let mut store = MemoryStore::new();
        let result: TrackerResult<Mutation<()>> = guarded(&mut store, "job-9", |store| {
            let created = create_job(store, job_data("job-9"), t0())?;
            assert_eq!(created.value.processes.len(), 17);
            Err(TrackerError::Store(anyhow::anyhow!("write timed out")))
        });
        assert!(result.is_err());
        assert!(store.job("job-9").unwrap().is_none());
        assert!(store.job_processes().unwrap().is_empty());
    }

    #[test]
    fn test_undo_restores_previous_snapshot() {
        let mut store = MemoryStore::new();
        create_job(&mut store, job_data("job-1"), t0()).unwrap();
        let mut log = UndoLog::new(8);

        let mutation = guarded(&mut store, "job-1", |store| {
            let mut row: JobProcess = store.job_processes_for("job-1")?.remove(0);
            row.remarks = Some("edited".into());
            Ok(store.update_job_process(&row)?)
        })
        .unwrap();
        let token = log.record("edit remarks", &mutation, t0());

        let entry = log.take(&token).unwrap();
        apply_undo(&mut store, &entry).unwrap();
        let rows = store.job_processes_for("job-1").unwrap();
        assert!(rows[0].remarks.is_none());
        assert!(log.take(&token).is_err());
    }

    #[test]
    fn test_undo_of_create_removes_job() {
        let mut store = MemoryStore::new();
        let mut log = UndoLog::new(8);
        let created = create_job(&mut store, job_data("job-1"), t0()).unwrap();
        let token = log.record("create", &created, t0());

        apply_undo(&mut store, &log.take(&token).unwrap()).unwrap();
        assert!(store.job("job-1").unwrap().is_none());
    }

    #[test]
    fn test_undo_of_delete_restores_job() {
        let mut store = MemoryStore::new();
        let mut log = UndoLog::new(8);
        let created = create_job(&mut store, job_data("job-1"), t0()).unwrap();
        let deleted = delete_job(&mut store, "job-1").unwrap().unwrap();
        let token = log.record("delete", &deleted, t0());

        apply_undo(&mut store, &log.take(&token).unwrap()).unwrap();
        assert_eq!(
            store.job_with_processes("job-1").unwrap().unwrap(),
            created.value
        );
    }

    #[test]
    fn test_log_evicts_oldest_entries() {
        let mut log = UndoLog::new(2);
        let m = Mutation {
            value: (),
            job_key: "job-1".into(),
            previous: None,
        };
        let first = log.record("a", &m, t0());
        let second = log.record("b", &m, t0());
        let third = log.record("c", &m, t0());
        assert_eq!(log.len(), 2);
        assert!(log.take(&first).is_err());
        assert!(log.take(&second).is_ok());
        assert!(log.take(&third).is_ok());
        assert!(log.is_empty());
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut log = UndoLog::new(0);
        let m = Mutation {
            value: (),
            job_key: "job-1".into(),
            previous: None,
        };
        let token = log.record("a", &m, t0());
        assert!(log.is_empty());
        assert!(matches!(
            log.take(&token),
            Err(TrackerError::UndoEntryNotFound { .. })
        ));
    }
}
