//! Store-bound workflow operations: applying status changes to a job's rows
//! and building per-user work queues.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::catalog::ProcessCatalog;
use super::journal::{Mutation, guarded};
use super::lifecycle::refresh_job_status;
use super::models::{Job, JobProcess, Process, ProcessStatus, StatusUpdate};
use super::store::RecordStore;
use super::workflow;
use crate::errors::{TrackerError, TrackerResult};

/// Rows changed by a status update, plus the job as it now stands.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutcome {
    pub job: Job,
    pub changed: Vec<JobProcess>,
}

/// Apply a status change to one job process, auto-advancing the next
/// process when this one completes.
///
/// The new rows are computed first, so a rejected change touches nothing.
/// The row writes and the job status refresh then run under one snapshot;
/// if any write fails the job is put back as it was.
pub fn update_process_status(
    store: &mut dyn RecordStore,
    update: &StatusUpdate,
    now: DateTime<Utc>,
) -> TrackerResult<Mutation<StatusOutcome>> {
    let job = store
        .job(&update.job_id)?
        .ok_or_else(|| TrackerError::JobNotFound {
            id: update.job_id.clone(),
        })?;
    let key = job.key();
    let actor = store
        .user(&update.user_id)?
        .ok_or_else(|| TrackerError::UserNotFound {
            id: update.user_id.clone(),
        })?;
    let catalog = ProcessCatalog::new(store.processes()?);
    let process = catalog
        .get(&update.process_id)
        .cloned()
        .ok_or_else(|| TrackerError::ProcessNotFound {
            id: update.process_id.clone(),
        })?;

    let rows = store.job_processes_for(&key)?;
    let current = rows
        .iter()
        .find(|r| r.process_id == process.process_id)
        .ok_or_else(|| TrackerError::JobProcessNotFound {
            job_id: key.clone(),
            process_id: process.process_id.clone(),
        })?;

    let applied = workflow::apply(current, &process, &actor, update, now)?;
    let mut next_rows: Vec<JobProcess> = rows
        .iter()
        .map(|r| {
            if r.id == applied.row.id {
                applied.row.clone()
            } else {
                r.clone()
            }
        })
        .collect();
    if applied.completed() {
        next_rows = workflow::advance(&next_rows, &catalog, &process.process_id, now);
    }

    let changed: Vec<JobProcess> = next_rows
        .iter()
        .zip(rows.iter())
        .filter(|(after, before)| after != before)
        .map(|(after, _)| after.clone())
        .collect();

    let active = next_rows
        .iter()
        .filter(|r| r.status == ProcessStatus::InProgress)
        .count();
    if active > 1 {
        tracing::warn!(job = %key, active, "more than one process in progress");
    }

    // Only store writes run under the snapshot; a rejected request writes nothing.
    let mutation = guarded(store, &key, |store| {
        for row in &changed {
            store.update_job_process(row)?;
        }
        let job = refresh_job_status(store, &job, &next_rows, now)?;
        Ok(StatusOutcome { job, changed })
    })?;

    tracing::info!(
        job = %key,
        process = %process.process_name,
        status = %update.new_status,
        advanced = mutation.value.changed.len() > 1,
        "process updated"
    );
    Ok(mutation)
}

/// A row on someone's work queue, with its job and process for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub job: Job,
    pub process: Process,
    #[serde(flatten)]
    pub row: JobProcess,
}

/// Rows the user can act on now: In Progress rows visible to them, oldest
/// started first.
pub fn user_queue(store: &dyn RecordStore, user_id: &str) -> TrackerResult<Vec<QueueItem>> {
    let user = store
        .user(user_id)?
        .ok_or_else(|| TrackerError::UserNotFound {
            id: user_id.to_string(),
        })?;
    let catalog = ProcessCatalog::new(store.processes()?);
    let jobs = store.jobs()?;

    let mut items = Vec::new();
    for row in store.job_processes()? {
        if row.status != ProcessStatus::InProgress {
            continue;
        }
        let Some(process) = catalog.get(&row.process_id) else {
            continue;
        };
        if !workflow::visible_to(&user, &row, process) {
            continue;
        }
        let Some(job) = jobs.iter().find(|j| j.key() == row.job_id) else {
            continue;
        };
        items.push(QueueItem {
            job: job.clone(),
            process: process.clone(),
            row,
        });
    }
    items.sort_by(|a, b| {
        a.row
            .start_time
            .cmp(&b.row.start_time)
            .then_with(|| a.row.id.cmp(&b.row.id))
    });
    Ok(items)
}
