//! Job lifecycle: create, edit, delete and restore jobs together with their
//! process rows.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};

use super::catalog::ProcessCatalog;
use super::journal::{Mutation, guarded};
use super::models::{
    Job, JobData, JobProcess, JobStatus, JobWithProcesses, ProcessStatus, resolve_job_key,
};
use super::store::RecordStore;
use super::workflow::seed_rows;
use crate::errors::{TrackerError, TrackerResult};

/// Job status implied by its rows and due date.
pub fn derive_job_status(
    due_date: NaiveDate,
    rows: &[JobProcess],
    now: DateTime<Utc>,
) -> JobStatus {
    if !rows.is_empty() && rows.iter().all(|r| r.status == ProcessStatus::Completed) {
        JobStatus::Completed
    } else if now.date_naive() > due_date {
        JobStatus::Overdue
    } else if rows.iter().any(|r| r.status != ProcessStatus::Pending) {
        JobStatus::InProgress
    } else {
        JobStatus::Pending
    }
}

fn required_text(value: Option<&str>, field: &str) -> TrackerResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(TrackerError::validation(field, "is required")),
    }
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Check `data` and build the job it describes, without status or
/// timestamps filled in meaningfully.
fn job_from_data(data: &JobData, now: DateTime<Utc>) -> TrackerResult<Job> {
    let job_id = required_text(Some(&data.job_id), "jobId")?;
    let customer_name = required_text(data.customer_name.as_deref(), "customerName")?;
    let part_no = required_text(data.part_no.as_deref(), "partNo")?;
    let material = required_text(data.material.as_deref(), "material")?;
    let due_date = data
        .due_date
        .ok_or_else(|| TrackerError::validation("dueDate", "is required"))?;

    let quantity = data
        .quantity
        .ok_or_else(|| TrackerError::validation("quantity", "is required"))?;
    if quantity <= 0 {
        return Err(TrackerError::validation("quantity", "must be positive"));
    }
    let launched_panels = data.launched_panels.unwrap_or(quantity);
    if launched_panels < 0 {
        return Err(TrackerError::validation("launchedPanels", "must not be negative"));
    }
    if data.order_date.is_some_and(|d| d > due_date) {
        return Err(TrackerError::validation("orderDate", "is after the due date"));
    }

    Ok(Job {
        job_id: job_id.to_uppercase(),
        ref_no: optional_text(data.ref_no.as_deref()),
        customer_name,
        part_no,
        po_no: optional_text(data.po_no.as_deref()),
        quantity,
        launched_panels,
        material,
        order_date: data.order_date,
        due_date,
        status: JobStatus::Pending,
        attributes: data.attributes.clone(),
        created_at: now,
        updated_at: now,
    })
}

/// Find a job and its rows by key or job id.
pub fn find_job(store: &dyn RecordStore, id: &str) -> TrackerResult<JobWithProcesses> {
    store
        .job_with_processes(id)?
        .ok_or_else(|| TrackerError::JobNotFound { id: id.to_string() })
}

/// Create a job and its seventeen process rows, first process started.
pub fn create_job(
    store: &mut dyn RecordStore,
    data: JobData,
    now: DateTime<Utc>,
) -> TrackerResult<Mutation<JobWithProcesses>> {
    let mut job = job_from_data(&data, now)?;
    let key = job.key();
    if store.job(&key)?.is_some() || store.job(&job.job_id)?.is_some() {
        return Err(TrackerError::Conflict { id: key });
    }

    let catalog = ProcessCatalog::new(store.processes()?);
    if catalog.is_empty() {
        return Err(TrackerError::Internal("process catalog is empty".into()));
    }
    let rows = seed_rows(&key, &catalog, job.launched_panels, now);
    job.status = derive_job_status(job.due_date, &rows, now);

    let mutation = guarded(store, &key, |store| {
        store.add_job(&job)?;
        store.add_job_processes(&rows)?;
        Ok(JobWithProcesses {
            job: job.clone(),
            processes: rows.clone(),
        })
    })?;
    tracing::info!(job = %key, customer = %job.customer_name, "job created");
    Ok(mutation)
}

/// Edit a job's descriptive fields. Its identity (job id and reference
/// number) is fixed at creation.
pub fn update_job(
    store: &mut dyn RecordStore,
    id: &str,
    data: JobData,
    now: DateTime<Utc>,
) -> TrackerResult<Mutation<Job>> {
    let existing = find_job(store, id)?;
    let key = existing.job.key();

    let mut data = data;
    if data.job_id.trim().is_empty() {
        data.job_id = existing.job.job_id.clone();
    }
    if data.ref_no.is_none() {
        data.ref_no = existing.job.ref_no.clone();
    }
    if resolve_job_key(&data.job_id, data.ref_no.as_deref()) != key
        || !data.job_id.trim().eq_ignore_ascii_case(&existing.job.job_id)
    {
        return Err(TrackerError::validation("jobId", "a job's identity cannot change"));
    }

    let mut job = job_from_data(&data, now)?;
    job.created_at = existing.job.created_at;
    job.status = derive_job_status(job.due_date, &existing.processes, now);

    let mutation = guarded(store, &key, |store| Ok(store.update_job(&job)?))?;
    tracing::info!(job = %key, "job updated");
    Ok(mutation)
}

/// Delete a job and all of its rows. Returns `None` if no such job exists.
pub fn delete_job(
    store: &mut dyn RecordStore,
    id: &str,
) -> TrackerResult<Option<Mutation<JobWithProcesses>>> {
    let Some(job) = store.job(id)? else {
        return Ok(None);
    };
    let key = job.key();
    let mutation = guarded(store, &key, |store| {
        store
            .delete_job(&key)?
            .ok_or_else(|| TrackerError::JobNotFound { id: key.clone() })
    })?;
    tracing::info!(job = %key, rows = mutation.value.processes.len(), "job deleted");
    Ok(Some(mutation))
}

/// Input that would rebuild `job`, for re-running creation checks.
fn data_of(job: &Job) -> JobData {
    JobData {
        job_id: job.job_id.clone(),
        ref_no: job.ref_no.clone(),
        customer_name: Some(job.customer_name.clone()),
        part_no: Some(job.part_no.clone()),
        po_no: job.po_no.clone(),
        quantity: Some(job.quantity),
        launched_panels: Some(job.launched_panels),
        material: Some(job.material.clone()),
        order_date: job.order_date,
        due_date: Some(job.due_date),
        attributes: job.attributes.clone(),
    }
}

/// A snapshot must describe a valid job with exactly one row per catalog
/// process, none of them holding negative quantities.
fn check_snapshot(
    snapshot: &JobWithProcesses,
    key: &str,
    catalog: &ProcessCatalog,
) -> TrackerResult<()> {
    job_from_data(&data_of(&snapshot.job), snapshot.job.created_at)?;

    let mut processes = HashSet::new();
    let mut ids = HashSet::new();
    for row in &snapshot.processes {
        if row.job_id != key {
            return Err(TrackerError::validation(
                "processes",
                format!("row {} belongs to job {}", row.id, row.job_id),
            ));
        }
        if catalog.get(&row.process_id).is_none() {
            return Err(TrackerError::ProcessNotFound {
                id: row.process_id.clone(),
            });
        }
        if !processes.insert(row.process_id.as_str()) {
            return Err(TrackerError::validation(
                "processes",
                format!("{} appears more than once", row.process_id),
            ));
        }
        if !ids.insert(row.id.as_str()) {
            return Err(TrackerError::validation(
                "processes",
                format!("row id {} appears more than once", row.id),
            ));
        }
        let quantities = [
            row.quantity_in,
            row.quantity_out,
            row.rework_quantity_in,
            row.rework_quantity_out,
            row.launched_panels,
        ];
        if quantities.iter().any(|q| *q < 0) {
            return Err(TrackerError::validation(
                "processes",
                format!("{} has a negative quantity", row.process_id),
            ));
        }
        if row.pending_quantity() < 0 {
            return Err(TrackerError::validation(
                "processes",
                format!("{} has a negative pending quantity", row.process_id),
            ));
        }
    }
    if processes.len() != catalog.len() {
        return Err(TrackerError::validation(
            "processes",
            format!("expected {} rows, got {}", catalog.len(), processes.len()),
        ));
    }
    Ok(())
}

/// Put a deleted job back exactly as it was.
pub fn restore_job(
    store: &mut dyn RecordStore,
    snapshot: JobWithProcesses,
) -> TrackerResult<Mutation<()>> {
    let key = snapshot.job.key();
    if store.job(&key)?.is_some() || store.job(&snapshot.job.job_id)?.is_some() {
        return Err(TrackerError::Conflict { id: key });
    }
    let catalog = ProcessCatalog::new(store.processes()?);
    check_snapshot(&snapshot, &key, &catalog)?;

    let mutation = guarded(store, &key, |store| Ok(store.restore_job(&snapshot)?))?;
    tracing::info!(job = %key, "job restored");
    Ok(mutation)
}

/// Recompute the stored status of a job from its rows.
pub fn refresh_job_status(
    store: &mut dyn RecordStore,
    job: &Job,
    rows: &[JobProcess],
    now: DateTime<Utc>,
) -> TrackerResult<Job> {
    let status = derive_job_status(job.due_date, rows, now);
    if status == job.status {
        return Ok(job.clone());
    }
    let mut updated = job.clone();
    updated.status = status;
    updated.updated_at = now;
    tracing::debug!(job = %job.key(), from = %job.status, to = %status, "job status changed");
    Ok(store.update_job(&updated)?)
}
