use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result, bail};

use super::catalog::ProcessCatalog;
use super::models::*;
use crate::errors::{TrackerError, TrackerResult};

/// Repository over the four record kinds. Every operation replaces or
/// appends whole records; nothing is transactional beyond one record except
/// where an implementation says otherwise.
pub trait RecordStore: Send {
    fn users(&self) -> Result<Vec<User>>;

    fn user(&self, id: &str) -> Result<Option<User>>;

    /// Insert a user, replacing any existing user with the same id.
    fn add_user(&mut self, user: &User) -> Result<User>;

    /// Processes in sequence order.
    fn processes(&self) -> Result<Vec<Process>>;

    /// Jobs, most recently created first.
    fn jobs(&self) -> Result<Vec<Job>>;

    /// Case-insensitive lookup by job key or job id.
    fn job(&self, id: &str) -> Result<Option<Job>>;

    fn job_processes(&self) -> Result<Vec<JobProcess>>;

    /// Rows for one job key, in process sequence order.
    fn job_processes_for(&self, job_key: &str) -> Result<Vec<JobProcess>>;

    fn add_job(&mut self, job: &Job) -> Result<Job>;

    fn add_job_processes(&mut self, rows: &[JobProcess]) -> Result<()>;

    /// Replace the job stored under `job.key()`.
    fn update_job(&mut self, job: &Job) -> Result<Job>;

    /// Remove a job and its rows, returning what was removed.
    fn delete_job(&mut self, job_key: &str) -> Result<Option<JobWithProcesses>>;

    /// Reinsert a previously deleted job and its rows unchanged.
    fn restore_job(&mut self, snapshot: &JobWithProcesses) -> Result<()>;

    /// Replace the row with the same `id`.
    fn update_job_process(&mut self, row: &JobProcess) -> Result<JobProcess>;

    /// Overwrite a job and all of its rows with `snapshot`.
    fn replace_job(&mut self, snapshot: &JobWithProcesses) -> Result<()> {
        self.delete_job(&snapshot.job.key())?;
        self.restore_job(snapshot)
    }

    /// Job plus rows, or `None` if the job is absent.
    fn job_with_processes(&self, id: &str) -> Result<Option<JobWithProcesses>> {
        match self.job(id)? {
            Some(job) => {
                let processes = self.job_processes_for(&job.key())?;
                Ok(Some(JobWithProcesses { job, processes }))
            }
            None => Ok(None),
        }
    }
}

/// Async-safe handle to a record store.
///
/// Runs every access on tokio's blocking pool with the store mutex held for
/// the whole closure, so a multi-record mutation is not interleaved with
/// another one.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<Mutex<Box<dyn RecordStore>>>,
}

impl StoreHandle {
    pub fn new<S: RecordStore + 'static>(store: S) -> Self {
        Self::from_boxed(Box::new(store))
    }

    pub fn from_boxed(store: Box<dyn RecordStore>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Run a closure against the store on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> TrackerResult<R>
    where
        F: FnOnce(&mut dyn RecordStore) -> TrackerResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = store.lock().map_err(|_| TrackerError::LockPoisoned)?;
            f(&mut **guard)
        })
        .await
        .map_err(|e| TrackerError::Internal(format!("Store task panicked: {}", e)))?
    }

    /// Acquire the store synchronously. For startup seeding and tests only.
    pub fn lock_sync(&self) -> TrackerResult<MutexGuard<'_, Box<dyn RecordStore>>> {
        self.inner.lock().map_err(|_| TrackerError::LockPoisoned)
    }
}

/// Store backed by plain vectors. Used by tests and by `--in-memory` runs.
pub struct MemoryStore {
    catalog: ProcessCatalog,
    users: Vec<User>,
    jobs: Vec<Job>,
    job_processes: Vec<JobProcess>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_catalog(ProcessCatalog::standard())
    }

    pub fn with_catalog(catalog: ProcessCatalog) -> Self {
        Self {
            catalog,
            users: Vec::new(),
            jobs: Vec::new(),
            job_processes: Vec::new(),
        }
    }

    fn sort_rows(&self, rows: &mut [JobProcess]) {
        rows.sort_by_key(|r| self.catalog.position(&r.process_id).unwrap_or(usize::MAX));
    }
}

impl RecordStore for MemoryStore {
    fn users(&self) -> Result<Vec<User>> {
        Ok(self.users.clone())
    }

    fn user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.iter().find(|u| u.id == id).cloned())
    }

    fn add_user(&mut self, user: &User) -> Result<User> {
        match self.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user.clone(),
            None => self.users.push(user.clone()),
        }
        Ok(user.clone())
    }

    fn processes(&self) -> Result<Vec<Process>> {
        Ok(self.catalog.iter().cloned().collect())
    }

    fn jobs(&self) -> Result<Vec<Job>> {
        let mut jobs = self.jobs.clone();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.key().cmp(&b.key())));
        Ok(jobs)
    }

    fn job(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.jobs.iter().find(|j| j.matches(id)).cloned())
    }

    fn job_processes(&self) -> Result<Vec<JobProcess>> {
        Ok(self.job_processes.clone())
    }

    fn job_processes_for(&self, job_key: &str) -> Result<Vec<JobProcess>> {
        let key = job_key.to_lowercase();
        let mut rows: Vec<JobProcess> = self
            .job_processes
            .iter()
            .filter(|r| r.job_id == key)
            .cloned()
            .collect();
        self.sort_rows(&mut rows);
        Ok(rows)
    }

    fn add_job(&mut self, job: &Job) -> Result<Job> {
        let key = job.key();
        if self.jobs.iter().any(|j| j.key() == key) {
            bail!("Job {} already stored", key);
        }
        self.jobs.push(job.clone());
        Ok(job.clone())
    }

    fn add_job_processes(&mut self, rows: &[JobProcess]) -> Result<()> {
        let mut ids = HashSet::new();
        let mut slots = HashSet::new();
        for row in rows {
            if !ids.insert(row.id.as_str()) || self.job_processes.iter().any(|e| e.id == row.id) {
                bail!("Job process {} already stored", row.id);
            }
            let taken = self
                .job_processes
                .iter()
                .any(|e| e.job_id == row.job_id && e.process_id == row.process_id);
            if !slots.insert((row.job_id.as_str(), row.process_id.as_str())) || taken {
                bail!("Job {} already has a row for {}", row.job_id, row.process_id);
            }
        }
        self.job_processes.extend_from_slice(rows);
        Ok(())
    }

    fn update_job(&mut self, job: &Job) -> Result<Job> {
        let key = job.key();
        let slot = self
            .jobs
            .iter_mut()
            .find(|j| j.key() == key)
            .with_context(|| format!("Job {} not found for update", key))?;
        *slot = job.clone();
        Ok(job.clone())
    }

    fn delete_job(&mut self, job_key: &str) -> Result<Option<JobWithProcesses>> {
        let key = job_key.to_lowercase();
        let Some(index) = self.jobs.iter().position(|j| j.key() == key) else {
            return Ok(None);
        };
        let job = self.jobs.remove(index);
        let (mut removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.job_processes)
            .into_iter()
            .partition(|r| r.job_id == key);
        self.job_processes = kept;
        self.sort_rows(&mut removed);
        Ok(Some(JobWithProcesses {
            job,
            processes: removed,
        }))
    }

    fn restore_job(&mut self, snapshot: &JobWithProcesses) -> Result<()> {
        self.add_job(&snapshot.job)?;
        self.add_job_processes(&snapshot.processes)
    }

    fn update_job_process(&mut self, row: &JobProcess) -> Result<JobProcess> {
        let slot = self
            .job_processes
            .iter_mut()
            .find(|r| r.id == row.id)
            .with_context(|| format!("Job process {} not found for update", row.id))?;
        *slot = row.clone();
        Ok(row.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    pub(crate) fn sample_job(job_id: &str, ref_no: Option<&str>, minute: u32) -> Job {
        let at = Utc.with_ymd_and_hms(2024, 12, 1, 9, minute, 0).unwrap();
        Job {
            job_id: job_id.to_uppercase(),
            ref_no: ref_no.map(String::from),
            customer_name: "Acme".into(),
            part_no: "P1".into(),
            po_no: None,
            quantity: 10,
            launched_panels: 10,
            material: "FR4".into(),
            order_date: None,
            due_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            status: JobStatus::Pending,
            attributes: JobAttributes::default(),
            created_at: at,
            updated_at: at,
        }
    }

    fn rows_for(key: &str) -> Vec<JobProcess> {
        ProcessCatalog::standard()
            .iter()
            .map(|p| JobProcess::pending(key, &p.process_id))
            .collect()
    }

    #[test]
    fn test_job_lookup_by_ref_no_or_job_id() {
        let mut store = MemoryStore::new();
        store.add_job(&sample_job("job-010", Some("6"), 0)).unwrap();
        assert!(store.job("6").unwrap().is_some());
        assert!(store.job("JOB-010").unwrap().is_some());
        assert!(store.job("job-011").unwrap().is_none());
    }

    #[test]
    fn test_jobs_listed_newest_first() {
        let mut store = MemoryStore::new();
        store.add_job(&sample_job("job-1", None, 0)).unwrap();
        store.add_job(&sample_job("job-2", None, 5)).unwrap();
        let keys: Vec<_> = store.jobs().unwrap().iter().map(Job::key).collect();
        assert_eq!(keys, vec!["job-2", "job-1"]);
    }

    #[test]
    fn test_duplicate_job_key_rejected() {
        let mut store = MemoryStore::new();
        store.add_job(&sample_job("job-1", None, 0)).unwrap();
        assert!(store.add_job(&sample_job("JOB-1", None, 1)).is_err());
    }

    #[test]
    fn test_rows_returned_in_sequence_order() {
        let mut store = MemoryStore::new();
        store.add_job(&sample_job("job-1", None, 0)).unwrap();
        let mut rows = rows_for("job-1");
        rows.reverse();
        store.add_job_processes(&rows).unwrap();

        let ids: Vec<_> = store
            .job_processes_for("job-1")
            .unwrap()
            .into_iter()
            .map(|r| r.process_id)
            .collect();
        assert_eq!(ids.first().unwrap(), "proc-1");
        assert_eq!(ids[9], "proc-10");
        assert_eq!(ids.last().unwrap(), "proc-17");
    }

    #[test]
    fn test_delete_removes_job_and_rows_as_unit() {
        let mut store = MemoryStore::new();
        store.add_job(&sample_job("job-1", None, 0)).unwrap();
        store.add_job(&sample_job("job-2", None, 1)).unwrap();
        store.add_job_processes(&rows_for("job-1")).unwrap();
        store.add_job_processes(&rows_for("job-2")).unwrap();

        let snapshot = store.delete_job("job-1").unwrap().unwrap();
        assert_eq!(snapshot.processes.len(), 17);
        assert!(store.job("job-1").unwrap().is_none());
        assert_eq!(store.job_processes().unwrap().len(), 17);
        assert!(store.delete_job("job-1").unwrap().is_none());

        store.restore_job(&snapshot).unwrap();
        assert_eq!(store.job_with_processes("job-1").unwrap().unwrap(), snapshot);
    }

    #[test]
    fn test_duplicate_rows_in_one_batch_rejected() {
        let mut store = MemoryStore::new();
        store.add_job(&sample_job("job-1", None, 0)).unwrap();
        let mut rows = rows_for("job-1");
        rows.push(rows[0].clone());
        assert!(store.add_job_processes(&rows).is_err());

        let mut rows = rows_for("job-1");
        rows.push(JobProcess::pending("job-1", "proc-1"));
        assert!(store.add_job_processes(&rows).is_err());
        assert!(store.job_processes_for("job-1").unwrap().is_empty());
    }

    #[test]
    fn test_update_missing_row_fails() {
        let mut store = MemoryStore::new();
        let row = JobProcess::pending("ghost", "proc-1");
        assert!(store.update_job_process(&row).is_err());
    }

    #[test]
    fn test_add_user_replaces_same_id() {
        let mut store = MemoryStore::new();
        let mut user = User {
            id: "u1".into(),
            name: "Asha".into(),
            role: Role::Employee,
            department: Some("Cutting".into()),
        };
        store.add_user(&user).unwrap();
        user.department = Some("Drilling".into());
        store.add_user(&user).unwrap();
        let users = store.users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].department.as_deref(), Some("Drilling"));
    }

    #[tokio::test]
    async fn test_handle_runs_closure_against_store() {
        let handle = StoreHandle::new(MemoryStore::new());
        let count = handle
            .call(|store| Ok(store.processes()?.len()))
            .await
            .unwrap();
        assert_eq!(count, 17);
    }
}
