use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::catalog::standard_processes;
use super::models::*;
use super::store::RecordStore;

const JOB_COLUMNS: &str = "job_id, ref_no, customer_name, part_no, po_no, quantity, \
     launched_panels, material, order_date, due_date, status, attributes, created_at, updated_at";

const ROW_COLUMNS: &str = "jp.id, jp.job_key, jp.process_id, jp.assigned_to, jp.status, \
     jp.start_time, jp.end_time, jp.remarks, jp.quantity_in, jp.quantity_out, \
     jp.rework_quantity_in, jp.rework_quantity_out, jp.launched_panels";

/// SQLite-backed record store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        self.seed_processes().context("Failed to seed processes")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'employee',
                    department TEXT
                );

                CREATE TABLE IF NOT EXISTS processes (
                    process_id TEXT PRIMARY KEY,
                    process_name TEXT NOT NULL,
                    sequence_number INTEGER NOT NULL UNIQUE
                );

                CREATE TABLE IF NOT EXISTS jobs (
                    job_key TEXT PRIMARY KEY,
                    job_id TEXT NOT NULL,
                    ref_no TEXT,
                    customer_name TEXT NOT NULL,
                    part_no TEXT NOT NULL,
                    po_no TEXT,
                    quantity INTEGER NOT NULL,
                    launched_panels INTEGER NOT NULL,
                    material TEXT NOT NULL,
                    order_date TEXT,
                    due_date TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'Pending',
                    attributes TEXT NOT NULL DEFAULT '{}',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS job_processes (
                    id TEXT PRIMARY KEY,
                    job_key TEXT NOT NULL REFERENCES jobs(job_key) ON DELETE CASCADE,
                    process_id TEXT NOT NULL REFERENCES processes(process_id),
                    assigned_to TEXT,
                    status TEXT NOT NULL DEFAULT 'Pending',
                    start_time TEXT,
                    end_time TEXT,
                    remarks TEXT,
                    quantity_in INTEGER NOT NULL DEFAULT 0,
                    quantity_out INTEGER NOT NULL DEFAULT 0,
                    rework_quantity_in INTEGER NOT NULL DEFAULT 0,
                    rework_quantity_out INTEGER NOT NULL DEFAULT 0,
                    launched_panels INTEGER NOT NULL DEFAULT 0,
                    UNIQUE(job_key, process_id)
                );

                CREATE INDEX IF NOT EXISTS idx_jobs_created ON jobs(created_at);
                CREATE INDEX IF NOT EXISTS idx_job_processes_job ON job_processes(job_key);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    fn seed_processes(&self) -> Result<()> {
        for process in standard_processes() {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO processes (process_id, process_name, sequence_number) VALUES (?1, ?2, ?3)",
                    params![process.process_id, process.process_name, process.sequence_number],
                )
                .context("Failed to insert process")?;
        }
        Ok(())
    }
}

// ── Row mapping ───────────────────────────────────────────────────────

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("Invalid date '{}'", raw))
}

struct JobRow {
    job_id: String,
    ref_no: Option<String>,
    customer_name: String,
    part_no: String,
    po_no: Option<String>,
    quantity: i64,
    launched_panels: i64,
    material: String,
    order_date: Option<String>,
    due_date: String,
    status: String,
    attributes: String,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            job_id: row.get(0)?,
            ref_no: row.get(1)?,
            customer_name: row.get(2)?,
            part_no: row.get(3)?,
            po_no: row.get(4)?,
            quantity: row.get(5)?,
            launched_panels: row.get(6)?,
            material: row.get(7)?,
            order_date: row.get(8)?,
            due_date: row.get(9)?,
            status: row.get(10)?,
            attributes: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_job(self) -> Result<Job> {
        Ok(Job {
            job_id: self.job_id,
            ref_no: self.ref_no,
            customer_name: self.customer_name,
            part_no: self.part_no,
            po_no: self.po_no,
            quantity: self.quantity,
            launched_panels: self.launched_panels,
            material: self.material,
            order_date: self.order_date.as_deref().map(parse_date).transpose()?,
            due_date: parse_date(&self.due_date)?,
            status: JobStatus::from_str(&self.status).map_err(|e| anyhow!(e))?,
            attributes: serde_json::from_str(&self.attributes)
                .context("Failed to decode job attributes")?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

struct JobProcessRow {
    id: String,
    job_key: String,
    process_id: String,
    assigned_to: Option<String>,
    status: String,
    start_time: Option<String>,
    end_time: Option<String>,
    remarks: Option<String>,
    quantity_in: i64,
    quantity_out: i64,
    rework_quantity_in: i64,
    rework_quantity_out: i64,
    launched_panels: i64,
}

impl JobProcessRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            job_key: row.get(1)?,
            process_id: row.get(2)?,
            assigned_to: row.get(3)?,
            status: row.get(4)?,
            start_time: row.get(5)?,
            end_time: row.get(6)?,
            remarks: row.get(7)?,
            quantity_in: row.get(8)?,
            quantity_out: row.get(9)?,
            rework_quantity_in: row.get(10)?,
            rework_quantity_out: row.get(11)?,
            launched_panels: row.get(12)?,
        })
    }

    fn into_job_process(self) -> Result<JobProcess> {
        Ok(JobProcess {
            id: self.id,
            job_id: self.job_key,
            process_id: self.process_id,
            assigned_to: self.assigned_to,
            status: ProcessStatus::from_str(&self.status).map_err(|e| anyhow!(e))?,
            start_time: parse_opt_ts(self.start_time)?,
            end_time: parse_opt_ts(self.end_time)?,
            remarks: self.remarks,
            quantity_in: self.quantity_in,
            quantity_out: self.quantity_out,
            rework_quantity_in: self.rework_quantity_in,
            rework_quantity_out: self.rework_quantity_out,
            launched_panels: self.launched_panels,
        })
    }
}

// ── Queries shared between plain and transactional access ────────────

fn query_job(conn: &Connection, id: &str) -> Result<Option<Job>> {
    let needle = id.trim().to_lowercase();
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM jobs WHERE job_key = ?1 OR lower(job_id) = ?1 LIMIT 1",
                JOB_COLUMNS
            ),
            params![needle],
            JobRow::read,
        )
        .optional()
        .context("Failed to query job")?;
    row.map(JobRow::into_job).transpose()
}

fn query_job_processes(conn: &Connection, job_key: Option<&str>) -> Result<Vec<JobProcess>> {
    let filter = if job_key.is_some() {
        "WHERE jp.job_key = ?1"
    } else {
        ""
    };
    let sql = format!(
        "SELECT {} FROM job_processes jp JOIN processes p ON p.process_id = jp.process_id {} ORDER BY jp.job_key, p.sequence_number",
        ROW_COLUMNS, filter
    );
    let mut stmt = conn
        .prepare(&sql)
        .context("Failed to prepare job process query")?;
    let rows = match job_key {
        Some(key) => stmt.query_map(params![key.to_lowercase()], JobProcessRow::read),
        None => stmt.query_map([], JobProcessRow::read),
    }
    .context("Failed to query job processes")?;

    let mut out = Vec::new();
    for row in rows {
        let r = row.context("Failed to read job process row")?;
        out.push(r.into_job_process()?);
    }
    Ok(out)
}

fn insert_job(conn: &Connection, job: &Job) -> Result<()> {
    let attributes =
        serde_json::to_string(&job.attributes).context("Failed to encode job attributes")?;
    conn.execute(
        &format!(
            "INSERT INTO jobs (job_key, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            JOB_COLUMNS
        ),
        params![
            job.key(),
            job.job_id,
            job.ref_no,
            job.customer_name,
            job.part_no,
            job.po_no,
            job.quantity,
            job.launched_panels,
            job.material,
            job.order_date.map(|d| d.format("%Y-%m-%d").to_string()),
            job.due_date.format("%Y-%m-%d").to_string(),
            job.status.as_str(),
            attributes,
            format_ts(&job.created_at),
            format_ts(&job.updated_at),
        ],
    )
    .context("Failed to insert job")?;
    Ok(())
}

fn insert_job_processes(conn: &Connection, rows: &[JobProcess]) -> Result<()> {
    let mut stmt = conn
        .prepare(
            "INSERT INTO job_processes (id, job_key, process_id, assigned_to, status, start_time, end_time, remarks, quantity_in, quantity_out, rework_quantity_in, rework_quantity_out, launched_panels)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .context("Failed to prepare job process insert")?;
    for row in rows {
        stmt.execute(params![
            row.id,
            row.job_id,
            row.process_id,
            row.assigned_to,
            row.status.as_str(),
            row.start_time.as_ref().map(format_ts),
            row.end_time.as_ref().map(format_ts),
            row.remarks,
            row.quantity_in,
            row.quantity_out,
            row.rework_quantity_in,
            row.rework_quantity_out,
            row.launched_panels,
        ])
        .with_context(|| format!("Failed to insert job process {}", row.id))?;
    }
    Ok(())
}

fn remove_job(conn: &Connection, job_key: &str) -> Result<Option<JobWithProcesses>> {
    let Some(job) = query_job(conn, job_key)? else {
        return Ok(None);
    };
    let key = job.key();
    let processes = query_job_processes(conn, Some(&key))?;
    conn.execute("DELETE FROM job_processes WHERE job_key = ?1", params![key])
        .context("Failed to delete job processes")?;
    conn.execute("DELETE FROM jobs WHERE job_key = ?1", params![key])
        .context("Failed to delete job")?;
    Ok(Some(JobWithProcesses { job, processes }))
}

impl RecordStore for SqliteStore {
    fn users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, role, department FROM users ORDER BY name")
            .context("Failed to prepare list_users")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .context("Failed to query users")?;
        let mut users = Vec::new();
        for row in rows {
            let (id, name, role, department) = row.context("Failed to read user row")?;
            users.push(User {
                id,
                name,
                role: Role::from_str(&role).map_err(|e| anyhow!(e))?,
                department,
            });
        }
        Ok(users)
    }

    fn user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users()?.into_iter().find(|u| u.id == id))
    }

    fn add_user(&mut self, user: &User) -> Result<User> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO users (id, name, role, department) VALUES (?1, ?2, ?3, ?4)",
                params![user.id, user.name, user.role.as_str(), user.department],
            )
            .context("Failed to insert user")?;
        Ok(user.clone())
    }

    fn processes(&self) -> Result<Vec<Process>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT process_id, process_name, sequence_number FROM processes ORDER BY sequence_number",
            )
            .context("Failed to prepare list_processes")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Process {
                    process_id: row.get(0)?,
                    process_name: row.get(1)?,
                    sequence_number: row.get(2)?,
                })
            })
            .context("Failed to query processes")?;
        let mut processes = Vec::new();
        for row in rows {
            processes.push(row.context("Failed to read process row")?);
        }
        Ok(processes)
    }

    fn jobs(&self) -> Result<Vec<Job>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM jobs ORDER BY created_at DESC, job_key",
                JOB_COLUMNS
            ))
            .context("Failed to prepare list_jobs")?;
        let rows = stmt
            .query_map([], JobRow::read)
            .context("Failed to query jobs")?;
        let mut jobs = Vec::new();
        for row in rows {
            let r = row.context("Failed to read job row")?;
            jobs.push(r.into_job()?);
        }
        Ok(jobs)
    }

    fn job(&self, id: &str) -> Result<Option<Job>> {
        query_job(&self.conn, id)
    }

    fn job_processes(&self) -> Result<Vec<JobProcess>> {
        query_job_processes(&self.conn, None)
    }

    fn job_processes_for(&self, job_key: &str) -> Result<Vec<JobProcess>> {
        query_job_processes(&self.conn, Some(job_key))
    }

    fn add_job(&mut self, job: &Job) -> Result<Job> {
        insert_job(&self.conn, job)?;
        query_job(&self.conn, &job.key())?.context("Job not found after insert")
    }

    fn add_job_processes(&mut self, rows: &[JobProcess]) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("Failed to begin transaction")?;
        insert_job_processes(&tx, rows)?;
        tx.commit().context("Failed to commit job processes")
    }

    fn update_job(&mut self, job: &Job) -> Result<Job> {
        let attributes =
            serde_json::to_string(&job.attributes).context("Failed to encode job attributes")?;
        let count = self
            .conn
            .execute(
                "UPDATE jobs SET job_id = ?2, ref_no = ?3, customer_name = ?4, part_no = ?5, po_no = ?6,
                 quantity = ?7, launched_panels = ?8, material = ?9, order_date = ?10, due_date = ?11,
                 status = ?12, attributes = ?13, updated_at = ?14
                 WHERE job_key = ?1",
                params![
                    job.key(),
                    job.job_id,
                    job.ref_no,
                    job.customer_name,
                    job.part_no,
                    job.po_no,
                    job.quantity,
                    job.launched_panels,
                    job.material,
                    job.order_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    job.due_date.format("%Y-%m-%d").to_string(),
                    job.status.as_str(),
                    attributes,
                    format_ts(&job.updated_at),
                ],
            )
            .context("Failed to update job")?;
        if count == 0 {
            return Err(anyhow!("Job {} not found for update", job.key()));
        }
        query_job(&self.conn, &job.key())?.context("Job not found after update")
    }

    fn delete_job(&mut self, job_key: &str) -> Result<Option<JobWithProcesses>> {
        let tx = self
            .conn
            .transaction()
            .context("Failed to begin transaction")?;
        let removed = remove_job(&tx, job_key)?;
        tx.commit().context("Failed to commit job delete")?;
        Ok(removed)
    }

    fn restore_job(&mut self, snapshot: &JobWithProcesses) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("Failed to begin transaction")?;
        insert_job(&tx, &snapshot.job)?;
        insert_job_processes(&tx, &snapshot.processes)?;
        tx.commit().context("Failed to commit job restore")
    }

    fn update_job_process(&mut self, row: &JobProcess) -> Result<JobProcess> {
        let count = self
            .conn
            .execute(
                "UPDATE job_processes SET assigned_to = ?2, status = ?3, start_time = ?4, end_time = ?5,
                 remarks = ?6, quantity_in = ?7, quantity_out = ?8, rework_quantity_in = ?9,
                 rework_quantity_out = ?10, launched_panels = ?11
                 WHERE id = ?1",
                params![
                    row.id,
                    row.assigned_to,
                    row.status.as_str(),
                    row.start_time.as_ref().map(format_ts),
                    row.end_time.as_ref().map(format_ts),
                    row.remarks,
                    row.quantity_in,
                    row.quantity_out,
                    row.rework_quantity_in,
                    row.rework_quantity_out,
                    row.launched_panels,
                ],
            )
            .context("Failed to update job process")?;
        if count == 0 {
            return Err(anyhow!("Job process {} not found for update", row.id));
        }
        Ok(row.clone())
    }

    fn replace_job(&mut self, snapshot: &JobWithProcesses) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("Failed to begin transaction")?;
        remove_job(&tx, &snapshot.job.key())?;
        insert_job(&tx, &snapshot.job)?;
        insert_job_processes(&tx, &snapshot.processes)?;
        tx.commit().context("Failed to commit job replace")
    }
}
