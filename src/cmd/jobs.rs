//! Read-only job views: `jobtrack jobs` and `jobtrack show`.

use anyhow::{Context, Result, bail};
use console::StyledObject;

use jobtrack::config::TrackerToml;
use jobtrack::tracker::catalog::ProcessCatalog;
use jobtrack::tracker::db::SqliteStore;
use jobtrack::tracker::lifecycle::find_job;
use jobtrack::tracker::models::{JobStatus, ProcessStatus};
use jobtrack::tracker::store::RecordStore;

fn open_existing(settings: &TrackerToml) -> Result<SqliteStore> {
    let path = &settings.database.path;
    if !path.exists() {
        bail!(
            "No database at {}. Run 'jobtrack init' first.",
            path.display()
        );
    }
    SqliteStore::new(path).context("Failed to open tracker database")
}

fn job_status(status: JobStatus) -> StyledObject<&'static str> {
    let style = console::style(status.as_str());
    match status {
        JobStatus::Completed => style.green(),
        JobStatus::Overdue => style.red().bold(),
        JobStatus::InProgress => style.yellow(),
        JobStatus::Pending => style.dim(),
    }
}

fn process_status(status: ProcessStatus) -> StyledObject<&'static str> {
    let style = console::style(status.as_str());
    match status {
        ProcessStatus::Completed => style.green(),
        ProcessStatus::Rejected => style.red(),
        ProcessStatus::InProgress => style.yellow(),
        ProcessStatus::Pending => style.dim(),
    }
}

pub fn cmd_jobs(settings: &TrackerToml) -> Result<()> {
    let store = open_existing(settings)?;
    let jobs = store.jobs()?;

    if jobs.is_empty() {
        println!("No jobs yet.");
        return Ok(());
    }

    println!(
        "{:<12} {:<12} {:<24} {:<16} {:<10} STATUS",
        "KEY", "JOB ID", "CUSTOMER", "PART NO", "DUE"
    );
    for job in &jobs {
        println!(
            "{:<12} {:<12} {:<24} {:<16} {:<10} {}",
            job.key(),
            job.job_id,
            job.customer_name,
            job.part_no,
            job.due_date,
            job_status(job.status)
        );
    }
    println!();
    println!("{} job(s)", jobs.len());
    Ok(())
}

pub fn cmd_show(settings: &TrackerToml, id: &str) -> Result<()> {
    let store = open_existing(settings)?;
    let job = find_job(&store, id)?;
    let catalog = ProcessCatalog::new(store.processes()?);

    println!(
        "{} {} ({})",
        console::style("Job").bold().cyan(),
        console::style(&job.job.job_id).bold(),
        job.job.key()
    );
    println!("  Customer:  {}", job.job.customer_name);
    println!("  Part no:   {}", job.job.part_no);
    println!("  Quantity:  {} ({} panels launched)", job.job.quantity, job.job.launched_panels);
    println!("  Material:  {}", job.job.material);
    println!("  Due:       {}", job.job.due_date);
    println!("  Status:    {}", job_status(job.job.status));
    println!();

    println!(
        "  {:>3} {:<16} {:<12} {:>6} {:>6} {:>6} {:>7}  ASSIGNED",
        "#", "PROCESS", "STATUS", "IN", "OUT", "SCRAP", "PENDING"
    );
    for row in &job.processes {
        let (seq, name) = catalog
            .get(&row.process_id)
            .map(|p| (p.sequence_number, p.process_name.as_str()))
            .unwrap_or((0, row.process_id.as_str()));
        println!(
            "  {:>3} {:<16} {:<12} {:>6} {:>6} {:>6} {:>7}  {}",
            seq,
            name,
            process_status(row.status),
            row.quantity_in,
            row.quantity_out,
            row.rework_quantity_out,
            row.pending_quantity(),
            row.assigned_to.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
