//! Per-process state machine.
//!
//! Everything here is pure: functions take the current rows and return new
//! ones, and the caller decides what to persist.

use chrono::{DateTime, Utc};

use super::catalog::{ProcessCatalog, is_qc_process};
use super::models::{JobProcess, Process, ProcessStatus, StatusUpdate, User};
use crate::errors::{TrackerError, TrackerResult};

/// What a requested status change does to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Pending → In Progress.
    Start,
    /// In Progress → Completed or Rejected.
    Finish(ProcessStatus),
    /// Back to In Progress from anything but Pending, recording a partial
    /// output and the quantity still to be reworked.
    Rework,
}

/// Classify a status change, or `None` if it is not allowed.
pub fn classify(from: ProcessStatus, to: ProcessStatus) -> Option<Transition> {
    use ProcessStatus::*;
    match (from, to) {
        (Pending, InProgress) => Some(Transition::Start),
        (InProgress, Completed | Rejected) => Some(Transition::Finish(to)),
        (InProgress | Completed | Rejected, InProgress) => Some(Transition::Rework),
        (_, Pending)
        | (Pending, Completed | Rejected)
        | (Completed | Rejected, Completed | Rejected) => None,
    }
}

/// A row after a status change was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub row: JobProcess,
    pub transition: Transition,
}

impl Applied {
    /// True when the change left the row Completed, which triggers
    /// auto-advance of the next process.
    pub fn completed(&self) -> bool {
        self.row.status == ProcessStatus::Completed
    }
}

/// Rows for a new job: the first process started with the launched panels
/// as its input, the rest pending.
pub fn seed_rows(
    job_key: &str,
    catalog: &ProcessCatalog,
    launched_panels: i64,
    now: DateTime<Utc>,
) -> Vec<JobProcess> {
    let first = catalog.first().map(|p| p.process_id.as_str());
    catalog
        .iter()
        .map(|process| {
            let mut row = JobProcess::pending(job_key, &process.process_id);
            if first == Some(process.process_id.as_str()) {
                row.status = ProcessStatus::InProgress;
                row.start_time = Some(now);
                row.quantity_in = launched_panels;
            }
            row
        })
        .collect()
}

/// Whether `user` may pick up or see work on `row`.
///
/// Admins see everything. Otherwise a row assigned to the user is theirs,
/// and an unassigned row belongs to the department named after its process.
pub fn visible_to(user: &User, row: &JobProcess, process: &Process) -> bool {
    if user.is_admin() {
        return true;
    }
    match &row.assigned_to {
        Some(assignee) => assignee == &user.id,
        None => user.works_in(&process.process_name),
    }
}

fn check_quantities(update: &StatusUpdate) -> TrackerResult<()> {
    let fields = [
        ("quantityIn", update.quantity_in),
        ("quantityOut", update.quantity_out),
        ("reworkQuantityIn", update.rework_quantity_in),
        ("reworkQuantityOut", update.rework_quantity_out),
        ("launchedPanels", update.launched_panels),
    ];
    for (field, value) in fields {
        if value.is_some_and(|v| v < 0) {
            return Err(TrackerError::validation(field, "must not be negative"));
        }
    }
    Ok(())
}

/// Output recorded for a row: QC processes take an explicit OUT count,
/// other processes report the panels they launched onward.
fn output_for(row: &JobProcess, process: &Process, update: &StatusUpdate) -> i64 {
    if is_qc_process(&process.process_name) {
        update.quantity_out.unwrap_or(row.quantity_out)
    } else {
        update
            .launched_panels
            .or(update.quantity_out)
            .unwrap_or(row.quantity_in)
    }
}

fn check_output(quantity_in: i64, quantity_out: i64) -> TrackerResult<()> {
    if quantity_out > quantity_in {
        return Err(TrackerError::validation(
            "quantityOut",
            format!("{} exceeds quantity in {}", quantity_out, quantity_in),
        ));
    }
    Ok(())
}

/// Apply `update` to `row`, performed by `actor`.
pub fn apply(
    row: &JobProcess,
    process: &Process,
    actor: &User,
    update: &StatusUpdate,
    now: DateTime<Utc>,
) -> TrackerResult<Applied> {
    check_quantities(update)?;
    let transition =
        classify(row.status, update.new_status).ok_or_else(|| TrackerError::InvalidTransition {
            process_id: row.process_id.clone(),
            from: row.status,
            to: update.new_status,
        })?;

    let qc = is_qc_process(&process.process_name);
    let mut next = row.clone();
    if let Some(remarks) = &update.remarks {
        next.remarks = Some(remarks.clone());
    }

    match transition {
        Transition::Start => {
            let allowed = actor.is_admin()
                || row.assigned_to.as_deref() == Some(actor.id.as_str())
                || actor.works_in(&process.process_name);
            if !allowed {
                return Err(TrackerError::Forbidden {
                    user_id: actor.id.clone(),
                    process_name: process.process_name.clone(),
                });
            }
            next.status = ProcessStatus::InProgress;
            next.start_time = Some(now);
            next.end_time = None;
            next.assigned_to = None;
            if let Some(quantity_in) = update.quantity_in {
                next.quantity_in = quantity_in;
            }
        }
        Transition::Finish(status) => {
            let quantity_out = output_for(row, process, update);
            if qc {
                next.quantity_in = update.quantity_in.unwrap_or(row.quantity_in);
            } else {
                if next.quantity_in == 0 {
                    next.quantity_in = update.quantity_in.unwrap_or(quantity_out);
                }
                next.launched_panels = quantity_out;
            }
            check_output(next.quantity_in, quantity_out)?;
            next.quantity_out = quantity_out;
            if let Some(rework_in) = update.rework_quantity_in {
                next.rework_quantity_in = rework_in;
            }
            if let Some(rework_out) = update.rework_quantity_out {
                next.rework_quantity_out = rework_out;
            }
            if next.pending_quantity() < 0 {
                return Err(TrackerError::validation(
                    "reworkQuantityOut",
                    "leaves a negative pending quantity",
                ));
            }
            next.status = status;
            next.end_time = Some(now);
        }
        Transition::Rework => {
            let quantity_in = update.quantity_in.unwrap_or(row.quantity_in);
            let quantity_out = output_for(row, process, update);
            check_output(quantity_in, quantity_out)?;
            let unfinished = quantity_in - quantity_out;
            let remaining = update.rework_quantity_in.unwrap_or(unfinished);
            if remaining > unfinished {
                return Err(TrackerError::validation(
                    "reworkQuantityIn",
                    format!("{} exceeds unfinished quantity {}", remaining, unfinished),
                ));
            }

            next.quantity_in = quantity_in;
            next.quantity_out = quantity_out;
            if !qc {
                next.launched_panels = quantity_out;
            }
            next.rework_quantity_in = remaining;
            next.rework_quantity_out = unfinished - remaining;
            if next.start_time.is_none() {
                next.start_time = Some(now);
            }

            if next.pending_quantity() == 0 {
                next.status = ProcessStatus::Completed;
                next.end_time = Some(now);
            } else {
                next.status = ProcessStatus::InProgress;
                next.end_time = None;
            }
        }
    }

    Ok(Applied {
        row: next,
        transition,
    })
}

/// Activate the process after `completed_process_id`.
///
/// The next row is started only if it is still Pending, taking the
/// completed row's output as its input. Rows already started or finished
/// are left alone, as is everything when the completed row is the last one
/// or is not actually Completed.
pub fn advance(
    rows: &[JobProcess],
    catalog: &ProcessCatalog,
    completed_process_id: &str,
    now: DateTime<Utc>,
) -> Vec<JobProcess> {
    let mut next_rows = rows.to_vec();
    let Some(completed) = rows
        .iter()
        .find(|r| r.process_id == completed_process_id && r.status == ProcessStatus::Completed)
    else {
        return next_rows;
    };
    let Some(next_process) = catalog.next_after(completed_process_id) else {
        return next_rows;
    };
    if let Some(row) = next_rows
        .iter_mut()
        .find(|r| r.process_id == next_process.process_id && r.status == ProcessStatus::Pending)
    {
        row.status = ProcessStatus::InProgress;
        row.start_time = Some(now);
        row.end_time = None;
        row.assigned_to = None;
        row.quantity_in = completed.quantity_out;
        tracing::debug!(
            job = %row.job_id,
            process = %next_process.process_name,
            quantity_in = row.quantity_in,
            "auto-advanced to next process"
        );
    }
    next_rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::models::Role;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 2, 10, 0, 0).unwrap()
    }

    fn process(id: &str) -> Process {
        ProcessCatalog::standard().get(id).unwrap().clone()
    }

    fn user(department: &str) -> User {
        User {
            id: "u1".into(),
            name: "Meena".into(),
            role: Role::Employee,
            department: Some(department.into()),
        }
    }

    fn admin() -> User {
        User {
            id: "admin".into(),
            name: "Admin".into(),
            role: Role::Admin,
            department: None,
        }
    }

    fn update(process_id: &str, status: ProcessStatus) -> StatusUpdate {
        StatusUpdate {
            job_id: "job-1".into(),
            process_id: process_id.into(),
            new_status: status,
            remarks: None,
            user_id: "u1".into(),
            quantity_in: None,
            quantity_out: None,
            rework_quantity_in: None,
            rework_quantity_out: None,
            launched_panels: None,
        }
    }

    fn in_progress(process_id: &str, quantity_in: i64) -> JobProcess {
        let mut row = JobProcess::pending("job-1", process_id);
        row.status = ProcessStatus::InProgress;
        row.start_time = Some(now() - Duration::hours(1));
        row.quantity_in = quantity_in;
        row
    }

    #[test]
    fn test_classify_covers_allowed_moves() {
        use ProcessStatus::*;
        assert_eq!(classify(Pending, InProgress), Some(Transition::Start));
        assert_eq!(
            classify(InProgress, Rejected),
            Some(Transition::Finish(Rejected))
        );
        assert_eq!(classify(Completed, InProgress), Some(Transition::Rework));
        assert_eq!(classify(Rejected, InProgress), Some(Transition::Rework));
        assert_eq!(classify(InProgress, InProgress), Some(Transition::Rework));
    }

    #[test]
    fn test_classify_rejects_everything_else() {
        use ProcessStatus::*;
        for (from, to) in [
            (Pending, Pending),
            (Pending, Completed),
            (Pending, Rejected),
            (InProgress, Pending),
            (Completed, Pending),
            (Completed, Completed),
            (Completed, Rejected),
            (Rejected, Completed),
        ] {
            assert!(classify(from, to).is_none(), "{from} -> {to}");
        }
    }

    #[test]
    fn test_seed_rows_starts_first_process() {
        let rows = seed_rows("6", &ProcessCatalog::standard(), 100, now());
        assert_eq!(rows.len(), 17);
        assert_eq!(rows[0].status, ProcessStatus::InProgress);
        assert_eq!(rows[0].quantity_in, 100);
        assert_eq!(rows[0].start_time, Some(now()));
        assert!(rows[1..].iter().all(|r| r.status == ProcessStatus::Pending));
        assert!(rows.iter().all(|r| r.job_id == "6"));
    }

    #[test]
    fn test_start_requires_department_or_admin() {
        let row = JobProcess::pending("job-1", "proc-2");
        let req = update("proc-2", ProcessStatus::InProgress);

        let err = apply(&row, &process("proc-2"), &user("Cutting"), &req, now()).unwrap_err();
        assert!(matches!(err, TrackerError::Forbidden { .. }));

        let started = apply(&row, &process("proc-2"), &user("Drilling"), &req, now()).unwrap();
        assert_eq!(started.row.status, ProcessStatus::InProgress);
        assert_eq!(started.row.start_time, Some(now()));
        assert!(started.row.assigned_to.is_none());

        assert!(apply(&row, &process("proc-2"), &admin(), &req, now()).is_ok());
    }

    #[test]
    fn test_start_allowed_for_assignee() {
        let mut row = JobProcess::pending("job-1", "proc-2");
        row.assigned_to = Some("u1".into());
        let req = update("proc-2", ProcessStatus::InProgress);
        let started = apply(&row, &process("proc-2"), &user("Cutting"), &req, now()).unwrap();
        assert!(started.row.assigned_to.is_none());
    }

    #[test]
    fn test_complete_non_qc_uses_launched_panels() {
        let row = in_progress("proc-1", 100);
        let mut req = update("proc-1", ProcessStatus::Completed);
        req.launched_panels = Some(95);
        let done = apply(&row, &process("proc-1"), &admin(), &req, now()).unwrap();
        assert!(done.completed());
        assert_eq!(done.row.quantity_out, 95);
        assert_eq!(done.row.launched_panels, 95);
        assert_eq!(done.row.end_time, Some(now()));
    }

    #[test]
    fn test_complete_qc_uses_in_and_out() {
        let row = in_progress("proc-7", 100);
        let mut req = update("proc-7", ProcessStatus::Completed);
        req.quantity_in = Some(98);
        req.quantity_out = Some(97);
        let done = apply(&row, &process("proc-7"), &admin(), &req, now()).unwrap();
        assert_eq!(done.row.quantity_in, 98);
        assert_eq!(done.row.quantity_out, 97);
        assert_eq!(done.row.launched_panels, 0);
    }

    #[test]
    fn test_output_cannot_exceed_input() {
        let row = in_progress("proc-7", 10);
        let mut req = update("proc-7", ProcessStatus::Completed);
        req.quantity_out = Some(11);
        let err = apply(&row, &process("proc-7"), &admin(), &req, now()).unwrap_err();
        assert!(
            matches!(err, TrackerError::Validation { ref field, .. } if field == "quantityOut")
        );
    }

    #[test]
    fn test_negative_quantity_rejected() {
        let row = in_progress("proc-1", 10);
        let mut req = update("proc-1", ProcessStatus::Completed);
        req.launched_panels = Some(-1);
        let err = apply(&row, &process("proc-1"), &admin(), &req, now()).unwrap_err();
        assert!(matches!(err, TrackerError::Validation { .. }));
    }

    #[test]
    fn test_invalid_transition_reports_states() {
        let row = JobProcess::pending("job-1", "proc-3");
        let req = update("proc-3", ProcessStatus::Completed);
        match apply(&row, &process("proc-3"), &admin(), &req, now()) {
            Err(TrackerError::InvalidTransition { from, to, .. }) => {
                assert_eq!(from, ProcessStatus::Pending);
                assert_eq!(to, ProcessStatus::Completed);
            }
            other => panic!("Expected InvalidTransition, got {:?}", other),
        }
    }

    #[test]
    fn test_rework_with_remaining_quantity_stays_in_progress() {
        let mut row = in_progress("proc-7", 100);
        row.status = ProcessStatus::Completed;
        row.end_time = Some(now());
        let mut req = update("proc-7", ProcessStatus::InProgress);
        req.quantity_in = Some(100);
        req.quantity_out = Some(80);

        let reworked = apply(&row, &process("proc-7"), &admin(), &req, now()).unwrap();
        assert_eq!(reworked.transition, Transition::Rework);
        assert_eq!(reworked.row.rework_quantity_in, 20);
        assert_eq!(reworked.row.rework_quantity_out, 0);
        assert_eq!(reworked.row.pending_quantity(), 20);
        assert_eq!(reworked.row.status, ProcessStatus::InProgress);
        assert!(reworked.row.end_time.is_none());
        assert!(!reworked.completed());
    }

    #[test]
    fn test_rework_with_nothing_pending_completes() {
        let row = in_progress("proc-7", 100);
        let mut req = update("proc-7", ProcessStatus::InProgress);
        req.quantity_out = Some(100);

        let reworked = apply(&row, &process("proc-7"), &admin(), &req, now()).unwrap();
        assert_eq!(reworked.row.status, ProcessStatus::Completed);
        assert_eq!(reworked.row.end_time, Some(now()));
        assert!(reworked.completed());
    }

    #[test]
    fn test_rework_scrap_is_written_off() {
        let row = in_progress("proc-13", 100);
        let mut req = update("proc-13", ProcessStatus::InProgress);
        req.quantity_out = Some(90);
        req.rework_quantity_in = Some(4);

        let reworked = apply(&row, &process("proc-13"), &admin(), &req, now()).unwrap();
        assert_eq!(reworked.row.rework_quantity_out, 6);
        assert_eq!(reworked.row.pending_quantity(), 4);
    }

    #[test]
    fn test_rework_remaining_bounded_by_unfinished() {
        let row = in_progress("proc-13", 100);
        let mut req = update("proc-13", ProcessStatus::InProgress);
        req.quantity_out = Some(90);
        req.rework_quantity_in = Some(11);
        assert!(apply(&row, &process("proc-13"), &admin(), &req, now()).is_err());
    }

    #[test]
    fn test_advance_activates_pending_successor() {
        let catalog = ProcessCatalog::standard();
        let mut rows = seed_rows("job-1", &catalog, 100, now());
        rows[0].status = ProcessStatus::Completed;
        rows[0].quantity_out = 96;
        rows[1].assigned_to = Some("u9".into());

        let later = now() + Duration::minutes(30);
        let advanced = advance(&rows, &catalog, "proc-1", later);
        assert_eq!(advanced[1].status, ProcessStatus::InProgress);
        assert_eq!(advanced[1].quantity_in, 96);
        assert_eq!(advanced[1].start_time, Some(later));
        assert!(advanced[1].assigned_to.is_none());
        assert_eq!(advanced[2..], rows[2..]);
    }

    #[test]
    fn test_advance_leaves_started_successor_alone() {
        let catalog = ProcessCatalog::standard();
        let mut rows = seed_rows("job-1", &catalog, 100, now());
        rows[0].status = ProcessStatus::Completed;
        rows[1].status = ProcessStatus::Rejected;
        assert_eq!(advance(&rows, &catalog, "proc-1", now()), rows);
    }

    #[test]
    fn test_advance_is_noop_for_last_or_unfinished() {
        let catalog = ProcessCatalog::standard();
        let mut rows = seed_rows("job-1", &catalog, 100, now());
        assert_eq!(advance(&rows, &catalog, "proc-1", now()), rows);
        rows[16].status = ProcessStatus::Completed;
        assert_eq!(advance(&rows, &catalog, "proc-17", now()), rows);
    }

    #[test]
    fn test_visibility_by_assignment_and_department() {
        let drilling = process("proc-2");
        let mut row = JobProcess::pending("job-1", "proc-2");
        assert!(visible_to(&user("Drilling"), &row, &drilling));
        assert!(!visible_to(&user("Cutting"), &row, &drilling));
        row.assigned_to = Some("someone-else".into());
        assert!(!visible_to(&user("Drilling"), &row, &drilling));
        assert!(visible_to(&admin(), &row, &drilling));
    }
}
