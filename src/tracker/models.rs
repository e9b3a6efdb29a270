use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of production processes every job is broken into.
pub const PROCESS_COUNT: usize = 17;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Employee => "employee",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "employee" => Ok(Self::Employee),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when the user's department names the given process.
    pub fn works_in(&self, process_name: &str) -> bool {
        self.department
            .as_deref()
            .is_some_and(|d| d.trim().eq_ignore_ascii_case(process_name.trim()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub process_id: String,
    pub process_name: String,
    pub sequence_number: u32,
}

/// Overall status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Overdue,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Overdue => "Overdue",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "In Progress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            "Overdue" => Ok(Self::Overdue),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// Status of a single job process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProcessStatus {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Rejected,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Rejected => "Rejected",
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "In Progress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            "Rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid process status: {}", s)),
        }
    }
}

/// Manufacturing attributes carried on a job card. None of them drive the
/// workflow; they are stored and echoed as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct JobAttributes {
    pub layers: Option<u32>,
    pub board_thickness: Option<String>,
    pub copper_thickness: Option<String>,
    pub surface_finish: Option<String>,
    pub solder_mask_color: Option<String>,
    pub legend_color: Option<String>,
    pub panel_size: Option<String>,
    pub pcb_per_panel: Option<u32>,
    pub array_size: Option<String>,
    pub impedance_control: Option<bool>,
    pub via_filling: Option<String>,
    pub gold_finger: Option<bool>,
    pub drawing_no: Option<String>,
    pub revision: Option<String>,
    pub delivery_mode: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,
    #[serde(default)]
    pub ref_no: Option<String>,
    pub customer_name: String,
    pub part_no: String,
    #[serde(default)]
    pub po_no: Option<String>,
    pub quantity: i64,
    pub launched_panels: i64,
    pub material: String,
    #[serde(default)]
    pub order_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub status: JobStatus,
    #[serde(default)]
    pub attributes: JobAttributes,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Lookup key: the reference number when one is set, the job id otherwise.
    pub fn key(&self) -> String {
        resolve_job_key(&self.job_id, self.ref_no.as_deref())
    }

    /// Case-insensitive match against the key or the job id.
    pub fn matches(&self, id: &str) -> bool {
        let needle = id.trim().to_lowercase();
        self.key() == needle || self.job_id.to_lowercase() == needle
    }
}

/// Resolve the lookup key for a job: `ref_no` if it has non-blank content,
/// otherwise `job_id`, lower-cased either way.
pub fn resolve_job_key(job_id: &str, ref_no: Option<&str>) -> String {
    match ref_no.map(str::trim) {
        Some(r) if !r.is_empty() => r.to_lowercase(),
        _ => job_id.trim().to_lowercase(),
    }
}

/// Input for creating or editing a job. Required fields are optional here so
/// that absence can be reported as a validation error rather than a decode
/// failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobData {
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub ref_no: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub part_no: Option<String>,
    #[serde(default)]
    pub po_no: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub launched_panels: Option<i64>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub order_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub attributes: JobAttributes,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobProcess {
    pub id: String,
    pub job_id: String,
    pub process_id: String,
    pub assigned_to: Option<String>,
    pub status: ProcessStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub quantity_in: i64,
    pub quantity_out: i64,
    pub rework_quantity_in: i64,
    pub rework_quantity_out: i64,
    pub launched_panels: i64,
}

impl JobProcess {
    /// A fresh, untouched row for `process_id` under `job_key`.
    pub fn pending(job_key: &str, process_id: &str) -> Self {
        Self {
            id: format!("{}:{}", job_key, process_id),
            job_id: job_key.to_string(),
            process_id: process_id.to_string(),
            assigned_to: None,
            status: ProcessStatus::Pending,
            start_time: None,
            end_time: None,
            remarks: None,
            quantity_in: 0,
            quantity_out: 0,
            rework_quantity_in: 0,
            rework_quantity_out: 0,
            launched_panels: 0,
        }
    }

    /// quantity_in − quantity_out − rework_quantity_out
    pub fn pending_quantity(&self) -> i64 {
        self.quantity_in - self.quantity_out - self.rework_quantity_out
    }
}

/// A job together with its process rows in sequence order. This is the unit
/// of delete, restore and undo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobWithProcesses {
    #[serde(flatten)]
    pub job: Job,
    pub processes: Vec<JobProcess>,
}

/// A status-change request for one job process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub job_id: String,
    pub process_id: String,
    pub new_status: ProcessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity_out: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rework_quantity_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rework_quantity_out: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launched_panels: Option<i64>,
}

/// Response to a status change: the request echoed back plus the token that
/// undoes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReceipt {
    #[serde(flatten)]
    pub update: StatusUpdate,
    pub undo_token: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_key_prefers_ref_no() {
        assert_eq!(resolve_job_key("job-010", Some("6")), "6");
        assert_eq!(resolve_job_key("job-010", Some("")), "job-010");
        assert_eq!(resolve_job_key("job-010", Some(" ")), "job-010");
        assert_eq!(resolve_job_key("JOB-010", None), "job-010");
        assert_eq!(resolve_job_key("job-010", Some(" RX-7 ")), "rx-7");
    }

    #[test]
    fn test_process_status_roundtrip() {
        for s in &["Pending", "In Progress", "Completed", "Rejected"] {
            let parsed: ProcessStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("in_progress".parse::<ProcessStatus>().is_err());
    }

    #[test]
    fn test_job_status_roundtrip() {
        for s in &["Pending", "In Progress", "Completed", "Overdue"] {
            let parsed: JobStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("Done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_display_strings() {
        assert_eq!(
            serde_json::to_string(&ProcessStatus::InProgress).unwrap(),
            "\"In Progress\""
        );
        assert_eq!(
            serde_json::from_str::<ProcessStatus>("\"Rejected\"").unwrap(),
            ProcessStatus::Rejected
        );
        assert_eq!(serde_json::to_string(&Role::Employee).unwrap(), "\"employee\"");
    }

    #[test]
    fn test_pending_quantity() {
        let mut row = JobProcess::pending("job-1", "proc-3");
        row.quantity_in = 100;
        row.quantity_out = 70;
        row.rework_quantity_out = 10;
        assert_eq!(row.pending_quantity(), 20);
        assert_eq!(row.id, "job-1:proc-3");
    }

    #[test]
    fn test_user_department_match_ignores_case() {
        let user = User {
            id: "u1".into(),
            name: "Ravi".into(),
            role: Role::Employee,
            department: Some("drilling".into()),
        };
        assert!(user.works_in("Drilling"));
        assert!(!user.works_in("Cutting"));
    }

    #[test]
    fn test_status_update_decodes_camel_case() {
        let json = r#"{"jobId":"6","processId":"proc-2","newStatus":"Completed","userId":"u1","launchedPanels":10}"#;
        let update: StatusUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(update.new_status, ProcessStatus::Completed);
        assert_eq!(update.launched_panels, Some(10));
        assert!(update.quantity_in.is_none());
    }
}
