//! Typed error hierarchy for the job tracker.
//!
//! `TrackerError` covers the lifecycle, workflow and store layers. Store
//! implementations report `anyhow::Error`, which converts into the transient
//! `Store` variant through `?`.

use thiserror::Error;

use crate::tracker::models::ProcessStatus;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Job {id} not found")]
    JobNotFound { id: String },

    #[error("User {id} not found")]
    UserNotFound { id: String },

    #[error("Process {id} not found")]
    ProcessNotFound { id: String },

    #[error("Process {process_id} not found on job {job_id}")]
    JobProcessNotFound { job_id: String, process_id: String },

    #[error("Undo entry {token} not found")]
    UndoEntryNotFound { token: String },

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Cannot move {process_id} from {from} to {to}")]
    InvalidTransition {
        process_id: String,
        from: ProcessStatus,
        to: ProcessStatus,
    },

    #[error("User {user_id} may not work on {process_name}")]
    Forbidden {
        user_id: String,
        process_name: String,
    },

    #[error("Job {id} already exists")]
    Conflict { id: String },

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrackerError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// True for failures that leave the records untouched and may succeed
    /// on a retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_) | Self::LockPoisoned)
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
