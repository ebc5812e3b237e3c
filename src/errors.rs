//! Error types shared by the quota engine and its collaborators.
//!
//! Invalid requests are never errors: they come back as results with
//! `is_valid`/`success` set to `false`.  `LeaveError` covers the
//! remaining failures, chiefly collaborators that could not answer.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LeaveError {
    #[error("leave balance unavailable for user {user_id}: {reason}")]
    BalanceUnavailable { user_id: String, reason: String },
    #[error("{service} failed: {reason}")]
    Service { service: &'static str, reason: String },
    #[error("no successful simulation to execute")]
    NotSimulated,
    #[error("invalid quota policy: {0}")]
    Policy(String),
}

impl LeaveError {
    pub fn service(service: &'static str, reason: impl Into<String>) -> Self {
        LeaveError::Service {
            service,
            reason: reason.into(),
        }
    }
}

pub type LeaveResult<T> = Result<T, LeaveError>;
