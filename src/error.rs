//! Error types for flaresync.
//!
//! Every variant is run-fatal. The next scheduled invocation recovers by
//! re-planning from freshly read state.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Policy not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    Access(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Conflicting policy modification: {0}")]
    Conflict(String),

    #[error("{operation} failed{}: {message}", priority_suffix(.priority))]
    Operation {
        operation: &'static str,
        priority: Option<u32>,
        message: String,
    },

    #[error("Run exceeded its deadline of {0}s")]
    Timeout(u64),
}

fn priority_suffix(priority: &Option<u32>) -> String {
    match priority {
        Some(p) => format!(" for priority {}", p),
        None => String::new(),
    }
}

impl SyncError {
    /// Build an operation error for a mutation or read call.
    pub fn operation(
        operation: &'static str,
        priority: Option<u32>,
        message: impl Into<String>,
    ) -> Self {
        SyncError::Operation {
            operation,
            priority,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
