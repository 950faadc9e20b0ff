//! Error types for flowsim

use thiserror::Error;

use crate::domain::locking::LockError;

/// Result type alias using flowsim's Error
pub type Result<T> = std::result::Result<T, Error>;

/// flowsim error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Entity errors (E001-E099)
    #[error("Entity not found: entityType={entity_type} flowId={flow_id} projectId={project_id}")]
    NotFound {
        entity_type: &'static str,
        flow_id: String,
        project_id: String,
    },

    // Lock errors (E300-E399)
    #[error("Lock timeout: {0}. Another caller is transitioning this flow, try again later.")]
    LockTimeout(String),

    #[error("Lock error: {0}")]
    Lock(LockError),

    // Store errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Store failure: {0}")]
    StoreFailed(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Hook errors (E1000-E1099)
    #[error("Hook execution failed: {0}")]
    HookFailed(String),
}

impl Error {
    /// Build the not-found error for a simulation lookup
    pub fn simulation_not_found(flow_id: impl ToString, project_id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: "webhookSimulation",
            flow_id: flow_id.to_string(),
            project_id: project_id.to_string(),
        }
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "E001",
            Self::LockTimeout(_) => "E300",
            Self::Lock(_) => "E301",
            Self::DatabaseError(_) => "E400",
            Self::StoreFailed(_) => "E401",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::HookFailed(_) => "E1000",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NotFound { flow_id, project_id, .. } => Some(format!(
                "flowsim create --flow {} --project {}",
                flow_id, project_id
            )),
            Self::LockTimeout(_) => Some("flowsim locks list".to_string()),
            Self::Lock(LockError::Corrupted(_)) | Self::Lock(LockError::StaleLock { .. }) => {
                Some("flowsim locks cleanup".to_string())
            }
            Self::ConfigError(_) => Some("flowsim config list".to_string()),
            _ => None,
        }
    }

    /// Whether this error means the target record does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<LockError> for Error {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { .. } => Self::LockTimeout(err.to_string()),
            other => Self::Lock(other),
        }
    }
}
