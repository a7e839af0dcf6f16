use thiserror::Error;

use crate::domain::entities::{JobKind, JobStatus};

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    #[error("{kind} job not found: {id}")]
    NotFound { kind: JobKind, id: String },
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Why content could not be produced for a job
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("mapping mismatch: template '{template}' has {expected} placeholders but mapping has {actual}")]
    MappingMismatch {
        template: String,
        expected: usize,
        actual: usize,
    },
    #[error("approved template '{name}' ({language}) not found")]
    TemplateNotFound { name: String, language: String },
    #[error("no template available")]
    NoTemplateAvailable,
    #[error("unknown template variable '{0}'")]
    UnknownVariable(String),
    #[error("AI declined to send: {0}")]
    Declined(String),
    #[error("text generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ResolutionError {
    /// Configuration defects skip the job; everything else is a dispatch failure
    pub fn is_config_defect(&self) -> bool {
        matches!(
            self,
            ResolutionError::MappingMismatch { .. }
                | ResolutionError::TemplateNotFound { .. }
                | ResolutionError::NoTemplateAvailable
                | ResolutionError::UnknownVariable(_)
                | ResolutionError::Declined(_)
        )
    }
}

#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("timed out after {0} seconds")]
    Timeout(u64),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("provider returned an empty response")]
    Empty,
}

/// Outcome of a failed webhook delivery attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Timeouts, connection errors, 5xx and 429; retried
    #[error("{0}")]
    Transient(String),
    /// 4xx other than 429; never retried
    #[error("{0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Transient(_))
    }

    /// Classify an HTTP status that is not 2xx
    pub fn from_status(status: u16, detail: String) -> Self {
        if status == 429 || status >= 500 || status < 400 {
            DeliveryError::Transient(detail)
        } else {
            DeliveryError::Permanent(detail)
        }
    }
}
