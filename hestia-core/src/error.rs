//! Engine error taxonomy
//!
//! Every component error is converted into an [`EngineError`] and translated
//! into a status code at the exchange boundary. Nothing crosses a request.

use crate::http::{HttpError, StatusCode};

/// Engine result type
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Authentication required")]
    AuthChallenge { stale: bool },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Method {method} not allowed, allowed: {allow}")]
    MethodNotAllowed { method: String, allow: String },
    #[error("Precondition failed")]
    PreconditionFailed,
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("Range not satisfiable for {size} bytes")]
    RangeNotSatisfiable { size: u64 },
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Internal engine error: {0}")]
    Internal(String),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl EngineError {
    /// Status code surfaced to the client
    pub fn status(&self) -> StatusCode {
        match self {
            EngineError::NotFound(_) => StatusCode::NotFound,
            EngineError::BadRequest(_) | EngineError::Http(_) => StatusCode::BadRequest,
            EngineError::AuthChallenge { .. } => StatusCode::Unauthorized,
            EngineError::Forbidden(_) => StatusCode::Forbidden,
            EngineError::MethodNotAllowed { .. } => StatusCode::MethodNotAllowed,
            EngineError::PreconditionFailed => StatusCode::PreconditionFailed,
            EngineError::PayloadTooLarge { .. } => StatusCode::PayloadTooLarge,
            EngineError::RangeNotSatisfiable { .. } => StatusCode::RangeNotSatisfiable,
            EngineError::NotImplemented(_) => StatusCode::NotImplemented,
            EngineError::Internal(_) | EngineError::Io(_) | EngineError::Anyhow(_) => {
                StatusCode::InternalServerError
            }
        }
    }

    /// Errors whose cause must stay out of the response body
    pub fn is_internal(&self) -> bool {
        self.status() == StatusCode::InternalServerError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(EngineError::NotFound("/x".into()).status(), StatusCode::NotFound);
        assert_eq!(EngineError::AuthChallenge { stale: true }.status(), StatusCode::Unauthorized);
        assert_eq!(EngineError::RangeNotSatisfiable { size: 1 }.status().as_u16(), 416);
        assert!(EngineError::Io(std::io::Error::other("disk")).is_internal());
        assert!(!EngineError::PreconditionFailed.is_internal());
    }
}
