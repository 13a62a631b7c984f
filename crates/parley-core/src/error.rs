use parley_db::DbError;
use parley_util::validation::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("storage failure: {0}")]
    Storage(#[source] DbError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable code reported in gateway acknowledgments.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Unauthorized => "unauthorized",
            CoreError::NotFound(_) => "not_found",
            CoreError::ValidationFailed(_) => "validation_failed",
            CoreError::Storage(_) | CoreError::Internal(_) => "storage_failure",
        }
    }

    pub fn validation(field: &str, err: ValidationError) -> Self {
        CoreError::ValidationFailed(format!("{field}: {err}"))
    }
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => CoreError::NotFound("record"),
            other => CoreError::Storage(other),
        }
    }
}
