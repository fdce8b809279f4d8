//! Admission error types

use thiserror::Error;

use super::types::{PlaceholderId, PlaceholderStatus};
use super::singleflight::FlightAborted;

/// Errors from key derivation, the admission store and the service.
///
/// `Clone` so a single store outcome can be handed to every caller joined on
/// the same flight. A key collision is not an error: stores report it as
/// [`Insertion::Conflict`](super::store::Insertion::Conflict).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// Context is missing or carries invalid discriminating fields.
    #[error("invalid context: {0}")]
    InvalidContext(String),

    /// Transient infrastructure failure (connection, pool, lock contention).
    /// Callers may retry with backoff.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// No placeholder with this id.
    #[error("placeholder not found: {0}")]
    NotFound(PlaceholderId),

    /// Requested status change is not allowed from the current status.
    #[error("placeholder {id} is {current}, cannot become {target}")]
    InvalidTransition {
        id: PlaceholderId,
        current: PlaceholderStatus,
        target: PlaceholderStatus,
    },

    /// Non-transient storage failure (bad query, corrupt row).
    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for admission operations.
pub type AdmissionResult<T> = Result<T, AdmissionError>;

impl AdmissionError {
    /// Whether the caller should retry the operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, AdmissionError::StorageUnavailable(_))
    }
}

impl From<sqlx::Error> for AdmissionError {
    fn from(err: sqlx::Error) -> Self {
        let transient = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => true,
            sqlx::Error::Database(db_err) => is_busy_or_locked(db_err.as_ref()),
            _ => false,
        };

        if transient {
            AdmissionError::StorageUnavailable(err.to_string())
        } else {
            AdmissionError::Storage(err.to_string())
        }
    }
}

impl From<mss_common::Error> for AdmissionError {
    fn from(err: mss_common::Error) -> Self {
        match err {
            mss_common::Error::Database(db_err) => db_err.into(),
            mss_common::Error::Io(io_err) => AdmissionError::StorageUnavailable(io_err.to_string()),
            other => AdmissionError::Internal(other.to_string()),
        }
    }
}

impl From<FlightAborted> for AdmissionError {
    fn from(_: FlightAborted) -> Self {
        AdmissionError::Internal("admission task aborted before completing".to_string())
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes.
fn is_busy_or_locked(db_err: &dyn sqlx::error::DatabaseError) -> bool {
    let primary_code = db_err
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| code & 0xff);

    matches!(primary_code, Some(5) | Some(6)) || db_err.message().contains("database is locked")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(AdmissionError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(AdmissionError::from(sqlx::Error::PoolClosed).is_transient());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(AdmissionError::from(sqlx::Error::Io(io)).is_transient());
    }

    #[test]
    fn test_row_not_found_is_not_transient() {
        let err = AdmissionError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, AdmissionError::Storage(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_common_errors_map() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        assert!(AdmissionError::from(mss_common::Error::Io(io)).is_transient());
        assert!(matches!(
            AdmissionError::from(mss_common::Error::Config("x".into())),
            AdmissionError::Internal(_)
        ));
    }

    #[test]
    fn test_invalid_transition_message() {
        let id = PlaceholderId::from_uuid(uuid::Uuid::nil());
        let err = AdmissionError::InvalidTransition {
            id,
            current: PlaceholderStatus::Abandoned,
            target: PlaceholderStatus::Finalized,
        };
        assert_eq!(
            err.to_string(),
            "placeholder 00000000-0000-0000-0000-000000000000 is abandoned, cannot become finalized"
        );
    }
}
