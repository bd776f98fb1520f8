use ulid::Ulid;

use crate::model::ReservationStatus;

/// Machine-checkable error category; the HTTP layer maps these to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Unauthorized,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    Validation(String),
    CarNotFound(Ulid),
    ReservationNotFound(Ulid),
    /// Requested range overlaps this active reservation.
    Conflict(Ulid),
    CarHasActiveReservations(Ulid),
    AdminExists(String),
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },
    Unauthorized(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) | EngineError::LimitExceeded(_) => ErrorKind::Validation,
            EngineError::CarNotFound(_) | EngineError::ReservationNotFound(_) => {
                ErrorKind::NotFound
            }
            EngineError::Conflict(_)
            | EngineError::CarHasActiveReservations(_)
            | EngineError::AdminExists(_)
            | EngineError::InvalidTransition { .. } => ErrorKind::Conflict,
            EngineError::Unauthorized(_) => ErrorKind::Unauthorized,
            EngineError::WalError(_) | EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => f.write_str(msg),
            EngineError::CarNotFound(id) => write!(f, "car not found: {id}"),
            EngineError::ReservationNotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::Conflict(id) => {
                write!(f, "car is already reserved for the selected dates (reservation {id})")
            }
            EngineError::CarHasActiveReservations(id) => {
                write!(f, "cannot delete car {id}: it has active reservations")
            }
            EngineError::AdminExists(email) => write!(f, "admin already exists: {email}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot change reservation status from {from} to {to}")
            }
            EngineError::Unauthorized(msg) => f.write_str(msg),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
            EngineError::Internal(e) => write!(f, "internal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
