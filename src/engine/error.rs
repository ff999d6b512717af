use thiserror::Error;
use ulid::Ulid;

use crate::limits::{MAX_PARTY_SIZE, MIN_PARTY_SIZE};
use crate::model::{Ms, UnitKind};

/// Malformed or out-of-range input. The caller can fix the request and retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("first name is required")]
    FirstNameRequired,
    #[error("last name is required")]
    LastNameRequired,
    #[error("phone is required")]
    PhoneRequired,
    #[error("invalid phone format (e.g. 12345678 or +21612345678)")]
    InvalidPhone,
    #[error("guest name too long")]
    NameTooLong,
    #[error("party size must be between {min} and {max}, got {0}", min = MIN_PARTY_SIZE, max = MAX_PARTY_SIZE)]
    PartySizeOutOfRange(u32),
    #[error("start must be before end (start {start}, end {end})")]
    InvalidInterval { start: Ms, end: Ms },
    #[error("timestamp out of range")]
    TimestampOutOfRange,
    #[error("reservation span too wide")]
    SpanTooWide,
    #[error("one guest per seat")]
    OneGuestPerSeat,
    #[error("max capacity: {max} guests")]
    CapacityExceeded { max: u32 },
    #[error("capacity must be at least 1")]
    ZeroCapacity,
    #[error("label too long")]
    LabelTooLong,
    #[error("unit {0} cannot change venue or kind")]
    ImmutableUnitField(Ulid),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{kind} not found: {id}")]
    UnitNotFound { kind: &'static str, id: Ulid },
    #[error("reservation not found: {0}")]
    ReservationNotFound(Ulid),
    #[error("this {} is already reserved for the selected time (conflicts with {existing})", .kind.noun())]
    Conflict { kind: UnitKind, existing: Ulid },
    #[error("reservation {0} already cancelled")]
    AlreadyCancelled(Ulid),
    #[error("unit already exists: {0}")]
    UnitExists(Ulid),
    #[error("venue {venue_id} already has {} number {number}", .kind.noun())]
    DuplicateUnitNumber {
        venue_id: Ulid,
        kind: UnitKind,
        number: u32,
    },
    #[error("WAL error: {0}")]
    WalError(String),
}

/// Coarse classification the HTTP layer maps to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Internal,
}

impl EngineError {
    pub fn unit_not_found(kind: UnitKind, id: Ulid) -> Self {
        EngineError::UnitNotFound {
            kind: kind.noun(),
            id,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::UnitNotFound { .. } | EngineError::ReservationNotFound(_) => {
                ErrorKind::NotFound
            }
            EngineError::Conflict { .. }
            | EngineError::AlreadyCancelled(_)
            | EngineError::UnitExists(_)
            | EngineError::DuplicateUnitNumber { .. } => ErrorKind::Conflict,
            EngineError::WalError(_) => ErrorKind::Internal,
        }
    }
}
