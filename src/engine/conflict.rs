use crate::model::*;

use super::{EngineError, ValidationError};

/// Any non-cancelled reservation overlapping `span` is a conflict.
/// Caller holds the unit's write lock across this check and the insert.
pub(crate) fn check_no_overlap(us: &UnitState, span: &Span) -> Result<(), EngineError> {
    match us.active_overlapping(span).next() {
        Some(existing) => Err(EngineError::Conflict {
            kind: us.unit.kind(),
            existing: existing.id,
        }),
        None => Ok(()),
    }
}

pub(crate) fn check_party_fits(unit: &Unit, party_size: u32) -> Result<(), ValidationError> {
    match &unit.details {
        UnitDetails::Seat { .. } if party_size > 1 => Err(ValidationError::OneGuestPerSeat),
        details if party_size > details.capacity() => Err(ValidationError::CapacityExceeded {
            max: details.capacity(),
        }),
        _ => Ok(()),
    }
}

/// A nonzero override wins; otherwise the unit's base price.
pub(crate) fn effective_price(unit: &Unit, price_override: Option<Price>) -> Price {
    price_override
        .filter(|p| *p != 0)
        .unwrap_or(unit.base_price)
}

/// Status is only meaningful relative to a window; without one every unit is available.
pub(crate) fn unit_status(us: &UnitState, window: Option<&Span>) -> UnitStatus {
    match window {
        Some(span) if us.active_overlapping(span).next().is_some() => UnitStatus::Reserved,
        _ => UnitStatus::Available,
    }
}
