use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Reject ranges that are empty, inverted, outside the representable calendar,
/// or wider than `max_width`.
pub(crate) fn validate_range(start: Ms, end: Ms, max_width: Ms) -> Result<DateRange, EngineError> {
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("date out of range"));
    }
    if start >= end {
        return Err(EngineError::validation("End date must be after start date"));
    }
    if end - start > max_width {
        return Err(EngineError::LimitExceeded("date range too wide"));
    }
    Ok(DateRange::new(start, end))
}

/// First active reservation on this car whose closed range intersects `range`.
pub(crate) fn find_conflict(cs: &CarState, range: &DateRange) -> Option<Ulid> {
    cs.overlapping(range)
        .find(|r| r.is_active())
        .map(|r| r.id)
}

pub(crate) fn check_no_conflict(cs: &CarState, range: &DateRange) -> Result<(), EngineError> {
    match find_conflict(cs, range) {
        Some(id) => Err(EngineError::Conflict(id)),
        None => Ok(()),
    }
}
