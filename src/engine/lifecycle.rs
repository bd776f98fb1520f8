use crate::model::ReservationStatus::{self, *};

use super::EngineError;

/// Reservation status transition table.
///
/// ```text
/// pending   -> confirmed | cancelled
/// confirmed -> completed | cancelled
/// completed, cancelled: terminal
/// ```
pub fn can_transition(from: ReservationStatus, to: ReservationStatus) -> bool {
    matches!(
        (from, to),
        (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
    )
}

pub(crate) fn check_transition(
    from: ReservationStatus,
    to: ReservationStatus,
) -> Result<(), EngineError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition { from, to })
    }
}
