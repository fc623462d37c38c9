use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_range(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::Validation("start must be before end"));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(span)
}

/// No two availability windows of one hall may overlap. Touching endpoints
/// are fine (half-open spans).
pub(crate) fn check_window_overlap(hs: &HallState, span: &Span) -> Result<(), EngineError> {
    for entry in hs.overlapping(span) {
        if entry.is_window() {
            return Err(EngineError::Conflict(entry.id));
        }
    }
    Ok(())
}

/// A booking request must sit fully inside a single availability window.
pub(crate) fn check_covered(hs: &HallState, span: &Span) -> Result<(), EngineError> {
    let covered = hs
        .overlapping(span)
        .any(|e| e.is_window() && e.span.contains_span(span));
    if covered {
        Ok(())
    } else {
        Err(EngineError::NotCovered { requested: *span })
    }
}

/// No overlap with approved appointments of the hall. `exclude` skips the
/// appointment currently being re-validated for its own approval.
pub(crate) fn check_approved_overlap(
    hs: &HallState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    for entry in hs.overlapping(span) {
        if entry.is_approved() && Some(entry.id) != exclude {
            return Err(EngineError::Conflict(entry.id));
        }
    }
    Ok(())
}

/// Check-in opens `CHECKIN_LEAD_MS` before the appointment starts and closes
/// at its end instant (inclusive).
pub(crate) fn checkin_window(span: &Span) -> Span {
    Span::new(span.start - CHECKIN_LEAD_MS, span.end)
}
