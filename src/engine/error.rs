use ulid::Ulid;

use crate::model::{AppointmentStatus, Span};

#[derive(Debug)]
pub enum EngineError {
    /// Malformed input (inverted range, empty name, bad slot length).
    /// Rejected before any store access.
    Validation(&'static str),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Overlaps the window or approved appointment with this id.
    Conflict(Ulid),
    /// Requested range is not contained in any availability window.
    NotCovered { requested: Span },
    /// Caller lacks the required role or does not own the entity.
    PermissionDenied,
    /// The appointment's current status does not admit the transition.
    InvalidTransition { from: AppointmentStatus },
    AlreadyCheckedIn(Ulid),
    /// Check-in attempted outside its window; carries the valid bounds.
    TimingWindow { allowed: Span },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict(id) => write!(f, "conflict with entry: {id}"),
            EngineError::NotCovered { requested } => write!(
                f,
                "[{}, {}) is not covered by any availability window",
                requested.start, requested.end
            ),
            EngineError::PermissionDenied => write!(f, "permission denied"),
            EngineError::InvalidTransition { from } => {
                write!(f, "invalid transition from status: {from}")
            }
            EngineError::AlreadyCheckedIn(id) => write!(f, "already checked in: {id}"),
            EngineError::TimingWindow { allowed } => write!(
                f,
                "outside the check-in window [{}, {}]",
                allowed.start, allowed.end
            ),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    /// Conflict-class rejections (spec'd as user-facing "conflict" messages):
    /// overlap with an existing entry or a range outside all windows.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict(_) | EngineError::NotCovered { .. })
    }
}
