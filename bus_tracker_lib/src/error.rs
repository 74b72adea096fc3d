use std::fmt;

/// Every way an action against the tracking core can be rejected.
///
/// All variants are recoverable: the action is refused and the state it
/// targeted is left exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// The trip state machine does not allow the action in its current state.
    InvalidTransition(String),
    /// No attendance record exists for the student at the current stop.
    UnknownStudent(String),
    /// The student's record has already left `pending`.
    AlreadyRecorded(String),
    /// A path needs at least two waypoints.
    InvalidPath(usize),
    /// Lookup of a stop or route by an identifier or index that does not exist.
    NotFound(String),
    /// A route was configured without stops or with duplicate stop ids.
    InvalidRoute(String),
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::InvalidTransition(msg) => write!(f, "Invalid transition: {msg}"),
            TrackerError::UnknownStudent(id) => write!(f, "No pending record for student {id} at the current stop"),
            TrackerError::AlreadyRecorded(id) => write!(f, "Attendance already recorded for student {id}"),
            TrackerError::InvalidPath(len) => write!(f, "A path needs at least 2 waypoints, got {len}"),
            TrackerError::NotFound(what) => write!(f, "Not found: {what}"),
            TrackerError::InvalidRoute(msg) => write!(f, "Invalid route: {msg}"),
        }
    }
}

impl std::error::Error for TrackerError {}

impl TrackerError {
    pub(crate) fn no_active_trip(action: &str) -> Self {
        TrackerError::InvalidTransition(format!("cannot {action}, no active trip"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offending_input() {
        let msg = TrackerError::InvalidPath(1).to_string();
        assert!(msg.contains("got 1"), "got: {msg}");

        let msg = TrackerError::AlreadyRecorded("s1".into()).to_string();
        assert!(msg.contains("s1"), "got: {msg}");
    }

    #[test]
    fn no_active_trip_is_an_invalid_transition() {
        let err = TrackerError::no_active_trip("advance");
        assert!(matches!(err, TrackerError::InvalidTransition(ref msg) if msg.contains("advance")));
    }
}
