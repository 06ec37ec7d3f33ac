use crate::error::Error;
use crate::models::{TranscodeSessionId, TranscodeStatus};

#[derive(Debug, thiserror::Error)]
#[error("invalid transition for session {session_id}: {from:?} -> {to:?}")]
pub struct InvalidTransitionError {
    pub from: TranscodeStatus,
    pub to: TranscodeStatus,
    pub session_id: TranscodeSessionId,
}

impl From<InvalidTransitionError> for Error {
    fn from(err: InvalidTransitionError) -> Self {
        Error::Conflict(err.to_string())
    }
}

/// Valid edges: `queued -> {running, failed, cancelled}`,
/// `running -> {completed, failed, cancelled}`, terminal states have no
/// outgoing edges.
pub fn validate_transition(
    from: TranscodeStatus,
    to: TranscodeStatus,
    session_id: TranscodeSessionId,
) -> Result<(), InvalidTransitionError> {
    let allowed = matches!(
        (from, to),
        (TranscodeStatus::Queued, TranscodeStatus::Running)
            | (TranscodeStatus::Queued, TranscodeStatus::Failed)
            | (TranscodeStatus::Queued, TranscodeStatus::Cancelled)
            | (TranscodeStatus::Running, TranscodeStatus::Completed)
            | (TranscodeStatus::Running, TranscodeStatus::Failed)
            | (TranscodeStatus::Running, TranscodeStatus::Cancelled)
    );

    if allowed {
        Ok(())
    } else {
        Err(InvalidTransitionError { from, to, session_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> TranscodeSessionId {
        TranscodeSessionId::new()
    }

    #[test]
    fn queued_to_running_is_valid() {
        assert!(validate_transition(TranscodeStatus::Queued, TranscodeStatus::Running, id()).is_ok());
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        assert!(validate_transition(TranscodeStatus::Completed, TranscodeStatus::Running, id()).is_err());
        assert!(validate_transition(TranscodeStatus::Failed, TranscodeStatus::Completed, id()).is_err());
    }

    #[test]
    fn queued_cannot_jump_to_completed() {
        assert!(validate_transition(TranscodeStatus::Queued, TranscodeStatus::Completed, id()).is_err());
    }
}
