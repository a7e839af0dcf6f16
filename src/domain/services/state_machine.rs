use crate::domain::entities::JobStatus;
use crate::domain::errors::TransitionError;

/// Validates if a job status transition is allowed.
///
/// `pending` and `evaluating` are the only live states; every other state is terminal
/// and can never be left.
pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), TransitionError> {
    use JobStatus::*;

    match (from, to) {
        // Claiming and releasing a follow-up
        (Pending, Evaluating) | (Evaluating, Pending) => Ok(()),

        // Deferral re-arms a live job
        (Pending, Pending) => Ok(()),

        (Pending | Evaluating, Sent | Failed | Cancelled | Skipped) => Ok(()),

        _ => Err(TransitionError::InvalidTransition { from, to }),
    }
}

/// States a job may be in for a move to `to` to be legal. Used to build guarded
/// `UPDATE ... WHERE status IN (...)` statements.
pub fn source_states(to: JobStatus) -> &'static [JobStatus] {
    use JobStatus::*;

    match to {
        Evaluating => &[Pending],
        Pending => &[Pending, Evaluating],
        Sent | Failed | Cancelled | Skipped => &[Pending, Evaluating],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use JobStatus::*;

    const ALL: [JobStatus; 6] = [Pending, Evaluating, Sent, Failed, Cancelled, Skipped];

    #[test]
    fn test_pending_to_terminal_valid() {
        for to in [Sent, Failed, Cancelled, Skipped] {
            assert!(validate_transition(Pending, to).is_ok());
            assert!(validate_transition(Evaluating, to).is_ok());
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in [Sent, Failed, Cancelled, Skipped] {
            for to in ALL {
                let result = validate_transition(from, to);
                assert!(
                    matches!(result, Err(TransitionError::InvalidTransition { .. })),
                    "{} -> {} should be rejected",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_release_after_evaluation_valid() {
        assert!(validate_transition(Evaluating, Pending).is_ok());
        assert!(validate_transition(Pending, Evaluating).is_ok());
        assert!(validate_transition(Evaluating, Evaluating).is_err());
    }

    #[test]
    fn test_source_states_agree_with_validation() {
        for to in ALL {
            for from in ALL {
                let allowed = source_states(to).contains(&from);
                assert_eq!(allowed, validate_transition(from, to).is_ok(), "{} -> {}", from, to);
            }
        }
    }
}
