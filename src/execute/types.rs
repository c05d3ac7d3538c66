//! Execution state types.
//!
//! Defines the state machine for one logical request and the pure decision
//! function that drives it.
//!
//! # State Transitions
//!
//! ```text
//!            execute()
//! Idle ─────────────────→ Attempting(1)
//!                              │
//!          ┌───────────────────┼────────────────────┐
//!          │ transient error   │ success            │ terminal error
//!          │ or retry status   │                    │ or ceiling hit
//!          ↓                   ↓                    ↓
//!     Retrying(n+1)        Succeeded              Failed
//!          │
//!          │ backoff.delay(n) elapsed
//!          ↓
//!     Attempting(n+1)
//! ```

use crate::error::ErrorKind;
use crate::status::Status;
use std::fmt;

/// How a response status steers the attempt loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Map the response and return it.
    Success,
    /// The node is fine but not ready; try again after a backoff.
    Retry,
    /// The request itself was rejected; surface the status.
    RequestError,
}

impl ExecutionState {
    /// Default mapping from a precheck status.
    pub fn from_precheck(status: Status) -> Self {
        match status {
            Status::Busy | Status::PlatformNotActive | Status::PlatformTransactionNotCreated => Self::Retry,
            Status::Ok => Self::Success,
            _ => Self::RequestError,
        }
    }
}

/// State of one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    /// Attempt `n` (1-based) is in flight.
    Attempting(u32),
    /// Waiting out the backoff before attempt `n`.
    Retrying(u32),
    Succeeded,
    Failed,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Attempting(n) => write!(f, "Attempting({})", n),
            Self::Retrying(n) => write!(f, "Retrying({})", n),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// What the loop does after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeed,
    /// Sleep, then run `next_attempt`. `penalize` marks the node unhealthy first.
    Retry { next_attempt: u32, penalize: bool },
    /// Give up with the error as-is.
    Fail,
    /// Retryable, but the attempt ceiling was reached.
    Exhausted { penalize: bool },
}

impl AttemptOutcome {
    pub fn next_state(&self) -> AttemptState {
        match self {
            Self::Succeed => AttemptState::Succeeded,
            Self::Retry { next_attempt, .. } => AttemptState::Retrying(*next_attempt),
            Self::Fail | Self::Exhausted { .. } => AttemptState::Failed,
        }
    }
}

/// Decide what follows attempt `attempt` given how it ended.
///
/// `error` is `None` when the attempt succeeded.
pub fn classify(attempt: u32, max_attempts: u32, error: Option<ErrorKind>) -> AttemptOutcome {
    let penalize = match error {
        None => return AttemptOutcome::Succeed,
        Some(ErrorKind::TransientTransport) => true,
        Some(ErrorKind::TransientApplication) => false,
        Some(_) => return AttemptOutcome::Fail,
    };

    if attempt >= max_attempts {
        AttemptOutcome::Exhausted { penalize }
    } else {
        AttemptOutcome::Retry {
            next_attempt: attempt + 1,
            penalize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precheck_mapping() {
        assert_eq!(ExecutionState::from_precheck(Status::Ok), ExecutionState::Success);
        assert_eq!(ExecutionState::from_precheck(Status::Busy), ExecutionState::Retry);
        assert_eq!(ExecutionState::from_precheck(Status::PlatformNotActive), ExecutionState::Retry);
        assert_eq!(
            ExecutionState::from_precheck(Status::PlatformTransactionNotCreated),
            ExecutionState::Retry
        );
        assert_eq!(
            ExecutionState::from_precheck(Status::InvalidSignature),
            ExecutionState::RequestError
        );
        assert_eq!(ExecutionState::from_precheck(Status::Success), ExecutionState::RequestError);
    }

    #[test]
    fn test_classify_success() {
        assert_eq!(classify(1, 10, None), AttemptOutcome::Succeed);
        assert_eq!(classify(10, 10, None), AttemptOutcome::Succeed);
    }

    #[test]
    fn test_classify_transient_transport_penalizes() {
        assert_eq!(
            classify(1, 10, Some(ErrorKind::TransientTransport)),
            AttemptOutcome::Retry { next_attempt: 2, penalize: true }
        );
    }

    #[test]
    fn test_classify_retry_status_does_not_penalize() {
        assert_eq!(
            classify(3, 10, Some(ErrorKind::TransientApplication)),
            AttemptOutcome::Retry { next_attempt: 4, penalize: false }
        );
    }

    #[test]
    fn test_classify_terminal_kinds_fail() {
        for kind in [
            ErrorKind::TerminalTransport,
            ErrorKind::TerminalApplication,
            ErrorKind::Programmer,
            ErrorKind::Internal,
        ] {
            assert_eq!(classify(1, 10, Some(kind)), AttemptOutcome::Fail, "{:?}", kind);
        }
    }

    #[test]
    fn test_classify_ceiling() {
        assert_eq!(
            classify(10, 10, Some(ErrorKind::TransientTransport)),
            AttemptOutcome::Exhausted { penalize: true }
        );
        assert_eq!(
            classify(1, 1, Some(ErrorKind::TransientApplication)),
            AttemptOutcome::Exhausted { penalize: false }
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(AttemptState::Attempting(2).to_string(), "Attempting(2)");
        assert_eq!(AttemptState::Retrying(3).to_string(), "Retrying(3)");
        assert!(AttemptState::Succeeded.is_terminal());
        assert!(!AttemptState::Idle.is_terminal());
        assert_eq!(
            AttemptOutcome::Retry { next_attempt: 2, penalize: true }.next_state(),
            AttemptState::Retrying(2)
        );
    }
}
