//! Error taxonomy shared by every troupe package.

use std::time::Duration;

/// Result type for facade operations.
pub type ActorResult<T> = Result<T, ActorError>;

/// Error type for facade operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActorError {
    /// Malformed props, strategy or router input. Raised before the runtime is touched.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The creator or the pre-start hook failed while the actor was being spawned.
    #[error("actor initialization failed for {path}: {reason}")]
    ActorInitialization { path: String, reason: String },

    #[error("actor path already in use: {0}")]
    NameConflict(String),

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The target handle is dead or could not be resolved.
    #[error("actor terminated or unreachable: {0}")]
    Terminated(String),

    #[error("unknown supervisor decision: {0:?}")]
    UnknownDecision(String),

    #[error("unexpected reply type: expected {expected}, got {actual}")]
    UnexpectedReply {
        expected: &'static str,
        actual: &'static str,
    },

    /// The callee answered with a failure notification.
    #[error("request failed: {0}")]
    Failed(String),

    /// A blocking wait from inside the actor that has to produce the reply.
    #[error("blocking ask on {0} from inside its own callback would deadlock")]
    WouldDeadlock(String),
}
