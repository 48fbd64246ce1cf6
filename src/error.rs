//! Error taxonomy for forcing thunks
//!
//! Every `force` either returns a value or exactly one of these kinds;
//! nothing is swallowed and nothing is retried automatically. Captured
//! failures are sticky: once an actor settles into a failed state it
//! replays the same error to every later request.

use std::time::Duration;

use thiserror::Error;

use crate::thunk::ThunkId;

/// The ways a `force` can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThunkError {
    /// The stored computation (or a combinator transform) panicked.
    ///
    /// `id` names the thunk whose code raised, which for a derived
    /// thunk may be a predecessor. The message is the rendered panic
    /// payload, replayed verbatim on every subsequent force.
    #[error("thunk {id} evaluation failed: {message}")]
    Evaluation { id: ThunkId, message: String },

    /// The target actor does not exist: deleted, or reaped after every
    /// handle was dropped. The request never reached a live actor.
    #[error("thunk {id} not found")]
    NotFound { id: ThunkId },

    /// The target actor accepted the request but died before answering,
    /// typically because `delete` landed while the force was in flight.
    #[error("thunk {id} terminated with a force in flight")]
    Terminated { id: ThunkId },

    /// A `force_timeout` deadline expired. Only the wait is abandoned;
    /// the evaluation keeps running and a later force can still collect
    /// the cached result.
    #[error("thunk {id} did not answer within {waited:?}")]
    Timeout { id: ThunkId, waited: Duration },
}

impl ThunkError {
    /// The identity of the thunk the error is attributed to.
    pub fn id(&self) -> &ThunkId {
        match self {
            ThunkError::Evaluation { id, .. }
            | ThunkError::NotFound { id }
            | ThunkError::Terminated { id }
            | ThunkError::Timeout { id, .. } => id,
        }
    }
}
