//! Thunk handles and the force protocol
//!
//! A `Thunk<T>` is an opaque reference to a thunk actor: an identity
//! plus the actor's mailbox sender, never the value itself. Handles
//! are cheap to clone, freely shareable across threads, and compare
//! by identity only.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use uuid::Uuid;

use crate::actor::{spawn, Request, State};
use crate::error::ThunkError;
use crate::registry::REGISTRY;

/// Unique identifier for a thunk actor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThunkId(pub Uuid);

impl ThunkId {
    /// Create a new random thunk ID
    pub fn new() -> Self {
        ThunkId(Uuid::new_v4())
    }

    /// Create from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        ThunkId(uuid)
    }

    /// Get the UUID as a string
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ThunkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ThunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Suspend a computation behind a new thunk actor.
///
/// The closure is not invoked; it runs at most once, on the first
/// `force` against the returned handle or any handle derived from it.
pub fn suspend<T, F>(compute: F) -> Thunk<T>
where
    T: Clone + Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    Thunk::suspend(compute)
}

/// Handle to a thunk actor (for requesting its value)
pub struct Thunk<T> {
    id: ThunkId,
    mailbox: Sender<Request<T>>,
}

impl<T> Thunk<T> {
    /// The identity of the owning actor.
    pub fn id(&self) -> &ThunkId {
        &self.id
    }

    /// Forcibly terminate the owning actor, whatever its state.
    ///
    /// Idempotent; never an error. Immediately afterwards `exists` is
    /// false and any new `force` fails `NotFound` without blocking.
    /// A force already in flight is answered `Terminated` instead.
    pub fn delete(&self) {
        // Dropping the lease out of the registry is the kill signal.
        REGISTRY.remove(&self.id);
    }

    /// Non-blocking liveness check: true until the actor is deleted or
    /// reaped after its last handle dropped.
    pub fn exists(&self) -> bool {
        REGISTRY.contains(&self.id)
    }
}

impl Thunk<()> {
    /// Returns a builder for configuring the actor before suspension.
    pub fn builder() -> ThunkBuilder {
        ThunkBuilder { name: None }
    }
}

impl<T> Thunk<T>
where
    T: Clone + Send + 'static,
{
    /// Suspend a computation behind a new thunk actor. See [`suspend`].
    pub fn suspend<F>(compute: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        spawn(ThunkId::new(), None, State::Pending(Box::new(compute)))
    }

    /// Create a thunk already settled into failure.
    ///
    /// Every force reports an evaluation failure carrying `cause`.
    pub fn failed(cause: impl Into<String>) -> Self {
        let id = ThunkId::new();
        let error = ThunkError::Evaluation {
            id: id.clone(),
            message: cause.into(),
        };
        spawn(id, None, State::Failed(error))
    }

    /// Send an evaluation request and return the reply receiver.
    ///
    /// The receiver doubles as the liveness watch: an actor that exits
    /// without answering drops the reply sender, and the disconnect is
    /// observed instead of silence. A request aimed at an actor absent
    /// from the registry is answered `NotFound` locally.
    pub(crate) fn request(&self) -> Receiver<Result<T, ThunkError>> {
        let (reply, receiver) = bounded(1);
        if !REGISTRY.contains(&self.id) {
            let _ = reply.send(Err(ThunkError::NotFound {
                id: self.id.clone(),
            }));
            return receiver;
        }
        if let Err(rejected) = self.mailbox.send(Request::Evaluate { reply }) {
            // The actor already exited and its mailbox is gone.
            let Request::Evaluate { reply } = rejected.0;
            let _ = reply.send(Err(ThunkError::NotFound {
                id: self.id.clone(),
            }));
        }
        receiver
    }

    /// Block until the actor answers with its value or a decided
    /// failure. No timeout: a force against a thunk whose predecessor
    /// chain never resolves blocks indefinitely.
    pub fn force(&self) -> Result<T, ThunkError> {
        match self.request().recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(ThunkError::Terminated {
                id: self.id.clone(),
            }),
        }
    }

    /// Like `force`, but abandon the wait after `deadline`.
    ///
    /// Only the wait is abandoned: the evaluation keeps running on the
    /// actor and a later force can still collect the cached result,
    /// computed exactly once.
    pub fn force_timeout(&self, deadline: Duration) -> Result<T, ThunkError> {
        match self.request().recv_timeout(deadline) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(ThunkError::Timeout {
                id: self.id.clone(),
                waited: deadline,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(ThunkError::Terminated {
                id: self.id.clone(),
            }),
        }
    }

    pub(crate) fn from_parts(id: ThunkId, mailbox: Sender<Request<T>>) -> Self {
        Thunk { id, mailbox }
    }
}

// Manual impls: handles clone and compare by identity, whatever T is.

impl<T> Clone for Thunk<T> {
    fn clone(&self) -> Self {
        Thunk {
            id: self.id.clone(),
            mailbox: self.mailbox.clone(),
        }
    }
}

impl<T> PartialEq for Thunk<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Thunk<T> {}

impl<T> Hash for Thunk<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Thunk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Thunk").field(&self.id).finish()
    }
}

/// A builder object that can be used to configure and spawn a thunk
/// actor; currently carries the actor thread name.
#[derive(Clone)]
pub struct ThunkBuilder {
    name: Option<String>,
}

impl ThunkBuilder {
    /// Sets the name of the actor thread (default: `thunk-<id prefix>`).
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    /// Suspend a computation on an actor configured by this builder.
    pub fn suspend<T, F>(self, compute: F) -> Thunk<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        spawn(ThunkId::new(), self.name, State::Pending(Box::new(compute)))
    }
}
