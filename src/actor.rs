//! Thunk actor state machine and message loop
//!
//! Each thunk is one OS thread owning a private mailbox and a tagged
//! state value. All state transitions happen on that single thread, so
//! no lock guards actor state; the only shared structure is the global
//! registry of termination leases.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Thunk Actor (one thread)                   │
//! │  ┌─────────┐   Pending ──► Evaluated        │
//! │  │ Mailbox │      │            ▲            │
//! │  └─────────┘   Derived ────────┤            │
//! │  ┌─────────┐      │            │            │
//! │  │  Lease  │      └──────► Failed           │
//! │  └─────────┘                                │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Message flow
//!
//! 1. A handle sends `Request::Evaluate { reply }` to the mailbox
//! 2. First evaluate runs the computation (or resolves the derivation)
//!    on the actor thread under `catch_unwind`
//! 3. The actor settles into `Evaluated` or `Failed`, both absorbing
//! 4. The current requester and every later one receive the cached
//!    outcome with no recomputation
//!
//! The actor re-checks its lease before replying: a request caught by a
//! `delete` mid-evaluation goes unanswered, and the requester's reply
//! receiver converts the disconnect into `Terminated`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TryRecvError};

use crate::combinators::Derivation;
use crate::error::ThunkError;
use crate::registry::REGISTRY;
use crate::thunk::{Thunk, ThunkId};

/// Message protocol accepted by a thunk actor's mailbox.
pub(crate) enum Request<T> {
    /// Evaluate (or replay the settled outcome) and answer on `reply`.
    Evaluate {
        reply: Sender<Result<T, ThunkError>>,
    },
}

/// What a thunk actor owns, exactly one of.
pub(crate) enum State<T> {
    /// Unevaluated leaf computation. Never invoked by construction.
    Pending(Box<dyn FnOnce() -> T + Send>),
    /// One- or two-predecessor derivation, resolved on first evaluate.
    Derived(Box<dyn Derivation<T>>),
    /// Terminal cached value, absorbing.
    Evaluated(T),
    /// Terminal captured failure, absorbing, replayed verbatim.
    Failed(ThunkError),
}

/// Spawn a thunk actor and return its handle.
///
/// Blocks until the actor thread has acknowledged startup, and
/// registers the lease before spawning, so a force issued immediately
/// after any constructor returns cannot race a half-initialized actor
/// and `exists` is already true.
pub(crate) fn spawn<T>(id: ThunkId, name: Option<String>, state: State<T>) -> Thunk<T>
where
    T: Clone + Send + 'static,
{
    let (mailbox_tx, mailbox_rx) = unbounded::<Request<T>>();
    let (lease_tx, lease_rx) = bounded::<()>(0);
    let (ready_tx, ready_rx) = bounded::<()>(1);

    REGISTRY.register(id.clone(), lease_tx);

    let thread_name = name.unwrap_or_else(|| format!("thunk-{}", &id.as_str()[..8]));
    let loop_id = id.clone();
    thread::Builder::new()
        .name(thread_name)
        .spawn(move || run(loop_id, state, mailbox_rx, lease_rx, ready_tx))
        .expect("failed to spawn thunk actor thread");

    ready_rx
        .recv()
        .expect("thunk actor exited before acknowledging startup");

    Thunk::from_parts(id, mailbox_tx)
}

/// The actor's message loop. Exits when the lease is revoked or when
/// every handle (and so every mailbox sender) has been dropped.
fn run<T>(
    id: ThunkId,
    mut state: State<T>,
    mailbox: Receiver<Request<T>>,
    lease: Receiver<()>,
    ready: Sender<()>,
) where
    T: Clone + Send + 'static,
{
    log::trace!("thunk actor {id} starting");
    let _ = ready.send(());

    loop {
        select! {
            recv(mailbox) -> msg => match msg {
                Ok(Request::Evaluate { reply }) => {
                    state = settle(state, &id);

                    // Deletion wins over an in-flight evaluation: a
                    // revoked actor discards its result and never
                    // answers, so the requester observes `Terminated`.
                    if matches!(lease.try_recv(), Err(TryRecvError::Disconnected)) {
                        log::trace!("thunk actor {id} deleted mid-evaluation, exiting");
                        return;
                    }

                    let outcome = match &state {
                        State::Evaluated(value) => Ok(value.clone()),
                        State::Failed(error) => Err(error.clone()),
                        _ => unreachable!("settle leaves only terminal states"),
                    };
                    // A requester that gave up waiting dropped its receiver.
                    let _ = reply.send(outcome);
                }
                Err(_) => {
                    // Every handle is gone; nothing can reach this actor again.
                    REGISTRY.remove(&id);
                    log::trace!("thunk actor {id} unreachable, exiting");
                    return;
                }
            },
            recv(lease) -> _ => {
                log::trace!("thunk actor {id} deleted, exiting");
                return;
            }
        }
    }
}

/// Drive the state machine to a terminal state. At-most-once: once
/// `Evaluated` or `Failed`, the stored outcome is reused untouched.
fn settle<T>(state: State<T>, id: &ThunkId) -> State<T>
where
    T: Clone + Send + 'static,
{
    let outcome = match state {
        State::Pending(compute) => guarded(id, compute),
        State::Derived(derivation) => derivation.resolve(id),
        done @ (State::Evaluated(_) | State::Failed(_)) => return done,
    };
    match outcome {
        Ok(value) => State::Evaluated(value),
        Err(error) => {
            log::debug!("thunk actor {id} settled into failure: {error}");
            State::Failed(error)
        }
    }
}

/// Run a computation, converting a panic into `Evaluation` attributed
/// to `id`.
pub(crate) fn guarded<T>(id: &ThunkId, compute: impl FnOnce() -> T) -> Result<T, ThunkError> {
    panic::catch_unwind(AssertUnwindSafe(compute)).map_err(|payload| ThunkError::Evaluation {
        id: id.clone(),
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "computation panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guarded_success() {
        let id = ThunkId::new();
        assert_eq!(guarded(&id, || 2 + 2).unwrap(), 4);
    }

    #[test]
    fn test_guarded_renders_str_payload() {
        let id = ThunkId::new();
        let err = guarded(&id, || -> i32 { panic!("str payload") }).unwrap_err();
        match err {
            ThunkError::Evaluation { id: at, message } => {
                assert_eq!(at, id);
                assert_eq!(message, "str payload");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_guarded_renders_string_payload() {
        let id = ThunkId::new();
        let err =
            guarded(&id, || -> i32 { std::panic::panic_any(String::from("owned")) }).unwrap_err();
        match err {
            ThunkError::Evaluation { message, .. } => assert_eq!(message, "owned"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_guarded_falls_back_on_opaque_payload() {
        let id = ThunkId::new();
        let err = guarded(&id, || -> i32 { std::panic::panic_any(7_u8) }).unwrap_err();
        match err {
            ThunkError::Evaluation { message, .. } => assert_eq!(message, "computation panicked"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
