//! thunk-actors: memoized, concurrency-safe deferred computation
//!
//! A thunk is a handle to a computation that has not run yet. It can be
//! transformed and composed without forcing evaluation, and once forced
//! by any number of concurrent callers it runs its computation exactly
//! once and hands the single result to every waiter.
//!
//! # Architecture
//!
//! - **Thunk actors**: one thread per deferred computation, owning a
//!   mailbox and a tagged state (Pending/Derived/Evaluated/Failed)
//! - **Handles**: cheap identity references for requesting evaluation,
//!   freely shareable across threads
//! - **Combinators**: `map`, `apply`, `product`, `copy` wire up new
//!   actors that force their predecessors lazily
//! - **Registry**: global id → termination-lease table; `delete` and
//!   `exists` are registry operations
//!
//! Settled actors stay addressable and answer repeat forces from cache;
//! `delete` is the only way an actor disappears while handles exist.
//!
//! # Usage
//!
//! ```
//! use thunk_actors::suspend;
//!
//! let base = suspend(|| 6 * 7);
//! let doubled = base.map(|n| n * 2);
//!
//! // Nothing has run yet; forcing evaluates each actor exactly once.
//! assert_eq!(doubled.force().unwrap(), 84);
//! assert_eq!(base.force().unwrap(), 42);
//! ```

mod actor;
mod combinators;
mod registry;

pub mod error;
pub mod thunk;

// Re-exports
pub use error::ThunkError;
pub use thunk::{suspend, Thunk, ThunkBuilder, ThunkId};
