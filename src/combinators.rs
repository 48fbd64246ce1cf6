//! Combinators over thunk handles
//!
//! `map`, `apply`, `product`, and `copy` spin up new thunk actors
//! whose derivation requests evaluation from the predecessor actors
//! only when itself forced. No combinator ever forces its input at
//! construction time; each new actor holds clones of the predecessor
//! handles, so the predecessor relation is a DAG by construction.

use crossbeam_channel::{select, RecvError};

use crate::actor::{guarded, spawn, State};
use crate::error::ThunkError;
use crate::thunk::{Thunk, ThunkId};

/// How a derived actor resolves its value from its predecessors.
/// Runs on the derived actor's own thread, at most once.
pub(crate) trait Derivation<T>: Send {
    fn resolve(self: Box<Self>, id: &ThunkId) -> Result<T, ThunkError>;
}

impl<T> Thunk<T>
where
    T: Clone + Send + 'static,
{
    /// Derive a new thunk by transforming this one's value.
    ///
    /// Returns immediately; the predecessor is untouched until the new
    /// handle is forced. If the predecessor fails, `transform` is never
    /// invoked and the failure is inherited verbatim. A panic inside
    /// `transform` is captured like a leaf failure, attributed to the
    /// derived thunk.
    pub fn map<U, F>(&self, transform: F) -> Thunk<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        spawn(
            ThunkId::new(),
            None,
            State::Derived(Box::new(Map {
                predecessor: self.clone(),
                transform: Box::new(transform),
            })),
        )
    }

    /// Derive an independent thunk holding the same value.
    ///
    /// The copy has its own actor and its own cache; forcing or
    /// deleting the original afterwards does not affect it.
    pub fn copy(&self) -> Thunk<T> {
        self.map(|value| value)
    }

    /// Derive a thunk pairing this value with another.
    ///
    /// On force, both predecessors are requested concurrently and the
    /// answers are joined whichever order they arrive in.
    pub fn product<B>(&self, other: &Thunk<B>) -> Thunk<(T, B)>
    where
        B: Clone + Send + 'static,
    {
        self.join(other, |a, b| (a, b))
    }

    /// Derive a thunk applying this thunk's value (a function) to
    /// another thunk's value. Same join as `product`.
    pub fn apply<X, U>(&self, argument: &Thunk<X>) -> Thunk<U>
    where
        T: FnOnce(X) -> U,
        X: Clone + Send + 'static,
        U: Clone + Send + 'static,
    {
        self.join(argument, |function, value| function(value))
    }

    fn join<B, U, F>(&self, other: &Thunk<B>, combine: F) -> Thunk<U>
    where
        B: Clone + Send + 'static,
        U: Clone + Send + 'static,
        F: FnOnce(T, B) -> U + Send + 'static,
    {
        spawn(
            ThunkId::new(),
            None,
            State::Derived(Box::new(Join {
                left: self.clone(),
                right: other.clone(),
                combine: Box::new(combine),
            })),
        )
    }
}

/// Single-predecessor derivation backing `map` and `copy`.
struct Map<P, T> {
    predecessor: Thunk<P>,
    transform: Box<dyn FnOnce(P) -> T + Send>,
}

impl<P, T> Derivation<T> for Map<P, T>
where
    P: Clone + Send + 'static,
    T: Send,
{
    fn resolve(self: Box<Self>, id: &ThunkId) -> Result<T, ThunkError> {
        let Map {
            predecessor,
            transform,
        } = *self;
        let value = predecessor.force()?;
        guarded(id, move || transform(value))
    }
}

/// Dual-predecessor derivation backing `apply` and `product`.
struct Join<A, B, T> {
    left: Thunk<A>,
    right: Thunk<B>,
    combine: Box<dyn FnOnce(A, B) -> T + Send>,
}

impl<A, B, T> Derivation<T> for Join<A, B, T>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    T: Send,
{
    /// Race-tolerant fan-in: both predecessors are requested before
    /// either answer is awaited, both arrival orders produce the same
    /// combined result, and the first failure observed wins without
    /// waiting for the slower side.
    fn resolve(self: Box<Self>, id: &ThunkId) -> Result<T, ThunkError> {
        let Join {
            left,
            right,
            combine,
        } = *self;
        let left_rx = left.request();
        let right_rx = right.request();

        select! {
            recv(left_rx) -> msg => {
                let a = answer(msg, left.id())?;
                let b = answer(right_rx.recv(), right.id())?;
                guarded(id, move || combine(a, b))
            }
            recv(right_rx) -> msg => {
                let b = answer(msg, right.id())?;
                let a = answer(left_rx.recv(), left.id())?;
                guarded(id, move || combine(a, b))
            }
        }
    }
}

/// Unwrap a predecessor's reply, converting a dropped reply channel
/// into `Terminated` attributed to that predecessor.
fn answer<T>(
    msg: Result<Result<T, ThunkError>, RecvError>,
    id: &ThunkId,
) -> Result<T, ThunkError> {
    match msg {
        Ok(outcome) => outcome,
        Err(_) => Err(ThunkError::Terminated { id: id.clone() }),
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ThunkError;
    use crate::thunk::{suspend, Thunk};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_combinators_are_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let base = suspend(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            1
        });
        let _mapped = base.map(|x| x + 1);
        let _copied = base.copy();
        let _paired = base.product(&suspend(|| 2));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_construction_never_raises() {
        let bomb: Thunk<i32> = suspend(|| panic!("armed"));
        let _mapped = bomb.map(|x| x + 1);
        let _copied = bomb.copy();
        let _paired = bomb.product(&suspend(|| 1));
        let armed_fn: Thunk<fn(i32) -> i32> = suspend(|| panic!("armed"));
        let _applied = armed_fn.apply(&suspend(|| 1));
    }

    #[test]
    fn test_functor_identity() {
        let thunk = suspend(|| 11);
        assert_eq!(thunk.map(|x| x).force().unwrap(), 11);
    }

    #[test]
    fn test_functor_composition() {
        let f = |x: i64| x + 3;
        let g = |x: i64| x * 2;
        let chained = suspend(|| 5_i64).map(f).map(g);
        let fused = suspend(|| 5_i64).map(move |x| g(f(x)));
        assert_eq!(chained.force().unwrap(), fused.force().unwrap());
    }

    #[test]
    fn test_applicative_identity() {
        let thunk = suspend(|| 7);
        let identity = suspend(|| |x: i32| x);
        assert_eq!(
            identity.apply(&thunk).force().unwrap(),
            thunk.force().unwrap()
        );
    }

    #[test]
    fn test_applicative_homomorphism() {
        let f = |x: i32| x * 10;
        let applied = suspend(move || f).apply(&suspend(|| 4));
        let direct = suspend(move || f(4));
        assert_eq!(applied.force().unwrap(), direct.force().unwrap());
    }

    #[test]
    fn test_map_inherits_failure_without_invoking_transform() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let bomb: Thunk<i32> = suspend(|| panic!("boom"));
        let mapped = bomb.map(move |x| {
            seen.fetch_add(1, Ordering::SeqCst);
            x
        });
        match mapped.force() {
            Err(ThunkError::Evaluation { id, message }) => {
                // The failure is attributed to the thunk whose code raised.
                assert_eq!(&id, bomb.id());
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_transform_panic_attributed_to_derived_thunk() {
        let base = suspend(|| 1);
        let mapped: Thunk<i32> = base.map(|_| panic!("transform blew up"));
        match mapped.force() {
            Err(ThunkError::Evaluation { id, message }) => {
                assert_eq!(&id, mapped.id());
                assert_eq!(message, "transform blew up");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_product_join_order_independence() {
        let slow_left = suspend(|| {
            thread::sleep(Duration::from_millis(100));
            1
        });
        let fast_right = suspend(|| 2);
        assert_eq!(slow_left.product(&fast_right).force().unwrap(), (1, 2));

        let fast_left = suspend(|| 1);
        let slow_right = suspend(|| {
            thread::sleep(Duration::from_millis(100));
            2
        });
        assert_eq!(fast_left.product(&slow_right).force().unwrap(), (1, 2));
    }

    #[test]
    fn test_apply_join_order_independence() {
        let slow_fn = suspend(|| {
            thread::sleep(Duration::from_millis(100));
            |x: i32| x + 1
        });
        let fast_arg = suspend(|| 41);
        assert_eq!(slow_fn.apply(&fast_arg).force().unwrap(), 42);

        let fast_fn = suspend(|| |x: i32| x + 1);
        let slow_arg = suspend(|| {
            thread::sleep(Duration::from_millis(100));
            41
        });
        assert_eq!(fast_fn.apply(&slow_arg).force().unwrap(), 42);
    }

    #[test]
    fn test_join_first_failure_wins_without_waiting() {
        let failing: Thunk<i32> = suspend(|| panic!("early failure"));
        let slow = suspend(|| {
            thread::sleep(Duration::from_millis(500));
            2
        });
        let started = Instant::now();
        match failing.product(&slow).force() {
            Err(ThunkError::Evaluation { message, .. }) => {
                assert_eq!(message, "early failure");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        // The slow side was requested but never awaited past the failure.
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_copy_survives_original_force() {
        let original = suspend(|| 9);
        let copied = original.copy();
        assert_ne!(original, copied);
        assert_eq!(original.force().unwrap(), 9);
        assert_eq!(copied.force().unwrap(), 9);
    }

    #[test]
    fn test_shared_predecessor_evaluates_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let base = suspend(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            5
        });
        let left = base.map(|x| x + 1);
        let right = base.map(|x| x * 2);
        assert_eq!(left.product(&right).force().unwrap(), (6, 10));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_derived_force_after_predecessor_delete_fails_not_found() {
        let base = suspend(|| 1);
        let mapped = base.map(|x| x + 1);
        base.delete();
        match mapped.force() {
            Err(ThunkError::NotFound { id }) => assert_eq!(&id, base.id()),
            other => panic!("unexpected outcome: {other:?}"),
        }
        // The inherited failure is sticky on the derived actor too.
        assert!(matches!(mapped.force(), Err(ThunkError::NotFound { .. })));
    }

    mod laws {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_functor_identity(v in any::<i64>()) {
                let thunk = suspend(move || v);
                prop_assert_eq!(thunk.map(|x| x).force().unwrap(), v);
            }

            #[test]
            fn prop_functor_composition(v in any::<i64>(), a in any::<i64>(), b in any::<i64>()) {
                let chained = suspend(move || v)
                    .map(move |x| x.wrapping_add(a))
                    .map(move |x| x.wrapping_mul(b));
                let fused = suspend(move || v).map(move |x| x.wrapping_add(a).wrapping_mul(b));
                prop_assert_eq!(chained.force().unwrap(), fused.force().unwrap());
            }

            #[test]
            fn prop_applicative_homomorphism(x in any::<i64>(), k in any::<i64>()) {
                let applied = suspend(move || move |n: i64| n.wrapping_mul(k))
                    .apply(&suspend(move || x));
                let direct = suspend(move || x.wrapping_mul(k));
                prop_assert_eq!(applied.force().unwrap(), direct.force().unwrap());
            }

            #[test]
            fn prop_product_pairs(a in any::<i32>(), b in any::<i32>()) {
                let left = suspend(move || a);
                let right = suspend(move || b);
                prop_assert_eq!(left.product(&right).force().unwrap(), (a, b));
            }
        }
    }
}
