//! Terminal combinators.
//!
//! A terminal combinator drains a transport on the calling task and returns a
//! single value. It suspends until the upstream stage closes the transport,
//! so calling one on a transport fed by a never-ending source never returns.

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{Error, Result};
use crate::traits::Monoid;
use crate::transport::Receiver;

/// Collect every element in arrival order.
pub async fn to_vec<T>(input: Receiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Some(item) = input.recv().await {
        items.push(item);
    }
    items
}

/// Hand every element to `consumer`.
pub async fn for_each<T, C>(input: Receiver<T>, mut consumer: C)
where
    C: FnMut(T),
{
    while let Some(item) = input.recv().await {
        consumer(item);
    }
}

/// Combine left to right: `f(f(f(init, a), b), c)`.
///
/// An empty input returns `init` without calling `f`.
pub async fn fold_left<T, U, F>(input: Receiver<T>, init: U, mut f: F) -> U
where
    F: FnMut(U, T) -> U,
{
    let mut acc = init;
    while let Some(item) = input.recv().await {
        acc = f(acc, item);
    }
    acc
}

/// Combine right to left: `f(a, f(b, f(c, init)))`.
///
/// Elements arrive left to right, so each one is held while the rest of the
/// transport is folded. Every pending element is one boxed future: memory
/// and nesting depth grow linearly with the input length.
pub async fn fold_right<T, U, F>(input: Receiver<T>, init: U, mut f: F) -> U
where
    T: Send,
    U: Send,
    F: FnMut(T, U) -> U + Send,
{
    fold_right_from(&input, init, &mut f).await
}

fn fold_right_from<'a, T, U, F>(input: &'a Receiver<T>, init: U, f: &'a mut F) -> BoxFuture<'a, U>
where
    T: Send + 'a,
    U: Send + 'a,
    F: FnMut(T, U) -> U + Send,
{
    async move {
        match input.recv().await {
            Some(item) => {
                let rest = fold_right_from(input, init, &mut *f).await;
                f(item, rest)
            }
            None => init,
        }
    }
    .boxed()
}

/// [`fold_left`] where the accumulator has the element type.
pub async fn reduce<T, F>(input: Receiver<T>, initial: T, op: F) -> T
where
    F: FnMut(T, T) -> T,
{
    fold_left(input, initial, op).await
}

/// Combine every element starting from the identity.
pub async fn sum<M: Monoid>(input: Receiver<M>) -> M {
    reduce(input, M::identity(), M::combine).await
}

/// Combine every element with `sep` between consecutive ones.
///
/// An empty input yields the identity, a single element is returned as is.
pub async fn join<M>(input: Receiver<M>, sep: M) -> M
where
    M: Monoid + Clone,
{
    let Some(first) = input.recv().await else {
        return M::identity();
    };
    fold_left(input, first, move |acc, item| acc.combine(sep.clone()).combine(item)).await
}

/// Aggregate a transport of failures into one error.
///
/// Returns `Ok(())` if the transport closes without yielding anything.
/// Otherwise the error lists every failure in arrival order, and its message
/// is their messages separated by newlines.
pub async fn join_errs<E>(errors: Receiver<E>) -> Result<()>
where
    E: Into<Error>,
{
    let joined = fold_left(errors, None, |acc: Option<Error>, err| {
        let err = err.into();
        Some(match acc {
            Some(acc) => acc.join(err),
            None => Error::Joined(err.errors().to_vec()),
        })
    })
    .await;
    match joined {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Number of elements.
pub async fn count<T>(input: Receiver<T>) -> usize {
    fold_left(input, 0, |n, _| n + 1).await
}

/// True if every element matches. Stops reading at the first mismatch.
pub async fn all_match<T, P>(input: Receiver<T>, mut predicate: P) -> bool
where
    P: FnMut(&T) -> bool,
{
    while let Some(item) = input.recv().await {
        if !predicate(&item) {
            return false;
        }
    }
    true
}

/// True if any element matches. Stops reading at the first match.
pub async fn any_match<T, P>(input: Receiver<T>, mut predicate: P) -> bool
where
    P: FnMut(&T) -> bool,
{
    while let Some(item) = input.recv().await {
        if predicate(&item) {
            return true;
        }
    }
    false
}
