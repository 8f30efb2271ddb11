//! Core traits.
//!
//! [`Monoid`] is the capability `sum` and `join` are written against: an
//! associative combine with an identity element. [`TransportExt`] chains
//! combinators as methods on a [`Receiver`].

use std::cmp::Ordering;
use std::future::Future;
use std::hash::Hash;

use crate::dispatcher;
use crate::error::{Error, Result};
use crate::parallel;
use crate::processors::{self, Pair};
use crate::sinks;
use crate::transport::Receiver;

/// An associative combine with an identity element.
///
/// `identity().combine(x) == x` and
/// `a.combine(b).combine(c) == a.combine(b.combine(c))` must hold.
pub trait Monoid: Sized {
    /// The neutral element
    fn identity() -> Self;

    /// Combine two values
    fn combine(self, other: Self) -> Self;
}

macro_rules! additive_monoid {
    ($zero:expr => $($t:ty),+ $(,)?) => {
        $(
            impl Monoid for $t {
                fn identity() -> Self {
                    $zero
                }

                fn combine(self, other: Self) -> Self {
                    self + other
                }
            }
        )+
    };
}

additive_monoid!(0 => i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
additive_monoid!(0.0 => f32, f64);

impl Monoid for String {
    fn identity() -> Self {
        String::new()
    }

    fn combine(mut self, other: Self) -> Self {
        self.push_str(&other);
        self
    }
}

/// Method-chaining access to every combinator.
///
/// ```rust
/// use conduit::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() {
/// let total = conduit::sources::range(1, 11)
///     .filter(|x| x % 2 == 0)
///     .map(|x| x * 10)
///     .sum()
///     .await;
/// assert_eq!(total, 300);
/// # }
/// ```
pub trait TransportExt: Sized {
    /// Element type of the transport
    type Item: Send + 'static;

    /// The underlying receiver
    fn into_receiver(self) -> Receiver<Self::Item>;

    /// See [`processors::map`].
    fn map<U, F>(self, f: F) -> Receiver<U>
    where
        U: Send + 'static,
        F: FnMut(Self::Item) -> U + Send + 'static,
    {
        processors::map(self.into_receiver(), f)
    }

    fn filter<P>(self, predicate: P) -> Receiver<Self::Item>
    where
        P: FnMut(&Self::Item) -> bool + Send + 'static,
    {
        processors::filter(self.into_receiver(), predicate)
    }

    /// Concatenate a transport of transports in input order.
    fn flatten<U>(self) -> Receiver<U>
    where
        Self: TransportExt<Item = Receiver<U>>,
        U: Send + 'static,
    {
        processors::flatten(self.into_receiver())
    }

    fn flat_map<U, F>(self, f: F) -> Receiver<U>
    where
        U: Send + 'static,
        F: FnMut(Self::Item) -> Receiver<U> + Send + 'static,
    {
        processors::flat_map(self.into_receiver(), f)
    }

    /// At most `max` elements; the rest is left unread.
    fn limit(self, max: usize) -> Receiver<Self::Item> {
        processors::limit(self.into_receiver(), max)
    }

    fn skip(self, n: usize) -> Receiver<Self::Item> {
        processors::skip(self.into_receiver(), n)
    }

    fn take_while<P>(self, predicate: P) -> Receiver<Self::Item>
    where
        P: FnMut(&Self::Item) -> bool + Send + 'static,
    {
        processors::take_while(self.into_receiver(), predicate)
    }

    /// Everything from `self`, then everything from `other`. See
    /// [`processors::concat`].
    fn chain(self, other: Receiver<Self::Item>) -> Receiver<Self::Item> {
        processors::concat(self.into_receiver(), other)
    }

    fn peek<C>(self, consumer: C) -> Receiver<Self::Item>
    where
        C: FnMut(&Self::Item) + Send + 'static,
    {
        processors::peek(self.into_receiver(), consumer)
    }

    /// Pair positionally with `other`, stopping at the shorter side.
    fn zip<B>(self, other: Receiver<B>) -> Receiver<Pair<Self::Item, B>>
    where
        B: Send + 'static,
    {
        processors::zip(self.into_receiver(), other)
    }

    /// Split a pair transport into its components.
    fn unzip<A, B>(self) -> (Receiver<A>, Receiver<B>)
    where
        Self: TransportExt<Item = Pair<A, B>>,
        A: Clone + Send + 'static,
        B: Clone + Send + 'static,
    {
        processors::unzip(self.into_receiver())
    }

    fn sorted(self) -> Receiver<Self::Item>
    where
        Self::Item: Ord,
    {
        processors::sorted(self.into_receiver())
    }

    fn sorted_by<F>(self, compare: F) -> Receiver<Self::Item>
    where
        F: FnMut(&Self::Item, &Self::Item) -> Ordering + Send + 'static,
    {
        processors::sorted_by(self.into_receiver(), compare)
    }

    /// First occurrence of every element, emitted once the input closes.
    fn distinct(self) -> Receiver<Self::Item>
    where
        Self::Item: Eq + Hash + Clone,
    {
        processors::distinct(self.into_receiver())
    }

    fn partition(self, size: usize) -> Receiver<Vec<Self::Item>> {
        processors::partition(self.into_receiver(), size)
    }

    /// See [`dispatcher::clone`].
    fn fan_out(self, n: usize) -> Vec<Receiver<Self::Item>>
    where
        Self::Item: Clone,
    {
        dispatcher::clone(self.into_receiver(), n)
    }

    /// Map with a fallible function; returns `(values, errors)`.
    fn map_with_err<U, E, F>(self, f: F) -> (Receiver<U>, Receiver<E>)
    where
        U: Send + 'static,
        E: Send + 'static,
        F: FnMut(Self::Item) -> std::result::Result<U, E> + Send + 'static,
    {
        processors::map_with_err(self.into_receiver(), f)
    }

    fn filter_with_err<E, P>(self, predicate: P) -> (Receiver<Self::Item>, Receiver<E>)
    where
        E: Send + 'static,
        P: FnMut(&Self::Item) -> std::result::Result<bool, E> + Send + 'static,
    {
        processors::filter_with_err(self.into_receiver(), predicate)
    }

    fn flat_map_with_err<U, E, F>(self, f: F) -> (Receiver<U>, Receiver<E>)
    where
        U: Send + 'static,
        E: Send + 'static,
        F: FnMut(Self::Item) -> std::result::Result<Receiver<U>, E> + Send + 'static,
    {
        processors::flat_map_with_err(self.into_receiver(), f)
    }

    /// Map on a worker pool. Output order is unspecified.
    fn parallel_map<U, F>(self, f: F) -> Receiver<U>
    where
        U: Send + 'static,
        F: Fn(Self::Item) -> U + Send + Sync + 'static,
    {
        parallel::parallel_map(self.into_receiver(), f)
    }

    fn parallel_filter<P>(self, predicate: P) -> Receiver<Self::Item>
    where
        P: Fn(&Self::Item) -> bool + Send + Sync + 'static,
    {
        parallel::parallel_filter(self.into_receiver(), predicate)
    }

    /// Drain every inner transport concurrently.
    fn parallel_flatten<U>(self) -> Receiver<U>
    where
        Self: TransportExt<Item = Receiver<U>>,
        U: Send + 'static,
    {
        parallel::parallel_flatten(self.into_receiver())
    }

    fn parallel_flat_map<U, F>(self, f: F) -> Receiver<U>
    where
        U: Send + 'static,
        F: Fn(Self::Item) -> Receiver<U> + Send + Sync + 'static,
    {
        parallel::parallel_flat_map(self.into_receiver(), f)
    }

    fn parallel_map_with_err<U, E, F>(self, f: F) -> (Receiver<U>, Receiver<E>)
    where
        U: Send + 'static,
        E: Send + 'static,
        F: Fn(Self::Item) -> std::result::Result<U, E> + Send + Sync + 'static,
    {
        parallel::parallel_map_with_err(self.into_receiver(), f)
    }

    fn parallel_filter_with_err<E, P>(self, predicate: P) -> (Receiver<Self::Item>, Receiver<E>)
    where
        E: Send + 'static,
        P: Fn(&Self::Item) -> std::result::Result<bool, E> + Send + Sync + 'static,
    {
        parallel::parallel_filter_with_err(self.into_receiver(), predicate)
    }

    fn parallel_flat_map_with_err<U, E, F>(self, f: F) -> (Receiver<U>, Receiver<E>)
    where
        U: Send + 'static,
        E: Send + 'static,
        F: Fn(Self::Item) -> std::result::Result<Receiver<U>, E> + Send + Sync + 'static,
    {
        parallel::parallel_flat_map_with_err(self.into_receiver(), f)
    }

    /// Collect every element in arrival order.
    fn to_vec(self) -> impl Future<Output = Vec<Self::Item>> + Send {
        sinks::to_vec(self.into_receiver())
    }

    fn for_each<C>(self, consumer: C) -> impl Future<Output = ()> + Send
    where
        C: FnMut(Self::Item) + Send,
    {
        sinks::for_each(self.into_receiver(), consumer)
    }

    fn fold_left<U, F>(self, init: U, f: F) -> impl Future<Output = U> + Send
    where
        U: Send,
        F: FnMut(U, Self::Item) -> U + Send,
    {
        sinks::fold_left(self.into_receiver(), init, f)
    }

    /// See [`sinks::fold_right`].
    fn fold_right<U, F>(self, init: U, f: F) -> impl Future<Output = U> + Send
    where
        U: Send,
        F: FnMut(Self::Item, U) -> U + Send,
    {
        sinks::fold_right(self.into_receiver(), init, f)
    }

    fn reduce<F>(self, initial: Self::Item, op: F) -> impl Future<Output = Self::Item> + Send
    where
        F: FnMut(Self::Item, Self::Item) -> Self::Item + Send,
    {
        sinks::reduce(self.into_receiver(), initial, op)
    }

    fn sum(self) -> impl Future<Output = Self::Item> + Send
    where
        Self::Item: Monoid,
    {
        sinks::sum(self.into_receiver())
    }

    /// Combine every element with `sep` in between.
    fn join(self, sep: Self::Item) -> impl Future<Output = Self::Item> + Send
    where
        Self::Item: Monoid + Clone,
    {
        sinks::join(self.into_receiver(), sep)
    }

    /// See [`sinks::join_errs`].
    fn join_errs(self) -> impl Future<Output = Result<()>> + Send
    where
        Self::Item: Into<Error>,
    {
        sinks::join_errs(self.into_receiver())
    }

    fn count(self) -> impl Future<Output = usize> + Send {
        sinks::count(self.into_receiver())
    }

    /// True if every element matches; stops at the first mismatch.
    fn all_match<P>(self, predicate: P) -> impl Future<Output = bool> + Send
    where
        P: FnMut(&Self::Item) -> bool + Send,
    {
        sinks::all_match(self.into_receiver(), predicate)
    }

    /// True if any element matches; stops at the first match.
    fn any_match<P>(self, predicate: P) -> impl Future<Output = bool> + Send
    where
        P: FnMut(&Self::Item) -> bool + Send,
    {
        sinks::any_match(self.into_receiver(), predicate)
    }
}

impl<T: Send + 'static> TransportExt for Receiver<T> {
    type Item = T;

    fn into_receiver(self) -> Receiver<T> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{of, range};

    #[test]
    fn test_monoid_laws_hold_for_strings() {
        let a = String::from("ab");
        assert_eq!(String::identity().combine(a.clone()), a);
        assert_eq!(a.clone().combine(String::identity()), a);
    }

    #[test]
    fn test_numeric_identities() {
        assert_eq!(<u64 as Monoid>::identity(), 0);
        assert_eq!(<f32 as Monoid>::identity(), 0.0);
        assert_eq!(3i16.combine(4), 7);
    }

    #[tokio::test]
    async fn test_method_chain() {
        let words = of(["b", "a", "c", "a"])
            .map(String::from)
            .distinct()
            .sorted()
            .join(String::from("-"))
            .await;
        assert_eq!(words, "a-b-c");
    }

    #[tokio::test]
    async fn test_method_chain_terminals() {
        assert_eq!(range(0, 10).skip(2).limit(3).to_vec().await, vec![2, 3, 4]);
        assert_eq!(range(0, 4).chain(range(10, 12)).count().await, 6);
        let pairs = range(0, 3).zip(of(['x', 'y'])).to_vec().await;
        assert_eq!(pairs, vec![Pair::new(0, 'x'), Pair::new(1, 'y')]);
        assert_eq!(range(1, 4).fold_right(0, |x, acc| acc * 10 + x).await, 321);
    }

    #[tokio::test]
    async fn test_method_chain_nested_transports() {
        let flat = of([of([1, 2]), of([3])]).flatten().to_vec().await;
        assert_eq!(flat, vec![1, 2, 3]);

        let (nums, chars) = of([Pair::new(1, 'a'), Pair::new(2, 'b')]).unzip();
        let (nums, chars) = tokio::join!(nums.to_vec(), chars.to_vec());
        assert_eq!((nums, chars), (vec![1, 2], vec!['a', 'b']));

        let (values, errors) = of([1, 0, 2])
            .flat_map_with_err(|n| if n == 0 { Err("zero") } else { Ok(range(0, n)) });
        let (values, errors) = tokio::join!(values.to_vec(), errors.to_vec());
        assert_eq!(values, vec![0, 0, 1]);
        assert_eq!(errors, vec!["zero"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_method_chain_parallel_variants() {
        let mut flat = of([range(0, 3), range(3, 5)]).parallel_flatten().to_vec().await;
        flat.sort_unstable();
        assert_eq!(flat, vec![0, 1, 2, 3, 4]);

        let (values, errors) = range(0, 6).parallel_map_with_err(|n| {
            if n == 4 {
                Err(Error::custom("four"))
            } else {
                Ok(n)
            }
        });
        let (values, joined) = tokio::join!(values.count(), errors.join_errs());
        assert_eq!(values, 5);
        assert_eq!(joined.unwrap_err().to_string(), "four");

        let (kept, errors) = range(0, 6)
            .parallel_filter_with_err(|n| if *n == 5 { Err(*n) } else { Ok(n % 2 == 0) });
        let (kept, errors) = tokio::join!(kept.count(), errors.to_vec());
        assert_eq!((kept, errors), (3, vec![5]));

        let (values, errors) = range(1, 4).parallel_flat_map_with_err(|n| {
            if n == 2 {
                Err(n)
            } else {
                Ok(range(0, n))
            }
        });
        let (values, errors) = tokio::join!(values.count(), errors.to_vec());
        assert_eq!((values, errors), (4, vec![2]));
    }
}
