//! Sequential stage implementations.
//!
//! Each function here spawns exactly one task that reads its input in
//! arrival order and writes results to a fresh output transport in the same
//! relative order. The output closes when the input is exhausted, or early
//! for stages that stop reading (`limit`, `take_while`, `zip`). A stage also
//! stops, dropping its input, once nobody is listening on its output.

pub mod fallible;

pub use fallible::{filter_with_err, flat_map_with_err, map_with_err};

use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::Hash;

use crate::dispatcher;
use crate::pipeline::spawn_stage;
use crate::transport::Receiver;

/// Two values travelling together, produced by [`zip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pair<A, B> {
    pub fst: A,
    pub snd: B,
}

impl<A, B> Pair<A, B> {
    pub fn new(fst: A, snd: B) -> Self {
        Self { fst, snd }
    }

    pub fn into_tuple(self) -> (A, B) {
        (self.fst, self.snd)
    }
}

impl<A, B> From<(A, B)> for Pair<A, B> {
    fn from((fst, snd): (A, B)) -> Self {
        Self { fst, snd }
    }
}

/// Apply `f` to every element.
pub fn map<T, U, F>(input: Receiver<T>, mut f: F) -> Receiver<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> U + Send + 'static,
{
    let config = *input.config();
    spawn_stage("map", config, move |tx, ctx| async move {
        while let Some(item) = input.recv().await {
            if tx.send(f(item)).await.is_err() {
                return;
            }
        }
        ctx.draining();
    })
}

/// Keep the elements matching `predicate`.
pub fn filter<T, P>(input: Receiver<T>, mut predicate: P) -> Receiver<T>
where
    T: Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
{
    let config = *input.config();
    spawn_stage("filter", config, move |tx, ctx| async move {
        while let Some(item) = input.recv().await {
            if predicate(&item) && tx.send(item).await.is_err() {
                return;
            }
        }
        ctx.draining();
    })
}

/// Drain each inner transport in turn into one output.
pub fn flatten<T>(input: Receiver<Receiver<T>>) -> Receiver<T>
where
    T: Send + 'static,
{
    let config = *input.config();
    spawn_stage("flatten", config, move |tx, ctx| async move {
        while let Some(inner) = input.recv().await {
            while let Some(item) = inner.recv().await {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        }
        ctx.draining();
    })
}

/// Map every element to a transport and concatenate them in input order.
pub fn flat_map<T, U, F>(input: Receiver<T>, f: F) -> Receiver<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> Receiver<U> + Send + 'static,
{
    flatten(map(input, f))
}

/// Pass at most `max` elements, then close without reading further.
pub fn limit<T>(input: Receiver<T>, max: usize) -> Receiver<T>
where
    T: Send + 'static,
{
    let config = *input.config();
    spawn_stage("limit", config, move |tx, ctx| async move {
        let mut count = 0;
        while count < max {
            let Some(item) = input.recv().await else {
                break;
            };
            if tx.send(item).await.is_err() {
                return;
            }
            count += 1;
        }
        ctx.draining();
    })
}

/// Drop the first `n` elements.
pub fn skip<T>(input: Receiver<T>, n: usize) -> Receiver<T>
where
    T: Send + 'static,
{
    let config = *input.config();
    spawn_stage("skip", config, move |tx, ctx| async move {
        let mut seen = 0;
        while let Some(item) = input.recv().await {
            if seen < n {
                seen += 1;
                continue;
            }
            if tx.send(item).await.is_err() {
                return;
            }
        }
        ctx.draining();
    })
}

/// Pass elements until `predicate` first fails; that element is dropped and
/// nothing after it is read.
pub fn take_while<T, P>(input: Receiver<T>, mut predicate: P) -> Receiver<T>
where
    T: Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
{
    let config = *input.config();
    spawn_stage("take_while", config, move |tx, ctx| async move {
        while let Some(item) = input.recv().await {
            if !predicate(&item) {
                break;
            }
            if tx.send(item).await.is_err() {
                return;
            }
        }
        ctx.draining();
    })
}

/// Everything from `first`, then everything from `second`.
pub fn concat<T>(first: Receiver<T>, second: Receiver<T>) -> Receiver<T>
where
    T: Send + 'static,
{
    let config = *first.config();
    spawn_stage("concat", config, move |tx, ctx| async move {
        for input in [first, second] {
            while let Some(item) = input.recv().await {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        }
        ctx.draining();
    })
}

/// Show every element to `consumer` before passing it on.
pub fn peek<T, C>(input: Receiver<T>, mut consumer: C) -> Receiver<T>
where
    T: Send + 'static,
    C: FnMut(&T) + Send + 'static,
{
    let config = *input.config();
    spawn_stage("peek", config, move |tx, ctx| async move {
        while let Some(item) = input.recv().await {
            consumer(&item);
            if tx.send(item).await.is_err() {
                return;
            }
        }
        ctx.draining();
    })
}

/// Pair elements of `left` and `right` positionally.
///
/// Emits `min(len(left), len(right))` pairs. Closes as soon as either side
/// is exhausted; the rest of the longer side is left unread.
pub fn zip<A, B>(left: Receiver<A>, right: Receiver<B>) -> Receiver<Pair<A, B>>
where
    A: Send + 'static,
    B: Send + 'static,
{
    let config = *left.config();
    spawn_stage("zip", config, move |tx, ctx| async move {
        loop {
            let Some(fst) = left.recv().await else {
                break;
            };
            let Some(snd) = right.recv().await else {
                break;
            };
            if tx.send(Pair { fst, snd }).await.is_err() {
                return;
            }
        }
        ctx.draining();
    })
}

/// Split a pair transport into its two components.
pub fn unzip<A, B>(input: Receiver<Pair<A, B>>) -> (Receiver<A>, Receiver<B>)
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
{
    let mut clones = dispatcher::clone(input, 2).into_iter();
    let (Some(firsts), Some(seconds)) = (clones.next(), clones.next()) else {
        unreachable!("clone returns exactly the requested number of outputs");
    };
    (map(firsts, |p| p.fst), map(seconds, |p| p.snd))
}

/// Emit every element in ascending order once the input is exhausted.
/// Equal elements keep their input order.
pub fn sorted<T>(input: Receiver<T>) -> Receiver<T>
where
    T: Ord + Send + 'static,
{
    sorted_by(input, T::cmp)
}

/// [`sorted`] with a custom comparator.
pub fn sorted_by<T, F>(input: Receiver<T>, mut compare: F) -> Receiver<T>
where
    T: Send + 'static,
    F: FnMut(&T, &T) -> Ordering + Send + 'static,
{
    let config = *input.config();
    spawn_stage("sorted", config, move |tx, ctx| async move {
        let mut buf = Vec::new();
        while let Some(item) = input.recv().await {
            buf.push(item);
        }
        ctx.draining();
        buf.sort_by(&mut compare);
        for item in buf {
            if tx.send(item).await.is_err() {
                return;
            }
        }
    })
}

/// Emit each distinct element once, in first-seen order, once the input is
/// exhausted.
pub fn distinct<T>(input: Receiver<T>) -> Receiver<T>
where
    T: Eq + Hash + Clone + Send + 'static,
{
    let config = *input.config();
    spawn_stage("distinct", config, move |tx, ctx| async move {
        let mut seen = HashSet::new();
        let mut firsts = Vec::new();
        while let Some(item) = input.recv().await {
            if seen.insert(item.clone()) {
                firsts.push(item);
            }
        }
        ctx.draining();
        for item in firsts {
            if tx.send(item).await.is_err() {
                return;
            }
        }
    })
}

/// Group consecutive elements into windows of `size`; the last window holds
/// the remainder. An empty input yields no windows.
///
/// # Panics
///
/// Panics if `size` is zero.
pub fn partition<T>(input: Receiver<T>, size: usize) -> Receiver<Vec<T>>
where
    T: Send + 'static,
{
    assert!(size > 0, "partition size must be at least 1");
    let config = *input.config();
    spawn_stage("partition", config, move |tx, ctx| async move {
        let mut window = Vec::with_capacity(size);
        while let Some(item) = input.recv().await {
            window.push(item);
            if window.len() == size {
                let full = std::mem::replace(&mut window, Vec::with_capacity(size));
                if tx.send(full).await.is_err() {
                    return;
                }
            }
        }
        ctx.draining();
        if !window.is_empty() {
            let _ = tx.send(window).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::to_vec;
    use crate::sources::{from_vec, of, range};
    use crate::transport::channel;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[tokio::test]
    async fn test_map_preserves_order() {
        let rx = map(of([1, 2, 3]), |x: i32| x.to_string());
        assert_eq!(to_vec(rx).await, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_map_empty_never_calls_function() {
        let rx = map(from_vec(Vec::<i32>::new()), |_| -> i32 {
            panic!("mapping function called on empty input")
        });
        assert!(to_vec(rx.clone()).await.is_empty());
        rx.stage_closed().await.unwrap();
    }

    #[tokio::test]
    async fn test_map_calls_function_once_per_read() {
        let input = from_vec((0..10).collect::<Vec<i32>>());
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        // dropped together with the mapping function when the stage exits
        let (alive, exited) = tokio::sync::oneshot::channel::<()>();
        let rx = map(input.clone(), move |x| {
            let _ = &alive;
            counted.fetch_add(1, AtomicOrdering::SeqCst);
            x
        });
        assert_eq!(to_vec(limit(rx, 3)).await, vec![0, 1, 2]);
        assert!(exited.await.is_err());

        let unread = to_vec(input).await;
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 10 - unread.len());
        assert!(unread.iter().all(|x| *x >= 3));
    }

    #[tokio::test]
    async fn test_filter_keeps_multiplicity() {
        let rx = filter(of([4, 1, 4, 2, 4, 3]), |x| x % 2 == 0);
        assert_eq!(to_vec(rx).await, vec![4, 4, 2, 4]);
    }

    #[tokio::test]
    async fn test_flat_map_concatenates_in_order() {
        let rx = flat_map(of([1, 2, 3]), |n| range(0, n + 1));
        let got: Vec<String> = to_vec(map(rx, |i| i.to_string())).await;
        assert_eq!(got, vec!["0", "1", "0", "1", "2", "0", "1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_flatten_empty_inners() {
        let rx = flatten(of([of(Vec::<u8>::new()), of([9u8]), of(vec![])]));
        assert_eq!(to_vec(rx).await, vec![9]);
    }

    #[tokio::test]
    async fn test_limit_skip_take_while() {
        assert_eq!(to_vec(limit(range(0, 10), 3)).await, vec![0, 1, 2]);
        assert!(to_vec(limit(range(0, 10), 0)).await.is_empty());
        assert_eq!(to_vec(limit(range(0, 2), 5)).await, vec![0, 1]);
        assert_eq!(to_vec(skip(range(0, 5), 3)).await, vec![3, 4]);
        assert!(to_vec(skip(range(0, 2), 3)).await.is_empty());
        assert_eq!(
            to_vec(take_while(of([1, 2, 5, 1]), |x| *x < 3)).await,
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn test_limit_leaves_rest_unread() {
        let input = of([1, 2, 3, 4]);
        assert_eq!(to_vec(limit(input.clone(), 2)).await, vec![1, 2]);
        assert_eq!(to_vec(input).await, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_concat_and_peek() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&seen);
        let rx = peek(concat(of([1, 2]), of([3])), move |_| {
            counted.fetch_add(1, AtomicOrdering::SeqCst);
        });
        assert_eq!(to_vec(rx).await, vec![1, 2, 3]);
        assert_eq!(seen.load(AtomicOrdering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zip_stops_at_shorter_side() {
        let left = of([1, 2, 3]);
        let rx = zip(left.clone(), of(["bob"]));
        assert_eq!(to_vec(rx).await, vec![Pair::new(1, "bob")]);
        // the second left element was read and dropped, the third never read
        assert_eq!(left.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_zip_empty_left_never_reads_right() {
        let right = of([1, 2]);
        let rx = zip(of(Vec::<u8>::new()), right.clone());
        assert!(to_vec(rx).await.is_empty());
        assert_eq!(to_vec(right).await, vec![1, 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unzip_round_trips_components() {
        let pairs = of([Pair::new(1, 'a'), Pair::new(2, 'b'), Pair::new(3, 'c')]);
        let (nums, chars) = unzip(pairs);
        let (nums, chars) = tokio::join!(to_vec(nums), to_vec(chars));
        assert_eq!(nums, vec![1, 2, 3]);
        assert_eq!(chars, vec!['a', 'b', 'c']);
    }

    #[tokio::test]
    async fn test_sorted_is_stable() {
        let rx = sorted_by(of([(2, 'a'), (1, 'b'), (2, 'c'), (1, 'd')]), |a, b| a.0.cmp(&b.0));
        assert_eq!(to_vec(rx).await, vec![(1, 'b'), (1, 'd'), (2, 'a'), (2, 'c')]);
        assert_eq!(to_vec(sorted(of([3, 1, 2]))).await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_sorted_waits_for_input_to_close() {
        let (tx, input) = channel(4);
        let rx = sorted(input);
        tx.send(2).await.unwrap();
        tx.send(1).await.unwrap();

        let mut next = task::spawn(rx.recv());
        assert_pending!(next.poll());
        tokio::task::yield_now().await;
        assert_pending!(next.poll());

        drop(tx);
        tokio::task::yield_now().await;
        assert_ready_eq!(next.poll(), Some(1));
        drop(next);
        assert_eq!(to_vec(rx).await, vec![2]);
    }

    #[tokio::test]
    async fn test_distinct_first_seen_order() {
        let mut input: Vec<i32> = (1..=10).rev().collect();
        input.extend([9, 2, 3, 4, 5, 6, 7, 8, 1, 10]);
        input.extend(1..=10);
        assert_eq!(input.len(), 30);

        let got = to_vec(distinct(from_vec(input))).await;
        assert_eq!(got, vec![10, 9, 8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn test_partition_windows() {
        let rx = partition(range(0, 10), 3);
        assert_eq!(
            to_vec(rx).await,
            vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8], vec![9]]
        );
        assert!(to_vec(partition(range(0, 0), 3)).await.is_empty());
        assert_eq!(to_vec(partition(range(0, 4), 2)).await.len(), 2);
    }

    #[tokio::test]
    #[should_panic(expected = "partition size must be at least 1")]
    async fn test_partition_zero_size_panics() {
        let _ = partition(of([1]), 0);
    }

    #[tokio::test]
    async fn test_stage_runs_while_any_receiver_lives() {
        let rx = map(crate::sources::from_iter(0u64..), |x| x + 1);
        assert_eq!(rx.recv().await, Some(1));
        let probe = rx.clone();
        drop(rx);
        assert_eq!(probe.recv().await, Some(2));
        drop(probe);
    }
}
