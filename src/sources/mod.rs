//! Source implementations.
//!
//! Sources turn plain values, iterators and streams into transports. All
//! of them except [`from_vec`] spawn a producer stage and must be called
//! inside a tokio runtime.

mod generate;

pub use generate::{generate, Stop};

use futures::Stream;
use std::ops::{Range, RangeInclusive};
use tokio_stream::StreamExt;

use crate::pipeline::{spawn_stage, PipelineConfig};
use crate::transport::Receiver;

/// A transport pre-filled with `items` and already closed.
///
/// The transport is sized to hold every item, so no task is spawned.
pub fn from_vec<T>(items: Vec<T>) -> Receiver<T> {
    from_vec_with(PipelineConfig::default(), items)
}

/// [`from_vec`] whose downstream stages use `config`.
pub fn from_vec_with<T>(config: PipelineConfig, items: Vec<T>) -> Receiver<T> {
    let (tx, rx) = config.capacity(items.len()).channel("from_vec");
    for item in items {
        if tx.try_send(item).is_err() {
            unreachable!("transport sized to hold every item");
        }
    }
    rx.with_config(config)
}

/// A closed transport holding the given values.
pub fn of<T, I>(items: I) -> Receiver<T>
where
    I: IntoIterator<Item = T>,
{
    from_vec(items.into_iter().collect())
}

/// Feed an iterator through a producer stage. The iterator is advanced
/// lazily, only as fast as the transport drains, so it may be infinite.
pub fn from_iter<I>(iter: I) -> Receiver<I::Item>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    let iter = iter.into_iter();
    spawn_stage("from_iter", PipelineConfig::default(), move |tx, ctx| async move {
        for item in iter {
            if tx.send(item).await.is_err() {
                return;
            }
        }
        ctx.draining();
    })
}

/// Emit `seed`, `next(seed)`, `next(next(seed))`, ... while `has_next` holds.
pub fn iterate<T, P, N>(seed: T, mut has_next: P, mut next: N) -> Receiver<T>
where
    T: Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
    N: FnMut(&T) -> T + Send + 'static,
{
    spawn_stage("iterate", PipelineConfig::default(), move |tx, ctx| async move {
        let mut current = seed;
        while has_next(&current) {
            let following = next(&current);
            if tx.send(current).await.is_err() {
                return;
            }
            current = following;
        }
        ctx.draining();
    })
}

/// Integers in `start..end`.
pub fn range<T>(start: T, end: T) -> Receiver<T>
where
    Range<T>: Iterator<Item = T> + Send + 'static,
    T: Send + 'static,
{
    from_iter(start..end)
}

/// Integers in `start..=end`.
pub fn range_closed<T>(start: T, end: T) -> Receiver<T>
where
    RangeInclusive<T>: Iterator<Item = T> + Send + 'static,
    T: Send + 'static,
{
    from_iter(start..=end)
}

/// Forward every item of a [`Stream`] into a transport, closing it when the
/// stream ends.
pub fn from_stream<S>(stream: S) -> Receiver<S::Item>
where
    S: Stream + Send + 'static,
    S::Item: Send + 'static,
{
    spawn_stage("from_stream", PipelineConfig::default(), move |tx, ctx| async move {
        tokio::pin!(stream);
        while let Some(item) = stream.next().await {
            if tx.send(item).await.is_err() {
                return;
            }
        }
        ctx.draining();
    })
}
