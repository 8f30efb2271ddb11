//! Fan-out dispatcher: replicate one transport into several.
//!
//! Every element read from the input is delivered to every output, and each
//! output sees the input's exact order. Outputs are independent: a slow
//! reader on one clone does not hold back the others.
//!
//! Each clone has a ticket gate, an atomic counter holding the sequence
//! number of the next element that clone may receive. For every input
//! element `s` the dispatcher spawns one delivery task per clone; the task
//! spins (checking the gate and yielding) until the gate reads `s`, sends,
//! then opens the gate for `s + 1`. The spin costs CPU while a clone lags;
//! it is kept because it is simple and adds no latency when clones keep up.
//!
//! The input is read as fast as it arrives. A clone nobody drains therefore
//! accumulates one parked delivery task per element, without bound.

use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::task::TaskTracker;

use crate::pipeline::Stage;
use crate::transport::{Receiver, Sender};

/// Replicate `input` into `n` order-synchronized outputs.
///
/// Each output closes once every element has been delivered to it, or
/// discarded because all of its receivers were dropped.
///
/// # Panics
///
/// Panics if `n` is zero.
pub fn clone<T>(input: Receiver<T>, n: usize) -> Vec<Receiver<T>>
where
    T: Clone + Send + 'static,
{
    assert!(n > 0, "clone requires at least one output");

    let stage = Stage::new("clone", *input.config());
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..n).map(|_| stage.output()).unzip();

    stage.run(move |ctx| async move {
        let lanes: Vec<Lane<T>> = senders.into_iter().map(Lane::new).collect();
        let mut seq = 0u64;
        while let Some(item) = input.recv().await {
            for lane in &lanes {
                lane.deliver(seq, item.clone());
            }
            seq += 1;
        }
        ctx.draining();
        tracing::debug!(elements = seq, clones = lanes.len(), "clone input exhausted");
        join_all(lanes.into_iter().map(Lane::finish)).await;
    });

    receivers
}

/// One output of a clone group.
struct Lane<T> {
    tx: Sender<T>,
    ticket: Arc<AtomicU64>,
    deliveries: TaskTracker,
}

impl<T: Send + 'static> Lane<T> {
    fn new(tx: Sender<T>) -> Self {
        Self {
            tx,
            ticket: Arc::new(AtomicU64::new(0)),
            deliveries: TaskTracker::new(),
        }
    }

    fn deliver(&self, seq: u64, item: T) {
        let tx = self.tx.clone();
        let ticket = Arc::clone(&self.ticket);
        self.deliveries.spawn(async move {
            while ticket.load(Ordering::Acquire) != seq {
                tokio::task::yield_now().await;
            }
            // a clone without receivers still opens the gate for the next element
            let _ = tx.send(item).await;
            ticket.store(seq + 1, Ordering::Release);
        });
    }

    /// Wait for this lane's deliveries, then close it.
    async fn finish(self) {
        self.deliveries.close();
        self.deliveries.wait().await;
        drop(self.tx);
    }
}
