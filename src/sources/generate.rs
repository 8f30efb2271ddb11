//! Unbounded generator with an explicit stop protocol.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{spawn_stage, PipelineConfig};
use crate::transport::Receiver;

/// Calls `supplier` forever, sending each result, until [`Stop::stop`].
///
/// The generator never ends on its own. Stages that stop reading early
/// (`limit`, `take_while`) leave it blocked on a send until `stop` is called
/// or every receiver, including the one inside [`Stop`], is dropped.
pub fn generate<T, F>(mut supplier: F) -> (Receiver<T>, Stop<T>)
where
    T: Send + 'static,
    F: FnMut() -> T + Send + 'static,
{
    let keep_going = Arc::new(AtomicBool::new(true));
    let token = CancellationToken::new();

    let rx = {
        let keep_going = Arc::clone(&keep_going);
        let token = token.clone();
        spawn_stage("generate", PipelineConfig::default(), move |tx, ctx| async move {
            while keep_going.load(Ordering::Acquire) {
                let item = supplier();
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    sent = tx.send(item) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            ctx.draining();
        })
    };

    let stop = Stop {
        keep_going,
        token,
        output: rx.clone(),
    };
    (rx, stop)
}

/// Stops a [`generate`] task.
#[derive(Debug)]
pub struct Stop<T> {
    keep_going: Arc<AtomicBool>,
    token: CancellationToken,
    output: Receiver<T>,
}

impl<T> Stop<T> {
    /// Stop the generator and wait for its output to close.
    ///
    /// Clears the keep-going flag, releases a send blocked on a full
    /// transport, then receives until the transport reports closed,
    /// discarding values that were already in flight. Once this returns,
    /// every receive on the generator's output yields `None`.
    ///
    /// Idempotent; concurrent calls all return once the output is closed.
    pub async fn stop(&self) {
        if self.keep_going.swap(false, Ordering::AcqRel) {
            tracing::debug!("stopping generator");
        }
        self.token.cancel();
        let mut discarded = 0usize;
        while self.output.recv().await.is_some() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::trace!(discarded, "discarded in-flight generator output");
        }
    }

    /// True once [`Stop::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        !self.keep_going.load(Ordering::Acquire)
    }
}
