//! Stage orchestration and pipeline configuration.
//!
//! Every combinator that returns a transport is a *stage*: one or more
//! background tasks that read input transports, apply a function and write
//! an output transport the stage owns exclusively. A stage moves through
//! [`StageState`] `Idle → Running → Draining → Closed`; the state is
//! published on a [`tokio::sync::watch`] channel so tests can detect stages
//! that never finish or that crashed.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::transport::{Receiver, Sender};

/// Configuration shared by the stages of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineConfig {
    /// Number of elements a transport buffers before `send` waits
    pub capacity: usize,
    /// Number of workers in a parallel pool
    pub parallelism: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl PipelineConfig {
    /// Set the transport capacity
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the worker count of parallel pools
    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub(crate) fn workers(&self) -> usize {
        self.parallelism.max(1)
    }

    /// Create a transport built with this configuration.
    pub fn channel<T>(&self, stage: &'static str) -> (Sender<T>, Receiver<T>) {
        let (tx, rx) = mpsc::channel(self.capacity.max(1));
        (Sender::new(tx, stage), Receiver::new(rx, *self))
    }
}

/// Lifecycle of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Created, task not yet scheduled
    Idle,
    /// Reading input and writing output
    Running,
    /// Input exhausted, flushing remaining output
    Draining,
    /// Task exited and every output transport is closed
    Closed,
    /// Task unwound or was cancelled before closing normally
    Aborted,
}

impl StageState {
    fn is_terminal(self) -> bool {
        matches!(self, StageState::Closed | StageState::Aborted)
    }
}

/// Read side of a stage's state, carried by its output receivers.
#[derive(Debug, Clone)]
pub(crate) struct StageMonitor {
    name: &'static str,
    state: watch::Receiver<StageState>,
}

impl StageMonitor {
    pub(crate) fn state(&self) -> StageState {
        *self.state.borrow()
    }

    pub(crate) async fn closed(&self) -> Result<()> {
        let mut state = self.state.clone();
        let aborted = Error::StageAborted { stage: self.name };
        let terminal = match state.wait_for(|s| s.is_terminal()).await {
            Ok(s) => *s,
            Err(_) => return Err(aborted),
        };
        match terminal {
            StageState::Closed => Ok(()),
            _ => Err(aborted),
        }
    }
}

/// Handle a stage body uses to report its progress.
#[derive(Debug, Clone)]
pub struct StageContext {
    name: &'static str,
    state: Arc<watch::Sender<StageState>>,
}

impl StageContext {
    /// Name the stage was spawned with
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Input is exhausted; only buffered output remains to be written.
    pub fn draining(&self) {
        self.transition(StageState::Draining);
    }

    fn transition(&self, next: StageState) {
        self.state.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            tracing::trace!(stage = self.name, from = ?*current, to = ?next, "stage transition");
            *current = next;
            true
        });
    }
}

/// Marks the stage `Aborted` unless it was finished explicitly.
struct StageGuard {
    ctx: StageContext,
    finished: bool,
}

impl StageGuard {
    fn finish(mut self) {
        self.finished = true;
        self.ctx.transition(StageState::Closed);
        tracing::debug!(stage = self.ctx.name, "stage closed");
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(stage = self.ctx.name, "stage aborted before closing its output");
            self.ctx.transition(StageState::Aborted);
        }
    }
}

/// A stage under construction: allocate outputs, then [`Stage::run`] it.
pub struct Stage {
    ctx: StageContext,
    monitor: StageMonitor,
    config: PipelineConfig,
}

impl Stage {
    /// Start building a stage whose outputs use `config`
    pub fn new(name: &'static str, config: PipelineConfig) -> Self {
        let (tx, rx) = watch::channel(StageState::Idle);
        Self {
            ctx: StageContext {
                name,
                state: Arc::new(tx),
            },
            monitor: StageMonitor { name, state: rx },
            config,
        }
    }

    /// Allocate an output transport owned by this stage.
    pub fn output<T>(&self) -> (Sender<T>, Receiver<T>) {
        let (tx, rx) = self.config.channel(self.ctx.name);
        (tx, rx.monitored(self.monitor.clone()))
    }

    /// Spawn the stage body on the current tokio runtime.
    ///
    /// The body must own every output [`Sender`]; they are dropped, closing
    /// the outputs, when the body completes. The stage is `Closed` only after
    /// that.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn run<F, Fut>(self, body: F)
    where
        F: FnOnce(StageContext) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = self.ctx.name;
        let guard = StageGuard {
            ctx: self.ctx.clone(),
            finished: false,
        };
        let fut = body(self.ctx);
        let span = tracing::debug_span!("stage", stage = name);

        tokio::spawn(
            async move {
                guard.ctx.transition(StageState::Running);
                tracing::debug!(stage = name, "stage started");
                fut.await;
                guard.finish();
            }
            .instrument(span),
        );
    }
}

/// Spawn a single-output stage and return its output.
pub(crate) fn spawn_stage<T, F, Fut>(
    name: &'static str,
    config: PipelineConfig,
    body: F,
) -> Receiver<T>
where
    F: FnOnce(Sender<T>, StageContext) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let stage = Stage::new(name, config);
    let (tx, rx) = stage.output();
    stage.run(move |ctx| body(tx, ctx));
    rx
}
