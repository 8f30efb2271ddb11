//! Closable one-directional transports between stages.
//!
//! A transport is a bounded FIFO built on [`tokio::sync::mpsc`]. The producer
//! side is a [`Sender`]; the transport closes when the last `Sender` is
//! dropped, so it closes exactly once and nothing can be sent afterwards.
//! Combinators only ever receive a [`Receiver`], which has no way to close
//! the transport: closing stays with the task that created it.
//!
//! `Receiver` is `Clone`. Clones compete for elements, every element goes to
//! exactly one of them. This is how a worker pool drains a single input.

use futures::Stream;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::error::{Error, Result};
use crate::pipeline::{PipelineConfig, StageMonitor, StageState};

/// Create a transport with the given capacity and the default config.
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    PipelineConfig::default().capacity(capacity).channel("channel")
}

/// The producing half of a transport.
pub struct Sender<T> {
    inner: mpsc::Sender<T>,
    stage: &'static str,
}

impl<T> Sender<T> {
    pub(crate) fn new(inner: mpsc::Sender<T>, stage: &'static str) -> Self {
        Self { inner, stage }
    }

    /// Send an item, waiting for capacity.
    ///
    /// Fails with [`Error::Closed`] once every receiver has been dropped;
    /// the item is discarded and the caller should stop producing.
    pub async fn send(&self, item: T) -> Result<()> {
        self.inner.send(item).await.map_err(|_| Error::Closed)?;

        #[cfg(feature = "metrics")]
        metrics::counter!("conduit_items_sent", "stage" => self.stage).increment(1);

        Ok(())
    }

    /// Send without waiting. Returns the item back when the transport is
    /// full or nobody is listening.
    pub fn try_send(&self, item: T) -> std::result::Result<(), T> {
        self.inner.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(item) => item,
            mpsc::error::TrySendError::Closed(item) => item,
        })
    }

    /// True once every receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Resolves once every receiver has been dropped.
    pub async fn closed(&self) {
        self.inner.closed().await
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            stage: self.stage,
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("stage", &self.stage)
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

/// The consuming half of a transport.
pub struct Receiver<T> {
    inner: Arc<Mutex<mpsc::Receiver<T>>>,
    config: PipelineConfig,
    stage: Option<StageMonitor>,
}

impl<T> Receiver<T> {
    pub(crate) fn new(inner: mpsc::Receiver<T>, config: PipelineConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
            config,
            stage: None,
        }
    }

    pub(crate) fn monitored(mut self, monitor: StageMonitor) -> Self {
        self.stage = Some(monitor);
        self
    }

    /// Receive the next element, or `None` once the transport is closed and
    /// drained. Receiving again after `None` keeps returning `None`.
    pub async fn recv(&self) -> Option<T> {
        self.inner.lock().await.recv().await
    }

    /// Receive without waiting.
    ///
    /// Returns `None` if no element is buffered right now, if another clone
    /// is in the middle of a receive, or if the transport is closed.
    pub fn try_recv(&self) -> Option<T> {
        let mut inner = self.inner.try_lock().ok()?;
        inner.try_recv().ok()
    }

    /// The configuration downstream stages will be built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build downstream stages with a different configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Current lifecycle state of the stage feeding this transport, if the
    /// transport is fed by a stage task.
    pub fn stage_state(&self) -> Option<StageState> {
        self.stage.as_ref().map(StageMonitor::state)
    }

    /// Wait until the stage feeding this transport has exited.
    ///
    /// Returns [`Error::StageAborted`] if its task unwound instead of closing
    /// normally. Transports without a feeding task return immediately.
    pub async fn stage_closed(&self) -> Result<()> {
        match &self.stage {
            Some(monitor) => monitor.closed().await,
            None => Ok(()),
        }
    }

    /// Consume the transport as a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = T>
    where
        T: Send + 'static,
    {
        futures::stream::unfold(self, |rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        })
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config,
            stage: self.stage.clone(),
        }
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("config", &self.config)
            .field("stage", &self.stage_state())
            .finish()
    }
}
