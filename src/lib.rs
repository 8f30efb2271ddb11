//! # Concurrent channel pipelines for Rust
//!
//! This crate provides composable sequence transformations where every stage
//! runs as its own tokio task and stages talk through closable, bounded,
//! one-directional transports.
//!
//! ## Core Concepts
//!
//! - **Transport**: a [`Sender`](transport::Sender)/[`Receiver`](transport::Receiver)
//!   pair. It closes when its last sender is dropped; only the stage that
//!   created it holds a sender.
//! - **Stage**: a combinator's runtime unit. It reads its input, applies a
//!   function and writes an output it owns, closing it when the input runs out.
//! - **Terminal combinator**: an `async fn` that drains a transport into one
//!   value (`to_vec`, `fold_left`, `sum`, ...).
//! - **Fan-out**: [`dispatcher::clone`] replicates a transport into several
//!   order-synchronized copies.
//! - **Parallel stages**: [`parallel`] runs a worker pool over one input and
//!   gives up output order for throughput.
//!
//! ## Example
//!
//! ```rust
//! use conduit::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let windows = sources::range(0, 10)
//!         .map(|x| x * 2)
//!         .partition(3)
//!         .to_vec()
//!         .await;
//!
//!     assert_eq!(windows, vec![vec![0, 2, 4], vec![6, 8, 10], vec![12, 14, 16], vec![18]]);
//! }
//! ```

pub mod dispatcher;
pub mod error;
pub mod parallel;
pub mod pipeline;
pub mod processors;
pub mod sinks;
pub mod sources;
pub mod traits;
pub mod transport;

// Re-export commonly used items
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::pipeline::{PipelineConfig, StageState};
    pub use crate::processors::Pair;
    pub use crate::sources::{self, generate, Stop};
    pub use crate::traits::{Monoid, TransportExt};
    pub use crate::transport::{channel, Receiver, Sender};
}

// Re-export main error type
pub use error::{Error, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
