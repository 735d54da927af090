//! Batch progress reporting.
//!
//! The runner never talks to a status message directly; it emits
//! [`ProgressUpdate`]s through a [`ProgressSink`], and the hosting layer
//! decides how to surface them (typically by editing a status message).
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ProgressUpdate`] | Countdown and batch cadence events |
//! | [`ProgressSink`] | Trait for update destinations |
//! | [`NoopProgressSink`] | Default sink (no delivery) |
//! | [`InMemoryProgressSink`] | Recording sink for tests |
//! | [`ChannelProgressSink`] | Forwards updates into an mpsc channel |
//! | [`ProgressReporter`] | Cadence and monotonicity enforcement |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

use crate::Result;

/// One user-visible progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressUpdate {
    /// Staged delayed-start countdown: emitted once per visible minute with
    /// the minutes left until execution begins.
    Countdown { remaining_minutes: u64 },
    /// Batch cadence event: how far along the target list the batch is.
    Processed {
        processed: usize,
        total: usize,
        succeeded: usize,
    },
}

/// Destination for progress updates.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit(&self, update: ProgressUpdate) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// No-op sink (always available).
pub struct NoopProgressSink;

#[async_trait]
impl ProgressSink for NoopProgressSink {
    async fn emit(&self, _: ProgressUpdate) -> Result<()> {
        Ok(())
    }
}

/// Returns a no-op progress sink.
pub fn noop_sink() -> Arc<dyn ProgressSink> {
    Arc::new(NoopProgressSink)
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct InMemoryProgressSink {
    updates: RwLock<Vec<ProgressUpdate>>,
}

impl InMemoryProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.read().unwrap().clone()
    }

    /// Only the `Processed` events, in emission order.
    pub fn processed_events(&self) -> Vec<(usize, usize, usize)> {
        self.updates
            .read()
            .unwrap()
            .iter()
            .filter_map(|u| match u {
                ProgressUpdate::Processed {
                    processed,
                    total,
                    succeeded,
                } => Some((*processed, *total, *succeeded)),
                _ => None,
            })
            .collect()
    }

    /// Only the countdown events, as remaining minutes in emission order.
    pub fn countdowns(&self) -> Vec<u64> {
        self.updates
            .read()
            .unwrap()
            .iter()
            .filter_map(|u| match u {
                ProgressUpdate::Countdown { remaining_minutes } => Some(*remaining_minutes),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.updates.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.updates.write().unwrap().clear();
    }
}

#[async_trait]
impl ProgressSink for InMemoryProgressSink {
    async fn emit(&self, update: ProgressUpdate) -> Result<()> {
        self.updates.write().unwrap().push(update);
        Ok(())
    }
}

/// Sink that forwards updates into an unbounded mpsc channel.
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ChannelProgressSink {
    /// Create the sink together with the receiving half.
    pub fn unbounded() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ProgressSink for ChannelProgressSink {
    async fn emit(&self, update: ProgressUpdate) -> Result<()> {
        // A dropped receiver just means nobody is watching anymore.
        let _ = self.tx.send(update);
        Ok(())
    }
}

static GLOBAL_SINK: once_cell::sync::Lazy<RwLock<Arc<dyn ProgressSink>>> =
    once_cell::sync::Lazy::new(|| RwLock::new(Arc::new(NoopProgressSink)));

/// Returns the globally configured progress sink.
pub fn get_progress_sink() -> Arc<dyn ProgressSink> {
    GLOBAL_SINK.read().unwrap().clone()
}

/// Sets the global progress sink, used by runners built without an explicit one.
pub fn set_progress_sink(sink: Arc<dyn ProgressSink>) {
    *GLOBAL_SINK.write().unwrap() = sink;
}

/// Emits an update to the global sink.
pub async fn emit_progress(update: ProgressUpdate) -> Result<()> {
    get_progress_sink().emit(update).await
}

/// Enforces the update cadence: an update after every `every` completed
/// targets (default 2) and unconditionally on the final one, with `processed`
/// never allowed to decrease.
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    every: usize,
    high_water: usize,
}

impl ProgressReporter {
    pub const DEFAULT_EVERY: usize = 2;

    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            every: Self::DEFAULT_EVERY,
            high_water: 0,
        }
    }

    /// Override the cadence; values below 1 are clamped to 1.
    pub fn with_every(mut self, every: usize) -> Self {
        self.every = every.max(1);
        self
    }

    /// Report one completed target. Emits when the cadence or the final
    /// target says so; calls that would move `processed` backwards are
    /// dropped.
    pub async fn report(&mut self, processed: usize, total: usize, succeeded: usize) {
        if processed <= self.high_water {
            return;
        }
        self.high_water = processed;

        if processed % self.every == 0 || processed == total {
            self.deliver(ProgressUpdate::Processed {
                processed,
                total,
                succeeded,
            })
            .await;
        }
    }

    /// Emit a delayed-start countdown update. Not subject to the cadence.
    pub async fn countdown(&self, remaining_minutes: u64) {
        self.deliver(ProgressUpdate::Countdown { remaining_minutes })
            .await;
    }

    async fn deliver(&self, update: ProgressUpdate) {
        if let Err(error) = self.sink.emit(update).await {
            // Progress delivery must never fail the batch.
            debug!(%error, "progress sink rejected update");
        }
    }
}
