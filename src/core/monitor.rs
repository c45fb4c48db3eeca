//! Change detection loop over a stream of readings.
//!
//! The monitor keeps a [`SensorWindow`], selects the most deviant reading each
//! time the window is full, and hands it to a [`ChangeHandler`] only when it
//! differs from the reading that triggered the previous dispatch.
//!
//! ```text
//!            ┌──────────── same as last trigger ───────────┐
//!            ▼                                              │
//!  ┌──────────────────┐  deviant differs   ┌──────────────────┐
//!  │      STEADY      │──────────────────▶│     CHANGED      │
//!  └──────────────────┘                    └──────────────────┘
//!            ▲        dispatch ok (last trigger updated) │
//!            └──────────────────────────────────────────┘
//! ```

use crate::advice::AdviceError;
use crate::core::reading::Reading;
use crate::core::window::{Deviant, SensorWindow, DEFAULT_WINDOW_SIZE};
use crate::model::ModelError;
use crate::source::SourceError;
use crate::stats::{create_shared_stats, SharedMonitorStats};
use crate::store::StoreError;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Failure of one dispatch attempt.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("classification failed: {0}")]
    Classification(#[from] ModelError),

    #[error("advice generation failed: {0}")]
    Advice(#[from] AdviceError),

    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Other(String),
}

/// Receives the reading behind each detected change.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    async fn on_change(&self, reading: &Reading) -> Result<(), DispatchError>;
}

#[async_trait]
impl<T: ChangeHandler + ?Sized> ChangeHandler for Arc<T> {
    async fn on_change(&self, reading: &Reading) -> Result<(), DispatchError> {
        (**self).on_change(reading).await
    }
}

/// Bounded retry for failed dispatches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per detected change, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Result of feeding one reading to the monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Window not yet full
    Filling { len: usize },
    /// Selected deviant equals the last trigger
    Unchanged(Deviant),
    /// Handler ran successfully; the deviant is the new last trigger
    Dispatched(Deviant),
    /// Every attempt failed; the last trigger is untouched
    Failed { deviant: Deviant, error: String },
    /// Stop was requested mid-dispatch; the last trigger is untouched
    Interrupted(Deviant),
}

/// Why the monitor loop stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorExit {
    /// The source ran out of readings
    EndOfStream,
    /// The source reported that the hardware went away
    Disconnected(String),
    /// The source produced an invalid payload
    Malformed(String),
    /// Stop was requested through the cancellation token
    Cancelled,
}

impl std::fmt::Display for MonitorExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorExit::EndOfStream => write!(f, "end of stream"),
            MonitorExit::Disconnected(reason) => write!(f, "hardware not connected: {reason}"),
            MonitorExit::Malformed(reason) => write!(f, "malformed reading: {reason}"),
            MonitorExit::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Sliding-window change monitor.
pub struct Monitor<H> {
    window: SensorWindow,
    last_trigger: Option<Reading>,
    handler: H,
    retry: RetryPolicy,
    stats: SharedMonitorStats,
}

impl<H: ChangeHandler> Monitor<H> {
    /// Create a monitor with a window of 10 and the default retry policy.
    pub fn new(handler: H) -> Self {
        Self {
            window: SensorWindow::new(DEFAULT_WINDOW_SIZE),
            last_trigger: None,
            handler,
            retry: RetryPolicy::default(),
            stats: create_shared_stats(),
        }
    }

    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window = SensorWindow::new(size);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stats(mut self, stats: SharedMonitorStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn window(&self) -> &SensorWindow {
        &self.window
    }

    pub fn last_trigger(&self) -> Option<&Reading> {
        self.last_trigger.as_ref()
    }

    pub fn stats(&self) -> &SharedMonitorStats {
        &self.stats
    }

    /// Process one reading.
    ///
    /// The reading enters the window (evicting the oldest once at capacity).
    /// When the window is full, its most deviant reading is compared with the
    /// last trigger and dispatched if it differs.
    pub async fn feed(&mut self, reading: Reading) -> CycleOutcome {
        self.cycle(reading, &CancellationToken::new()).await
    }

    async fn cycle(&mut self, reading: Reading, cancel: &CancellationToken) -> CycleOutcome {
        self.stats.record_reading();

        if !self.window.push(reading) {
            return CycleOutcome::Filling {
                len: self.window.len(),
            };
        }
        let Some(deviant) = self.window.select_deviant() else {
            return CycleOutcome::Filling {
                len: self.window.len(),
            };
        };
        self.stats.record_window_evaluated();

        if self.last_trigger.as_ref() == Some(&deviant.reading) {
            tracing::debug!(reading = %deviant.reading, "unchanged");
            self.stats.record_unchanged();
            return CycleOutcome::Unchanged(deviant);
        }

        let Some(result) = self.dispatch(&deviant.reading, cancel).await else {
            tracing::info!(reading = %deviant.reading, "dispatch interrupted");
            return CycleOutcome::Interrupted(deviant);
        };

        match result {
            Ok(()) => {
                self.last_trigger = Some(deviant.reading);
                self.stats.record_dispatch();
                tracing::info!(
                    reading = %deviant.reading,
                    index = deviant.index,
                    total = deviant.total,
                    "changed"
                );
                CycleOutcome::Dispatched(deviant)
            }
            Err(e) => {
                self.stats.record_failed_dispatch();
                tracing::error!(reading = %deviant.reading, "dispatch failed: {}", e);
                CycleOutcome::Failed {
                    deviant,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Consume `stream` until it ends, fails, or `cancel` fires.
    ///
    /// Input problems end the loop quietly; the returned [`MonitorExit`] says
    /// why. Dispatch failures never end the loop.
    pub async fn run<S>(&mut self, mut stream: S, cancel: CancellationToken) -> MonitorExit
    where
        S: Stream<Item = Result<Reading, SourceError>> + Unpin,
    {
        tracing::info!(window = self.window.capacity(), "Sensor monitor started");

        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break MonitorExit::Cancelled,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(reading)) => {
                    if let CycleOutcome::Interrupted(_) = self.cycle(reading, &cancel).await {
                        break MonitorExit::Cancelled;
                    }
                }
                Some(Err(SourceError::Disconnected(reason))) => {
                    tracing::warn!("Hardware is not connected: {}", reason);
                    break MonitorExit::Disconnected(reason);
                }
                Some(Err(SourceError::Malformed(e))) => {
                    tracing::warn!("Discarding stream after malformed reading: {}", e);
                    break MonitorExit::Malformed(e.to_string());
                }
                None => break MonitorExit::EndOfStream,
            }
        };

        tracing::info!(
            dispatches = self.stats.stats().dispatches,
            "Sensor monitor stopped: {}",
            exit
        );
        exit
    }

    /// Run the handler with bounded retry. `None` means `cancel` fired
    /// while a handler call or a backoff sleep was pending.
    async fn dispatch(
        &self,
        reading: &Reading,
        cancel: &CancellationToken,
    ) -> Option<Result<(), DispatchError>> {
        let attempts = self.retry.max_attempts.max(1);
        let mut delay = self.retry.backoff;
        let mut attempt = 1;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                result = self.handler.on_change(reading) => result,
            };

            match result {
                Ok(()) => return Some(Ok(())),
                Err(e) if attempt >= attempts => return Some(Err(e)),
                Err(e) => {
                    tracing::warn!(attempt, "Dispatch attempt failed, retrying: {}", e);
                    if !delay.is_zero() {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return None,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }
}
