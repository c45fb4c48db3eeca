//! Annadata Monitor - soil sensor change detection with crop advice.
//!
//! This library watches a stream of seven-field soil and climate readings
//! (Nitrogen, Phosphorus, Potassium, Temperature, Humidity, pH, Rainfall),
//! detects when the field state has meaningfully changed, and only then runs
//! the expensive advisory pipeline: crop classification, generated advice,
//! and persistence. It also serves on-demand crop and leaf-disease
//! classification over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Annadata Monitor                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Source    │──▶│   Window    │──▶│   Monitor   │       │
//! │  │ (tcp/stdin/ │   │ (10 slots)  │   │(LastTrigger)│       │
//! │  │  file/http) │   └─────────────┘   └─────────────┘       │
//! │  └─────────────┘                            │ change        │
//! │                                             ▼              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │    Store    │◀──│   Advice    │◀──│   Models    │       │
//! │  │(jsonl/mongo)│   │  (Gemini)   │   │ (crop MLP)  │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use annadata_monitor::{core::Monitor, pipeline::AdvisoryPipeline, source, store::MemoryStore};
//! use annadata_monitor::model::Models;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() {
//! let models = Arc::new(Models::new(None, None));
//! let pipeline = AdvisoryPipeline::new(models, None, Arc::new(MemoryStore::new()));
//!
//! let mut monitor = Monitor::new(pipeline);
//! let exit = monitor.run(source::stdin(), CancellationToken::new()).await;
//! println!("monitor stopped: {exit}");
//! # }
//! ```

pub mod advice;
pub mod config;
pub mod core;
pub mod model;
pub mod pipeline;
pub mod source;
pub mod stats;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use advice::{AdviceError, AdviceGenerator, GeminiAdvisor};
pub use config::{Config, ConfigError};
pub use crate::core::{
    ChangeHandler, CycleOutcome, DispatchError, Monitor, MonitorExit, Reading, ReadingError,
    RetryPolicy, SensorWindow,
};
pub use model::{CropClassifier, CropPrediction, DiseasePrediction, ModelError, Models};
pub use pipeline::AdvisoryPipeline;
pub use source::{ReadingStream, SourceError, SourceKind};
pub use stats::{MonitorStats, SharedMonitorStats};
pub use store::{RecommendationStore, StoreError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
