//! Core functionality for the field monitor.
//!
//! This module contains:
//! - The validated sensor reading type
//! - The sliding window and most-deviant selection
//! - The change detection loop that drives dispatch

pub mod monitor;
pub mod reading;
pub mod window;

// Re-export commonly used types
pub use monitor::{
    ChangeHandler, CycleOutcome, DispatchError, Monitor, MonitorExit, RetryPolicy,
};
pub use reading::{Reading, ReadingError, FIELD_NAMES, READING_ARITY};
pub use window::{Deviant, SensorWindow, DEFAULT_WINDOW_SIZE};
