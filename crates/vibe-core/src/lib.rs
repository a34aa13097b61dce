//! Shared runtime kernel for the vibe playback engine.
//!
//! - [`EngineConfig`]: block sizes, parameter limits and channel capacities
//! - [`AtomicFloat`] / [`AtomicFlag`]: cache-line aligned atomics for cross-thread state
//! - [`DspLoadMeter`]: per-quantum processing load, readable from any thread

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::{validate_sample_rate, EngineConfig, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};

mod lockfree;
pub use lockfree::{AtomicFlag, AtomicFloat};

mod meter;
pub use meter::{DspLoad, DspLoadMeter};
