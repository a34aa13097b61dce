//! Processing load tracking for the real-time quantum callback.

use crate::{AtomicFlag, AtomicFloat};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Load snapshot, as percentages of the quantum's real-time budget.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DspLoad {
    pub average: f32,
    pub peak: f32,
    pub current: f32,
    pub overruns: u64,
    pub quanta: u64,
}

/// Load meter written by the real-time side and read by the control side.
///
/// Recording is a handful of relaxed atomic stores; reading never blocks the writer.
#[derive(Debug)]
pub struct DspLoadMeter {
    current: AtomicFloat,
    peak: AtomicFloat,
    average: AtomicFloat,
    overruns: AtomicU64,
    quanta: AtomicU64,
    samples: AtomicU32,
    sample_rate: AtomicU32,
    enabled: AtomicFlag,
}

impl DspLoadMeter {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            current: AtomicFloat::new(0.0),
            peak: AtomicFloat::new(0.0),
            average: AtomicFloat::new(0.0),
            overruns: AtomicU64::new(0),
            quanta: AtomicU64::new(0),
            samples: AtomicU32::new(0),
            sample_rate: AtomicU32::new(sample_rate.max(1)),
            enabled: AtomicFlag::new(true),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Rate used to convert a quantum length into its time budget.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate.max(1), Ordering::Relaxed);
    }

    pub fn record(&self, quantum_frames: usize, elapsed: Duration) {
        if !self.is_enabled() || quantum_frames == 0 {
            return;
        }

        let budget = quantum_frames as f64 / self.sample_rate.load(Ordering::Relaxed) as f64;
        let load = (elapsed.as_secs_f64() / budget) as f32;

        self.current.set(load);
        if load > self.peak.get() {
            self.peak.set(load);
        }

        let count = self.samples.fetch_add(1, Ordering::Relaxed);
        let alpha = 1.0 / (count.min(100) + 1) as f32;
        let avg = self.average.get();
        self.average.set(avg * (1.0 - alpha) + load * alpha);

        self.quanta.fetch_add(1, Ordering::Relaxed);
        if elapsed.as_secs_f64() > budget {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> DspLoad {
        DspLoad {
            average: self.average.get() * 100.0,
            peak: self.peak.get() * 100.0,
            current: self.current.get() * 100.0,
            overruns: self.overruns.load(Ordering::Relaxed),
            quanta: self.quanta.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.current.set(0.0);
        self.peak.set(0.0);
        self.average.set(0.0);
        self.overruns.store(0, Ordering::Relaxed);
        self.quanta.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
    }
}

impl Default for DspLoadMeter {
    fn default() -> Self {
        Self::new(44100)
    }
}
