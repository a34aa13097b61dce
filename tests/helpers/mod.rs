//! Test helpers and fixtures for vibe integration tests
//!
//! - signal generators and ready-made sources
//! - [`RecordingModule`]: a `SoftStretcher` that logs every native call
//! - [`FaultyModule`]: a `SoftStretcher` that panics or traps on demand

#![allow(dead_code)]

use vibe::prelude::*;
use vibe::stretch::{
    Address, HeapMemory, NativeResult, RawHandle, StretchOptions, Trap,
};

/// Default test sample rate
pub const TEST_SAMPLE_RATE: u32 = 44100;

/// Output quantum used by the render loops
pub const TEST_QUANTUM: usize = 128;

/// Route library logs to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}

/// Generate a test signal: sine wave at given frequency for specified samples.
pub fn generate_sine(frequency: f64, sample_rate: u32, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            (0.5 * (2.0 * std::f64::consts::PI * frequency * t).sin()) as f32
        })
        .collect()
}

/// A 440 Hz tone of `seconds` with `channels` identical channels.
pub fn sine_source(seconds: f64, channels: usize) -> SourceAudio {
    let frames = (seconds * TEST_SAMPLE_RATE as f64).round() as usize;
    let samples = generate_sine(440.0, TEST_SAMPLE_RATE, frames);
    SourceAudio::new(vec![samples; channels], TEST_SAMPLE_RATE).expect("valid test source")
}

/// Planar output buffers for one quantum.
pub fn quantum_buffers(channels: usize) -> Vec<Vec<f32>> {
    vec![vec![0.0; TEST_QUANTUM]; channels]
}

pub fn is_silent(buffers: &[Vec<f32>]) -> bool {
    buffers.iter().flatten().all(|&s| s == 0.0)
}

/// Controller with an in-memory event log.
pub type TestController<M> = StreamingPlaybackController<M, Vec<EngineEvent>>;

pub fn controller<M: StretcherModule>(module: M) -> TestController<M> {
    StreamingPlaybackController::new(module, EngineConfig::default(), Vec::new())
}

/// Render `count` stereo quanta and return how many carried any sound.
pub fn run_quanta<M: StretcherModule>(controller: &mut TestController<M>, count: usize) -> usize {
    let mut out = quantum_buffers(2);
    (0..count)
        .filter(|_| {
            controller.render(&mut out);
            !is_silent(&out)
        })
        .count()
}

pub fn time_updates(events: &[EngineEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::TimeUpdate { current_time } => Some(*current_time),
            _ => None,
        })
        .collect()
}

pub fn count_status(events: &[EngineEvent], status: Status) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::Status { status: s } if *s == status))
        .count()
}

// =============================================================================
// Instrumented modules
// =============================================================================

/// One native call, as seen by [`RecordingModule`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create { channels: usize },
    Delete,
    Reset,
    SetTimeRatio(f64),
    SetPitchScale(f64),
    SetFormantScale(f64),
    Study { frames: usize, is_final: bool },
    Process { frames: usize, is_final: bool },
    Retrieve { frames: usize },
}

/// Wraps a `SoftStretcher` and records every mutating native call in order.
#[derive(Debug, Default)]
pub struct RecordingModule {
    pub inner: SoftStretcher,
    pub calls: Vec<Call>,
}

impl RecordingModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.iter().position(predicate)
    }
}

impl StretcherModule for RecordingModule {
    type Memory = HeapMemory;

    fn memory(&self) -> &HeapMemory {
        self.inner.memory()
    }

    fn memory_mut(&mut self) -> &mut HeapMemory {
        self.inner.memory_mut()
    }

    fn create_instance(
        &mut self,
        sample_rate: u32,
        channels: usize,
        options: StretchOptions,
        time_ratio: f64,
        pitch_scale: f64,
    ) -> RawHandle {
        self.calls.push(Call::Create { channels });
        self.inner
            .create_instance(sample_rate, channels, options, time_ratio, pitch_scale)
    }

    fn delete_instance(&mut self, handle: RawHandle) {
        self.calls.push(Call::Delete);
        self.inner.delete_instance(handle)
    }

    fn reset(&mut self, handle: RawHandle) -> NativeResult<()> {
        self.calls.push(Call::Reset);
        self.inner.reset(handle)
    }

    fn set_time_ratio(&mut self, handle: RawHandle, ratio: f64) -> NativeResult<()> {
        self.calls.push(Call::SetTimeRatio(ratio));
        self.inner.set_time_ratio(handle, ratio)
    }

    fn set_pitch_scale(&mut self, handle: RawHandle, scale: f64) -> NativeResult<()> {
        self.calls.push(Call::SetPitchScale(scale));
        self.inner.set_pitch_scale(handle, scale)
    }

    fn set_formant_scale(&mut self, handle: RawHandle, scale: f64) -> NativeResult<()> {
        self.calls.push(Call::SetFormantScale(scale));
        self.inner.set_formant_scale(handle, scale)
    }

    fn latency(&self, handle: RawHandle) -> NativeResult<usize> {
        self.inner.latency(handle)
    }

    fn study(
        &mut self,
        handle: RawHandle,
        input_ptrs: Address,
        frames: usize,
        is_final: bool,
    ) -> NativeResult<()> {
        self.calls.push(Call::Study { frames, is_final });
        self.inner.study(handle, input_ptrs, frames, is_final)
    }

    fn process(
        &mut self,
        handle: RawHandle,
        input_ptrs: Address,
        frames: usize,
        is_final: bool,
    ) -> NativeResult<()> {
        self.calls.push(Call::Process { frames, is_final });
        self.inner.process(handle, input_ptrs, frames, is_final)
    }

    fn available(&self, handle: RawHandle) -> NativeResult<usize> {
        self.inner.available(handle)
    }

    fn retrieve(
        &mut self,
        handle: RawHandle,
        output_ptrs: Address,
        frames: usize,
    ) -> NativeResult<usize> {
        self.calls.push(Call::Retrieve { frames });
        self.inner.retrieve(handle, output_ptrs, frames)
    }
}

/// Fault injected by [`FaultyModule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    #[default]
    None,
    Panic,
    /// A non-fatal native fault.
    Trap,
    /// An out-of-bounds access, reported as an arena overrun.
    Overrun,
    /// `create_instance` returns an invalid handle.
    RefuseCreate,
    /// Input is accepted and discarded; nothing ever becomes available.
    Mute,
    /// Input is discarded; one frame is always reported but none is retrievable.
    Stall,
}

/// A `SoftStretcher` whose `process` (or creation) misbehaves in a chosen way.
#[derive(Debug, Default)]
pub struct FaultyModule {
    pub inner: SoftStretcher,
    pub fault: Fault,
}

impl StretcherModule for FaultyModule {
    type Memory = HeapMemory;

    fn memory(&self) -> &HeapMemory {
        self.inner.memory()
    }

    fn memory_mut(&mut self) -> &mut HeapMemory {
        self.inner.memory_mut()
    }

    fn create_instance(
        &mut self,
        sample_rate: u32,
        channels: usize,
        options: StretchOptions,
        time_ratio: f64,
        pitch_scale: f64,
    ) -> RawHandle {
        if self.fault == Fault::RefuseCreate {
            return RawHandle::INVALID;
        }
        self.inner
            .create_instance(sample_rate, channels, options, time_ratio, pitch_scale)
    }

    fn delete_instance(&mut self, handle: RawHandle) {
        self.inner.delete_instance(handle)
    }

    fn reset(&mut self, handle: RawHandle) -> NativeResult<()> {
        self.inner.reset(handle)
    }

    fn set_time_ratio(&mut self, handle: RawHandle, ratio: f64) -> NativeResult<()> {
        self.inner.set_time_ratio(handle, ratio)
    }

    fn set_pitch_scale(&mut self, handle: RawHandle, scale: f64) -> NativeResult<()> {
        self.inner.set_pitch_scale(handle, scale)
    }

    fn set_formant_scale(&mut self, handle: RawHandle, scale: f64) -> NativeResult<()> {
        self.inner.set_formant_scale(handle, scale)
    }

    fn latency(&self, handle: RawHandle) -> NativeResult<usize> {
        self.inner.latency(handle)
    }

    fn study(
        &mut self,
        handle: RawHandle,
        input_ptrs: Address,
        frames: usize,
        is_final: bool,
    ) -> NativeResult<()> {
        self.inner.study(handle, input_ptrs, frames, is_final)
    }

    fn process(
        &mut self,
        handle: RawHandle,
        input_ptrs: Address,
        frames: usize,
        is_final: bool,
    ) -> NativeResult<()> {
        match self.fault {
            Fault::None | Fault::RefuseCreate => {
                self.inner.process(handle, input_ptrs, frames, is_final)
            }
            Fault::Mute | Fault::Stall => Ok(()),
            Fault::Panic => panic!("injected stretcher panic"),
            Fault::Trap => Err(Trap::InputOverflow),
            Fault::Overrun => Err(Trap::OutOfBounds {
                address: input_ptrs.0,
                bytes: frames * 4,
                extent: 0,
            }),
        }
    }

    fn available(&self, handle: RawHandle) -> NativeResult<usize> {
        match self.fault {
            Fault::Mute => Ok(0),
            Fault::Stall => Ok(1),
            _ => self.inner.available(handle),
        }
    }

    fn retrieve(
        &mut self,
        handle: RawHandle,
        output_ptrs: Address,
        frames: usize,
    ) -> NativeResult<usize> {
        match self.fault {
            Fault::Mute | Fault::Stall => Ok(0),
            _ => self.inner.retrieve(handle, output_ptrs, frames),
        }
    }
}

impl FaultyModule {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: SoftStretcher::new(),
            fault,
        }
    }
}
