//! The native stretcher ABI.
//!
//! A stretcher module is driven the way a C library behind a `float**` interface
//! is: instances are opaque handles, and audio crosses the boundary as *pointer
//! arrays* in the module's linear memory (one `u32` address per channel, each
//! pointing at that channel's `f32` frames).

use crate::error::Trap;
use crate::memory::{Address, LinearMemory};
use crate::options::StretchOptions;

/// Opaque instance handle. `RawHandle::INVALID` signals a failed creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub u32);

impl RawHandle {
    pub const INVALID: RawHandle = RawHandle(0);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// Result of a native call.
pub type NativeResult<T> = Result<T, Trap>;

/// A time-stretching / pitch-shifting library exposed through handles and linear memory.
///
/// `process`, `retrieve` and `available` run on the real-time path: implementations
/// must not block or allocate in them, and their cost must be proportional to the
/// frames moved.
pub trait StretcherModule {
    type Memory: LinearMemory;

    fn memory(&self) -> &Self::Memory;

    fn memory_mut(&mut self) -> &mut Self::Memory;

    /// Create an instance. Returns [`RawHandle::INVALID`] on failure.
    fn create_instance(
        &mut self,
        sample_rate: u32,
        channels: usize,
        options: StretchOptions,
        time_ratio: f64,
        pitch_scale: f64,
    ) -> RawHandle;

    /// Destroy an instance. Invalid or stale handles are ignored.
    fn delete_instance(&mut self, handle: RawHandle);

    /// Drop all buffered audio and history; re-arms the instance after a final block.
    fn reset(&mut self, handle: RawHandle) -> NativeResult<()>;

    fn set_time_ratio(&mut self, handle: RawHandle, ratio: f64) -> NativeResult<()>;

    fn set_pitch_scale(&mut self, handle: RawHandle, scale: f64) -> NativeResult<()>;

    fn set_formant_scale(&mut self, handle: RawHandle, scale: f64) -> NativeResult<()>;

    /// Processing delay in frames between input and the corresponding output.
    fn latency(&self, handle: RawHandle) -> NativeResult<usize>;

    /// Offline analysis pass: inspect `frames` of input without producing output.
    fn study(
        &mut self,
        handle: RawHandle,
        input_ptrs: Address,
        frames: usize,
        is_final: bool,
    ) -> NativeResult<()>;

    /// Feed `frames` of input. `is_final` marks the last block of the stream.
    fn process(
        &mut self,
        handle: RawHandle,
        input_ptrs: Address,
        frames: usize,
        is_final: bool,
    ) -> NativeResult<()>;

    /// Frames of output ready to retrieve.
    fn available(&self, handle: RawHandle) -> NativeResult<usize>;

    /// Copy up to `frames` of output into the buffers named by `output_ptrs`.
    /// Returns the number of frames written per channel.
    fn retrieve(&mut self, handle: RawHandle, output_ptrs: Address, frames: usize)
        -> NativeResult<usize>;
}
