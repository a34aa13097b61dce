//! Lifecycle and parameter wrapper around one stretcher instance.

use crate::arena::ChannelBufferSet;
use crate::error::{Error, Result};
use crate::module::{RawHandle, StretcherModule};
use crate::options::StretchOptions;

/// One live stretcher instance plus the parameters last pushed into it.
///
/// The handle is valid iff the native instance is live. The `applied_*` fields
/// shadow the instance so callers can skip redundant native calls.
#[derive(Debug)]
pub struct StretchEngineHandle {
    handle: RawHandle,
    sample_rate: u32,
    channels: usize,
    options: StretchOptions,
    applied_ratio: f64,
    applied_pitch_scale: f64,
    applied_formant_scale: f64,
}

impl StretchEngineHandle {
    pub fn create<M: StretcherModule>(
        module: &mut M,
        sample_rate: u32,
        channels: usize,
        options: StretchOptions,
        initial_ratio: f64,
        initial_pitch: f64,
    ) -> Result<Self> {
        let handle =
            module.create_instance(sample_rate, channels, options, initial_ratio, initial_pitch);
        if !handle.is_valid() {
            tracing::error!(
                "Stretcher creation failed: {} channels @ {} Hz (options {:#x})",
                channels,
                sample_rate,
                options.bits()
            );
            return Err(Error::EngineCreateFailed {
                sample_rate,
                channels,
            });
        }

        Ok(Self {
            handle,
            sample_rate,
            channels,
            options,
            applied_ratio: initial_ratio,
            applied_pitch_scale: initial_pitch,
            applied_formant_scale: 1.0,
        })
    }

    /// Destroy the native instance. Further calls are no-ops.
    pub fn destroy<M: StretcherModule>(&mut self, module: &mut M) {
        if self.handle.is_valid() {
            let handle = std::mem::replace(&mut self.handle, RawHandle::INVALID);
            module.delete_instance(handle);
        }
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.handle.is_valid()
    }

    #[inline]
    pub fn raw(&self) -> RawHandle {
        self.handle
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn options(&self) -> StretchOptions {
        self.options
    }

    pub fn applied_ratio(&self) -> f64 {
        self.applied_ratio
    }

    pub fn applied_pitch_scale(&self) -> f64 {
        self.applied_pitch_scale
    }

    pub fn applied_formant_scale(&self) -> f64 {
        self.applied_formant_scale
    }

    fn live(&self) -> Result<RawHandle> {
        if self.handle.is_valid() {
            Ok(self.handle)
        } else {
            Err(Error::InvalidHandle)
        }
    }

    /// Clear the instance's history. Must precede parameter changes after a discontinuity.
    pub fn reset<M: StretcherModule>(&mut self, module: &mut M) -> Result<()> {
        module.reset(self.live()?)?;
        Ok(())
    }

    pub fn set_time_ratio<M: StretcherModule>(&mut self, module: &mut M, ratio: f64) -> Result<()> {
        module.set_time_ratio(self.live()?, ratio)?;
        self.applied_ratio = ratio;
        Ok(())
    }

    pub fn set_pitch_scale<M: StretcherModule>(&mut self, module: &mut M, scale: f64) -> Result<()> {
        module.set_pitch_scale(self.live()?, scale)?;
        self.applied_pitch_scale = scale;
        Ok(())
    }

    pub fn set_formant_scale<M: StretcherModule>(
        &mut self,
        module: &mut M,
        scale: f64,
    ) -> Result<()> {
        module.set_formant_scale(self.live()?, scale)?;
        self.applied_formant_scale = scale;
        Ok(())
    }

    /// Push `ratio` only if it differs from the shadow by more than `epsilon`.
    /// Returns whether a native call was made.
    pub fn update_time_ratio<M: StretcherModule>(
        &mut self,
        module: &mut M,
        ratio: f64,
        epsilon: f64,
    ) -> Result<bool> {
        if (ratio - self.applied_ratio).abs() <= epsilon {
            return Ok(false);
        }
        self.set_time_ratio(module, ratio)?;
        Ok(true)
    }

    pub fn update_pitch_scale<M: StretcherModule>(
        &mut self,
        module: &mut M,
        scale: f64,
        epsilon: f64,
    ) -> Result<bool> {
        if (scale - self.applied_pitch_scale).abs() <= epsilon {
            return Ok(false);
        }
        self.set_pitch_scale(module, scale)?;
        Ok(true)
    }

    pub fn update_formant_scale<M: StretcherModule>(
        &mut self,
        module: &mut M,
        scale: f64,
        epsilon: f64,
    ) -> Result<bool> {
        if (scale - self.applied_formant_scale).abs() <= epsilon {
            return Ok(false);
        }
        self.set_formant_scale(module, scale)?;
        Ok(true)
    }

    /// Feed `frames` from the set's input buffers (analysis only, offline mode).
    pub fn study<M: StretcherModule>(
        &mut self,
        module: &mut M,
        buffers: &ChannelBufferSet,
        frames: usize,
        is_final: bool,
    ) -> Result<()> {
        check_block(buffers, frames)?;
        module.study(self.live()?, buffers.input_ptrs(), frames, is_final)?;
        Ok(())
    }

    /// Feed `frames` from the set's input buffers.
    pub fn process<M: StretcherModule>(
        &mut self,
        module: &mut M,
        buffers: &ChannelBufferSet,
        frames: usize,
        is_final: bool,
    ) -> Result<()> {
        check_block(buffers, frames)?;
        module.process(self.live()?, buffers.input_ptrs(), frames, is_final)?;
        Ok(())
    }

    pub fn available<M: StretcherModule>(&self, module: &M) -> Result<usize> {
        Ok(module.available(self.live()?)?)
    }

    /// Retrieve up to `max_frames` (capped at the block size) into the set's output buffers.
    pub fn retrieve<M: StretcherModule>(
        &mut self,
        module: &mut M,
        buffers: &ChannelBufferSet,
        max_frames: usize,
    ) -> Result<usize> {
        let frames = max_frames.min(buffers.block_frames());
        Ok(module.retrieve(self.live()?, buffers.output_ptrs(), frames)?)
    }

    pub fn latency_frames<M: StretcherModule>(&self, module: &M) -> Result<usize> {
        Ok(module.latency(self.live()?)?)
    }
}

impl Drop for StretchEngineHandle {
    fn drop(&mut self) {
        if self.handle.is_valid() {
            tracing::warn!(
                "StretchEngineHandle {} dropped without destroy; native instance leaked",
                self.handle.0
            );
        }
    }
}

fn check_block(buffers: &ChannelBufferSet, frames: usize) -> Result<()> {
    if frames > buffers.block_frames() {
        return Err(Error::BlockOverflow {
            frames,
            capacity: buffers.block_frames(),
        });
    }
    Ok(())
}
