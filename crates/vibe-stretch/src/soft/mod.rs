//! Built-in pure-Rust stretcher module.
//!
//! Each channel runs a [`LinearResampler`] (pitch) into a [`PhaseVocoder`]
//! (time). The vocoder stretches by `ratio × pitch` so the resampled signal
//! comes back to `ratio` times the input length at the shifted pitch.
//!
//! Output accounting is exact: every `process` call adds `frames × ratio` to the
//! instance's target length, and once the final block arrives the vocoder is
//! flushed with zero padding and the retrievable output is cut at that target.

mod resampler;
mod vocoder;

use std::fmt;

use rustfft::FftPlanner;

use crate::error::Trap;
use crate::memory::{Address, HeapMemory, LinearMemory};
use crate::module::{NativeResult, RawHandle, StretcherModule};
use crate::options::{FftSize, StretchOptions};

use resampler::LinearResampler;
use vocoder::PhaseVocoder;

/// Largest block a single `process` or `study` call accepts by default.
pub const DEFAULT_MAX_BLOCK_FRAMES: usize = 2048;

/// Upper channel limit per instance.
pub const MAX_CHANNELS: usize = 32;

const MIN_STRETCH: f64 = 0.05;
const MAX_STRETCH: f64 = 20.0;
const MIN_PITCH: f64 = 0.25;
const MAX_PITCH: f64 = 4.0;

struct ChannelState {
    resampler: LinearResampler,
    vocoder: PhaseVocoder,
}

struct Instance {
    options: StretchOptions,
    fft_size: FftSize,
    time_ratio: f64,
    pitch_scale: f64,
    formant_scale: f64,

    channels: Vec<ChannelState>,
    // Per-channel addresses read from a pointer array; sized once at creation.
    pointers: Vec<Address>,
    hop_phase: f64,

    target_output: f64,
    output_limit: Option<usize>,
    retrieved: usize,
    input_frames: u64,
    final_received: bool,

    studied_frames: u64,
    study_complete: bool,
}

impl Instance {
    fn new(
        channels: usize,
        options: StretchOptions,
        time_ratio: f64,
        pitch_scale: f64,
        max_block_frames: usize,
    ) -> Self {
        let fft_size = options.fft_size();
        let size = fft_size.size();
        let max_synthesis_hop = (fft_size.hop_size() as f64 * MAX_STRETCH).ceil() as usize;
        let input_capacity = size * 2 + max_block_frames * 4 + 8;
        let output_capacity = size * 4 + max_synthesis_hop * 4 + max_block_frames * 20;

        let mut planner = FftPlanner::new();
        let states = (0..channels)
            .map(|_| ChannelState {
                resampler: LinearResampler::new(pitch_scale),
                vocoder: PhaseVocoder::new(fft_size, &mut planner, input_capacity, output_capacity),
            })
            .collect();

        Self {
            options,
            fft_size,
            time_ratio,
            pitch_scale,
            formant_scale: 1.0,
            channels: states,
            pointers: vec![Address::NULL; channels],
            hop_phase: 0.0,
            target_output: 0.0,
            output_limit: None,
            retrieved: 0,
            input_frames: 0,
            final_received: false,
            studied_frames: 0,
            study_complete: false,
        }
    }

    fn stretch(&self) -> f64 {
        (self.time_ratio * self.pitch_scale).clamp(MIN_STRETCH, MAX_STRETCH)
    }

    fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.resampler.reset();
            channel.vocoder.reset();
        }
        self.hop_phase = 0.0;
        self.target_output = 0.0;
        self.output_limit = None;
        self.retrieved = 0;
        self.input_frames = 0;
        self.final_received = false;
    }

    fn set_pitch_scale(&mut self, scale: f64) {
        self.pitch_scale = scale;
        for channel in &mut self.channels {
            channel.resampler.set_step(scale);
        }
    }

    /// Synthesis hop for the next frame; the fractional part carries over so the
    /// long-run rate matches the stretch exactly.
    fn next_synthesis_hop(&mut self) -> usize {
        self.hop_phase += self.fft_size.hop_size() as f64 * self.stretch();
        let hop = self.hop_phase.floor();
        self.hop_phase -= hop;
        (hop as usize).max(1)
    }

    fn produced(&self) -> usize {
        self.channels
            .iter()
            .map(|c| c.vocoder.produced())
            .min()
            .unwrap_or(0)
    }

    fn available(&self) -> usize {
        let produced = self.produced();
        let ready = match self.output_limit {
            Some(limit) => produced.min(limit),
            None => produced,
        };
        ready.saturating_sub(self.retrieved)
    }

    fn finish(&mut self) {
        self.final_received = true;
        self.output_limit = Some(self.target_output.round() as usize);
    }

    /// Run as many frames as input and output room allow. After the final block,
    /// keep going on zero padding until the target length is reached.
    fn pump(&mut self) {
        loop {
            let Some(first) = self.channels.first() else {
                return;
            };
            if !first.vocoder.has_output_room() {
                return;
            }
            match self.output_limit {
                Some(limit) => {
                    if first.vocoder.produced() >= limit {
                        return;
                    }
                    if !first.vocoder.has_frame() {
                        for channel in &mut self.channels {
                            channel.vocoder.pad_to_frame();
                        }
                    }
                }
                None if !first.vocoder.has_frame() => return,
                None => {}
            }

            let hop = self.next_synthesis_hop();
            for channel in &mut self.channels {
                channel.vocoder.process_frame(hop);
            }
        }
    }
}

/// Pure-Rust [`StretcherModule`] over a [`HeapMemory`].
pub struct SoftStretcher {
    memory: HeapMemory,
    instances: Vec<Option<Instance>>,
    max_block_frames: usize,
}

impl SoftStretcher {
    pub fn new() -> Self {
        Self::with_memory(HeapMemory::new())
    }

    pub fn with_memory(memory: HeapMemory) -> Self {
        Self {
            memory,
            instances: Vec::new(),
            max_block_frames: DEFAULT_MAX_BLOCK_FRAMES,
        }
    }

    /// Largest block accepted per call. Applies to instances created afterwards.
    pub fn with_max_block_frames(mut self, frames: usize) -> Self {
        self.max_block_frames = frames.max(1);
        self
    }

    pub fn max_block_frames(&self) -> usize {
        self.max_block_frames
    }

    pub fn live_instances(&self) -> usize {
        self.instances.iter().filter(|i| i.is_some()).count()
    }

    /// Formant scale last set on `handle`.
    pub fn formant_scale(&self, handle: RawHandle) -> Option<f64> {
        instance(&self.instances, handle).ok().map(|i| i.formant_scale)
    }

    /// Frames seen by the study pass of `handle`.
    pub fn studied_frames(&self, handle: RawHandle) -> Option<u64> {
        instance(&self.instances, handle)
            .ok()
            .map(|i| i.studied_frames)
    }
}

impl Default for SoftStretcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SoftStretcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftStretcher")
            .field("live_instances", &self.live_instances())
            .field("max_block_frames", &self.max_block_frames)
            .field("memory_bytes", &self.memory.byte_len())
            .finish()
    }
}

fn instance(instances: &[Option<Instance>], handle: RawHandle) -> NativeResult<&Instance> {
    (handle.0 as usize)
        .checked_sub(1)
        .and_then(|index| instances.get(index))
        .and_then(Option::as_ref)
        .ok_or(Trap::InvalidHandle(handle.0))
}

fn instance_mut(
    instances: &mut [Option<Instance>],
    handle: RawHandle,
) -> NativeResult<&mut Instance> {
    (handle.0 as usize)
        .checked_sub(1)
        .and_then(|index| instances.get_mut(index))
        .and_then(Option::as_mut)
        .ok_or(Trap::InvalidHandle(handle.0))
}

/// Read a pointer array into `pointers` and validate each channel range.
fn load_pointers(
    memory: &HeapMemory,
    array: Address,
    frames: usize,
    pointers: &mut [Address],
) -> NativeResult<()> {
    let words = memory.view::<u32>(array, pointers.len())?;
    for (pointer, &word) in pointers.iter_mut().zip(words) {
        *pointer = Address(word);
    }
    for &pointer in pointers.iter() {
        memory.check_range::<f32>(pointer, frames)?;
    }
    Ok(())
}

fn valid_factor(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl StretcherModule for SoftStretcher {
    type Memory = HeapMemory;

    fn memory(&self) -> &HeapMemory {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut HeapMemory {
        &mut self.memory
    }

    fn create_instance(
        &mut self,
        sample_rate: u32,
        channels: usize,
        options: StretchOptions,
        time_ratio: f64,
        pitch_scale: f64,
    ) -> RawHandle {
        if sample_rate == 0
            || channels == 0
            || channels > MAX_CHANNELS
            || !valid_factor(time_ratio)
            || !valid_factor(pitch_scale)
        {
            return RawHandle::INVALID;
        }

        let instance = Instance::new(
            channels,
            options,
            time_ratio.clamp(MIN_STRETCH, MAX_STRETCH),
            pitch_scale.clamp(MIN_PITCH, MAX_PITCH),
            self.max_block_frames,
        );
        self.instances.push(Some(instance));
        RawHandle(self.instances.len() as u32)
    }

    fn delete_instance(&mut self, handle: RawHandle) {
        if let Some(slot) = (handle.0 as usize)
            .checked_sub(1)
            .and_then(|index| self.instances.get_mut(index))
        {
            *slot = None;
        }
    }

    fn reset(&mut self, handle: RawHandle) -> NativeResult<()> {
        instance_mut(&mut self.instances, handle)?.reset();
        Ok(())
    }

    fn set_time_ratio(&mut self, handle: RawHandle, ratio: f64) -> NativeResult<()> {
        let instance = instance_mut(&mut self.instances, handle)?;
        if valid_factor(ratio) {
            instance.time_ratio = ratio.clamp(MIN_STRETCH, MAX_STRETCH);
        }
        Ok(())
    }

    fn set_pitch_scale(&mut self, handle: RawHandle, scale: f64) -> NativeResult<()> {
        let instance = instance_mut(&mut self.instances, handle)?;
        if valid_factor(scale) {
            instance.set_pitch_scale(scale.clamp(MIN_PITCH, MAX_PITCH));
        }
        Ok(())
    }

    fn set_formant_scale(&mut self, handle: RawHandle, scale: f64) -> NativeResult<()> {
        let instance = instance_mut(&mut self.instances, handle)?;
        if valid_factor(scale) {
            instance.formant_scale = scale;
        }
        Ok(())
    }

    fn latency(&self, handle: RawHandle) -> NativeResult<usize> {
        Ok(instance(&self.instances, handle)?.fft_size.size())
    }

    fn study(
        &mut self,
        handle: RawHandle,
        input_ptrs: Address,
        frames: usize,
        is_final: bool,
    ) -> NativeResult<()> {
        let max_block_frames = self.max_block_frames;
        let instance = instance_mut(&mut self.instances, handle)?;
        if instance.options.is_realtime() {
            return Err(Trap::StudyInRealtime);
        }
        if frames > max_block_frames {
            return Err(Trap::TooManyFrames {
                frames,
                capacity: max_block_frames,
            });
        }
        load_pointers(&self.memory, input_ptrs, frames, &mut instance.pointers)?;

        instance.studied_frames += frames as u64;
        if is_final {
            instance.study_complete = true;
        }
        Ok(())
    }

    fn process(
        &mut self,
        handle: RawHandle,
        input_ptrs: Address,
        frames: usize,
        is_final: bool,
    ) -> NativeResult<()> {
        let max_block_frames = self.max_block_frames;
        let instance = instance_mut(&mut self.instances, handle)?;
        if instance.final_received {
            return Err(Trap::ProcessAfterFinal);
        }
        if frames > max_block_frames {
            return Err(Trap::TooManyFrames {
                frames,
                capacity: max_block_frames,
            });
        }
        if let Some(first) = instance.channels.first() {
            if first.vocoder.input_free() < first.resampler.max_output(frames) {
                return Err(Trap::InputOverflow);
            }
        }
        load_pointers(&self.memory, input_ptrs, frames, &mut instance.pointers)?;

        for (channel, &pointer) in instance.channels.iter_mut().zip(&instance.pointers) {
            let samples = self.memory.view::<f32>(pointer, frames)?;
            let ChannelState { resampler, vocoder } = channel;
            resampler.process(samples, |sample| vocoder.push_input(sample));
        }

        instance.input_frames += frames as u64;
        instance.target_output += frames as f64 * instance.time_ratio;

        // With a completed study the total length is known up front.
        let studied_total_reached = !instance.options.is_realtime()
            && instance.study_complete
            && instance.input_frames >= instance.studied_frames;
        if is_final || studied_total_reached {
            instance.finish();
        }
        instance.pump();
        Ok(())
    }

    fn available(&self, handle: RawHandle) -> NativeResult<usize> {
        Ok(instance(&self.instances, handle)?.available())
    }

    fn retrieve(
        &mut self,
        handle: RawHandle,
        output_ptrs: Address,
        frames: usize,
    ) -> NativeResult<usize> {
        let instance = instance_mut(&mut self.instances, handle)?;
        let count = frames.min(instance.available());
        load_pointers(&self.memory, output_ptrs, count, &mut instance.pointers)?;

        for (channel, &pointer) in instance.channels.iter_mut().zip(&instance.pointers) {
            let view = self.memory.view_mut::<f32>(pointer, count)?;
            channel.vocoder.pop_output(view);
        }
        instance.retrieved += count;
        instance.pump();
        Ok(count)
    }
}
