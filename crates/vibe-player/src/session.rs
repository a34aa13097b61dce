//! One loaded track: arena, engine, cursor and scratch.

use vibe_core::EngineConfig;
use vibe_stretch::{
    ChannelBufferSet, MemoryArena, StretchEngineHandle, StretchOptions, StretcherModule,
};

use crate::cursor::{PlaybackCursor, PlaybackTargets};
use crate::source::SourceAudio;
use crate::Result;

/// What one quantum did, for the controller to report.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QuantumReport {
    /// Frames written from engine output; the rest of the quantum is silence.
    pub frames_rendered: usize,
    /// Latency-corrected position, present when input was fed this quantum.
    pub reported_time: Option<f64>,
    /// The engine drained after the final block during this quantum.
    pub ended: bool,
}

/// Everything owned by one `load-audio`, torn down as a unit.
///
/// Built by [`provision`](Self::provision) and destroyed by
/// [`teardown`](Self::teardown); nothing here is shared with another session.
pub struct PlaybackSession {
    arena: MemoryArena,
    buffers: ChannelBufferSet,
    engine: StretchEngineHandle,
    cursor: PlaybackCursor,
    source: SourceAudio,
    latency_frames: usize,
    scratch: Vec<Vec<f32>>,
}

impl PlaybackSession {
    /// Allocate buffers and create an engine sized to `source`.
    ///
    /// On failure everything allocated so far is released before returning.
    pub fn provision<M: StretcherModule>(
        module: &mut M,
        config: &EngineConfig,
        source: SourceAudio,
        targets: PlaybackTargets,
    ) -> Result<Self> {
        let channels = source.channel_count();
        let mut arena = MemoryArena::new();

        let buffers = match ChannelBufferSet::allocate(
            &mut arena,
            module.memory_mut(),
            channels,
            config.block_size_frames,
        ) {
            Ok(buffers) => buffers,
            Err(e) => {
                arena.free_all(module.memory_mut());
                return Err(e.into());
            }
        };

        let mut engine = match StretchEngineHandle::create(
            module,
            source.sample_rate(),
            channels,
            StretchOptions::realtime(),
            config.safe_ratio(targets.speed),
            config.safe_scale(targets.pitch_scale),
        ) {
            Ok(engine) => engine,
            Err(e) => {
                arena.free_all(module.memory_mut());
                return Err(e.into());
            }
        };

        let latency_frames = match engine.latency_frames(module) {
            Ok(latency) => latency,
            Err(e) => {
                engine.destroy(module);
                arena.free_all(module.memory_mut());
                return Err(e.into());
            }
        };

        tracing::info!(
            "Playback session: {} channels @ {} Hz, {:.2}s, latency {} frames",
            channels,
            source.sample_rate(),
            source.duration_seconds(),
            latency_frames
        );

        Ok(Self {
            arena,
            buffers,
            engine,
            cursor: PlaybackCursor::new(targets, source.frames(), source.sample_rate()),
            source,
            latency_frames,
            scratch: vec![vec![0.0; config.max_quantum_frames]; channels],
        })
    }

    /// Destroy the engine and free the arena.
    pub fn teardown<M: StretcherModule>(mut self, module: &mut M) {
        self.engine.destroy(module);
        self.arena.free_all(module.memory_mut());
        tracing::debug!("Playback session torn down");
    }

    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut PlaybackCursor {
        &mut self.cursor
    }

    pub fn source(&self) -> &SourceAudio {
        &self.source
    }

    pub fn engine(&self) -> &StretchEngineHandle {
        &self.engine
    }

    pub fn arena(&self) -> &MemoryArena {
        &self.arena
    }

    pub fn latency_frames(&self) -> usize {
        self.latency_frames
    }

    pub fn channel_count(&self) -> usize {
        self.source.channel_count()
    }

    /// Produce one quantum into `outputs`.
    ///
    /// Output channels beyond the source's channel count repeat the last source
    /// channel. Quanta larger than `max_quantum_frames` are rendered up to that
    /// size and padded with silence.
    pub fn render_quantum<M: StretcherModule, B: AsMut<[f32]>>(
        &mut self,
        module: &mut M,
        config: &EngineConfig,
        outputs: &mut [B],
    ) -> Result<QuantumReport> {
        let quantum = outputs.first_mut().map_or(0, |c| c.as_mut().len());
        let frames = quantum.min(self.scratch.first().map_or(0, Vec::len));
        let mut report = QuantumReport::default();

        // Idle tail: nothing left to hear after the final block.
        if self.cursor.stream_ended && self.engine.available(module)? == 0 {
            write_silence(outputs);
            return Ok(report);
        }

        self.apply_parameters(module, config)?;

        // Feed
        let ratio = config.safe_ratio(self.cursor.target_speed);
        let backlog = self.engine.available(module)?;
        let remaining = self.cursor.remaining_frames();
        let provided = if backlog >= config.max_backlog_frames {
            0
        } else {
            config
                .frames_wanted(frames, ratio)
                .min(self.buffers.block_frames())
                .min(remaining)
        };
        let is_final_chunk = provided >= remaining;
        let send_final = is_final_chunk && !self.cursor.final_block_sent;

        if provided > 0 || send_final {
            let start = self.cursor.position_frames();
            for channel in 0..self.source.channel_count() {
                let samples = &self.source.channel(channel)[start..start + provided];
                self.buffers
                    .write_input(module.memory_mut(), channel, samples)?;
            }
            self.engine
                .process(module, &self.buffers, provided, send_final)?;

            self.cursor.advance(provided);
            if send_final {
                self.cursor.final_block_sent = true;
            }
            report.reported_time = Some(self.cursor.reported_time(self.latency_frames, quantum));
        }

        // Retrieve until the quantum is full or the engine has nothing left.
        let mut filled = 0;
        while filled < frames {
            let available = self.engine.available(module)?;
            if available == 0 {
                break;
            }
            let want = available
                .min(frames - filled)
                .min(self.buffers.block_frames());
            let got = self.engine.retrieve(module, &self.buffers, want)?;
            if got == 0 {
                break;
            }
            for (channel, scratch) in self.scratch.iter_mut().enumerate() {
                self.buffers
                    .read_output(module.memory(), channel, &mut scratch[filled..filled + got])?;
            }
            filled += got;
        }

        for (index, output) in outputs.iter_mut().enumerate() {
            let output = output.as_mut();
            let source = &self.scratch[index.min(self.scratch.len() - 1)];
            output[..filled].copy_from_slice(&source[..filled]);
            output[filled..].fill(0.0);
        }
        report.frames_rendered = filled;

        if self.cursor.final_block_sent
            && self.engine.available(module)? == 0
            && filled < quantum
        {
            self.cursor.is_playing = false;
            self.cursor.stream_ended = true;
            report.ended = true;
        }

        Ok(report)
    }

    /// Full reset after a discontinuity, otherwise only the parameters that moved.
    fn apply_parameters<M: StretcherModule>(
        &mut self,
        module: &mut M,
        config: &EngineConfig,
    ) -> Result<()> {
        let ratio = config.safe_ratio(self.cursor.target_speed);
        let pitch = config.safe_scale(self.cursor.target_pitch_scale);
        let formant = config.safe_scale(self.cursor.target_formant_scale);

        if self.cursor.reset_needed {
            self.engine.reset(module)?;
            self.engine.set_time_ratio(module, ratio)?;
            self.engine.set_pitch_scale(module, pitch)?;
            self.engine.set_formant_scale(module, formant)?;
            self.cursor.reset_needed = false;
            self.cursor.final_block_sent = false;
            self.cursor.stream_ended = false;
            tracing::debug!(
                "Engine reset at {:.3}s (ratio {:.3}, pitch {:.3}, formant {:.3})",
                self.cursor.source_position_seconds(),
                ratio,
                pitch,
                formant
            );
        } else {
            let eps = config.param_epsilon;
            self.engine.update_time_ratio(module, ratio, eps)?;
            self.engine.update_pitch_scale(module, pitch, eps)?;
            self.engine.update_formant_scale(module, formant, eps)?;
        }
        Ok(())
    }
}

pub(crate) fn write_silence<B: AsMut<[f32]>>(outputs: &mut [B]) {
    for output in outputs.iter_mut() {
        output.as_mut().fill(0.0);
    }
}
