//! Two-pass offline rendering of a whole track at a fixed speed.

use std::time::Instant;

use vibe_core::EngineConfig;
use vibe_stretch::{
    ChannelBufferSet, MemoryArena, StretchEngineHandle, StretchOptions, StretcherModule,
};

use crate::source::SourceAudio;
use crate::{Error, Result};

/// Renders a full track through a throwaway engine and arena.
///
/// The engine runs in offline mode: a study pass streams the whole source for
/// analysis, then a process pass streams it again and collects every output
/// frame. Nothing here touches a real-time session.
#[derive(Debug, Clone)]
pub struct OfflinePreprocessor {
    config: EngineConfig,
}

/// Engine and arena scoped to one render; released on every exit path.
struct RenderScope<'a, M: StretcherModule> {
    module: &'a mut M,
    arena: MemoryArena,
    engine: Option<StretchEngineHandle>,
}

impl<M: StretcherModule> Drop for RenderScope<'_, M> {
    fn drop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.destroy(self.module);
        }
        self.arena.free_all(self.module.memory_mut());
    }
}

impl OfflinePreprocessor {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Render `source` at `speed` (ratio `1 / speed`, clamped).
    ///
    /// Fails with [`Error::EmptyOutput`] if a non-empty source yields nothing.
    pub fn render<M: StretcherModule>(
        &self,
        module: &mut M,
        source: &SourceAudio,
        speed: f64,
    ) -> Result<SourceAudio> {
        let channels = source.channel_count();
        if source.is_empty() {
            return SourceAudio::new(vec![Vec::new(); channels], source.sample_rate());
        }

        let started = Instant::now();
        let ratio = self.config.safe_ratio(speed);
        let block = self.config.block_size_frames;

        let mut scope = RenderScope {
            module,
            arena: MemoryArena::new(),
            engine: None,
        };
        let buffers =
            ChannelBufferSet::allocate(&mut scope.arena, scope.module.memory_mut(), channels, block)?;
        let engine = scope.engine.insert(StretchEngineHandle::create(
            scope.module,
            source.sample_rate(),
            channels,
            StretchOptions::offline(),
            ratio,
            1.0,
        )?);
        let module = &mut *scope.module;

        // Study
        let mut position = 0;
        while position < source.frames() {
            let frames = block.min(source.frames() - position);
            write_block(&buffers, module, source, position, frames)?;
            position += frames;
            engine.study(module, &buffers, frames, position == source.frames())?;
        }

        // Process
        let expected = (source.frames() as f64 * ratio).round() as usize;
        let mut rendered: Vec<Vec<f32>> = (0..channels).map(|_| Vec::with_capacity(expected)).collect();
        let mut position = 0;
        let mut final_sent = false;
        loop {
            if !final_sent {
                let frames = block.min(source.frames() - position);
                write_block(&buffers, module, source, position, frames)?;
                position += frames;
                final_sent = position == source.frames();
                engine.process(module, &buffers, frames, final_sent)?;
            }

            // Drain until the engine is empty or stops yielding.
            let mut stalled = false;
            loop {
                let available = engine.available(module)?;
                if available == 0 {
                    break;
                }
                let got = engine.retrieve(module, &buffers, available)?;
                if got == 0 {
                    stalled = true;
                    break;
                }
                for (channel, out) in rendered.iter_mut().enumerate() {
                    let start = out.len();
                    out.resize(start + got, 0.0);
                    buffers.read_output(module.memory(), channel, &mut out[start..])?;
                }
            }

            // The drain ends empty or stalled; after the final block no more
            // input can unblock a stall.
            if final_sent {
                if stalled {
                    tracing::warn!(
                        "Offline render stalled with {} frames reported but none retrievable",
                        engine.available(module)?
                    );
                }
                break;
            }
        }

        let produced = rendered.first().map_or(0, Vec::len);
        if produced == 0 {
            tracing::error!(
                "Offline render produced nothing for {} input frames",
                source.frames()
            );
            return Err(Error::EmptyOutput {
                input_frames: source.frames(),
            });
        }

        let tolerance = self.config.length_tolerance_blocks * block;
        if produced.abs_diff(expected) > tolerance {
            tracing::warn!(
                "Offline render length {} deviates from expected {} by more than {} frames",
                produced,
                expected,
                tolerance
            );
        }

        tracing::info!(
            "Offline render: {} -> {} frames at ratio {:.3} in {:.1} ms",
            source.frames(),
            produced,
            ratio,
            started.elapsed().as_secs_f64() * 1000.0
        );

        SourceAudio::new(rendered, source.sample_rate())
    }
}

fn write_block<M: StretcherModule>(
    buffers: &ChannelBufferSet,
    module: &mut M,
    source: &SourceAudio,
    position: usize,
    frames: usize,
) -> Result<()> {
    for channel in 0..source.channel_count() {
        let samples = &source.channel(channel)[position..position + frames];
        buffers.write_input(module.memory_mut(), channel, samples)?;
    }
    Ok(())
}
