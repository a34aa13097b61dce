//! Control-side endpoint.

use std::sync::Arc;
use std::time::Duration;

use vibe_core::{AtomicFlag, DspLoad, DspLoadMeter, EngineConfig};
use vibe_stretch::StretcherModule;

use crate::channel::{ControlChannel, ControlEndpoint};
use crate::offline::OfflinePreprocessor;
use crate::processor::PlaybackProcessor;
use crate::protocol::{ControlMessage, EngineEvent, WireMessage};
use crate::source::SourceAudio;
use crate::{Error, Result};

/// Sample rate the load meter assumes until a track is loaded.
const DEFAULT_METER_RATE: u32 = 48_000;

/// Build a connected control handle and engine-side processor.
///
/// The processor goes to the audio thread; the handle stays with the caller.
pub fn create_player<M: StretcherModule>(
    module: M,
    config: EngineConfig,
) -> Result<(PlayerHandle, PlaybackProcessor<M>)> {
    config.validate()?;
    let (control, engine) = ControlChannel::new(&config);
    let meter = Arc::new(DspLoadMeter::new(DEFAULT_METER_RATE));

    let processor = PlaybackProcessor::new(module, config.clone(), engine, Arc::clone(&meter));
    let handle = PlayerHandle {
        endpoint: control,
        config,
        session_gate: AtomicFlag::new(false),
        meter,
    };
    Ok((handle, processor))
}

/// Sends control messages and receives engine events. Never blocks on the engine.
#[derive(Debug)]
pub struct PlayerHandle {
    endpoint: ControlEndpoint,
    config: EngineConfig,
    // Held by an offline render for its whole run, and by a session-replacing
    // send while it is queued, so the two never interleave.
    session_gate: AtomicFlag,
    meter: Arc<DspLoadMeter>,
}

/// Lowers the session gate when dropped.
struct GateGuard<'a>(&'a AtomicFlag);

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl PlayerHandle {
    /// Send a typed message, refusing session replacement during an offline render.
    pub fn send(&self, message: ControlMessage) -> Result<()> {
        if !message.replaces_session() {
            return self.endpoint.send(message);
        }
        if !self.session_gate.try_raise() {
            let error = Error::PreprocessorBusy;
            self.endpoint.reject(&error);
            return Err(error);
        }
        let _guard = GateGuard(&self.session_gate);
        self.endpoint.send(message)
    }

    /// Validate and send a serialised message. Invalid messages never reach the engine.
    pub fn send_wire(&self, message: WireMessage) -> Result<()> {
        let message = ControlMessage::try_from(message).inspect_err(|e| self.endpoint.reject(e))?;
        self.send(message)
    }

    pub fn load_audio(&self, source: SourceAudio) -> Result<()> {
        self.send(ControlMessage::LoadAudio(source))
    }

    pub fn play(&self) -> Result<()> {
        self.send(ControlMessage::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(ControlMessage::Pause)
    }

    pub fn seek(&self, seconds: f64) -> Result<()> {
        self.send(ControlMessage::Seek(seconds))
    }

    pub fn set_speed(&self, speed: f64) -> Result<()> {
        self.send(ControlMessage::SetSpeed(speed))
    }

    pub fn set_pitch(&self, scale: f64) -> Result<()> {
        self.send(ControlMessage::SetPitch(scale))
    }

    pub fn set_formant(&self, scale: f64) -> Result<()> {
        self.send(ControlMessage::SetFormant(scale))
    }

    pub fn cleanup(&self) -> Result<()> {
        self.send(ControlMessage::Cleanup)
    }

    /// Render `source` at `speed` offline, blocking the calling thread.
    ///
    /// `module` must not be the one driving playback. While this runs,
    /// `load_audio` and `cleanup` fail with [`Error::PreprocessorBusy`].
    pub fn preprocess<N: StretcherModule>(
        &self,
        module: &mut N,
        source: &SourceAudio,
        speed: f64,
    ) -> Result<SourceAudio> {
        if !self.session_gate.try_raise() {
            return Err(Error::PreprocessorBusy);
        }
        let _guard = GateGuard(&self.session_gate);

        OfflinePreprocessor::new(self.config.clone())
            .render(module, source, speed)
            .inspect_err(|e| self.endpoint.reject(e))
    }

    /// True while an offline render runs. Also reads true for the instant a
    /// `load_audio` or `cleanup` is being queued.
    pub fn is_preprocessing(&self) -> bool {
        self.session_gate.get()
    }

    pub fn try_recv_event(&self) -> Option<EngineEvent> {
        self.endpoint.try_recv_event()
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Result<Option<EngineEvent>> {
        self.endpoint.recv_event_timeout(timeout)
    }

    pub fn drain_events(&self) -> Vec<EngineEvent> {
        self.endpoint.drain_events()
    }

    pub fn dsp_load(&self) -> DspLoad {
        self.meter.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
