//! Real-time playback state machine.
//!
//! ```text
//! AwaitingAudio --load--> Initializing --ok--> Ready(Paused) <--play/pause--> Ready(Playing)
//!                              |                    ^                              |
//!                              +--fail--> Failed    +---------seek----- Ended <----+ end of stream
//!                                                        Ended --play--> Ready(Playing) (rewinds)
//! ```
//!
//! [`render`](StreamingPlaybackController::render) runs once per output quantum
//! and always leaves a valid (possibly silent) quantum behind, whatever fails.

use std::panic::{catch_unwind, AssertUnwindSafe};

use vibe_core::EngineConfig;
use vibe_stretch::StretcherModule;

use crate::channel::EventSink;
use crate::cursor::{PlaybackCursor, PlaybackTargets};
use crate::protocol::{ControlMessage, EngineEvent, Status};
use crate::session::{write_silence, PlaybackSession, QuantumReport};
use crate::source::SourceAudio;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Paused,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    AwaitingAudio,
    Initializing,
    Ready(Transport),
    Ended,
    /// Provisioning or a session-fatal error; a new `load-audio` recovers.
    Failed,
    /// Terminal; the controller no longer accepts messages.
    CleanedUp,
}

impl PlayerState {
    pub fn is_playing(self) -> bool {
        self == PlayerState::Ready(Transport::Playing)
    }
}

/// Owns the stretcher module, the current session and the event sink.
pub struct StreamingPlaybackController<M: StretcherModule, S: EventSink> {
    module: M,
    config: EngineConfig,
    events: S,
    state: PlayerState,
    targets: PlaybackTargets,
    session: Option<PlaybackSession>,
}

impl<M: StretcherModule, S: EventSink> StreamingPlaybackController<M, S> {
    pub fn new(module: M, config: EngineConfig, events: S) -> Self {
        Self {
            module,
            config,
            events,
            state: PlayerState::AwaitingAudio,
            targets: PlaybackTargets::default(),
            session: None,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_alive(&self) -> bool {
        self.state != PlayerState::CleanedUp
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut M {
        &mut self.module
    }

    pub fn events(&self) -> &S {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut S {
        &mut self.events
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn cursor(&self) -> Option<&PlaybackCursor> {
        self.session.as_ref().map(PlaybackSession::cursor)
    }

    pub fn targets(&self) -> PlaybackTargets {
        self.targets
    }

    /// Sample rate of the loaded track.
    pub fn sample_rate(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.source().sample_rate())
    }

    /// Apply one control message. Effects are visible from the next quantum.
    pub fn handle(&mut self, message: ControlMessage) {
        if self.state == PlayerState::CleanedUp {
            tracing::warn!("Ignoring {} after cleanup", message.kind());
            self.events
                .emit(EngineEvent::error(format!("{} after cleanup", message.kind())));
            return;
        }

        match message {
            ControlMessage::LoadAudio(source) => {
                // Failure is already reported as an event.
                let _ = self.load_audio(source);
            }
            ControlMessage::Play => self.play(),
            ControlMessage::Pause => self.pause(),
            ControlMessage::Seek(seconds) => self.seek(seconds),
            ControlMessage::SetSpeed(speed) => self.set_speed(speed),
            ControlMessage::SetPitch(scale) => self.set_pitch(scale),
            ControlMessage::SetFormant(scale) => self.set_formant(scale),
            ControlMessage::Cleanup => self.cleanup(),
        }
    }

    /// Discard the current session and build a fresh one for `source`.
    pub fn load_audio(&mut self, source: SourceAudio) -> Result<()> {
        self.state = PlayerState::Initializing;
        if let Some(old) = self.session.take() {
            old.teardown(&mut self.module);
        }

        match PlaybackSession::provision(&mut self.module, &self.config, source, self.targets) {
            Ok(session) => {
                self.session = Some(session);
                self.state = PlayerState::Ready(Transport::Paused);
                self.events.emit(EngineEvent::Status {
                    status: Status::Ready,
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to provision playback session: {}", e);
                self.state = PlayerState::Failed;
                self.events.emit(EngineEvent::error(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn play(&mut self) {
        let Some(session) = self.session.as_mut() else {
            self.events
                .emit(EngineEvent::PlaybackState { is_playing: false });
            return;
        };

        match self.state {
            PlayerState::Ended => {
                session.cursor_mut().seek(0.0);
            }
            PlayerState::Ready(_) => {}
            _ => return,
        }
        session.cursor_mut().is_playing = true;
        self.state = PlayerState::Ready(Transport::Playing);
        self.events
            .emit(EngineEvent::PlaybackState { is_playing: true });
    }

    pub fn pause(&mut self) {
        if let (Some(session), PlayerState::Ready(_)) = (self.session.as_mut(), self.state) {
            session.cursor_mut().is_playing = false;
            self.state = PlayerState::Ready(Transport::Paused);
        }
        self.events
            .emit(EngineEvent::PlaybackState { is_playing: false });
    }

    /// Clamp to the track and arm a reset. Leaves play/pause unchanged; an ended
    /// track comes back paused.
    pub fn seek(&mut self, seconds: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.cursor_mut().seek(seconds);
        if self.state == PlayerState::Ended {
            self.state = PlayerState::Ready(Transport::Paused);
        }
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.targets.speed = speed;
        if let Some(session) = self.session.as_mut() {
            session.cursor_mut().target_speed = speed;
        }
    }

    pub fn set_pitch(&mut self, scale: f64) {
        self.targets.pitch_scale = scale;
        if let Some(session) = self.session.as_mut() {
            session.cursor_mut().target_pitch_scale = scale;
        }
    }

    pub fn set_formant(&mut self, scale: f64) {
        self.targets.formant_scale = scale;
        if let Some(session) = self.session.as_mut() {
            session.cursor_mut().target_formant_scale = scale;
        }
    }

    /// Destroy the engine, free the arena and mark the controller dead.
    pub fn cleanup(&mut self) {
        if let Some(session) = self.session.take() {
            session.teardown(&mut self.module);
        }
        self.state = PlayerState::CleanedUp;
        tracing::info!("Playback controller cleaned up");
        self.events.emit(EngineEvent::Status {
            status: Status::CleanedUp,
        });
    }

    /// Produce one output quantum. `outputs` holds one equally sized buffer per
    /// output channel.
    pub fn render<B: AsMut<[f32]>>(&mut self, outputs: &mut [B]) {
        if !self.state.is_playing() {
            write_silence(outputs);
            return;
        }
        let Some(session) = self.session.as_mut() else {
            write_silence(outputs);
            return;
        };

        let module = &mut self.module;
        let config = &self.config;
        let result = catch_unwind(AssertUnwindSafe(|| {
            session.render_quantum(module, config, outputs)
        }))
        .unwrap_or_else(|_| Err(Error::Processing("stretcher panicked".into())));

        match result {
            Ok(report) => self.report(report),
            Err(e) => {
                write_silence(outputs);
                self.fail_quantum(e);
            }
        }
    }

    fn report(&mut self, report: QuantumReport) {
        if let Some(current_time) = report.reported_time {
            self.events.emit(EngineEvent::TimeUpdate { current_time });
        }
        if report.ended {
            self.state = PlayerState::Ended;
            tracing::debug!("End of stream");
            self.events.emit(EngineEvent::Status {
                status: Status::Ended,
            });
            self.events
                .emit(EngineEvent::PlaybackState { is_playing: false });
        }
    }

    /// Mute and pause after a per-quantum failure; fatal errors also end the session.
    fn fail_quantum(&mut self, error: Error) {
        tracing::error!("Processing error: {}", error);
        let message = match &error {
            Error::Processing(_) => error.to_string(),
            other => format!("Processing error: {other}"),
        };

        if error.is_fatal() {
            if let Some(session) = self.session.take() {
                session.teardown(&mut self.module);
            }
            self.state = PlayerState::Failed;
        } else {
            if let Some(session) = self.session.as_mut() {
                session.cursor_mut().is_playing = false;
            }
            self.state = PlayerState::Ready(Transport::Paused);
        }
        self.events.emit(EngineEvent::error(message));
        self.events
            .emit(EngineEvent::PlaybackState { is_playing: false });
    }
}

impl<M: StretcherModule, S: EventSink> Drop for StreamingPlaybackController<M, S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.teardown(&mut self.module);
        }
    }
}
