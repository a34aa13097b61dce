//! Engine-side endpoint: drains control messages and renders quanta.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use vibe_core::{DspLoadMeter, EngineConfig};
use vibe_stretch::StretcherModule;

use crate::channel::EngineEndpoint;
use crate::controller::StreamingPlaybackController;
use crate::protocol::{ControlMessage, EngineEvent};

/// Runs on the audio thread. Call [`process`](Self::process) once per quantum.
pub struct PlaybackProcessor<M: StretcherModule> {
    controller: StreamingPlaybackController<M, Sender<EngineEvent>>,
    messages: Receiver<ControlMessage>,
    meter: Arc<DspLoadMeter>,
}

impl<M: StretcherModule> PlaybackProcessor<M> {
    pub(crate) fn new(
        module: M,
        config: EngineConfig,
        endpoint: EngineEndpoint,
        meter: Arc<DspLoadMeter>,
    ) -> Self {
        let (messages, events) = endpoint.into_parts();
        Self {
            controller: StreamingPlaybackController::new(module, config, events),
            messages,
            meter,
        }
    }

    /// Apply pending messages in arrival order, then render one quantum.
    ///
    /// Returns `false` once the controller has been cleaned up; the host may
    /// stop calling after that (further calls output silence).
    pub fn process<B: AsMut<[f32]>>(&mut self, outputs: &mut [B]) -> bool {
        let started = Instant::now();

        while let Ok(message) = self.messages.try_recv() {
            self.controller.handle(message);
        }
        self.controller.render(outputs);

        if let Some(sample_rate) = self.controller.sample_rate() {
            self.meter.set_sample_rate(sample_rate);
        }
        let quantum = outputs.first_mut().map_or(0, |c| c.as_mut().len());
        self.meter.record(quantum, started.elapsed());

        self.controller.is_alive()
    }

    pub fn alive(&self) -> bool {
        self.controller.is_alive()
    }

    pub fn controller(&self) -> &StreamingPlaybackController<M, Sender<EngineEvent>> {
        &self.controller
    }

    pub fn meter(&self) -> &Arc<DspLoadMeter> {
        &self.meter
    }
}
