//! Bounded, non-blocking channels between the control context and the engine.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;

use vibe_core::EngineConfig;

use crate::protocol::{ControlMessage, EngineEvent};
use crate::{Error, Result};

/// Destination for engine events. Emitting must never block.
pub trait EventSink {
    fn emit(&mut self, event: EngineEvent);
}

impl EventSink for Sender<EngineEvent> {
    #[inline]
    fn emit(&mut self, event: EngineEvent) {
        // A full queue drops the event rather than stall the audio thread.
        let _ = self.try_send(event);
    }
}

impl EventSink for Vec<EngineEvent> {
    fn emit(&mut self, event: EngineEvent) {
        self.push(event);
    }
}

/// Factory for a connected pair of endpoints.
pub struct ControlChannel;

impl ControlChannel {
    pub fn new(config: &EngineConfig) -> (ControlEndpoint, EngineEndpoint) {
        let (message_tx, message_rx) = bounded(config.message_capacity);
        let (event_tx, event_rx) = bounded(config.event_capacity);

        (
            ControlEndpoint {
                messages: message_tx,
                events: event_rx,
                rejections: event_tx.clone(),
            },
            EngineEndpoint {
                messages: message_rx,
                events: event_tx,
            },
        )
    }
}

/// Control-side end: sends messages, receives events.
#[derive(Debug)]
pub struct ControlEndpoint {
    messages: Sender<ControlMessage>,
    events: Receiver<EngineEvent>,
    // Lets a message rejected at the boundary still surface as an `error` event.
    rejections: Sender<EngineEvent>,
}

impl ControlEndpoint {
    pub fn send(&self, message: ControlMessage) -> Result<()> {
        self.messages.try_send(message).map_err(|e| match e {
            TrySendError::Full(m) => {
                tracing::warn!("Control channel full, dropped {}", m.kind());
                Error::ChannelFull
            }
            TrySendError::Disconnected(_) => Error::ChannelClosed,
        })
    }

    /// Surface a message refused before reaching the engine as an `error` event.
    pub(crate) fn reject(&self, error: &Error) {
        tracing::warn!("Rejected control message: {}", error);
        let _ = self.rejections.try_send(EngineEvent::error(error.to_string()));
    }

    pub fn try_recv_event(&self) -> Option<EngineEvent> {
        self.events.try_recv().ok()
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Result<Option<EngineEvent>> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ChannelClosed),
        }
    }

    /// Drain every pending event.
    pub fn drain_events(&self) -> Vec<EngineEvent> {
        self.events.try_iter().collect()
    }
}

/// Engine-side end: receives messages, sends events.
#[derive(Debug)]
pub struct EngineEndpoint {
    messages: Receiver<ControlMessage>,
    events: Sender<EngineEvent>,
}

impl EngineEndpoint {
    #[inline]
    pub fn try_recv(&self) -> Option<ControlMessage> {
        self.messages.try_recv().ok()
    }

    pub fn into_parts(self) -> (Receiver<ControlMessage>, Sender<EngineEvent>) {
        (self.messages, self.events)
    }
}
