//! Control protocol between the control context and the real-time engine.
//!
//! [`ControlMessage`] and [`EngineEvent`] are the typed forms used in-process.
//! [`WireMessage`] is the serialised form of a control message; it is validated
//! once, in `TryFrom<WireMessage>`, so nothing past the channel boundary ever
//! re-checks a payload.

use serde::{Deserialize, Serialize};

use crate::source::SourceAudio;
use crate::{Error, Result};

/// Control-to-engine message.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Replace the loaded track; (re)provisions arena and engine.
    LoadAudio(SourceAudio),
    Play,
    Pause,
    /// Move the cursor to the given seconds. Does not start playback.
    Seek(f64),
    SetSpeed(f64),
    SetPitch(f64),
    SetFormant(f64),
    /// Destroy the engine, free the arena and stop accepting messages.
    Cleanup,
}

impl ControlMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::LoadAudio(_) => "load-audio",
            ControlMessage::Play => "play",
            ControlMessage::Pause => "pause",
            ControlMessage::Seek(_) => "seek",
            ControlMessage::SetSpeed(_) => "set-speed",
            ControlMessage::SetPitch(_) => "set-pitch",
            ControlMessage::SetFormant(_) => "set-formant",
            ControlMessage::Cleanup => "cleanup",
        }
    }

    /// Messages that change the channel-count assumption shared with the preprocessor.
    pub fn replaces_session(&self) -> bool {
        matches!(self, ControlMessage::LoadAudio(_) | ControlMessage::Cleanup)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Ready,
    Ended,
    CleanedUp,
}

/// Engine-to-control event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineEvent {
    Status { status: Status },
    Error { message: String },
    /// State-sync confirmation after play/pause/end.
    #[serde(rename_all = "camelCase")]
    PlaybackState { is_playing: bool },
    /// Latency-corrected position in seconds, at most once per quantum.
    #[serde(rename_all = "camelCase")]
    TimeUpdate { current_time: f64 },
}

impl EngineEvent {
    pub fn error(message: impl Into<String>) -> Self {
        EngineEvent::Error {
            message: message.into(),
        }
    }
}

/// Serialised control message, e.g. `{"type": "set-speed", "value": 0.5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireMessage {
    #[serde(rename_all = "camelCase")]
    LoadAudio {
        channels: Vec<Vec<f32>>,
        channel_count: usize,
        sample_rate: u32,
    },
    Play,
    Pause,
    Seek {
        time: f64,
    },
    SetSpeed {
        value: f64,
    },
    SetPitch {
        value: f64,
    },
    SetFormant {
        value: f64,
    },
    Cleanup,
}

fn positive(kind: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidMessage(format!(
            "{kind}: expected a finite positive value, got {value}"
        )))
    }
}

impl TryFrom<WireMessage> for ControlMessage {
    type Error = Error;

    fn try_from(message: WireMessage) -> Result<Self> {
        Ok(match message {
            WireMessage::LoadAudio {
                channels,
                channel_count,
                sample_rate,
            } => {
                if channels.len() != channel_count {
                    return Err(Error::InvalidMessage(format!(
                        "load-audio: channelCount {channel_count} but {} channel buffers",
                        channels.len()
                    )));
                }
                let source = SourceAudio::new(channels, sample_rate)
                    .map_err(|e| Error::InvalidMessage(format!("load-audio: {e}")))?;
                ControlMessage::LoadAudio(source)
            }
            WireMessage::Play => ControlMessage::Play,
            WireMessage::Pause => ControlMessage::Pause,
            WireMessage::Seek { time } => {
                if !time.is_finite() {
                    return Err(Error::InvalidMessage(format!("seek: time {time} is not finite")));
                }
                ControlMessage::Seek(time)
            }
            WireMessage::SetSpeed { value } => ControlMessage::SetSpeed(positive("set-speed", value)?),
            WireMessage::SetPitch { value } => ControlMessage::SetPitch(positive("set-pitch", value)?),
            WireMessage::SetFormant { value } => {
                ControlMessage::SetFormant(positive("set-formant", value)?)
            }
            WireMessage::Cleanup => ControlMessage::Cleanup,
        })
    }
}
