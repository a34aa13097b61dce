//! Streaming time-stretch playback.
//!
//! - [`StreamingPlaybackController`]: per-quantum state machine driving a stretcher
//! - [`PlaybackSession`]: arena, engine and cursor owned by one loaded track
//! - [`OfflinePreprocessor`]: two-pass render of a whole track at a fixed speed
//! - [`ControlChannel`]: bounded message/event channels between control and engine
//! - [`PlayerHandle`] / [`PlaybackProcessor`]: the two ends, from [`create_player`]
//!
//! # Example
//!
//! ```ignore
//! use vibe_player::{create_player, EngineConfig, SourceAudio};
//! use vibe_stretch::SoftStretcher;
//!
//! let (handle, mut processor) = create_player(SoftStretcher::new(), EngineConfig::default())?;
//! handle.load_audio(SourceAudio::new(vec![left, right], 44100)?)?;
//! handle.set_speed(0.75)?;
//! handle.play()?;
//!
//! // Audio thread, once per quantum:
//! processor.process(&mut outputs);
//! ```

mod error;
pub use error::{Error, Result};

mod source;
pub use source::SourceAudio;

mod cursor;
pub use cursor::{PlaybackCursor, PlaybackTargets};

mod session;
pub use session::{PlaybackSession, QuantumReport};

mod controller;
pub use controller::{PlayerState, StreamingPlaybackController, Transport};

mod offline;
pub use offline::OfflinePreprocessor;

mod protocol;
pub use protocol::{ControlMessage, EngineEvent, Status, WireMessage};

mod channel;
pub use channel::{ControlChannel, ControlEndpoint, EngineEndpoint, EventSink};

mod processor;
pub use processor::PlaybackProcessor;

mod handle;
pub use handle::{create_player, PlayerHandle};

#[cfg(feature = "output")]
mod output;
#[cfg(feature = "output")]
pub use output::AudioOutput;

pub use vibe_core::EngineConfig;
