//! # Vibe - Real-time Time-Stretch Playback
//!
//! Umbrella crate over the playback subsystems:
//! - **vibe-core** - configuration, lock-free atomics, DSP load meter
//! - **vibe-stretch** - linear memory, arena, native stretcher ABI, built-in phase vocoder
//! - **vibe-player** - real-time controller, offline preprocessor, control protocol
//!
//! ## Quick Start
//!
//! ```ignore
//! use vibe::prelude::*;
//!
//! let (handle, mut processor) = create_player(SoftStretcher::new(), EngineConfig::default())?;
//!
//! // Optionally pre-render a slowed copy on the control side
//! let slow = handle.preprocess(&mut SoftStretcher::new(), &source, 0.5)?;
//! handle.load_audio(slow)?;
//! handle.play()?;
//!
//! // Audio thread
//! processor.process(&mut outputs);
//!
//! for event in handle.drain_events() {
//!     println!("{event:?}");
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `output` - drive a `PlaybackProcessor` from the default output device (CPAL)

pub mod error;
pub use error::{Error, Result};

/// Re-export of vibe-core for direct access
pub use vibe_core as core;
/// Re-export of vibe-player for direct access
pub use vibe_player as player;
/// Re-export of vibe-stretch for direct access
pub use vibe_stretch as stretch;

pub use vibe_core::{DspLoad, DspLoadMeter, EngineConfig};
pub use vibe_stretch::{
    ChannelBufferSet, HeapMemory, LinearMemory, MemoryArena, SoftStretcher, StretchEngineHandle,
    StretchOptions, StretcherModule,
};
pub use vibe_player::{
    create_player, ControlChannel, ControlMessage, EngineEvent, OfflinePreprocessor,
    PlaybackProcessor, PlayerHandle, PlayerState, SourceAudio, Status,
    StreamingPlaybackController, Transport, WireMessage,
};

#[cfg(feature = "output")]
pub use vibe_player::AudioOutput;

/// Common imports.
pub mod prelude {
    pub use crate::{
        create_player, ControlMessage, EngineConfig, EngineEvent, OfflinePreprocessor,
        PlaybackProcessor, PlayerHandle, PlayerState, SoftStretcher, SourceAudio, Status,
        StreamingPlaybackController, StretcherModule, Transport,
    };
    pub use crate::{Error, Result};
}
