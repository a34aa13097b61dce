//! Error types for vibe-player.

use thiserror::Error;

/// Error type for playback and preprocessing.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Stretch(#[from] vibe_stretch::Error),

    #[error(transparent)]
    Config(#[from] vibe_core::Error),

    /// Per-quantum failure; the quantum is muted and playback paused.
    #[error("Processing error: {0}")]
    Processing(String),

    /// The offline render produced nothing for non-empty input.
    #[error("Offline render produced no output for {input_frames} input frames")]
    EmptyOutput { input_frames: usize },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    /// `load-audio` or `cleanup` arrived while an offline render is running.
    #[error("Offline preprocessor is running")]
    PreprocessorBusy,

    #[error("Control channel full")]
    ChannelFull,

    #[error("Control channel closed")]
    ChannelClosed,

    #[cfg(feature = "output")]
    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    #[cfg(feature = "output")]
    #[error("Audio device not available")]
    DeviceNotAvailable(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "output")]
    #[error("Failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "output")]
    #[error("Failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[cfg(feature = "output")]
    #[error("Failed to enumerate devices")]
    DevicesError(#[from] cpal::DevicesError),
}

impl Error {
    /// Whether the error ends the session it occurred in.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Stretch(e) => e.is_fatal(),
            Error::EmptyOutput { .. } => true,
            _ => false,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let create: Error = vibe_stretch::Error::EngineCreateFailed {
            sample_rate: 44100,
            channels: 2,
        }
        .into();
        assert!(create.is_fatal());
        assert!(!Error::Processing("nan".into()).is_fatal());
        assert!(Error::EmptyOutput { input_frames: 10 }.is_fatal());
        assert!(!Error::PreprocessorBusy.is_fatal());
    }
}
