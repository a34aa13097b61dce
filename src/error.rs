//! Centralized error type for the vibe umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] vibe_core::Error),

    #[error("Stretch: {0}")]
    Stretch(#[from] vibe_stretch::Error),

    #[error("Player: {0}")]
    Player(#[from] vibe_player::Error),
}

impl Error {
    /// Whether the error ends the playback session it occurred in.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Core(_) => false,
            Error::Stretch(e) => e.is_fatal(),
            Error::Player(e) => e.is_fatal(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
