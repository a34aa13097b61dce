//! Error types.

use thiserror::Error;

/// Fault raised by a stretcher module while executing a native call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Trap {
    #[error("invalid instance handle {0}")]
    InvalidHandle(u32),

    #[error("memory access out of bounds: {bytes} bytes at {address:#x} (extent {extent})")]
    OutOfBounds {
        address: u32,
        bytes: usize,
        extent: usize,
    },

    #[error("misaligned memory access at {0:#x}")]
    Misaligned(u32),

    #[error("process called after the final block without a reset")]
    ProcessAfterFinal,

    #[error("{frames} frames exceed the per-call capacity of {capacity}")]
    TooManyFrames { frames: usize, capacity: usize },

    #[error("input ring overflow")]
    InputOverflow,

    #[error("study is only available in offline mode")]
    StudyInRealtime,
}

/// Error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The module returned an invalid handle.
    #[error("Stretcher creation failed ({channels} channels @ {sample_rate} Hz)")]
    EngineCreateFailed { sample_rate: u32, channels: usize },

    /// A byte range fell outside the current extent of linear memory.
    #[error("Arena overrun: {bytes} bytes at {address:#x} beyond extent {extent}")]
    ArenaOverrun {
        address: u32,
        bytes: usize,
        extent: usize,
    },

    /// The module's allocator could not satisfy a request.
    #[error("Allocation of {bytes} bytes failed")]
    AllocationFailed { bytes: usize },

    /// More frames than a channel buffer holds.
    #[error("Block overflow: {frames} frames exceed buffer capacity {capacity}")]
    BlockOverflow { frames: usize, capacity: usize },

    #[error("Channel {channel} out of range ({channels} channels)")]
    ChannelOutOfRange { channel: usize, channels: usize },

    /// The engine handle was already destroyed.
    #[error("Stretcher instance is not live")]
    InvalidHandle,

    /// Any other native fault.
    #[error("Native fault: {0}")]
    Trap(Trap),
}

impl Error {
    /// Whether the error ends the session (no further audio can be produced from it).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::EngineCreateFailed { .. }
                | Error::ArenaOverrun { .. }
                | Error::AllocationFailed { .. }
        )
    }
}

impl From<Trap> for Error {
    fn from(trap: Trap) -> Self {
        match trap {
            Trap::OutOfBounds {
                address,
                bytes,
                extent,
            } => Error::ArenaOverrun {
                address,
                bytes,
                extent,
            },
            other => Error::Trap(other),
        }
    }
}

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;
