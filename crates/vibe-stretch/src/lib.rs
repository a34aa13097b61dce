//! Native stretcher plumbing for the vibe playback engine.
//!
//! A stretcher is driven through an opaque handle and buffers in its own linear
//! memory, the way a compiled C library would be:
//!
//! - [`LinearMemory`] / [`HeapMemory`]: the module's flat address space
//! - [`MemoryArena`] / [`ChannelBufferSet`]: tracked allocations freed together
//! - [`StretcherModule`]: the native call surface (create, process, retrieve, ...)
//! - [`StretchEngineHandle`]: one live instance plus its applied parameters
//! - [`SoftStretcher`]: built-in phase vocoder module
//!
//! # Example
//!
//! ```ignore
//! use vibe_stretch::{ChannelBufferSet, MemoryArena, SoftStretcher, StretchEngineHandle,
//!                    StretchOptions, StretcherModule};
//!
//! let mut module = SoftStretcher::new();
//! let mut arena = MemoryArena::new();
//! let buffers = ChannelBufferSet::allocate(&mut arena, module.memory_mut(), 2, 1024)?;
//! let mut engine = StretchEngineHandle::create(&mut module, 44100, 2, StretchOptions::realtime(), 2.0, 1.0)?;
//!
//! buffers.write_input(module.memory_mut(), 0, &left)?;
//! buffers.write_input(module.memory_mut(), 1, &right)?;
//! engine.process(&mut module, &buffers, left.len(), false)?;
//! let got = engine.retrieve(&mut module, &buffers, 1024)?;
//!
//! engine.destroy(&mut module);
//! arena.free_all(module.memory_mut());
//! ```

pub mod error;
pub use error::{Error, Result, Trap};

mod memory;
pub use memory::{
    Address, Element, ElementKind, HeapMemory, LinearMemory, ALLOC_ALIGN, DEFAULT_INITIAL_BYTES,
    DEFAULT_MAX_BYTES,
};

mod arena;
pub use arena::{ChannelBufferSet, MemoryArena};

mod module;
pub use module::{NativeResult, RawHandle, StretcherModule};

mod options;
pub use options::{FftSize, StretchOptions};

mod engine;
pub use engine::StretchEngineHandle;

pub mod soft;
pub use soft::SoftStretcher;
