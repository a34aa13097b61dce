//! Tracked allocations in a module's linear memory.

use crate::error::{Error, Result};
use crate::memory::{Address, Element, LinearMemory};

/// A pool of allocations in one module's linear memory, freed together.
///
/// Every address handed out is recorded exactly once until [`free_all`](Self::free_all).
/// The arena only stores addresses; the memory itself is passed into each call,
/// so views it returns borrow the memory and cannot be kept across a later
/// allocation that may grow it.
#[derive(Debug, Default)]
pub struct MemoryArena {
    allocations: Vec<Address>,
}

impl MemoryArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate<M: LinearMemory>(&mut self, memory: &mut M, bytes: usize) -> Result<Address> {
        let address = memory
            .malloc(bytes)
            .ok_or(Error::AllocationFailed { bytes })?;
        self.allocations.push(address);
        Ok(address)
    }

    /// Allocate `count` elements and return the address with a fresh view over it.
    ///
    /// The range is validated against the memory's extent *after* the allocation,
    /// since the allocation itself may have grown the region.
    pub fn allocate_view<'m, T: Element, M: LinearMemory>(
        &mut self,
        memory: &'m mut M,
        count: usize,
    ) -> Result<(Address, &'m mut [T])> {
        let bytes = count.saturating_mul(T::KIND.size());
        let address = self.allocate(memory, bytes)?;
        let view = memory.view_mut::<T>(address, count)?;
        Ok((address, view))
    }

    /// Free every tracked allocation. Safe to call repeatedly or on a partly built arena.
    pub fn free_all<M: LinearMemory>(&mut self, memory: &mut M) {
        for address in self.allocations.drain(..) {
            memory.free(address);
        }
    }

    pub fn tracked(&self) -> &[Address] {
        &self.allocations
    }

    pub fn owns(&self, address: Address) -> bool {
        self.allocations.contains(&address)
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

impl Drop for MemoryArena {
    fn drop(&mut self) {
        if !self.allocations.is_empty() {
            tracing::warn!(
                "MemoryArena dropped with {} live allocations",
                self.allocations.len()
            );
        }
    }
}

/// Per-channel input/output buffers plus the pointer arrays that name them.
///
/// All buffers hold `block_frames` frames and are never resized; a different
/// channel count or block size needs a new set from a fresh arena.
#[derive(Debug, Clone)]
pub struct ChannelBufferSet {
    input_ptrs: Address,
    output_ptrs: Address,
    inputs: Vec<Address>,
    outputs: Vec<Address>,
    block_frames: usize,
}

impl ChannelBufferSet {
    pub fn allocate<M: LinearMemory>(
        arena: &mut MemoryArena,
        memory: &mut M,
        channels: usize,
        block_frames: usize,
    ) -> Result<Self> {
        let mut inputs = Vec::with_capacity(channels);
        let mut outputs = Vec::with_capacity(channels);

        for _ in 0..channels {
            let (address, _) = arena.allocate_view::<f32, _>(memory, block_frames)?;
            inputs.push(address);
            let (address, _) = arena.allocate_view::<f32, _>(memory, block_frames)?;
            outputs.push(address);
        }

        // Pointer arrays are filled through views taken after the last growth.
        let (input_ptrs, view) = arena.allocate_view::<u32, _>(memory, channels)?;
        for (slot, address) in view.iter_mut().zip(&inputs) {
            *slot = address.0;
        }
        let (output_ptrs, view) = arena.allocate_view::<u32, _>(memory, channels)?;
        for (slot, address) in view.iter_mut().zip(&outputs) {
            *slot = address.0;
        }

        Ok(Self {
            input_ptrs,
            output_ptrs,
            inputs,
            outputs,
            block_frames,
        })
    }

    pub fn channels(&self) -> usize {
        self.inputs.len()
    }

    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    pub fn input_ptrs(&self) -> Address {
        self.input_ptrs
    }

    pub fn output_ptrs(&self) -> Address {
        self.output_ptrs
    }

    pub fn input(&self, channel: usize) -> Result<Address> {
        self.inputs
            .get(channel)
            .copied()
            .ok_or(self.out_of_range(channel))
    }

    pub fn output(&self, channel: usize) -> Result<Address> {
        self.outputs
            .get(channel)
            .copied()
            .ok_or(self.out_of_range(channel))
    }

    /// Copy `samples` into a channel's input buffer and zero the rest of the block.
    pub fn write_input<M: LinearMemory>(
        &self,
        memory: &mut M,
        channel: usize,
        samples: &[f32],
    ) -> Result<()> {
        if samples.len() > self.block_frames {
            return Err(Error::BlockOverflow {
                frames: samples.len(),
                capacity: self.block_frames,
            });
        }
        let view = memory.view_mut::<f32>(self.input(channel)?, self.block_frames)?;
        let (head, tail) = view.split_at_mut(samples.len());
        head.copy_from_slice(samples);
        tail.fill(0.0);
        Ok(())
    }

    /// Copy the first `dest.len()` frames of a channel's output buffer.
    pub fn read_output<M: LinearMemory>(
        &self,
        memory: &M,
        channel: usize,
        dest: &mut [f32],
    ) -> Result<()> {
        if dest.len() > self.block_frames {
            return Err(Error::BlockOverflow {
                frames: dest.len(),
                capacity: self.block_frames,
            });
        }
        let view = memory.view::<f32>(self.output(channel)?, dest.len())?;
        dest.copy_from_slice(view);
        Ok(())
    }

    fn out_of_range(&self, channel: usize) -> Error {
        Error::ChannelOutOfRange {
            channel,
            channels: self.inputs.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HeapMemory;

    #[test]
    fn test_allocate_tracks_each_address_once() {
        let mut heap = HeapMemory::new();
        let mut arena = MemoryArena::new();
        let a = arena.allocate(&mut heap, 64).unwrap();
        let b = arena.allocate(&mut heap, 64).unwrap();
        assert_ne!(a, b);
        assert_eq!(arena.tracked(), &[a, b]);
        assert!(arena.owns(a));
    }

    #[test]
    fn test_free_all_is_idempotent() {
        let mut heap = HeapMemory::new();
        let mut arena = MemoryArena::new();
        arena.allocate(&mut heap, 64).unwrap();
        arena.allocate(&mut heap, 128).unwrap();

        arena.free_all(&mut heap);
        assert!(arena.is_empty());
        assert_eq!(heap.live_allocations(), 0);

        arena.free_all(&mut heap);
        assert!(arena.is_empty());
        assert_eq!(heap.live_allocations(), 0);
    }

    #[test]
    fn test_allocation_failure_keeps_partial_state_freeable() {
        let mut heap = HeapMemory::with_limits(64, 4096);
        let mut arena = MemoryArena::new();
        // Three 1 KiB buffers fit below the 4 KiB ceiling, the fourth does not.
        let result = ChannelBufferSet::allocate(&mut arena, &mut heap, 2, 256);
        assert!(matches!(result, Err(Error::AllocationFailed { .. })));
        assert!(!arena.is_empty());

        arena.free_all(&mut heap);
        assert_eq!(heap.live_allocations(), 0);
    }

    #[test]
    fn test_pointer_arrays_name_channel_buffers() {
        let mut heap = HeapMemory::with_limits(64, 1 << 20);
        let mut arena = MemoryArena::new();
        let set = ChannelBufferSet::allocate(&mut arena, &mut heap, 2, 256).unwrap();

        // 2 inputs + 2 outputs + 2 pointer arrays
        assert_eq!(arena.len(), 6);
        let ptrs = heap.view::<u32>(set.input_ptrs(), 2).unwrap();
        assert_eq!(ptrs[0], set.input(0).unwrap().0);
        assert_eq!(ptrs[1], set.input(1).unwrap().0);
        let ptrs = heap.view::<u32>(set.output_ptrs(), 2).unwrap();
        assert_eq!(ptrs[1], set.output(1).unwrap().0);

        arena.free_all(&mut heap);
    }

    #[test]
    fn test_write_input_zero_pads() {
        let mut heap = HeapMemory::new();
        let mut arena = MemoryArena::new();
        let set = ChannelBufferSet::allocate(&mut arena, &mut heap, 1, 8).unwrap();

        heap.view_mut::<f32>(set.input(0).unwrap(), 8).unwrap().fill(9.0);
        set.write_input(&mut heap, 0, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(
            heap.view::<f32>(set.input(0).unwrap(), 8).unwrap(),
            &[1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        );

        let err = set.write_input(&mut heap, 0, &[0.0; 9]).unwrap_err();
        assert_eq!(err, Error::BlockOverflow { frames: 9, capacity: 8 });
        assert!(matches!(
            set.write_input(&mut heap, 3, &[0.0]),
            Err(Error::ChannelOutOfRange { channel: 3, .. })
        ));
        arena.free_all(&mut heap);
    }
}
