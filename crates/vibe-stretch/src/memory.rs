//! Linear memory of a stretcher module.
//!
//! A module sees one flat, byte-addressed region. Buffers handed to native calls
//! are identified by [`Address`]; Rust code reaches them through typed views that
//! borrow the memory, so a view can never outlive an allocation that grows (and
//! possibly relocates) the region.

use std::collections::BTreeMap;

use crate::error::Trap;

/// Byte offset into a module's linear memory. `Address::NULL` is never allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub u32);

impl Address {
    pub const NULL: Address = Address(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0 as usize
    }
}

/// Element types a view can be taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// Audio sample.
    F32,
    /// Native pointer (one machine word on a 32-bit module).
    U32,
}

impl ElementKind {
    #[inline]
    pub const fn size(self) -> usize {
        4
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for u32 {}
}

/// A word-sized element that can be viewed in linear memory.
pub trait Element: bytemuck::Pod + sealed::Sealed {
    const KIND: ElementKind;
}

impl Element for f32 {
    const KIND: ElementKind = ElementKind::F32;
}

impl Element for u32 {
    const KIND: ElementKind = ElementKind::U32;
}

/// Flat memory owned by a stretcher module, with the module's allocator.
pub trait LinearMemory {
    /// Allocate `bytes`, returning `None` when the region cannot grow far enough.
    fn malloc(&mut self, bytes: usize) -> Option<Address>;

    /// Release an allocation. Unknown addresses are ignored.
    fn free(&mut self, address: Address);

    /// Current extent of the region in bytes.
    fn byte_len(&self) -> usize;

    fn words(&self) -> &[u32];

    fn words_mut(&mut self) -> &mut [u32];

    /// Number of times the region has grown. Any change invalidates earlier views.
    fn growth_count(&self) -> u64;

    /// Validate `count` elements at `address` against the current extent.
    fn check_range<T: Element>(&self, address: Address, count: usize) -> Result<(usize, usize), Trap> {
        if address.0 % 4 != 0 {
            return Err(Trap::Misaligned(address.0));
        }
        let bytes = count.saturating_mul(T::KIND.size());
        let start = address.get();
        let extent = self.byte_len();
        match start.checked_add(bytes) {
            Some(end) if !address.is_null() && end <= extent => Ok((start / 4, end / 4)),
            _ => Err(Trap::OutOfBounds {
                address: address.0,
                bytes,
                extent,
            }),
        }
    }

    fn view<T: Element>(&self, address: Address, count: usize) -> Result<&[T], Trap> {
        let (start, end) = self.check_range::<T>(address, count)?;
        Ok(bytemuck::cast_slice(&self.words()[start..end]))
    }

    fn view_mut<T: Element>(&mut self, address: Address, count: usize) -> Result<&mut [T], Trap> {
        let (start, end) = self.check_range::<T>(address, count)?;
        Ok(bytemuck::cast_slice_mut(&mut self.words_mut()[start..end]))
    }
}

/// Allocation granularity and alignment in bytes.
pub const ALLOC_ALIGN: usize = 16;

/// Initial heap size (one 64 KiB page).
pub const DEFAULT_INITIAL_BYTES: usize = 64 * 1024;

/// Default ceiling for heap growth (256 MiB).
pub const DEFAULT_MAX_BYTES: usize = 256 * 1024 * 1024;

/// Growable heap with a first-fit, coalescing free list.
///
/// Growth doubles the backing vector, which may move it; views must be re-derived
/// after every `malloc`.
#[derive(Debug, Clone)]
pub struct HeapMemory {
    words: Vec<u32>,
    max_bytes: usize,
    live: BTreeMap<u32, u32>,
    free_list: Vec<(u32, u32)>,
    top: u32,
    growths: u64,
}

impl HeapMemory {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_INITIAL_BYTES, DEFAULT_MAX_BYTES)
    }

    /// Create a heap with explicit initial and maximum sizes (rounded to the alignment).
    pub fn with_limits(initial_bytes: usize, max_bytes: usize) -> Self {
        let max_bytes = align_up(max_bytes.clamp(ALLOC_ALIGN * 2, u32::MAX as usize / 2));
        let initial = align_up(initial_bytes.clamp(ALLOC_ALIGN * 2, max_bytes));
        Self {
            words: vec![0; initial / 4],
            max_bytes,
            live: BTreeMap::new(),
            free_list: Vec::new(),
            // The first slot is reserved so no allocation is ever at address 0.
            top: ALLOC_ALIGN as u32,
            growths: 0,
        }
    }

    /// Number of outstanding allocations.
    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    /// Bytes currently handed out (after alignment).
    pub fn allocated_bytes(&self) -> usize {
        self.live.values().map(|&size| size as usize).sum()
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn is_live(&self, address: Address) -> bool {
        self.live.contains_key(&address.0)
    }

    fn grow_to(&mut self, needed: usize) -> bool {
        if needed > self.max_bytes {
            return false;
        }
        let mut new_len = self.byte_len().max(ALLOC_ALIGN);
        while new_len < needed {
            new_len = new_len.saturating_mul(2);
        }
        new_len = new_len.min(self.max_bytes);
        self.words.resize(new_len / 4, 0);
        self.growths += 1;
        true
    }

    fn take_free(&mut self, size: u32) -> Option<u32> {
        let index = self.free_list.iter().position(|&(_, len)| len >= size)?;
        let (address, len) = self.free_list[index];
        if len == size {
            self.free_list.remove(index);
        } else {
            self.free_list[index] = (address + size, len - size);
        }
        Some(address)
    }

    fn release(&mut self, address: u32, size: u32) {
        let index = self
            .free_list
            .partition_point(|&(start, _)| start < address);
        self.free_list.insert(index, (address, size));

        // Coalesce with the following range, then the preceding one.
        if index + 1 < self.free_list.len() {
            let (start, len) = self.free_list[index];
            let (next_start, next_len) = self.free_list[index + 1];
            if start + len == next_start {
                self.free_list[index].1 = len + next_len;
                self.free_list.remove(index + 1);
            }
        }
        if index > 0 {
            let (prev_start, prev_len) = self.free_list[index - 1];
            let (start, len) = self.free_list[index];
            if prev_start + prev_len == start {
                self.free_list[index - 1].1 = prev_len + len;
                self.free_list.remove(index);
            }
        }

        // Give a trailing free range back to the bump pointer.
        if let Some(&(start, len)) = self.free_list.last() {
            if start + len == self.top {
                self.top = start;
                self.free_list.pop();
            }
        }
    }
}

impl Default for HeapMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearMemory for HeapMemory {
    fn malloc(&mut self, bytes: usize) -> Option<Address> {
        let size = align_up(bytes.max(1));
        if size > self.max_bytes {
            return None;
        }
        let size = size as u32;

        let address = match self.take_free(size) {
            Some(address) => address,
            None => {
                let end = self.top as usize + size as usize;
                if end > self.byte_len() && !self.grow_to(end) {
                    return None;
                }
                let address = self.top;
                self.top += size;
                address
            }
        };

        let start = address as usize / 4;
        self.words[start..start + size as usize / 4].fill(0);
        self.live.insert(address, size);
        Some(Address(address))
    }

    fn free(&mut self, address: Address) {
        if let Some(size) = self.live.remove(&address.0) {
            self.release(address.0, size);
        }
    }

    fn byte_len(&self) -> usize {
        self.words.len() * 4
    }

    fn words(&self) -> &[u32] {
        &self.words
    }

    fn words_mut(&mut self) -> &mut [u32] {
        &mut self.words
    }

    fn growth_count(&self) -> u64 {
        self.growths
    }
}

#[inline]
fn align_up(bytes: usize) -> usize {
    bytes.div_ceil(ALLOC_ALIGN) * ALLOC_ALIGN
}
