//! Software emulation of the virtual memory collaborators.
//!
//! This module provides in-memory stand-ins for the pieces of the kernel that the
//! virtual memory core talks to, so that the full fault path can run on any host:
//! - [`EmulatedMemory`]: a pool of page-sized frames backed by a heap buffer
//! - [`SoftwarePageTable`]: a flat map from virtual page to page entry
//! - [`EmulatedSwap`]: a fixed number of swap slots held in memory
//! - [`MemoryFile`]: a file whose contents live in a byte vector

mod entry;
mod flags;
mod table;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;

pub use entry::PageEntry;
pub use flags::PageFlags;
pub use table::SoftwarePageTable;

use crate::{
    BackingFile, FrameAllocator, FrameNumber, PAGE_SIZE, PhysicalAddress, SwapSlot, SwapStore,
    VmError,
};

/// Emulated physical memory.
///
/// Frame `n` lives at physical address `n * PAGE_SIZE` and occupies
/// `PAGE_SIZE` bytes of the underlying buffer. Released frames are handed out
/// again last-in first-out.
pub struct EmulatedMemory {
    /// The underlying memory buffer.
    memory: Box<[UnsafeCell<u8>]>,
    /// Frames available for allocation; the next frame handed out is at the end.
    free: spin::Mutex<Vec<FrameNumber>>,
    frame_count: usize,
}

// SAFETY: frame contents are only reached through raw pointers handed out by
// `frame_ptr`, and the allocator never gives the same frame to two owners.
unsafe impl Sync for EmulatedMemory {}

impl EmulatedMemory {
    /// Creates emulated memory with `frame_count` free frames.
    pub fn new(frame_count: usize) -> Self {
        let memory = (0..frame_count * PAGE_SIZE)
            .map(|_| UnsafeCell::new(0))
            .collect();
        let free = (0..frame_count).rev().map(FrameNumber::new).collect();
        Self {
            memory,
            free: spin::Mutex::new(free),
            frame_count,
        }
    }

    /// Returns the number of frames managed by this memory.
    pub fn total_frames(&self) -> usize {
        self.frame_count
    }

    /// Returns the number of frames available for allocation.
    pub fn free_frames(&self) -> usize {
        self.free.lock().len()
    }

    pub fn allocated_frames(&self) -> usize {
        self.total_frames() - self.free_frames()
    }

    /// Copies the contents of `frame` out.
    pub fn copy_frame(&self, frame: PhysicalAddress) -> Vec<u8> {
        let ptr = self.frame_ptr(frame);
        // SAFETY: `frame_ptr` checked the frame is in bounds.
        unsafe { core::slice::from_raw_parts(ptr, PAGE_SIZE) }.to_vec()
    }

    /// Overwrites every byte of `frame` with `value`.
    pub fn fill_frame(&self, frame: PhysicalAddress, value: u8) {
        let ptr = self.frame_ptr(frame);
        // SAFETY: `frame_ptr` checked the frame is in bounds.
        unsafe { core::ptr::write_bytes(ptr, value, PAGE_SIZE) };
    }

    fn offset_of(&self, frame: PhysicalAddress) -> usize {
        assert!(frame.is_page_aligned(), "frame address must be page-aligned");
        let number = frame.frame_number();
        assert!(
            number.as_usize() < self.frame_count,
            "physical address out of bounds"
        );
        frame.as_usize()
    }
}

impl FrameAllocator for EmulatedMemory {
    fn allocate_frame(&self) -> Result<PhysicalAddress, VmError> {
        let frame = self.free.lock().pop().ok_or(VmError::OutOfMemory)?;
        Ok(frame.start())
    }

    fn release_frame(&self, frame: PhysicalAddress) {
        let number = frame.frame_number();
        let mut free = self.free.lock();
        debug_assert!(!free.contains(&number), "double release of frame {}", frame);
        free.push(number);
    }

    fn frame_ptr(&self, frame: PhysicalAddress) -> *mut u8 {
        let offset = self.offset_of(frame);
        // SAFETY: `offset_of` checked that the whole frame lies inside the buffer.
        UnsafeCell::raw_get(unsafe { self.memory.as_ptr().add(offset) })
    }
}

/// Emulated swap device with a fixed number of page-sized slots.
pub struct EmulatedSwap {
    slots: spin::Mutex<Vec<Option<Box<[u8]>>>>,
}

impl EmulatedSwap {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: spin::Mutex::new((0..capacity).map(|_| None).collect()),
        }
    }

    /// Returns the number of occupied slots.
    pub fn used_slots(&self) -> usize {
        self.slots.lock().iter().filter(|slot| slot.is_some()).count()
    }
}

impl SwapStore for EmulatedSwap {
    fn swap_out(&self, page: &[u8]) -> Result<SwapSlot, VmError> {
        let mut slots = self.slots.lock();
        let index = slots
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(VmError::OutOfMemory)?;
        slots[index] = Some(page.into());
        Ok(SwapSlot::new(index))
    }

    fn swap_in(&self, slot: SwapSlot, page: &mut [u8]) -> Result<(), VmError> {
        let slots = self.slots.lock();
        let stored = slots
            .get(slot.index())
            .and_then(|stored| stored.as_deref())
            .ok_or(VmError::SwapFailure)?;
        if stored.len() != page.len() {
            return Err(VmError::SwapFailure);
        }
        page.copy_from_slice(stored);
        Ok(())
    }

    fn release(&self, slot: SwapSlot) {
        if let Some(stored) = self.slots.lock().get_mut(slot.index()) {
            *stored = None;
        }
    }
}

/// A read-only file held in memory.
pub struct MemoryFile {
    contents: Vec<u8>,
}

impl MemoryFile {
    pub fn new(contents: Vec<u8>) -> Self {
        Self { contents }
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

impl BackingFile for MemoryFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> usize {
        let Ok(start) = usize::try_from(offset) else {
            return 0;
        };
        let Some(available) = self.contents.get(start..) else {
            return 0;
        };
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        count
    }
}
