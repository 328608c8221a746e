//! Interfaces to the subsystems the virtual memory core depends on.
//!
//! The frame allocator, the hardware page table, the swap store and the filesystem
//! all live outside this crate. Each is reached through a trait so that the kernel
//! can plug in its real implementation and tests can use the software emulation.

use core::fmt;

use crate::{PhysicalAddress, VirtualAddress, VmError};

/// Serializes every file operation system-wide.
///
/// The filesystem is not safe for concurrent use, so any read from a
/// [`BackingFile`] must happen while this lock is held.
pub static FILESYSTEM_LOCK: spin::Mutex<()> = spin::Mutex::new(());

/// Hands out and takes back physical frames.
///
/// One allocator is shared by every address space. Allocation may block and may
/// evict a resident page of another address space to make room.
pub trait FrameAllocator: Sync {
    /// Allocates one page-sized, page-aligned frame.
    fn allocate_frame(&self) -> Result<PhysicalAddress, VmError>;

    /// Returns a frame to the allocator.
    fn release_frame(&self, frame: PhysicalAddress);

    /// Returns a kernel pointer to the first byte of `frame`.
    ///
    /// The pointer is valid for `PAGE_SIZE` bytes for as long as the frame stays
    /// allocated.
    fn frame_ptr(&self, frame: PhysicalAddress) -> *mut u8;
}

/// Binds virtual pages to frames in an address space's hardware page table.
pub trait PageMapper {
    /// Maps `page` to `frame` with user access and the given writability.
    fn map(&mut self, page: VirtualAddress, frame: PhysicalAddress, writable: bool) -> Result<(), VmError>;

    /// Removes the mapping for `page`, returning the frame it pointed to.
    fn unmap(&mut self, page: VirtualAddress) -> Option<PhysicalAddress>;

    /// Looks up the frame currently mapped at `page`.
    fn translate(&self, page: VirtualAddress) -> Option<PhysicalAddress>;
}

/// A file that page contents can be read from.
pub trait BackingFile: Send + Sync {
    /// Reads up to `buf.len()` bytes starting at `offset`, returning the number of
    /// bytes actually read. The caller holds [`FILESYSTEM_LOCK`].
    fn read_at(&self, buf: &mut [u8], offset: u64) -> usize;
}

/// Identifies a page-sized slot in the swap store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapSlot(usize);

impl SwapSlot {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwapSlot({})", self.0)
    }
}

/// Page-granular backing store for evicted anonymous and dirty pages.
pub trait SwapStore: Sync {
    /// Writes one page to a free slot.
    fn swap_out(&self, page: &[u8]) -> Result<SwapSlot, VmError>;

    /// Reads the page stored in `slot` back into `page`. The slot stays allocated.
    fn swap_in(&self, slot: SwapSlot, page: &mut [u8]) -> Result<(), VmError>;

    /// Frees `slot`.
    fn release(&self, slot: SwapSlot);
}

/// The system-wide memory collaborators an address space works against.
#[derive(Clone, Copy)]
pub struct PhysicalMemory<'a> {
    frames: &'a dyn FrameAllocator,
    swap: &'a dyn SwapStore,
}

impl<'a> PhysicalMemory<'a> {
    pub fn new(frames: &'a dyn FrameAllocator, swap: &'a dyn SwapStore) -> Self {
        Self { frames, swap }
    }

    pub fn frames(&self) -> &'a dyn FrameAllocator {
        self.frames
    }

    pub fn swap(&self) -> &'a dyn SwapStore {
        self.swap
    }

    /// Returns the bytes of a frame.
    ///
    /// # Safety
    ///
    /// `frame` must be allocated from this allocator and no other reference to its
    /// contents may exist while the returned slice is alive.
    pub(crate) unsafe fn frame_mut(&self, frame: PhysicalAddress) -> &'a mut [u8] {
        // SAFETY: `frame_ptr` is valid for PAGE_SIZE bytes while the frame is
        // allocated, and the caller guarantees exclusive access.
        unsafe { core::slice::from_raw_parts_mut(self.frames.frame_ptr(frame), crate::PAGE_SIZE) }
    }
}
