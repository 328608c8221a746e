//! Per-page metadata kept in the supplemental page table.

use alloc::sync::Arc;
use core::fmt;

use crate::{BackingFile, PAGE_SIZE, PageNumber, SwapSlot, VirtualAddress};

/// Residency of a declared page.
///
/// A pinned page must not be evicted. The state only changes while the owning
/// address space's lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// No frame backs the page.
    NotResident,
    /// A fault handler is populating a frame for the page.
    Loading,
    /// A frame backs the page and it may be evicted.
    Resident,
    /// A frame backs the page and the kernel is accessing it on the process's
    /// behalf, so it must stay put.
    Pinned,
    /// The page is unmapped and its frame is being written out. It stays pinned
    /// until the frame is released and the state drops to `NotResident`.
    Evicting,
}

impl PageState {
    /// Returns true if a physical frame currently backs the page.
    pub const fn is_resident(self) -> bool {
        matches!(self, PageState::Resident | PageState::Pinned | PageState::Evicting)
    }

    /// Returns true if the page must not be evicted.
    pub const fn is_pinned(self) -> bool {
        matches!(self, PageState::Loading | PageState::Pinned | PageState::Evicting)
    }
}

/// Describes one declared virtual page and where its contents come from.
///
/// File-backed pages take `read_bytes` bytes from `file` at `file_offset` and
/// zero the remaining `zero_bytes`; anonymous pages are entirely zero. The two
/// counts always add up to [`PAGE_SIZE`].
#[derive(Clone)]
pub struct PageDescriptor {
    page: VirtualAddress,
    file: Option<Arc<dyn BackingFile>>,
    file_offset: u64,
    read_bytes: usize,
    zero_bytes: usize,
    writable: bool,
    state: PageState,
    swap_slot: Option<SwapSlot>,
    generation: u64,
}

impl PageDescriptor {
    /// Creates a zero-filled page with no backing file.
    ///
    /// # Panics
    ///
    /// Panics if `page` is not page-aligned.
    pub fn anonymous(page: VirtualAddress, writable: bool) -> Self {
        assert!(page.is_page_aligned(), "virtual address must be page-aligned");
        Self {
            page,
            file: None,
            file_offset: 0,
            read_bytes: 0,
            zero_bytes: PAGE_SIZE,
            writable,
            state: PageState::NotResident,
            swap_slot: None,
            generation: 0,
        }
    }

    /// Creates a page whose first `read_bytes` bytes come from `file` at
    /// `file_offset`.
    ///
    /// # Panics
    ///
    /// Panics if `page` is not page-aligned or `read_bytes` exceeds a page.
    pub fn file_backed(
        page: VirtualAddress,
        file: Arc<dyn BackingFile>,
        file_offset: u64,
        read_bytes: usize,
        writable: bool,
    ) -> Self {
        assert!(page.is_page_aligned(), "virtual address must be page-aligned");
        assert!(read_bytes <= PAGE_SIZE, "read_bytes must fit in a page");
        Self {
            page,
            file: Some(file),
            file_offset,
            read_bytes,
            zero_bytes: PAGE_SIZE - read_bytes,
            writable,
            state: PageState::NotResident,
            swap_slot: None,
            generation: 0,
        }
    }

    /// The page-aligned virtual address this descriptor covers.
    pub fn virtual_address(&self) -> VirtualAddress {
        self.page
    }

    pub fn page_number(&self) -> PageNumber {
        self.page.page_number()
    }

    pub fn backing_file(&self) -> Option<&Arc<dyn BackingFile>> {
        self.file.as_ref()
    }

    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    pub fn read_bytes(&self) -> usize {
        self.read_bytes
    }

    pub fn zero_bytes(&self) -> usize {
        self.zero_bytes
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn is_resident(&self) -> bool {
        self.state.is_resident()
    }

    pub fn is_pinned(&self) -> bool {
        self.state.is_pinned()
    }

    /// The swap slot holding this page's contents while it is evicted.
    pub fn swap_slot(&self) -> Option<SwapSlot> {
        self.swap_slot
    }

    /// Identifies this declaration of the page. Assigned by the table on insertion
    /// and never reused within that table, so a deleted and redeclared page can
    /// be told apart from the original.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub(crate) fn set_state(&mut self, state: PageState) {
        log::trace!("page {}: {:?} -> {:?}", self.page, self.state, state);
        self.state = state;
    }

    pub(crate) fn set_swap_slot(&mut self, slot: Option<SwapSlot>) {
        self.swap_slot = slot;
    }

    /// Resets the descriptor to "not resident". New descriptors always start
    /// unpinned, whatever state the caller built them in.
    pub(crate) fn reset_state(&mut self) {
        self.state = PageState::NotResident;
    }
}

impl fmt::Debug for PageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageDescriptor")
            .field("page", &self.page)
            .field("file_backed", &self.file.is_some())
            .field("file_offset", &self.file_offset)
            .field("read_bytes", &self.read_bytes)
            .field("zero_bytes", &self.zero_bytes)
            .field("writable", &self.writable)
            .field("state", &self.state)
            .field("swap_slot", &self.swap_slot)
            .field("generation", &self.generation)
            .finish()
    }
}
