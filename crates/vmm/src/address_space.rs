//! Address space management.
//!
//! An [`AddressSpace`] is the per-process object the rest of the kernel talks to.
//! It owns the process's supplemental page table and hardware page table behind a
//! single lock, and drives page faults from resolution to a mapped, populated frame.
//!
//! The lock is never held across frame allocation or I/O. Allocation may evict a
//! page, possibly one of this very address space, and eviction needs the lock. A
//! page that is being populated or written out is pinned instead, and every other
//! path leaves pinned pages alone.

use alloc::sync::Arc;

use crate::fault::{self, FaultAccess};
use crate::{
    BackingFile, PAGE_SIZE, PageDescriptor, PageMapper, PageState, PhysicalAddress,
    PhysicalMemory, SupplementalPageTable, UserLayout, VirtualAddress, VmError, loader,
};

struct Inner<M> {
    table: SupplementalPageTable,
    directory: M,
}

/// A user address space: declared pages plus the page table that maps the
/// resident ones.
pub struct AddressSpace<M: PageMapper> {
    layout: UserLayout,
    inner: spin::Mutex<Inner<M>>,
}

impl<M: PageMapper> AddressSpace<M> {
    /// Creates an empty address space with the default user layout.
    pub fn new(directory: M) -> Self {
        Self::with_layout(directory, UserLayout::default())
    }

    /// Creates an empty address space with a custom user layout.
    pub fn with_layout(directory: M, layout: UserLayout) -> Self {
        Self {
            layout,
            inner: spin::Mutex::new(Inner {
                table: SupplementalPageTable::new(),
                directory,
            }),
        }
    }

    pub fn layout(&self) -> &UserLayout {
        &self.layout
    }

    /// Declares a page. Fails with [`VmError::DuplicateMapping`] if the page is
    /// already declared.
    pub fn insert(&self, page: PageDescriptor) -> Result<(), VmError> {
        self.inner.lock().table.insert(page)
    }

    /// Returns a snapshot of the descriptor covering `addr`.
    pub fn search(&self, addr: VirtualAddress) -> Option<PageDescriptor> {
        self.inner.lock().table.search(addr).cloned()
    }

    /// Removes the page covering `addr`, releasing its frame if it is resident.
    pub fn delete(&self, addr: VirtualAddress, memory: PhysicalMemory<'_>) -> Result<(), VmError> {
        let mut inner = self.inner.lock();
        let Inner { table, directory } = &mut *inner;
        table.delete(addr, directory, memory)
    }

    /// Tears the address space down, releasing every page.
    ///
    /// Returns the number of frames returned to the allocator.
    pub fn destroy(self, memory: PhysicalMemory<'_>) -> usize {
        let Inner {
            table,
            mut directory,
        } = self.inner.into_inner();
        table.destroy(&mut directory, memory)
    }

    /// Returns the frame backing the page that contains `addr`, if it is mapped.
    pub fn translate(&self, addr: VirtualAddress) -> Option<PhysicalAddress> {
        self.inner.lock().directory.translate(addr.page_round_down())
    }

    /// Runs `f` with the supplemental page table locked.
    pub fn with_table<R>(&self, f: impl FnOnce(&SupplementalPageTable) -> R) -> R {
        f(&self.inner.lock().table)
    }

    /// Number of pages currently backed by a frame.
    pub fn resident_pages(&self) -> usize {
        self.with_table(|table| table.iter().filter(|page| page.is_resident()).count())
    }

    /// Lazily declares a loadable segment of `file`.
    ///
    /// Covers `read_bytes + zero_bytes` bytes starting at `upage`: the first
    /// `read_bytes` come from `file` starting at `offset` and the rest are zero.
    /// One descriptor is inserted per page; nothing is read until the page faults.
    ///
    /// # Panics
    ///
    /// Panics if `upage` is not page-aligned or the segment is not a whole number
    /// of pages.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::DuplicateMapping`] if any page of the segment is already
    /// declared; nothing is declared in that case.
    pub fn declare_segment(
        &self,
        file: Arc<dyn BackingFile>,
        mut offset: u64,
        upage: VirtualAddress,
        mut read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> Result<(), VmError> {
        assert!(upage.is_page_aligned(), "segment must start on a page boundary");
        assert!(
            (read_bytes + zero_bytes) % PAGE_SIZE == 0,
            "segment must cover whole pages"
        );

        let pages = (read_bytes + zero_bytes) / PAGE_SIZE;
        log::debug!(
            "declaring segment at {}: {} pages, {} bytes from offset {:#x}",
            upage,
            pages,
            read_bytes,
            offset
        );

        let mut inner = self.inner.lock();
        if let Some(taken) = (0..pages)
            .map(|index| upage + index * PAGE_SIZE)
            .find(|&page| inner.table.contains(page))
        {
            log::debug!("segment page {} is already declared", taken);
            return Err(VmError::DuplicateMapping);
        }

        for index in 0..pages {
            let page = upage + index * PAGE_SIZE;
            let page_read_bytes = read_bytes.min(PAGE_SIZE);

            let descriptor = if page_read_bytes == 0 {
                PageDescriptor::anonymous(page, writable)
            } else {
                PageDescriptor::file_backed(page, file.clone(), offset, page_read_bytes, writable)
            };
            inner.table.insert(descriptor)?;

            read_bytes -= page_read_bytes;
            offset += page_read_bytes as u64;
        }
        Ok(())
    }

    /// Declares a zero-filled page at `page`.
    pub fn declare_anonymous(&self, page: VirtualAddress, writable: bool) -> Result<(), VmError> {
        self.insert(PageDescriptor::anonymous(page, writable))
    }

    /// Resolves a fault without populating anything.
    ///
    /// Returns a snapshot of the descriptor the fault should be served from,
    /// growing the stack if needed. See [`fault::resolve`].
    pub fn resolve_fault(
        &self,
        fault: VirtualAddress,
        stack_pointer: VirtualAddress,
    ) -> Result<PageDescriptor, VmError> {
        let mut inner = self.inner.lock();
        fault::resolve(&mut inner.table, &self.layout, fault, stack_pointer).cloned()
    }

    /// Handles a page fault end to end.
    ///
    /// Resolves the fault, allocates a frame, fills it from swap, the backing file
    /// or zeros, maps it and marks the page resident. Any error is fatal to the
    /// process (see [`VmError::exit_status`]); the page is left not resident and
    /// no frame is leaked.
    pub fn handle_page_fault(
        &self,
        fault: VirtualAddress,
        stack_pointer: VirtualAddress,
        access: FaultAccess,
        memory: PhysicalMemory<'_>,
    ) -> Result<(), VmError> {
        let snapshot = {
            let mut inner = self.inner.lock();
            let page = fault::resolve(&mut inner.table, &self.layout, fault, stack_pointer)?;

            if access == FaultAccess::Write && !page.is_writable() {
                log::debug!("write fault at {} on read-only page", fault);
                return Err(VmError::InvalidAddress);
            }

            match page.state() {
                PageState::NotResident => {}
                state => {
                    // Already mapped, or another thread is moving it; the access
                    // is retried when the trap returns.
                    log::trace!("fault at {} on page in state {:?}", fault, state);
                    return Ok(());
                }
            }

            page.set_state(PageState::Loading);
            page.clone()
        };
        let page = snapshot.virtual_address();
        let generation = snapshot.generation();

        let frame = match memory.frames().allocate_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("no frame for page {}: {}", page, err);
                self.abandon_load(page, generation);
                return Err(err);
            }
        };

        // SAFETY: the frame was just allocated and is not mapped anywhere, so this
        // is the only reference to its contents.
        let bytes = unsafe { memory.frame_mut(frame) };
        let filled = match snapshot.swap_slot() {
            Some(slot) => memory.swap().swap_in(slot, bytes),
            None if snapshot.backing_file().is_some() => loader::load(bytes, &snapshot),
            None => {
                loader::zero_fill(bytes);
                Ok(())
            }
        };

        if let Err(err) = filled {
            log::warn!("failed to populate page {}: {}", page, err);
            memory.frames().release_frame(frame);
            self.abandon_load(page, generation);
            return Err(err);
        }

        let mut inner = self.inner.lock();
        let Inner { table, directory } = &mut *inner;
        let descriptor = match table.search_generation(page, generation) {
            Some(descriptor) if descriptor.state() == PageState::Loading => descriptor,
            _ => {
                // Deleted, and possibly redeclared, while we were loading.
                log::debug!("page {} went away while loading", page);
                memory.frames().release_frame(frame);
                return Ok(());
            }
        };

        if let Err(err) = directory.map(page, frame, descriptor.is_writable()) {
            memory.frames().release_frame(frame);
            descriptor.set_state(PageState::NotResident);
            return Err(err);
        }

        if let Some(slot) = descriptor.swap_slot() {
            memory.swap().release(slot);
            descriptor.set_swap_slot(None);
        }
        descriptor.set_state(PageState::Resident);
        log::trace!("page {} resident in frame {}", page, frame);
        Ok(())
    }

    /// Pins a resident page so that it cannot be evicted.
    pub fn pin(&self, addr: VirtualAddress) -> Result<(), VmError> {
        let mut inner = self.inner.lock();
        let page = inner.table.search_mut(addr).ok_or(VmError::NotFound)?;
        match page.state() {
            PageState::Resident => {
                page.set_state(PageState::Pinned);
                Ok(())
            }
            _ => Err(VmError::PagePinned),
        }
    }

    /// Releases a pin taken with [`pin`](Self::pin).
    ///
    /// Fails with [`VmError::PagePinned`] if the page is not pinned by the caller,
    /// including pages that are loading or being evicted.
    pub fn unpin(&self, addr: VirtualAddress) -> Result<(), VmError> {
        let mut inner = self.inner.lock();
        let page = inner.table.search_mut(addr).ok_or(VmError::NotFound)?;
        match page.state() {
            PageState::Pinned => {
                page.set_state(PageState::Resident);
                Ok(())
            }
            state => {
                log::debug!("unpin of page {} in state {:?}", page.virtual_address(), state);
                Err(VmError::PagePinned)
            }
        }
    }

    /// Evicts the page covering `addr`, freeing its frame.
    ///
    /// Writable and anonymous pages are written to swap first; read-only
    /// file-backed pages are simply dropped and reloaded from the file on the next
    /// fault. The page stays pinned until its frame has been released.
    pub fn evict(&self, addr: VirtualAddress, memory: PhysicalMemory<'_>) -> Result<(), VmError> {
        let (page, generation, frame, needs_swap) = {
            let mut inner = self.inner.lock();
            let Inner { table, directory } = &mut *inner;
            let descriptor = table.search_mut(addr).ok_or(VmError::NotFound)?;
            match descriptor.state() {
                PageState::Resident => {}
                PageState::NotResident => return Ok(()),
                PageState::Loading | PageState::Pinned | PageState::Evicting => {
                    return Err(VmError::PagePinned);
                }
            }

            let page = descriptor.virtual_address();
            let Some(frame) = directory.unmap(page) else {
                log::warn!("resident page {} has no hardware mapping", page);
                descriptor.set_state(PageState::NotResident);
                return Ok(());
            };
            descriptor.set_state(PageState::Evicting);
            let needs_swap = descriptor.is_writable() || descriptor.backing_file().is_none();
            (page, descriptor.generation(), frame, needs_swap)
        };

        let slot = if needs_swap {
            // SAFETY: the page is unmapped and marked evicting, so nothing else
            // reads or writes the frame until it is released below.
            let bytes = unsafe { memory.frame_mut(frame) };
            match memory.swap().swap_out(bytes) {
                Ok(slot) => Some(slot),
                Err(err) => {
                    log::warn!("failed to swap out page {}: {}", page, err);
                    self.abandon_eviction(page, generation, frame, memory);
                    return Err(err);
                }
            }
        } else {
            None
        };

        {
            let mut inner = self.inner.lock();
            match inner.table.search_generation(page, generation) {
                Some(descriptor) if descriptor.state() == PageState::Evicting => {
                    descriptor.set_swap_slot(slot);
                    descriptor.set_state(PageState::NotResident);
                }
                _ => {
                    if let Some(slot) = slot {
                        memory.swap().release(slot);
                    }
                }
            }
        }

        memory.frames().release_frame(frame);
        log::trace!("evicted page {} from frame {} (swap {:?})", page, frame, slot);
        Ok(())
    }

    /// Returns a page whose load failed to the not-resident state.
    fn abandon_load(&self, page: VirtualAddress, generation: u64) {
        let mut inner = self.inner.lock();
        if let Some(descriptor) = inner.table.search_generation(page, generation) {
            if descriptor.state() == PageState::Loading {
                descriptor.set_state(PageState::NotResident);
            }
        }
    }

    /// Maps a page back after a failed eviction, or frees the frame if the page
    /// was deleted in the meantime.
    fn abandon_eviction(
        &self,
        page: VirtualAddress,
        generation: u64,
        frame: PhysicalAddress,
        memory: PhysicalMemory<'_>,
    ) {
        let mut inner = self.inner.lock();
        let Inner { table, directory } = &mut *inner;
        match table.search_generation(page, generation) {
            Some(descriptor) if descriptor.state() == PageState::Evicting => {
                match directory.map(page, frame, descriptor.is_writable()) {
                    Ok(()) => descriptor.set_state(PageState::Resident),
                    Err(_) => {
                        memory.frames().release_frame(frame);
                        descriptor.set_state(PageState::NotResident);
                    }
                }
            }
            _ => memory.frames().release_frame(frame),
        }
    }
}
