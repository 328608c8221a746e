//! The supplemental page table.
//!
//! The hardware page table only knows about pages that are resident. The
//! supplemental page table records every page a process has declared, resident
//! or not, together with where its contents come from. It is the authority the
//! fault handler consults to decide whether a fault is legitimate.

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;

use crate::{
    PageDescriptor, PageMapper, PageNumber, PageState, PhysicalMemory, VirtualAddress, VmError,
};

/// Per-address-space map from virtual page to [`PageDescriptor`].
///
/// The table owns its descriptors. [`delete`](Self::delete) and
/// [`destroy`](Self::destroy) are the only places descriptors leave the table, and
/// both release the frame and swap slot a descriptor holds.
#[derive(Debug, Default)]
pub struct SupplementalPageTable {
    pages: HashMap<PageNumber, PageDescriptor>,
    next_generation: u64,
}

impl SupplementalPageTable {
    /// Creates a new, empty table.
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Adds a descriptor for a page that has no descriptor yet.
    ///
    /// The descriptor is stored unpinned and not resident, with a fresh
    /// generation.
    pub fn insert(&mut self, mut page: PageDescriptor) -> Result<(), VmError> {
        match self.pages.entry(page.page_number()) {
            Entry::Occupied(_) => {
                log::debug!("duplicate mapping for {}", page.virtual_address());
                Err(VmError::DuplicateMapping)
            }
            Entry::Vacant(slot) => {
                page.reset_state();
                page.set_generation(self.next_generation);
                self.next_generation += 1;
                slot.insert(page);
                Ok(())
            }
        }
    }

    /// Returns true if a descriptor covers `addr`.
    pub fn contains(&self, addr: VirtualAddress) -> bool {
        self.pages.contains_key(&addr.page_number())
    }

    /// Finds the descriptor covering `addr`, which may point anywhere inside the page.
    pub fn search(&self, addr: VirtualAddress) -> Option<&PageDescriptor> {
        self.pages.get(&addr.page_number())
    }

    /// Mutable version of [`search`](Self::search).
    pub fn search_mut(&mut self, addr: VirtualAddress) -> Option<&mut PageDescriptor> {
        self.pages.get_mut(&addr.page_number())
    }

    /// Like [`search_mut`](Self::search_mut), but only finds the descriptor if it
    /// is still the declaration with the given generation.
    pub(crate) fn search_generation(
        &mut self,
        addr: VirtualAddress,
        generation: u64,
    ) -> Option<&mut PageDescriptor> {
        self.search_mut(addr)
            .filter(|page| page.generation() == generation)
    }

    /// Removes the descriptor covering `addr`.
    ///
    /// If the page is resident its mapping is cleared and its frame returned to the
    /// allocator; if it was swapped out its swap slot is freed.
    pub fn delete<M: PageMapper + ?Sized>(
        &mut self,
        addr: VirtualAddress,
        directory: &mut M,
        memory: PhysicalMemory<'_>,
    ) -> Result<(), VmError> {
        let page = self
            .pages
            .remove(&addr.page_number())
            .ok_or(VmError::NotFound)?;
        release(page, directory, memory);
        Ok(())
    }

    /// Tears the table down, releasing every descriptor.
    ///
    /// Returns the number of frames returned to the allocator.
    pub fn destroy<M: PageMapper + ?Sized>(
        mut self,
        directory: &mut M,
        memory: PhysicalMemory<'_>,
    ) -> usize {
        let released = self
            .pages
            .drain()
            .map(|(_, page)| release(page, directory, memory))
            .filter(|released| *released)
            .count();
        log::debug!("supplemental page table destroyed, {} frames released", released);
        released
    }

    /// Returns the number of declared pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Returns true if no pages are declared.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Iterates over all descriptors in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &PageDescriptor> {
        self.pages.values()
    }
}

/// Frees everything `page` holds. Returns true if a frame was released.
fn release<M: PageMapper + ?Sized>(
    page: PageDescriptor,
    directory: &mut M,
    memory: PhysicalMemory<'_>,
) -> bool {
    if let Some(slot) = page.swap_slot() {
        memory.swap().release(slot);
    }

    if !page.is_resident() {
        return false;
    }

    match directory.unmap(page.virtual_address()) {
        Some(frame) => {
            log::trace!("releasing frame {} of page {}", frame, page.virtual_address());
            memory.frames().release_frame(frame);
            true
        }
        // An evicting page is already unmapped; its evictor releases the frame.
        None => {
            if page.state() != PageState::Evicting {
                log::warn!("resident page {} has no hardware mapping", page.virtual_address());
            }
            false
        }
    }
}
