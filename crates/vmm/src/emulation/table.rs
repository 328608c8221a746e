//! A flat software page table.

use hashbrown::HashMap;

use crate::{PageMapper, PageNumber, PhysicalAddress, VirtualAddress, VmError};

use super::{PageEntry, PageFlags};

/// Hardware page table stand-in for one address space.
///
/// Only leaf entries are modelled, keyed by virtual page number. Absent keys
/// behave like not-present entries.
#[derive(Debug, Default)]
pub struct SoftwarePageTable {
    entries: HashMap<PageNumber, PageEntry>,
}

impl SoftwarePageTable {
    /// Creates a new, empty page table.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Returns the entry for the page containing `page`.
    pub fn entry(&self, page: VirtualAddress) -> PageEntry {
        self.entries
            .get(&page.page_number())
            .copied()
            .unwrap_or_default()
    }

    /// Returns the number of present entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PageMapper for SoftwarePageTable {
    fn map(&mut self, page: VirtualAddress, frame: PhysicalAddress, writable: bool) -> Result<(), VmError> {
        let number = page.page_number();
        if self.entries.contains_key(&number) {
            log::warn!("page {} is already mapped", page);
            return Err(VmError::DuplicateMapping);
        }
        self.entries
            .insert(number, PageEntry::new(frame, PageFlags::user(writable)));
        Ok(())
    }

    fn unmap(&mut self, page: VirtualAddress) -> Option<PhysicalAddress> {
        self.entries
            .remove(&page.page_number())
            .and_then(PageEntry::address)
    }

    fn translate(&self, page: VirtualAddress) -> Option<PhysicalAddress> {
        self.entry(page).address()
    }
}
