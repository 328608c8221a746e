//! Page table entry for the software page table.

use core::fmt;

use crate::{PAGE_SIZE, PhysicalAddress};

use super::flags::PageFlags;

/// A single emulated page table entry.
///
/// Laid out like a 32-bit x86 PTE: the frame address occupies the bits above the
/// page offset and the flags sit in the low bits.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct PageEntry(usize);

impl PageEntry {
    /// Frame address mask (everything above the page offset).
    const ADDRESS_MASK: usize = !(PAGE_SIZE - 1);

    /// Creates a new page table entry.
    pub fn new(address: PhysicalAddress, flags: PageFlags) -> Self {
        debug_assert!(
            address.is_page_aligned(),
            "physical address must be page-aligned"
        );
        Self((address.as_usize() & Self::ADDRESS_MASK) | flags.to_raw())
    }

    /// Returns the frame this entry points to, or None if it is not present.
    pub fn address(self) -> Option<PhysicalAddress> {
        if self.is_present() {
            Some(PhysicalAddress::new(self.0 & Self::ADDRESS_MASK))
        } else {
            None
        }
    }

    pub fn flags(self) -> PageFlags {
        PageFlags::from_raw(self.0 & PageFlags::MASK)
    }

    pub fn is_present(self) -> bool {
        self.flags().is_present()
    }

    pub fn is_writable(self) -> bool {
        self.flags().is_writable()
    }

    /// Clears this entry (sets it to zero).
    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

impl fmt::Debug for PageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address() {
            Some(address) => write!(f, "PageEntry({}, {:?})", address, self.flags()),
            None => write!(f, "PageEntry(not present)"),
        }
    }
}
