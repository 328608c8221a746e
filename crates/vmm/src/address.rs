//! Address types for physical and virtual memory.
//!
//! This module provides thin newtype wrappers around raw addresses so that virtual
//! page addresses and physical frame addresses cannot be mixed up by accident.

use core::fmt;
use core::ops::{Add, Sub};

use crate::{FrameNumber, PAGE_SIZE, PageNumber};

/// Macro to define common address type functionality.
///
/// This macro generates the basic structure and methods common to both physical
/// and virtual address types, reducing code duplication.
macro_rules! impl_address_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Creates a new address.
            #[inline]
            pub const fn new(addr: usize) -> Self {
                Self(addr)
            }

            /// Returns the raw address value.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// Checks if the address is aligned to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn is_aligned(self, align: usize) -> bool {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                self.0 & (align - 1) == 0
            }

            /// Aligns the address down to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn align_down(self, align: usize) -> Self {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                Self(self.0 & !(align - 1))
            }

            /// Returns true if the address sits on a page boundary.
            #[inline]
            pub const fn is_page_aligned(self) -> bool {
                self.is_aligned(PAGE_SIZE)
            }

            /// Rounds the address down to the start of its containing page.
            #[inline]
            pub const fn page_round_down(self) -> Self {
                self.align_down(PAGE_SIZE)
            }

            /// Returns the byte offset of this address within its page.
            #[inline]
            pub const fn page_offset(self) -> usize {
                self.0 & (PAGE_SIZE - 1)
            }

            /// Subtracts `rhs` bytes, returning `None` on underflow.
            #[inline]
            pub const fn checked_sub(self, rhs: usize) -> Option<Self> {
                match self.0.checked_sub(rhs) {
                    Some(addr) => Some(Self(addr)),
                    None => None,
                }
            }

            /// Adds `rhs` bytes, returning `None` on overflow.
            #[inline]
            pub const fn checked_add(self, rhs: usize) -> Option<Self> {
                match self.0.checked_add(rhs) {
                    Some(addr) => Some(Self(addr)),
                    None => None,
                }
            }
        }

        impl fmt::Pointer for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:p}", self.0 as *const u8)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(addr: usize) -> Self {
                Self::new(addr)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self::new(self.0 + rhs)
            }
        }

        impl Sub<usize> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: usize) -> Self::Output {
                Self::new(self.0 - rhs)
            }
        }

        impl Sub<$name> for $name {
            type Output = usize;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0 - rhs.0
            }
        }
    };
}

impl_address_common!(
    PhysicalAddress,
    "A physical memory address.\n\n\
     Identifies a frame handed out by the frame allocator. Frames are owned by the\n\
     allocator; this crate only records which frame backs a resident page."
);

impl PhysicalAddress {
    /// Returns the corresponding frame number for this physical address.
    #[inline]
    pub const fn frame_number(self) -> FrameNumber {
        FrameNumber::new(self.0 / PAGE_SIZE)
    }
}

impl_address_common!(
    VirtualAddress,
    "A virtual memory address in a user address space.\n\n\
     Faulting addresses and stack pointers arrive as arbitrary virtual addresses;\n\
     the supplemental page table only ever stores page-aligned ones."
);

impl VirtualAddress {
    /// Gets the corresponding page number for this virtual address.
    #[inline]
    pub const fn page_number(self) -> PageNumber {
        PageNumber::new(self.0 / PAGE_SIZE)
    }

    /// Converts the address to a pointer.
    #[inline]
    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod physical_address {
        use super::*;

        #[test]
        fn alignment_check() {
            let addr = PhysicalAddress::new(PAGE_SIZE * 4);
            assert!(addr.is_aligned(PAGE_SIZE));
            assert!(addr.is_page_aligned());
            assert!(!addr.is_aligned(PAGE_SIZE * 8));
        }

        #[test]
        fn frame_number() {
            let addr = PhysicalAddress::new(PAGE_SIZE * 7 + 12);
            assert_eq!(addr.frame_number(), FrameNumber::new(7));
        }

        #[test]
        fn sub_address_operator() {
            let addr1 = PhysicalAddress::new(0x2150);
            let addr2 = PhysicalAddress::new(0x2100);
            assert_eq!(addr1 - addr2, 0x50);
        }

        #[test]
        fn debug_format() {
            let debug_str = format!("{:?}", PhysicalAddress::new(0x1000));
            assert_eq!(debug_str, "PhysicalAddress(0x1000)");
        }
    }

    mod virtual_address {
        use super::*;

        #[test]
        fn page_round_down() {
            let addr = VirtualAddress::new(0x0804_8123);
            assert_eq!(addr.page_round_down(), VirtualAddress::new(0x0804_8000));
            assert_eq!(addr.page_offset(), 0x123);
        }

        #[test]
        fn page_round_down_already_aligned() {
            let addr = VirtualAddress::new(0x0804_9000);
            assert_eq!(addr.page_round_down(), addr);
            assert_eq!(addr.page_offset(), 0);
        }

        #[test]
        fn every_offset_shares_a_page_number() {
            let base = VirtualAddress::new(0x1000_0000);
            for offset in [0, 1, 100, PAGE_SIZE - 1] {
                assert_eq!((base + offset).page_number(), base.page_number());
            }
            assert_ne!((base + PAGE_SIZE).page_number(), base.page_number());
        }

        #[test]
        fn checked_arithmetic() {
            let addr = VirtualAddress::new(16);
            assert_eq!(addr.checked_sub(32), None);
            assert_eq!(addr.checked_sub(16), Some(VirtualAddress::new(0)));
            assert_eq!(VirtualAddress::new(usize::MAX).checked_add(1), None);
        }

        #[test]
        fn comparison_operators() {
            let addr1 = VirtualAddress::new(0x0100);
            let addr2 = VirtualAddress::new(0x0200);
            assert!(addr1 < addr2);
            assert_eq!(addr1, VirtualAddress::new(0x0100));
        }

        #[test]
        fn display_format() {
            let display_str = format!("{}", VirtualAddress::new(0xbfff_f000));
            assert_eq!(display_str, "0xbffff000");
        }
    }
}
